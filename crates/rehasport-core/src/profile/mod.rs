//! Profile self-service and the staff patient directory.
//!
//! Any signed-in principal may edit their own name and phone. Creating,
//! editing and listing patient records is gated by the `Patients` area.

#[cfg(test)]
mod tests;

use crate::{
    db::{
        Db, Loaded,
        commit::CommitBatch,
        query::{Order, Predicate},
        store::Row,
    },
    error::{ErrorKind, InternalError},
    identity::{Area, Decision, Viewer, authorize},
    model::{Principal, Profile, Role},
    serialize::to_json,
    types::{PrincipalId, Timestamp},
    validate::{Validate, ValidateError},
};
use rehasport_config::EnrollmentConfig;
use thiserror::Error as ThisError;
use tracing::{debug, info};

///
/// ProfileError
///

#[derive(Debug, ThisError)]
pub enum ProfileError {
    #[error("profile not found: {id}")]
    NotFound { id: PrincipalId },

    #[error("principal {id} has role {role}, not patient")]
    NotAPatient { id: PrincipalId, role: Role },

    #[error("profile {id} already exists")]
    AlreadyExists { id: PrincipalId },

    #[error("{actor} may not access {area}")]
    Forbidden { actor: PrincipalId, area: Area },

    #[error(transparent)]
    Invalid(#[from] ValidateError),

    #[error("profile {id} is busy after {attempts} attempts, try again")]
    Contention { id: PrincipalId, attempts: u32 },

    #[error(transparent)]
    Store(#[from] InternalError),
}

impl ProfileError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. }
            | Self::NotAPatient { .. }
            | Self::AlreadyExists { .. }
            | Self::Invalid(_) => ErrorKind::Validation,
            Self::Forbidden { .. } => ErrorKind::Authorization,
            Self::Contention { .. } => ErrorKind::Contention,
            Self::Store(err) => err.kind(),
        }
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Contention { .. } => true,
            Self::Store(err) => err.is_transient(),
            _ => false,
        }
    }
}

///
/// OwnProfilePatch
///
/// The fields a principal may change on their own profile. `None` keeps the
/// stored value; a blank phone clears it.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct OwnProfilePatch {
    pub full_name: Option<String>,
    pub phone: Option<String>,
}

///
/// NewPatient
///
/// Staff-entered patient record. `id` is the identity provider subject the
/// patient signs in with.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewPatient {
    pub id: PrincipalId,
    pub email: Option<String>,
    pub full_name: String,
    pub phone: Option<String>,
    pub insurance_provider: Option<String>,
    pub insurance_number: Option<String>,
    pub notes: Option<String>,
}

///
/// PatientPatch
///
/// Staff edit of a patient record. `None` keeps the stored value; blank
/// optional fields are cleared.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PatientPatch {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub insurance_provider: Option<String>,
    pub insurance_number: Option<String>,
    pub notes: Option<String>,
}

impl PatientPatch {
    fn apply(self, profile: &mut Profile) {
        if let Some(full_name) = self.full_name {
            profile.full_name = Some(full_name.trim().to_string());
        }
        for (value, slot) in [
            (self.email, &mut profile.email),
            (self.phone, &mut profile.phone),
            (self.insurance_provider, &mut profile.insurance_provider),
            (self.insurance_number, &mut profile.insurance_number),
            (self.notes, &mut profile.notes),
        ] {
            if let Some(value) = value {
                *slot = non_blank(value);
            }
        }
    }
}

///
/// ProfileService
///

#[derive(Clone)]
pub struct ProfileService {
    db: Db,
    max_retries: u32,
}

impl ProfileService {
    #[must_use]
    pub fn new(db: Db, config: &EnrollmentConfig) -> Self {
        Self {
            db,
            max_retries: config.max_retries.max(1),
        }
    }

    //
    // Self-service
    //

    /// The actor's own profile.
    pub async fn own(&self, actor: &Principal) -> Result<Profile, ProfileError> {
        require(actor, Area::Profile)?;

        self.load(&actor.id).await.map(|loaded| loaded.entity)
    }

    /// Change the actor's own display name and phone.
    pub async fn update_own(
        &self,
        actor: &Principal,
        patch: OwnProfilePatch,
    ) -> Result<Profile, ProfileError> {
        require(actor, Area::Profile)?;

        self.edit(&actor.id, |profile| {
            if let Some(full_name) = patch.full_name.clone() {
                profile.full_name = Some(full_name.trim().to_string());
            }
            if let Some(phone) = patch.phone.clone() {
                profile.phone = non_blank(phone);
            }
            Ok(())
        })
        .await
    }

    //
    // Patient directory
    //

    /// Register a patient profile ahead of their first sign-in.
    pub async fn create_patient(
        &self,
        actor: &Principal,
        new: NewPatient,
    ) -> Result<Profile, ProfileError> {
        require(actor, Area::Patients)?;

        let mut profile = Profile::new(new.id, new.email.and_then(non_blank), Role::Patient);
        profile.full_name = Some(new.full_name.trim().to_string());
        profile.phone = new.phone.and_then(non_blank);
        profile.insurance_provider = new.insurance_provider.and_then(non_blank);
        profile.insurance_number = new.insurance_number.and_then(non_blank);
        profile.notes = new.notes.and_then(non_blank);
        profile.validate()?;

        match self.db.insert(&profile).await {
            Ok(created) => {
                info!(patient = %created.entity.id, actor = %actor.id, "patient created");
                Ok(created.entity)
            }
            Err(err) if err.is_unique_violation() => Err(ProfileError::AlreadyExists {
                id: profile.id.clone(),
            }),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn get_patient(
        &self,
        actor: &Principal,
        id: &PrincipalId,
    ) -> Result<Profile, ProfileError> {
        require(actor, Area::Patients)?;

        let loaded = self.load(id).await?;
        require_patient(&loaded.entity)?;

        Ok(loaded.entity)
    }

    /// Apply a staff edit to a patient record.
    pub async fn update_patient(
        &self,
        actor: &Principal,
        id: &PrincipalId,
        patch: PatientPatch,
    ) -> Result<Profile, ProfileError> {
        require(actor, Area::Patients)?;

        let updated = self
            .edit(id, |profile| {
                require_patient(profile)?;
                patch.clone().apply(profile);
                Ok(())
            })
            .await?;
        info!(patient = %id, actor = %actor.id, "patient updated");

        Ok(updated)
    }

    /// Patients ordered by name. `search` filters case-insensitively on
    /// name, email and insurance provider.
    pub async fn list_patients(
        &self,
        actor: &Principal,
        search: Option<&str>,
    ) -> Result<Vec<Profile>, ProfileError> {
        require(actor, Area::Patients)?;

        let predicate = Predicate::all().eq("role", to_json(&Role::Patient)?);
        let rows = self
            .db
            .find::<Profile>(&predicate, Some(&Order::asc("full_name")))
            .await?;

        let search = search.map(str::trim).filter(|needle| !needle.is_empty());

        Ok(rows
            .into_iter()
            .map(|loaded| loaded.entity)
            .filter(|profile| search.is_none_or(|needle| profile.matches_search(needle)))
            .collect())
    }

    //
    // Helpers
    //

    // Versioned read-modify-write of the editable profile columns.
    async fn edit<F>(&self, id: &PrincipalId, change: F) -> Result<Profile, ProfileError>
    where
        F: Fn(&mut Profile) -> Result<(), ProfileError>,
    {
        for attempt in 1..=self.max_retries {
            let loaded = self.load(id).await?;

            let mut updated = loaded.entity.clone();
            change(&mut updated)?;
            updated.validate()?;
            updated.updated_at = Some(Timestamp::now());

            let patch = editable_columns(&updated)?;
            match self.db.commit(CommitBatch::new().with(loaded.patch_op(patch))).await {
                Ok(_) => return Ok(updated),
                Err(err) if err.is_version_conflict() || err.is_not_found() => {
                    debug!(profile = %id, attempt, "profile changed during edit, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(ProfileError::Contention {
            id: id.clone(),
            attempts: self.max_retries,
        })
    }

    async fn load(&self, id: &PrincipalId) -> Result<Loaded<Profile>, ProfileError> {
        self.db
            .load::<Profile>(id.as_str())
            .await?
            .ok_or_else(|| ProfileError::NotFound { id: id.clone() })
    }
}

fn require(actor: &Principal, area: Area) -> Result<(), ProfileError> {
    match authorize(&Viewer::Principal(actor.clone()), area) {
        Decision::Allow => Ok(()),
        Decision::RedirectTo(_) => Err(ProfileError::Forbidden {
            actor: actor.id.clone(),
            area,
        }),
    }
}

fn require_patient(profile: &Profile) -> Result<(), ProfileError> {
    if profile.role == Role::Patient {
        Ok(())
    } else {
        Err(ProfileError::NotAPatient {
            id: profile.id.clone(),
            role: profile.role,
        })
    }
}

// Role, id and creation time are never rewritten by an edit.
fn editable_columns(profile: &Profile) -> Result<Row, InternalError> {
    let mut row = Row::new();
    for (field, value) in [
        ("full_name", &profile.full_name),
        ("email", &profile.email),
        ("phone", &profile.phone),
        ("insurance_provider", &profile.insurance_provider),
        ("insurance_number", &profile.insurance_number),
        ("notes", &profile.notes),
    ] {
        row.insert(field.to_string(), to_json(value)?);
    }
    row.insert("updated_at".to_string(), to_json(&profile.updated_at)?);

    Ok(row)
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();

    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
