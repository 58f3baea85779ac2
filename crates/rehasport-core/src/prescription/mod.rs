//! Prescriptions (therapy vouchers).
//!
//! Nothing consumes sessions: `remaining_sessions` is fixed at creation.


use crate::{
    db::{
        Db,
        commit::CommitBatch,
        query::{Order, Predicate},
        store::Row,
    },
    error::{ErrorKind, InternalError},
    model::{Prescription, PrescriptionStatus, Principal, Profile, Role},
    serialize::to_json,
    types::{PrescriptionId, PrincipalId, Timestamp},
    validate::{Validate, ValidateError},
};
use rehasport_config::EnrollmentConfig;
use thiserror::Error as ThisError;
use tracing::{debug, info};

///
/// PrescriptionError
///

#[derive(Debug, ThisError)]
pub enum PrescriptionError {
    #[error("prescription not found: {id}")]
    NotFound { id: PrescriptionId },

    #[error("patient not found: {patient_id}")]
    PatientNotFound { patient_id: PrincipalId },

    #[error("principal {patient_id} has role {role}, not patient")]
    NotAPatient { patient_id: PrincipalId, role: Role },

    #[error("{actor} may not manage prescriptions")]
    Forbidden { actor: PrincipalId },

    #[error("prescription {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: PrescriptionId,
        from: PrescriptionStatus,
        to: PrescriptionStatus,
    },

    #[error("prescription {id} is busy after {attempts} attempts, try again")]
    Contention { id: PrescriptionId, attempts: u32 },

    #[error(transparent)]
    Invalid(#[from] ValidateError),

    #[error(transparent)]
    Store(#[from] InternalError),
}

impl PrescriptionError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. }
            | Self::PatientNotFound { .. }
            | Self::NotAPatient { .. }
            | Self::InvalidTransition { .. }
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
/// NewPrescription
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewPrescription {
    pub patient_id: PrincipalId,
    pub diagnosis: String,
    pub prescribed_sessions: u32,
    /// Defaults to `prescribed_sessions`.
    pub remaining_sessions: Option<u32>,
    pub valid_from: Timestamp,
    pub valid_until: Timestamp,
    pub doctor_name: Option<String>,
    pub insurance_provider: Option<String>,
    pub insurance_number: Option<String>,
    pub notes: Option<String>,
}

///
/// PrescriptionService
///

#[derive(Clone)]
pub struct PrescriptionService {
    db: Db,
    max_retries: u32,
}

impl PrescriptionService {
    #[must_use]
    pub fn new(db: Db, config: &EnrollmentConfig) -> Self {
        Self {
            db,
            max_retries: config.max_retries.max(1),
        }
    }

    pub async fn create(
        &self,
        actor: &Principal,
        new: NewPrescription,
    ) -> Result<Prescription, PrescriptionError> {
        require_staff(actor)?;

        match self.db.load::<Profile>(new.patient_id.as_str()).await? {
            None => {
                return Err(PrescriptionError::PatientNotFound {
                    patient_id: new.patient_id,
                });
            }
            Some(loaded) if loaded.entity.role != Role::Patient => {
                return Err(PrescriptionError::NotAPatient {
                    patient_id: new.patient_id,
                    role: loaded.entity.role,
                });
            }
            Some(_) => {}
        }

        let prescription = Prescription {
            id: PrescriptionId::generate(),
            patient_id: new.patient_id,
            diagnosis: new.diagnosis.trim().to_string(),
            prescribed_sessions: new.prescribed_sessions,
            remaining_sessions: new.remaining_sessions.unwrap_or(new.prescribed_sessions),
            valid_from: new.valid_from,
            valid_until: new.valid_until,
            status: PrescriptionStatus::Pending,
            doctor_name: new.doctor_name,
            insurance_provider: new.insurance_provider,
            insurance_number: new.insurance_number,
            notes: new.notes,
            created_at: Timestamp::now(),
        };
        prescription.validate()?;

        let created = self.db.insert(&prescription).await?;
        info!(
            prescription = %created.entity.id,
            patient = %created.entity.patient_id,
            actor = %actor.id,
            "prescription created"
        );

        Ok(created.entity)
    }

    /// Move a prescription along its lifecycle.
    pub async fn transition(
        &self,
        actor: &Principal,
        id: &PrescriptionId,
        to: PrescriptionStatus,
    ) -> Result<Prescription, PrescriptionError> {
        require_staff(actor)?;

        for attempt in 1..=self.max_retries {
            let loaded = self
                .db
                .load::<Prescription>(id.as_str())
                .await?
                .ok_or_else(|| PrescriptionError::NotFound { id: id.clone() })?;

            let from = loaded.entity.status;
            if !from.can_transition_to(to) {
                return Err(PrescriptionError::InvalidTransition {
                    id: id.clone(),
                    from,
                    to,
                });
            }

            let mut patch = Row::new();
            patch.insert("status".to_string(), to_json(&to)?);

            match self.db.commit(CommitBatch::new().with(loaded.patch_op(patch))).await {
                Ok(_) => {
                    info!(
                        prescription = %id,
                        %from,
                        %to,
                        actor = %actor.id,
                        "prescription status changed"
                    );

                    let mut updated = loaded.entity;
                    updated.status = to;
                    return Ok(updated);
                }
                // A concurrent change may have made the move invalid; the re-read decides.
                Err(err) if err.is_version_conflict() || err.is_not_found() => {
                    debug!(prescription = %id, attempt, "prescription changed, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(PrescriptionError::Contention {
            id: id.clone(),
            attempts: self.max_retries,
        })
    }

    /// Prescriptions of one patient, earliest validity first.
    pub async fn for_patient(
        &self,
        patient_id: &PrincipalId,
    ) -> Result<Vec<Prescription>, PrescriptionError> {
        let rows = self
            .db
            .find::<Prescription>(
                &Predicate::all().eq("patient_id", patient_id.as_str()),
                Some(&Order::asc("valid_from")),
            )
            .await?;

        Ok(rows.into_iter().map(|loaded| loaded.entity).collect())
    }
}

fn require_staff(actor: &Principal) -> Result<(), PrescriptionError> {
    if actor.role.is_staff() {
        Ok(())
    } else {
        Err(PrescriptionError::Forbidden {
            actor: actor.id.clone(),
        })
    }
}
