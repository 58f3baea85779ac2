use crate::{
    db::Table,
    model::Role,
    traits::Entity,
    types::{PrincipalId, Timestamp},
    validate::{Issues, Validate, check_text},
};
use serde::{Deserialize, Serialize};

/// Longest accepted display name.
pub const MAX_NAME_LEN: usize = 120;

/// Longest accepted phone number, email or insurance field.
pub const MAX_CONTACT_LEN: usize = 120;

/// Longest accepted free-text note.
pub const MAX_NOTES_LEN: usize = 2000;

///
/// Profile
///
/// `profiles`-shaped record. The primary key is the identity provider's
/// subject id, which makes profile creation idempotent per principal.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Profile {
    pub id: PrincipalId,
    #[serde(default)]
    pub email: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub insurance_provider: Option<String>,
    #[serde(default)]
    pub insurance_number: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub created_at: Timestamp,
    #[serde(default)]
    pub updated_at: Option<Timestamp>,
}

impl Profile {
    #[must_use]
    pub fn new(id: PrincipalId, email: Option<String>, role: Role) -> Self {
        Self {
            id,
            email,
            role,
            full_name: None,
            phone: None,
            insurance_provider: None,
            insurance_number: None,
            notes: None,
            created_at: Timestamp::now(),
            updated_at: None,
        }
    }

    /// Case-insensitive match of `needle` against name, email and insurer.
    #[must_use]
    pub fn matches_search(&self, needle: &str) -> bool {
        let needle = needle.trim().to_lowercase();

        [&self.full_name, &self.email, &self.insurance_provider]
            .into_iter()
            .flatten()
            .any(|field| field.to_lowercase().contains(&needle))
    }
}

impl Validate for Profile {
    fn validate_into(&self, issues: &mut Issues) {
        let optional = [
            ("full_name", &self.full_name, MAX_NAME_LEN),
            ("email", &self.email, MAX_CONTACT_LEN),
            ("phone", &self.phone, MAX_CONTACT_LEN),
            ("insurance_provider", &self.insurance_provider, MAX_CONTACT_LEN),
            ("insurance_number", &self.insurance_number, MAX_CONTACT_LEN),
            ("notes", &self.notes, MAX_NOTES_LEN),
        ];
        for (field, value, max) in optional {
            if let Some(value) = value {
                check_text(issues, field, value, max);
            }
        }

        if let Some(email) = &self.email {
            issues.ensure(email.contains('@'), "email", "must contain '@'");
        }
    }
}

impl Entity for Profile {
    const TABLE: Table = Table::Profiles;

    fn key(&self) -> &str {
        self.id.as_str()
    }
}

///
/// Principal
///
/// An authenticated identity with its resolved role.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Principal {
    pub id: PrincipalId,
    pub email: Option<String>,
    pub role: Role,
}

impl Principal {
    #[must_use]
    pub fn new(id: impl Into<PrincipalId>, role: Role) -> Self {
        Self {
            id: id.into(),
            email: None,
            role,
        }
    }
}

impl From<&Profile> for Principal {
    fn from(profile: &Profile) -> Self {
        Self {
            id: profile.id.clone(),
            email: profile.email.clone(),
            role: profile.role,
        }
    }
}

///
/// TESTS
///
