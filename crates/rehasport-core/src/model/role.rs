use serde::{Deserialize, Serialize};
use std::fmt;

///
/// Role
///
/// Exactly one role per principal. Older rows spell the trainer role
/// `therapist`; both decode to [`Role::Trainer`].
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    #[serde(alias = "therapist")]
    Trainer,
    Patient,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Trainer => "trainer",
            Self::Patient => "patient",
        }
    }

    /// Admins and trainers run courses and manage patients.
    #[must_use]
    pub const fn is_staff(self) -> bool {
        matches!(self, Self::Admin | Self::Trainer)
    }

    /// Parse signup metadata; unknown values yield `None`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Self::Admin),
            "trainer" | "therapist" => Some(Self::Trainer),
            "patient" => Some(Self::Patient),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<rehasport_config::DefaultRole> for Role {
    fn from(role: rehasport_config::DefaultRole) -> Self {
        match role {
            rehasport_config::DefaultRole::Admin => Self::Admin,
            rehasport_config::DefaultRole::Trainer => Self::Trainer,
            rehasport_config::DefaultRole::Patient => Self::Patient,
        }
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_therapist_spelling_decodes_as_trainer() {
        let role: Role = serde_json::from_str("\"therapist\"").expect("legacy role should decode");

        assert_eq!(role, Role::Trainer);
        assert_eq!(
            serde_json::to_string(&role).expect("role should encode"),
            "\"trainer\""
        );
    }

    #[test]
    fn unknown_role_does_not_decode() {
        assert!(serde_json::from_str::<Role>("\"superuser\"").is_err());
        assert_eq!(Role::parse("superuser"), None);
        assert_eq!(Role::parse(" Patient "), Some(Role::Patient));
    }
}
