use crate::{
    db::Table,
    traits::Entity,
    types::{PrescriptionId, PrincipalId, Timestamp},
    validate::{Issues, Validate, check_text},
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest accepted diagnosis text.
pub const MAX_DIAGNOSIS_LEN: usize = 500;

///
/// PrescriptionStatus
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PrescriptionStatus {
    #[default]
    Pending,
    Approved,
    Completed,
    Cancelled,
}

impl PrescriptionStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// `pending -> approved | cancelled`, `approved -> completed | cancelled`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Approved | Self::Cancelled)
                | (Self::Approved, Self::Completed | Self::Cancelled)
        )
    }
}

impl fmt::Display for PrescriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

///
/// Prescription
///
/// Therapy voucher. `remaining_sessions` is set at creation; nothing in the
/// runtime consumes sessions yet.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Prescription {
    pub id: PrescriptionId,
    pub patient_id: PrincipalId,
    pub diagnosis: String,
    pub prescribed_sessions: u32,
    pub remaining_sessions: u32,
    #[serde(alias = "start_date")]
    pub valid_from: Timestamp,
    #[serde(alias = "end_date")]
    pub valid_until: Timestamp,
    #[serde(default)]
    pub status: PrescriptionStatus,
    #[serde(default)]
    pub doctor_name: Option<String>,
    #[serde(default)]
    pub insurance_provider: Option<String>,
    #[serde(default)]
    pub insurance_number: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub created_at: Timestamp,
}

impl Entity for Prescription {
    const TABLE: Table = Table::Prescriptions;

    fn key(&self) -> &str {
        self.id.as_str()
    }
}

impl Validate for Prescription {
    fn validate_into(&self, issues: &mut Issues) {
        check_text(issues, "diagnosis", &self.diagnosis, MAX_DIAGNOSIS_LEN);
        issues.ensure(
            self.prescribed_sessions > 0,
            "prescribed_sessions",
            "must be positive",
        );
        issues.ensure(
            self.remaining_sessions <= self.prescribed_sessions,
            "remaining_sessions",
            "must not exceed prescribed_sessions",
        );
        issues.ensure(
            self.valid_until >= self.valid_from,
            "valid_until",
            "must not precede valid_from",
        );
    }
}

///
/// TESTS
///
