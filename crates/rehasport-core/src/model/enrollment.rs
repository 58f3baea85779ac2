use crate::{
    db::Table,
    traits::Entity,
    types::{CourseId, EnrollmentId, PrescriptionId, PrincipalId, Timestamp},
};
use serde::{Deserialize, Serialize};

///
/// EnrollmentStatus
///
/// Rows exist only while the patient is enrolled; removal deletes the row.
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    #[default]
    Active,
}

///
/// Enrollment
///
/// `course_participants`-shaped record, unique on `(course_id, patient_id)`.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Enrollment {
    pub id: EnrollmentId,
    pub course_id: CourseId,
    pub patient_id: PrincipalId,
    #[serde(alias = "joined_date")]
    pub joined_at: Timestamp,
    #[serde(default)]
    pub status: EnrollmentStatus,
    #[serde(default)]
    pub attendance_count: u32,
    #[serde(default)]
    pub prescription_id: Option<PrescriptionId>,
}

impl Enrollment {
    #[must_use]
    pub fn new(course_id: CourseId, patient_id: PrincipalId) -> Self {
        Self {
            id: EnrollmentId::generate(),
            course_id,
            patient_id,
            joined_at: Timestamp::now(),
            status: EnrollmentStatus::Active,
            attendance_count: 0,
            prescription_id: None,
        }
    }
}

impl Entity for Enrollment {
    const TABLE: Table = Table::CourseParticipants;

    fn key(&self) -> &str {
        self.id.as_str()
    }
}
