use serde::{Deserialize, Serialize};
use std::fmt;

///
/// Table
///
/// Relations known to the record store. Names match the backend schema.
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Profiles,
    Courses,
    CourseParticipants,
    Prescriptions,
    Messages,
}

impl Table {
    pub const ALL: [Self; 5] = [
        Self::Profiles,
        Self::Courses,
        Self::CourseParticipants,
        Self::Prescriptions,
        Self::Messages,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Profiles => "profiles",
            Self::Courses => "courses",
            Self::CourseParticipants => "course_participants",
            Self::Prescriptions => "prescriptions",
            Self::Messages => "messages",
        }
    }

    /// Secondary unique constraints, beyond the primary `id`.
    #[must_use]
    pub const fn unique_keys(self) -> &'static [&'static [&'static str]] {
        match self {
            Self::CourseParticipants => &[&["course_id", "patient_id"]],
            Self::Profiles | Self::Courses | Self::Prescriptions | Self::Messages => &[],
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
