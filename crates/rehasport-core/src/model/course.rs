use crate::{
    db::Table,
    traits::Entity,
    types::{CourseId, PrincipalId, Timestamp},
    validate::{Issues, Validate, check_text},
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest accepted course title.
pub const MAX_TITLE_LEN: usize = 200;

/// Column holding the cached enrollment count.
pub const ENROLLMENT_COUNT_FIELD: &str = "current_enrollment";

///
/// CourseStatus
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CourseStatus {
    #[default]
    Active,
    Completed,
    Cancelled,
}

impl CourseStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for CourseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

///
/// Course
///
/// `courses`-shaped record. `current_enrollment` caches the number of
/// enrollment rows for the course and is only written through commit
/// batches that also insert or delete the matching enrollment row.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Course {
    pub id: CourseId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(alias = "max_participants")]
    pub capacity: u32,
    #[serde(alias = "current_participants", default)]
    pub current_enrollment: u32,
    #[serde(default)]
    pub status: CourseStatus,
    #[serde(default)]
    pub instructor_id: Option<PrincipalId>,
    pub start: Timestamp,
    pub end: Timestamp,
    #[serde(default)]
    pub location: Option<String>,
}

impl Course {
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self.status, CourseStatus::Active)
    }

    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.current_enrollment >= self.capacity
    }

    #[must_use]
    pub const fn capacity_view(&self) -> Capacity {
        Capacity::new(self.capacity, self.current_enrollment)
    }

    /// Whether `principal` instructs this course.
    #[must_use]
    pub fn is_instructed_by(&self, principal: &PrincipalId) -> bool {
        self.instructor_id.as_ref() == Some(principal)
    }
}

impl Entity for Course {
    const TABLE: Table = Table::Courses;

    fn key(&self) -> &str {
        self.id.as_str()
    }
}

impl Validate for Course {
    fn validate_into(&self, issues: &mut Issues) {
        check_text(issues, "title", &self.title, MAX_TITLE_LEN);
        issues.ensure(self.capacity > 0, "capacity", "must be positive");
        issues.ensure(
            self.current_enrollment <= self.capacity,
            "current_enrollment",
            "must not exceed capacity",
        );
        issues.ensure(self.end >= self.start, "end", "must not precede start");
    }
}

///
/// Capacity
///
/// Read-only capacity snapshot; `remaining` never underflows.
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Capacity {
    pub capacity: u32,
    pub current: u32,
    pub remaining: u32,
}

impl Capacity {
    #[must_use]
    pub const fn new(capacity: u32, current: u32) -> Self {
        Self {
            capacity,
            current,
            remaining: capacity.saturating_sub(current),
        }
    }
}

///
/// TESTS
///
