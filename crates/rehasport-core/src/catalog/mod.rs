//! Course catalog: creation, edits, cancellation and deletion.
//!
//! The catalog never writes `current_enrollment`; edits are versioned
//! patches with that column stripped, and deletion removes the course and
//! its enrollments in one batch.


use crate::{
    db::{
        Db, Loaded,
        commit::CommitBatch,
        query::{Order, Predicate},
    },
    error::{ErrorKind, InternalError},
    model::{Course, CourseStatus, ENROLLMENT_COUNT_FIELD, Enrollment, Principal, Role},
    serialize::{to_json, to_row},
    types::{CourseId, PrincipalId, Timestamp},
    validate::{Validate, ValidateError},
};
use rehasport_config::EnrollmentConfig;
use thiserror::Error as ThisError;
use tracing::{debug, info};

///
/// CatalogError
///

#[derive(Debug, ThisError)]
pub enum CatalogError {
    #[error("course not found: {course_id}")]
    NotFound { course_id: CourseId },

    #[error("{actor} may not {action}")]
    Forbidden {
        actor: PrincipalId,
        action: &'static str,
    },

    #[error(transparent)]
    Invalid(#[from] ValidateError),

    #[error("course {course_id} has {current} participants, capacity {capacity} is too small")]
    CapacityBelowEnrollment {
        course_id: CourseId,
        capacity: u32,
        current: u32,
    },

    #[error("course {course_id} is busy after {attempts} attempts, try again")]
    Contention { course_id: CourseId, attempts: u32 },

    #[error(transparent)]
    Store(#[from] InternalError),
}

impl CatalogError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } | Self::Invalid(_) | Self::CapacityBelowEnrollment { .. } => {
                ErrorKind::Validation
            }
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
/// NewCourse
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewCourse {
    pub title: String,
    pub description: Option<String>,
    pub capacity: u32,
    pub instructor_id: Option<PrincipalId>,
    pub start: Timestamp,
    pub end: Timestamp,
    pub location: Option<String>,
}

///
/// CoursePatch
///
/// Fields left `None` keep their stored value.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CoursePatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: Option<Timestamp>,
    pub end: Option<Timestamp>,
    pub status: Option<CourseStatus>,
    pub capacity: Option<u32>,
    pub instructor_id: Option<PrincipalId>,
}

impl CoursePatch {
    fn apply(self, course: &mut Course) {
        if let Some(title) = self.title {
            course.title = title.trim().to_string();
        }
        if let Some(description) = self.description {
            course.description = Some(description);
        }
        if let Some(location) = self.location {
            course.location = Some(location);
        }
        if let Some(start) = self.start {
            course.start = start;
        }
        if let Some(end) = self.end {
            course.end = end;
        }
        if let Some(status) = self.status {
            course.status = status;
        }
        if let Some(capacity) = self.capacity {
            course.capacity = capacity;
        }
        if let Some(instructor_id) = self.instructor_id {
            course.instructor_id = Some(instructor_id);
        }
    }
}

///
/// CourseFilter
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CourseFilter {
    pub status: Option<CourseStatus>,
    pub instructor_id: Option<PrincipalId>,
}

impl CourseFilter {
    fn predicate(&self) -> Result<Predicate, InternalError> {
        let mut predicate = Predicate::all();
        if let Some(status) = self.status {
            predicate = predicate.eq("status", to_json(&status)?);
        }
        if let Some(instructor_id) = &self.instructor_id {
            predicate = predicate.eq("instructor_id", instructor_id.as_str());
        }

        Ok(predicate)
    }
}

///
/// CatalogService
///

#[derive(Clone)]
pub struct CatalogService {
    db: Db,
    max_retries: u32,
}

impl CatalogService {
    #[must_use]
    pub fn new(db: Db, config: &EnrollmentConfig) -> Self {
        Self {
            db,
            max_retries: config.max_retries.max(1),
        }
    }

    /// Create an active, empty course. Trainers default to instructing it.
    pub async fn create_course(
        &self,
        actor: &Principal,
        new: NewCourse,
    ) -> Result<Course, CatalogError> {
        if !actor.role.is_staff() {
            return Err(forbidden(actor, "create courses"));
        }

        let instructor_id = new
            .instructor_id
            .or_else(|| (actor.role == Role::Trainer).then(|| actor.id.clone()));
        let course = Course {
            id: CourseId::generate(),
            title: new.title.trim().to_string(),
            description: new.description,
            capacity: new.capacity,
            current_enrollment: 0,
            status: CourseStatus::Active,
            instructor_id,
            start: new.start,
            end: new.end,
            location: new.location,
        };
        course.validate()?;

        let created = self.db.insert(&course).await?;
        info!(course = %created.entity.id, actor = %actor.id, "course created");

        Ok(created.entity)
    }

    pub async fn get_course(&self, course_id: &CourseId) -> Result<Course, CatalogError> {
        self.load(course_id).await.map(|loaded| loaded.entity)
    }

    /// Apply `patch` to a course. Admins may edit any course, trainers only
    /// the ones they instruct.
    pub async fn update_course(
        &self,
        actor: &Principal,
        course_id: &CourseId,
        patch: CoursePatch,
    ) -> Result<Course, CatalogError> {
        for attempt in 1..=self.max_retries {
            let loaded = self.load(course_id).await?;
            if !may_edit(actor, &loaded.entity) {
                return Err(forbidden(actor, "edit this course"));
            }

            let mut updated = loaded.entity.clone();
            patch.clone().apply(&mut updated);
            if updated.capacity < updated.current_enrollment {
                return Err(CatalogError::CapacityBelowEnrollment {
                    course_id: course_id.clone(),
                    capacity: updated.capacity,
                    current: updated.current_enrollment,
                });
            }
            updated.validate()?;

            let mut row = to_row(&updated).map_err(InternalError::from)?;
            row.remove("id");
            row.remove(ENROLLMENT_COUNT_FIELD);

            match self.db.commit(CommitBatch::new().with(loaded.patch_op(row))).await {
                Ok(_) => {
                    info!(course = %course_id, actor = %actor.id, "course updated");
                    return Ok(updated);
                }
                Err(err) if err.is_version_conflict() => {
                    debug!(course = %course_id, attempt, "course changed during edit, retrying");
                }
                Err(err) if err.is_not_found() => {
                    return Err(CatalogError::NotFound {
                        course_id: course_id.clone(),
                    });
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(CatalogError::Contention {
            course_id: course_id.clone(),
            attempts: self.max_retries,
        })
    }

    /// Logical removal: the course stays, marked cancelled.
    pub async fn cancel_course(
        &self,
        actor: &Principal,
        course_id: &CourseId,
    ) -> Result<Course, CatalogError> {
        let patch = CoursePatch {
            status: Some(CourseStatus::Cancelled),
            ..CoursePatch::default()
        };

        self.update_course(actor, course_id, patch).await
    }

    /// Irreversibly delete a course and its enrollments. Admin only.
    pub async fn delete_course(
        &self,
        actor: &Principal,
        course_id: &CourseId,
    ) -> Result<usize, CatalogError> {
        if actor.role != Role::Admin {
            return Err(forbidden(actor, "delete courses"));
        }

        for attempt in 1..=self.max_retries {
            let course = self.load(course_id).await?;
            let enrollments = self
                .db
                .find::<Enrollment>(&Predicate::all().eq("course_id", course_id.as_str()), None)
                .await?;

            let mut batch = CommitBatch::new().with(course.delete_op());
            for enrollment in &enrollments {
                batch.push(enrollment.delete_op());
            }

            match self.db.commit(batch).await {
                Ok(_) => {
                    info!(
                        course = %course_id,
                        actor = %actor.id,
                        enrollments = enrollments.len(),
                        "course deleted"
                    );
                    return Ok(enrollments.len());
                }
                Err(err) if err.is_version_conflict() || err.is_not_found() => {
                    debug!(course = %course_id, attempt, "course changed during delete, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(CatalogError::Contention {
            course_id: course_id.clone(),
            attempts: self.max_retries,
        })
    }

    /// Courses matching `filter`, earliest start first.
    pub async fn list_courses(&self, filter: &CourseFilter) -> Result<Vec<Course>, CatalogError> {
        let rows = self
            .db
            .find::<Course>(&filter.predicate()?, Some(&Order::asc("start")))
            .await?;

        Ok(rows.into_iter().map(|loaded| loaded.entity).collect())
    }

    async fn load(&self, course_id: &CourseId) -> Result<Loaded<Course>, CatalogError> {
        self.db
            .load::<Course>(course_id.as_str())
            .await?
            .ok_or_else(|| CatalogError::NotFound {
                course_id: course_id.clone(),
            })
    }
}

fn may_edit(actor: &Principal, course: &Course) -> bool {
    match actor.role {
        Role::Admin => true,
        Role::Trainer => course.is_instructed_by(&actor.id),
        Role::Patient => false,
    }
}

fn forbidden(actor: &Principal, action: &'static str) -> CatalogError {
    CatalogError::Forbidden {
        actor: actor.id.clone(),
        action,
    }
}
