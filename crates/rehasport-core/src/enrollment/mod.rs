//! Course participant lifecycle.
//!
//! Every change to `(Course.current_enrollment, Enrollment existence)` is a
//! single [`CommitBatch`]: the counter update is pinned to the course
//! version that was read, and the enrollment row is inserted or deleted in
//! the same batch. A per-course lock queues local callers; the version pin
//! covers writers outside this process.

mod error;
mod locks;


pub use error::EnrollmentError;
pub use locks::CourseLocks;

use crate::{
    db::{
        Db, Loaded, Table,
        commit::{CommitBatch, CommitOp},
        insert_op,
        query::{Order, Predicate},
        store::Row,
    },
    error::InternalError,
    model::{
        Capacity, Course, ENROLLMENT_COUNT_FIELD, Enrollment, Prescription, PrescriptionStatus,
        Principal, Profile, Role,
    },
    obs::{MetricsEvent, RejectReason, SharedSink, global_sink},
    types::{CourseId, PrescriptionId, PrincipalId},
};
use rehasport_config::EnrollmentConfig;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{debug, info, warn};

///
/// Recount
///
/// Result of recomputing a course's cached count from membership.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Recount {
    pub course_id: CourseId,
    pub cached: u32,
    pub actual: u32,
}

impl Recount {
    #[must_use]
    pub const fn drifted(&self) -> bool {
        self.cached != self.actual
    }
}

///
/// EnrollmentService
///

#[derive(Clone)]
pub struct EnrollmentService {
    db: Db,
    locks: Arc<CourseLocks>,
    max_retries: u32,
    sink: SharedSink,
}

impl EnrollmentService {
    #[must_use]
    pub fn new(db: Db, config: &EnrollmentConfig) -> Self {
        Self {
            db,
            locks: Arc::new(CourseLocks::new(config.lock_prune_threshold)),
            max_retries: config.max_retries.max(1),
            sink: global_sink(),
        }
    }

    #[must_use]
    pub fn with_sink(mut self, sink: SharedSink) -> Self {
        self.sink = sink;
        self
    }

    //
    // Core operations
    //

    /// Enroll `patient_id` in `course_id`.
    ///
    /// The seat check and the count increment happen inside one commit, so
    /// concurrent callers racing for the last seat cannot both succeed.
    pub async fn enroll(
        &self,
        course_id: &CourseId,
        patient_id: &PrincipalId,
    ) -> Result<Enrollment, EnrollmentError> {
        self.require_patient(patient_id).await?;
        let _guard = self.locks.acquire(course_id).await;

        for attempt in 1..=self.max_retries {
            let course = self.load_course(course_id).await?;
            if !course.entity.is_active() {
                return Err(self.reject(
                    RejectReason::CourseNotActive,
                    EnrollmentError::CourseNotActive {
                        course_id: course_id.clone(),
                        status: course.entity.status,
                    },
                ));
            }
            if self.find_enrollment(course_id, patient_id).await?.is_some() {
                return Err(self.already_enrolled(course_id, patient_id));
            }
            if course.entity.is_full() {
                return Err(self.capacity_exceeded(&course.entity));
            }

            let enrollment = Enrollment::new(course_id.clone(), patient_id.clone());
            let batch = CommitBatch::new()
                .with(CommitOp::IncrementIfBelow {
                    table: Table::Courses,
                    id: course_id.to_string(),
                    field: ENROLLMENT_COUNT_FIELD.to_string(),
                    limit: i64::from(course.entity.capacity),
                    delta: 1,
                    expected_version: Some(course.version),
                })
                .with(insert_op(&enrollment)?);

            match self.db.commit(batch).await {
                Ok(_) => {
                    info!(course = %course_id, patient = %patient_id, attempt, "enrolled");
                    self.sink
                        .record(MetricsEvent::EnrollCommitted { attempts: attempt });

                    return Ok(enrollment);
                }
                // A vanished course is reported by the re-read.
                Err(err) if err.is_version_conflict() || err.is_not_found() => {
                    debug!(course = %course_id, attempt, "course changed during enroll, retrying");
                }
                Err(err) if err.is_limit_reached() => {
                    return Err(self.capacity_exceeded(&course.entity));
                }
                Err(err) if err.is_unique_violation() => {
                    return Err(self.already_enrolled(course_id, patient_id));
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(self.contention(course_id))
    }

    /// Remove `patient_id` from `course_id`.
    ///
    /// The count is floored at zero; a clamp means the cache had drifted and
    /// is logged rather than underflowing.
    pub async fn remove(
        &self,
        course_id: &CourseId,
        patient_id: &PrincipalId,
    ) -> Result<(), EnrollmentError> {
        let _guard = self.locks.acquire(course_id).await;

        for attempt in 1..=self.max_retries {
            let course = self.load_course(course_id).await?;
            let Some(enrollment) = self.find_enrollment(course_id, patient_id).await? else {
                return Err(EnrollmentError::NotEnrolled {
                    course_id: course_id.clone(),
                    patient_id: patient_id.clone(),
                });
            };

            let batch = CommitBatch::new()
                .with(enrollment.delete_op())
                .with(CommitOp::DecrementSaturating {
                    table: Table::Courses,
                    id: course_id.to_string(),
                    field: ENROLLMENT_COUNT_FIELD.to_string(),
                    delta: 1,
                    expected_version: Some(course.version),
                });

            match self.db.commit(batch).await {
                Ok(receipt) => {
                    if receipt.was_clamped() {
                        warn!(
                            course = %course_id,
                            patient = %patient_id,
                            "enrollment count was already zero, clamped"
                        );
                        self.sink.record(MetricsEvent::CountClamped);
                    }
                    info!(course = %course_id, patient = %patient_id, attempt, "enrollment removed");
                    self.sink
                        .record(MetricsEvent::RemoveCommitted { attempts: attempt });

                    return Ok(());
                }
                // The row may have been removed concurrently; the re-read decides.
                Err(err) if err.is_version_conflict() || err.is_not_found() => {
                    debug!(course = %course_id, attempt, "course changed during remove, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(self.contention(course_id))
    }

    /// Read-only capacity snapshot.
    pub async fn capacity_of(&self, course_id: &CourseId) -> Result<Capacity, EnrollmentError> {
        let course = self.load_course(course_id).await?;

        Ok(course.entity.capacity_view())
    }

    //
    // Actor-checked entry points
    //

    /// Enroll on behalf of `actor`. Staff may enroll anyone; a patient only
    /// themself.
    pub async fn enroll_as(
        &self,
        actor: &Principal,
        course_id: &CourseId,
        patient_id: &PrincipalId,
    ) -> Result<Enrollment, EnrollmentError> {
        self.authorize_actor(actor, patient_id)?;

        self.enroll(course_id, patient_id).await
    }

    /// Remove on behalf of `actor`, with the same rules as [`Self::enroll_as`].
    pub async fn remove_as(
        &self,
        actor: &Principal,
        course_id: &CourseId,
        patient_id: &PrincipalId,
    ) -> Result<(), EnrollmentError> {
        self.authorize_actor(actor, patient_id)?;

        self.remove(course_id, patient_id).await
    }

    //
    // Membership
    //

    /// Enrollments of a course, oldest first.
    pub async fn participants(&self, course_id: &CourseId) -> Result<Vec<Enrollment>, EnrollmentError> {
        self.load_course(course_id).await?;
        let rows = self
            .db
            .find::<Enrollment>(&by_course(course_id), Some(&Order::asc("joined_at")))
            .await?;

        Ok(rows.into_iter().map(|loaded| loaded.entity).collect())
    }

    /// Courses `patient_id` is enrolled in, earliest start first.
    pub async fn courses_of(
        &self,
        patient_id: &PrincipalId,
    ) -> Result<Vec<Course>, EnrollmentError> {
        Ok(enrolled_courses(&self.db, patient_id).await?)
    }

    /// Link an approved prescription of the patient to their enrollment.
    /// Staff may link for anyone, a patient only for themself.
    pub async fn attach_prescription(
        &self,
        actor: &Principal,
        course_id: &CourseId,
        patient_id: &PrincipalId,
        prescription_id: &PrescriptionId,
    ) -> Result<Enrollment, EnrollmentError> {
        self.authorize_actor(actor, patient_id)?;

        let prescription = self
            .db
            .load::<Prescription>(prescription_id.as_str())
            .await?
            .ok_or_else(|| EnrollmentError::PrescriptionNotFound {
                prescription_id: prescription_id.clone(),
            })?
            .entity;
        let unusable = |reason| EnrollmentError::PrescriptionNotUsable {
            prescription_id: prescription_id.clone(),
            reason,
        };
        if prescription.patient_id != *patient_id {
            return Err(unusable("issued to another patient"));
        }
        if prescription.status != PrescriptionStatus::Approved {
            return Err(unusable("not approved"));
        }

        for attempt in 1..=self.max_retries {
            let Some(loaded) = self.find_enrollment(course_id, patient_id).await? else {
                return Err(EnrollmentError::NotEnrolled {
                    course_id: course_id.clone(),
                    patient_id: patient_id.clone(),
                });
            };

            let mut updated = loaded.entity.clone();
            updated.prescription_id = Some(prescription_id.clone());

            let mut patch = Row::new();
            patch.insert(
                "prescription_id".to_string(),
                JsonValue::from(prescription_id.as_str()),
            );

            match self.db.commit(CommitBatch::new().with(loaded.patch_op(patch))).await {
                Ok(_) => {
                    info!(
                        course = %course_id,
                        patient = %patient_id,
                        prescription = %prescription_id,
                        "prescription attached"
                    );
                    return Ok(updated);
                }
                Err(err) if err.is_version_conflict() || err.is_not_found() => {
                    debug!(
                        course = %course_id,
                        patient = %patient_id,
                        attempt,
                        "enrollment changed, retrying"
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(self.contention(course_id))
    }

    /// Count one attended session for an enrolled patient.
    pub async fn record_attendance(
        &self,
        course_id: &CourseId,
        patient_id: &PrincipalId,
    ) -> Result<Enrollment, EnrollmentError> {
        for attempt in 1..=self.max_retries {
            let Some(loaded) = self.find_enrollment(course_id, patient_id).await? else {
                return Err(EnrollmentError::NotEnrolled {
                    course_id: course_id.clone(),
                    patient_id: patient_id.clone(),
                });
            };

            let mut updated = loaded.entity.clone();
            updated.attendance_count = updated.attendance_count.saturating_add(1);

            let mut patch = Row::new();
            patch.insert(
                "attendance_count".to_string(),
                JsonValue::from(updated.attendance_count),
            );

            match self.db.commit(CommitBatch::new().with(loaded.patch_op(patch))).await {
                Ok(_) => return Ok(updated),
                Err(err) if err.is_version_conflict() || err.is_not_found() => {
                    debug!(course = %course_id, patient = %patient_id, attempt, "attendance raced, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(self.contention(course_id))
    }

    /// Recompute `current_enrollment` from membership and repair drift.
    pub async fn recount(&self, course_id: &CourseId) -> Result<Recount, EnrollmentError> {
        let _guard = self.locks.acquire(course_id).await;

        for attempt in 1..=self.max_retries {
            let course = self.load_course(course_id).await?;
            let members = self
                .db
                .find::<Enrollment>(&by_course(course_id), None)
                .await?
                .len();

            let report = Recount {
                course_id: course_id.clone(),
                cached: course.entity.current_enrollment,
                actual: u32::try_from(members).map_err(|_| {
                    InternalError::enrollment_invariant(format!(
                        "course {course_id} has more enrollments than a u32 can count"
                    ))
                })?,
            };
            if !report.drifted() {
                return Ok(report);
            }
            if report.actual > course.entity.capacity {
                warn!(
                    course = %course_id,
                    actual = report.actual,
                    capacity = course.entity.capacity,
                    "membership exceeds capacity"
                );
            }

            let mut patch = Row::new();
            patch.insert(
                ENROLLMENT_COUNT_FIELD.to_string(),
                JsonValue::from(report.actual),
            );

            match self.db.commit(CommitBatch::new().with(course.patch_op(patch))).await {
                Ok(_) => {
                    warn!(
                        course = %course_id,
                        cached = report.cached,
                        actual = report.actual,
                        "repaired enrollment count drift"
                    );
                    self.sink.record(MetricsEvent::CountRepaired);

                    return Ok(report);
                }
                Err(err) if err.is_version_conflict() => {
                    debug!(course = %course_id, attempt, "course changed during recount, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(self.contention(course_id))
    }

    //
    // Helpers
    //

    fn authorize_actor(
        &self,
        actor: &Principal,
        patient_id: &PrincipalId,
    ) -> Result<(), EnrollmentError> {
        if actor.role.is_staff() || actor.id == *patient_id {
            return Ok(());
        }

        Err(self.reject(
            RejectReason::Forbidden,
            EnrollmentError::Forbidden {
                actor: actor.id.clone(),
                patient_id: patient_id.clone(),
            },
        ))
    }

    async fn require_patient(&self, patient_id: &PrincipalId) -> Result<(), EnrollmentError> {
        match self.db.load::<Profile>(patient_id.as_str()).await? {
            None => Err(EnrollmentError::PatientNotFound {
                patient_id: patient_id.clone(),
            }),
            Some(loaded) if loaded.entity.role != Role::Patient => Err(EnrollmentError::NotAPatient {
                patient_id: patient_id.clone(),
                role: loaded.entity.role,
            }),
            Some(_) => Ok(()),
        }
    }

    async fn load_course(&self, course_id: &CourseId) -> Result<Loaded<Course>, EnrollmentError> {
        match self.db.load::<Course>(course_id.as_str()).await? {
            Some(course) => Ok(course),
            None => Err(self.reject(
                RejectReason::CourseNotFound,
                EnrollmentError::CourseNotFound {
                    course_id: course_id.clone(),
                },
            )),
        }
    }

    async fn find_enrollment(
        &self,
        course_id: &CourseId,
        patient_id: &PrincipalId,
    ) -> Result<Option<Loaded<Enrollment>>, InternalError> {
        let predicate = by_course(course_id).eq("patient_id", patient_id.as_str());

        Ok(self
            .db
            .find::<Enrollment>(&predicate, None)
            .await?
            .into_iter()
            .next())
    }

    fn already_enrolled(&self, course_id: &CourseId, patient_id: &PrincipalId) -> EnrollmentError {
        self.reject(
            RejectReason::AlreadyEnrolled,
            EnrollmentError::AlreadyEnrolled {
                course_id: course_id.clone(),
                patient_id: patient_id.clone(),
            },
        )
    }

    fn capacity_exceeded(&self, course: &Course) -> EnrollmentError {
        self.reject(
            RejectReason::CapacityExceeded,
            EnrollmentError::CapacityExceeded {
                course_id: course.id.clone(),
                capacity: course.capacity,
            },
        )
    }

    fn reject(&self, reason: RejectReason, err: EnrollmentError) -> EnrollmentError {
        debug!(reason = reason.as_str(), error = %err, "enrollment rejected");
        self.sink.record(MetricsEvent::EnrollRejected { reason });

        err
    }

    fn contention(&self, course_id: &CourseId) -> EnrollmentError {
        warn!(course = %course_id, attempts = self.max_retries, "enrollment retries exhausted");
        self.sink.record(MetricsEvent::ContentionExhausted {
            attempts: self.max_retries,
        });

        EnrollmentError::Contention {
            course_id: course_id.clone(),
            attempts: self.max_retries,
        }
    }
}

fn by_course(course_id: &CourseId) -> Predicate {
    Predicate::all().eq("course_id", course_id.as_str())
}

/// Courses a patient holds an enrollment row for, earliest start first.
/// Rows pointing at a deleted course are skipped.
pub(crate) async fn enrolled_courses(
    db: &Db,
    patient_id: &PrincipalId,
) -> Result<Vec<Course>, InternalError> {
    let enrollments = db
        .find::<Enrollment>(&Predicate::all().eq("patient_id", patient_id.as_str()), None)
        .await?;

    let mut courses = Vec::with_capacity(enrollments.len());
    for enrollment in enrollments {
        if let Some(course) = db.load::<Course>(enrollment.entity.course_id.as_str()).await? {
            courses.push(course.entity);
        }
    }
    courses.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));

    Ok(courses)
}

/// Whether `patient_id` holds an enrollment row for `course_id`.
pub(crate) async fn is_enrolled(
    db: &Db,
    course_id: &CourseId,
    patient_id: &PrincipalId,
) -> Result<bool, InternalError> {
    let predicate = by_course(course_id).eq("patient_id", patient_id.as_str());

    Ok(!db.find::<Enrollment>(&predicate, None).await?.is_empty())
}
