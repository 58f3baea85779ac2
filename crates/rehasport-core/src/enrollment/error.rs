use crate::{
    error::{ErrorKind, InternalError},
    model::{CourseStatus, Role},
    types::{CourseId, PrescriptionId, PrincipalId},
};
use thiserror::Error as ThisError;

///
/// EnrollmentError
///

#[derive(Debug, ThisError)]
pub enum EnrollmentError {
    #[error("course not found: {course_id}")]
    CourseNotFound { course_id: CourseId },

    #[error("course {course_id} is {status}")]
    CourseNotActive {
        course_id: CourseId,
        status: CourseStatus,
    },

    #[error("patient {patient_id} is already enrolled in {course_id}")]
    AlreadyEnrolled {
        course_id: CourseId,
        patient_id: PrincipalId,
    },

    #[error("course {course_id} is full ({capacity} seats)")]
    CapacityExceeded { course_id: CourseId, capacity: u32 },

    #[error("patient {patient_id} is not enrolled in {course_id}")]
    NotEnrolled {
        course_id: CourseId,
        patient_id: PrincipalId,
    },

    #[error("patient not found: {patient_id}")]
    PatientNotFound { patient_id: PrincipalId },

    #[error("principal {patient_id} has role {role}, not patient")]
    NotAPatient { patient_id: PrincipalId, role: Role },

    #[error("{actor} may not manage enrollments of {patient_id}")]
    Forbidden {
        actor: PrincipalId,
        patient_id: PrincipalId,
    },

    #[error("prescription not found: {prescription_id}")]
    PrescriptionNotFound { prescription_id: PrescriptionId },

    #[error("prescription {prescription_id} cannot back this enrollment: {reason}")]
    PrescriptionNotUsable {
        prescription_id: PrescriptionId,
        reason: &'static str,
    },

    #[error("course {course_id} is busy after {attempts} attempts, try again")]
    Contention { course_id: CourseId, attempts: u32 },

    #[error(transparent)]
    Store(#[from] InternalError),
}

impl EnrollmentError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::CourseNotFound { .. }
            | Self::CourseNotActive { .. }
            | Self::AlreadyEnrolled { .. }
            | Self::NotEnrolled { .. }
            | Self::PatientNotFound { .. }
            | Self::NotAPatient { .. }
            | Self::PrescriptionNotFound { .. }
            | Self::PrescriptionNotUsable { .. } => ErrorKind::Validation,
            Self::CapacityExceeded { .. } => ErrorKind::Capacity,
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
