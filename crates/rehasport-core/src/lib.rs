//! Core runtime for rehasport: role-gated routing, capacity-safe course
//! enrollment, the course catalog, prescriptions, profiles and course chat,
//! all over an injected record store.

// public exports are one module level down
pub mod catalog;
pub mod db;
pub mod enrollment;
pub mod error;
pub mod feed;
pub mod identity;
pub mod model;
pub mod obs;
pub mod prescription;
pub mod profile;
pub mod serialize;
pub mod traits;
pub mod types;
pub mod validate;

// test
#[cfg(test)]
pub(crate) mod test_support;

pub use error::Error;

///
/// Prelude
///
/// Prelude contains only domain vocabulary.
/// No errors, services, stores, or serializers are re-exported here.
///

pub mod prelude {
    pub use crate::{
        identity::{Area, Decision, Viewer},
        model::{
            Capacity, Course, CourseStatus, Enrollment, Message, Prescription,
            PrescriptionStatus, Principal, Profile, Role,
        },
        traits::Entity,
        types::{CourseId, EnrollmentId, MessageId, PrescriptionId, PrincipalId, Timestamp},
    };
}
