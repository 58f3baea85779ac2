//! Domain records as stored in the record store.

mod course;
mod enrollment;
mod message;
mod prescription;
mod profile;
mod role;

pub use course::*;
pub use enrollment::*;
pub use message::*;
pub use prescription::*;
pub use profile::*;
pub use role::*;
