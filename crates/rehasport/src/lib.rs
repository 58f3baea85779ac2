//! ## Crate layout
//! - `config`: TOML configuration for the runtime.
//! - `core`: error taxonomy, domain model, record store contract, and the
//!   identity, enrollment, catalog, prescription and chat services.
//!
//! [`Runtime`] owns the process-wide store handle and hands clones of it to
//! every service. The `prelude` mirrors the vocabulary a presentation layer
//! needs.

mod runtime;

pub use rehasport_config as config;
pub use rehasport_core as core;

pub use core::Error;
pub use runtime::Runtime;

//
// Consts
//

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

///
/// Prelude
///

pub mod prelude {
    pub use crate::{
        Runtime,
        core::{error::ErrorKind, prelude::*},
    };
    pub use serde::{Deserialize, Serialize};
}
