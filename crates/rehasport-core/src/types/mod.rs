mod id;
mod timestamp;
mod ulid;

pub use id::*;
pub use timestamp::*;
pub use ulid::*;
