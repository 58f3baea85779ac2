use derive_more::{Deref, Display};
use parking_lot::Mutex;
use std::sync::LazyLock;
use thiserror::Error as ThisError;
use ulid::{Generator, Ulid as WrappedUlid};

///
/// GENERATOR keeps the previous value so ids minted within the same
/// millisecond still sort in creation order.
///

static GENERATOR: LazyLock<Mutex<Generator>> = LazyLock::new(|| Mutex::new(Generator::new()));

///
/// UlidError
///

#[derive(Debug, ThisError)]
pub enum UlidError {
    #[error("invalid ulid string")]
    InvalidString,

    #[error("monotonic error - overflow")]
    GeneratorOverflow,
}

///
/// Ulid
///
/// Generated row identifier. Ids reach the store as their 26-character text
/// form through the string-backed id newtypes.
///

#[derive(Clone, Copy, Debug, Deref, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct Ulid(WrappedUlid);

impl Ulid {
    #[must_use]
    pub const fn nil() -> Self {
        Self(WrappedUlid::nil())
    }

    /// generate
    /// Generate a monotonic ULID, falling back to nil on overflow.
    #[must_use]
    pub fn generate() -> Self {
        Self::try_generate().unwrap_or_else(|_| Self::nil())
    }

    /// try_generate
    /// Fallible ULID generation preserving the overflow error.
    pub fn try_generate() -> Result<Self, UlidError> {
        GENERATOR
            .lock()
            .generate()
            .map(Self)
            .map_err(|_| UlidError::GeneratorOverflow)
    }

    /// from_str
    #[expect(clippy::should_implement_trait)]
    pub fn from_str(encoded: &str) -> Result<Self, UlidError> {
        let this = WrappedUlid::from_string(encoded).map_err(|_| UlidError::InvalidString)?;

        Ok(Self(this))
    }
}

impl Default for Ulid {
    fn default() -> Self {
        Self::nil()
    }
}

impl From<WrappedUlid> for Ulid {
    fn from(ulid: WrappedUlid) -> Self {
        Self(ulid)
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_strictly_increasing() {
        let first = Ulid::generate();
        let second = Ulid::generate();
        let third = Ulid::generate();

        assert!(first < second && second < third);
        assert_ne!(first, Ulid::nil());
    }

    #[test]
    fn text_form_round_trips() {
        let id = Ulid::generate();
        let text = id.to_string();

        assert_eq!(text.len(), 26);
        assert_eq!(Ulid::from_str(&text).expect("ulid should parse"), id);
    }

    #[test]
    fn invalid_text_is_rejected() {
        assert!(Ulid::from_str("not-a-ulid").is_err());
    }
}
