use crate::{
    catalog::CatalogError, db::Table, enrollment::EnrollmentError, feed::FeedError,
    identity::IdentityError, prescription::PrescriptionError, profile::ProfileError,
};
use std::fmt;
use thiserror::Error as ThisError;

///
/// Error
///
/// Public error surface of the runtime. Every service returns its own typed
/// error; this enum joins them for callers that handle several services.
///

#[derive(Debug, ThisError)]
pub enum Error {
    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Enrollment(#[from] EnrollmentError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Prescription(#[from] PrescriptionError),

    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error(transparent)]
    Profile(#[from] ProfileError),

    #[error(transparent)]
    Internal(#[from] InternalError),
}

impl Error {
    /// Caller-facing classification used to pick a user message.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Identity(err) => err.kind(),
            Self::Enrollment(err) => err.kind(),
            Self::Catalog(err) => err.kind(),
            Self::Prescription(err) => err.kind(),
            Self::Feed(err) => err.kind(),
            Self::Profile(err) => err.kind(),
            Self::Internal(err) => err.kind(),
        }
    }

    /// Whether repeating the same request may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Identity(err) => err.is_retryable(),
            Self::Enrollment(err) => err.is_retryable(),
            Self::Catalog(err) => err.is_retryable(),
            Self::Prescription(err) => err.is_retryable(),
            Self::Feed(err) => err.is_retryable(),
            Self::Profile(err) => err.is_retryable(),
            Self::Internal(err) => err.is_transient(),
        }
    }
}

///
/// ErrorKind
///
/// Coarse taxonomy the presentation layer maps onto messages.
/// `Capacity` is kept apart from `Validation` so a full course reads as
/// "full" rather than "invalid".
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Authorization,
    Validation,
    Capacity,
    Contention,
    Store,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Authorization => "authorization",
            Self::Validation => "validation",
            Self::Capacity => "capacity",
            Self::Contention => "contention",
            Self::Store => "store",
        };
        write!(f, "{label}")
    }
}

///
/// InternalError
///
/// Structured runtime error with a stable internal classification.
/// Store and transport failures travel as this type; services wrap it in
/// their own error enums without reinterpreting it.
///

#[derive(Debug, ThisError)]
#[error("{message}")]
pub struct InternalError {
    pub class: ErrorClass,
    pub origin: ErrorOrigin,
    pub message: String,

    /// Optional structured error detail.
    /// The variant (if present) must correspond to `origin`.
    pub detail: Option<ErrorDetail>,
}

impl InternalError {
    /// Construct an InternalError without structured detail.
    pub fn new(class: ErrorClass, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            class,
            origin,
            message: message.into(),
            detail: None,
        }
    }

    fn store(class: ErrorClass, err: StoreError) -> Self {
        Self {
            class,
            origin: ErrorOrigin::Store,
            message: err.to_string(),
            detail: Some(ErrorDetail::Store(err)),
        }
    }

    pub fn store_not_found(table: Table, id: impl Into<String>) -> Self {
        Self::store(
            ErrorClass::NotFound,
            StoreError::NotFound {
                table,
                id: id.into(),
            },
        )
    }

    pub fn unique_violation(table: Table, fields: &'static [&'static str]) -> Self {
        Self::store(
            ErrorClass::Conflict,
            StoreError::UniqueViolation { table, fields },
        )
    }

    pub fn version_conflict(table: Table, id: impl Into<String>, expected: u64, found: u64) -> Self {
        Self::store(
            ErrorClass::Conflict,
            StoreError::VersionConflict {
                table,
                id: id.into(),
                expected,
                found,
            },
        )
    }

    pub fn limit_reached(
        table: Table,
        id: impl Into<String>,
        field: impl Into<String>,
        limit: i64,
    ) -> Self {
        Self::store(
            ErrorClass::Conflict,
            StoreError::LimitReached {
                table,
                id: id.into(),
                field: field.into(),
                limit,
            },
        )
    }

    pub fn table_missing(table: Table) -> Self {
        Self::store(ErrorClass::NotFound, StoreError::TableMissing { table })
    }

    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::store(
            ErrorClass::Unavailable,
            StoreError::Unavailable {
                message: message.into(),
            },
        )
    }

    pub fn store_corruption(message: impl Into<String>) -> Self {
        Self::store(
            ErrorClass::Corruption,
            StoreError::Corrupt {
                message: message.into(),
            },
        )
    }

    /// Construct a store-origin invariant violation.
    pub(crate) fn store_invariant(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::InvariantViolation,
            ErrorOrigin::Store,
            message.into(),
        )
    }

    /// Construct a store-origin unsupported error.
    pub(crate) fn store_unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Unsupported, ErrorOrigin::Store, message.into())
    }

    /// Construct a serialize-origin internal error.
    pub(crate) fn serialize_internal(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Internal, ErrorOrigin::Serialize, message.into())
    }

    /// Construct an enrollment-origin invariant violation.
    pub(crate) fn enrollment_invariant(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::InvariantViolation,
            ErrorOrigin::Enrollment,
            message.into(),
        )
    }

    /// Construct an identity-origin corruption error.
    pub(crate) fn identity_corruption(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Corruption, ErrorOrigin::Identity, message.into())
    }

    #[must_use]
    pub const fn store_detail(&self) -> Option<&StoreError> {
        match &self.detail {
            Some(ErrorDetail::Store(err)) => Some(err),
            None => None,
        }
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self.store_detail(), Some(StoreError::NotFound { .. }))
    }

    #[must_use]
    pub const fn is_unique_violation(&self) -> bool {
        matches!(self.store_detail(), Some(StoreError::UniqueViolation { .. }))
    }

    #[must_use]
    pub const fn is_version_conflict(&self) -> bool {
        matches!(self.store_detail(), Some(StoreError::VersionConflict { .. }))
    }

    #[must_use]
    pub const fn is_limit_reached(&self) -> bool {
        matches!(self.store_detail(), Some(StoreError::LimitReached { .. }))
    }

    #[must_use]
    pub const fn is_table_missing(&self) -> bool {
        matches!(self.store_detail(), Some(StoreError::TableMissing { .. }))
    }

    /// Transient failures may succeed when retried unchanged.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self.class, ErrorClass::Unavailable) || self.is_version_conflict()
    }

    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        if self.is_version_conflict() {
            ErrorKind::Contention
        } else {
            ErrorKind::Store
        }
    }

    #[must_use]
    pub fn display_with_class(&self) -> String {
        format!("{}:{}: {}", self.origin, self.class, self.message)
    }
}

///
/// ErrorDetail
///
/// Structured, origin-specific error detail carried by [`InternalError`].
///

#[derive(Debug, ThisError)]
pub enum ErrorDetail {
    #[error("{0}")]
    Store(StoreError),
}

///
/// StoreError
///
/// Store-specific structured error detail.
/// Never returned directly; always wrapped in [`ErrorDetail::Store`].
///

#[derive(Debug, ThisError)]
pub enum StoreError {
    #[error("row not found: {table}/{id}")]
    NotFound { table: Table, id: String },

    #[error("unique constraint violation: {table} ({})", fields.join(", "))]
    UniqueViolation {
        table: Table,
        fields: &'static [&'static str],
    },

    #[error("version conflict on {table}/{id}: expected {expected}, found {found}")]
    VersionConflict {
        table: Table,
        id: String,
        expected: u64,
        found: u64,
    },

    #[error("limit reached on {table}/{id}.{field} (limit {limit})")]
    LimitReached {
        table: Table,
        id: String,
        field: String,
        limit: i64,
    },

    #[error("table does not exist: {table}")]
    TableMissing { table: Table },

    #[error("store unavailable: {message}")]
    Unavailable { message: String },

    #[error("store corruption: {message}")]
    Corrupt { message: String },
}

///
/// ErrorClass
/// Internal error taxonomy for runtime classification.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    Corruption,
    NotFound,
    Internal,
    Conflict,
    Unavailable,
    Unsupported,
    InvariantViolation,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Corruption => "corruption",
            Self::NotFound => "not_found",
            Self::Internal => "internal",
            Self::Conflict => "conflict",
            Self::Unavailable => "unavailable",
            Self::Unsupported => "unsupported",
            Self::InvariantViolation => "invariant_violation",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
/// Internal origin taxonomy for runtime classification.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorOrigin {
    Serialize,
    Store,
    Identity,
    Enrollment,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Serialize => "serialize",
            Self::Store => "store",
            Self::Identity => "identity",
            Self::Enrollment => "enrollment",
        };
        write!(f, "{label}")
    }
}

///
/// TESTS
///
