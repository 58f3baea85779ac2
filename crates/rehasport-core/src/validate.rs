use std::collections::BTreeMap;
use thiserror::Error as ThisError;

///
/// ValidateError
///

#[derive(Debug, Eq, PartialEq, ThisError)]
pub enum ValidateError {
    #[error("validation failed: {}", format_issues(.0))]
    ValidationFailed(BTreeMap<String, Vec<String>>),
}

impl ValidateError {
    /// Issues recorded for `field`, if any.
    #[must_use]
    pub fn issues_for(&self, field: &str) -> &[String] {
        match self {
            Self::ValidationFailed(issues) => issues.get(field).map_or(&[][..], Vec::as_slice),
        }
    }
}

fn format_issues(issues: &BTreeMap<String, Vec<String>>) -> String {
    issues
        .iter()
        .map(|(field, messages)| format!("{field}: {}", messages.join("; ")))
        .collect::<Vec<_>>()
        .join(", ")
}

///
/// Issues
///
/// Collects validation issues by field path. Validation never stops at the
/// first problem.
///

#[derive(Debug, Default)]
pub struct Issues(BTreeMap<String, Vec<String>>);

impl Issues {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    /// Record `message` unless `ok` holds.
    pub fn ensure(&mut self, ok: bool, field: &str, message: impl Into<String>) {
        if !ok {
            self.add(field, message);
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn finish(self) -> Result<(), ValidateError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(ValidateError::ValidationFailed(self.0))
        }
    }
}

///
/// Validate
///

pub trait Validate {
    fn validate_into(&self, issues: &mut Issues);

    /// Validate, collecting every issue.
    fn validate(&self) -> Result<(), ValidateError> {
        let mut issues = Issues::new();
        self.validate_into(&mut issues);

        issues.finish()
    }
}

/// Shared rule: trimmed text must be non-empty and at most `max` chars.
pub fn check_text(issues: &mut Issues, field: &str, value: &str, max: usize) {
    let trimmed = value.trim();
    issues.ensure(!trimmed.is_empty(), field, "must not be empty");
    issues.ensure(
        trimmed.chars().count() <= max,
        field,
        format!("must be at most {max} characters"),
    );
}

///
/// TESTS
///
