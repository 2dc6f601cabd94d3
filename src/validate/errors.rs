//! Validation error types

use std::fmt;

use thiserror::Error;

/// What went wrong at a specific field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationDetails {
    /// Dotted field path (e.g. `props.crop.topLeft.x`)
    pub field: String,
    /// Expected type or condition
    pub expected: String,
    /// Actual value or type found
    pub actual: String,
}

impl ValidationDetails {
    pub fn new(
        field: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::new(field, "field to be present", "missing")
    }

    pub fn extra_field(field: impl Into<String>) -> Self {
        Self::new(field, "no undeclared fields", "extra field present")
    }

    pub fn type_mismatch(
        field: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::new(field, expected, actual)
    }

    pub fn null_value(field: impl Into<String>) -> Self {
        Self::new(field, "non-null value", "null")
    }
}

impl fmt::Display for ValidationDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "field '{}': expected {}, got {}",
            self.field, self.expected, self.actual
        )
    }
}

/// A record or property failed its validator.
///
/// Raised at transaction commit; the transaction that produced the
/// offending record is rolled back in full.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("validation failed for record type '{type_name}'{}: {details}", record_display(.record_id))]
pub struct ValidationError {
    /// The record type whose validator rejected the value
    pub type_name: String,
    /// The offending record's id, when known
    pub record_id: Option<String>,
    /// Field-level failure details
    pub details: ValidationDetails,
}

impl ValidationError {
    pub fn new(type_name: impl Into<String>, details: ValidationDetails) -> Self {
        Self {
            type_name: type_name.into(),
            record_id: None,
            details,
        }
    }

    /// Attach the offending record's id.
    pub fn with_record_id(mut self, record_id: impl Into<String>) -> Self {
        self.record_id = Some(record_id.into());
        self
    }
}

fn record_display(record_id: &Option<String>) -> String {
    match record_id {
        Some(id) => format!(" (record '{}')", id),
        None => String::new(),
    }
}

/// Result type for validation.
pub type ValidationResult = Result<(), ValidationError>;
