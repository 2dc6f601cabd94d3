//! Record identifiers
//!
//! Wire format is `typeName:<suffix>`. The suffix is a UUIDv4 when
//! generated, or a caller-supplied human part (e.g. `document:document`).
//! The embedded type name lets the store index by type without a registry
//! lookup; callers must still treat ids as opaque tokens.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A globally unique record identifier, permanently bound to one type name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Generate a fresh id for the given type name.
    pub fn generate(type_name: &str) -> Self {
        Self(format!("{}:{}", type_name, Uuid::new_v4().simple()))
    }

    /// Build an id from a type name and a caller-supplied suffix.
    pub fn from_parts(type_name: &str, suffix: &str) -> Self {
        Self(format!("{}:{}", type_name, suffix))
    }

    /// Wrap a raw id string, e.g. one read back from a snapshot.
    ///
    /// No format check happens here; a malformed id is caught by record
    /// validation, which requires the prefix to match the record's type.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The type name embedded in the id (the part before the first `:`).
    pub fn type_name(&self) -> &str {
        match self.0.split_once(':') {
            Some((type_name, _)) => type_name,
            None => "",
        }
    }

    /// The raw id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
