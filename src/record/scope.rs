//! Record scopes
//!
//! The persistence/sync class of a record type:
//! - `document`: persisted in snapshots and synced between peers
//! - `session`: local ephemeral state, never persisted or synced
//! - `presence`: synced between peers but never persisted

use std::fmt;

use serde::{Deserialize, Serialize};

/// Persistence/sync class of a record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordScope {
    /// Persisted and synced.
    Document,
    /// Local ephemeral, neither persisted nor synced.
    Session,
    /// Synced but not persisted.
    Presence,
}

impl RecordScope {
    /// Returns the string name used in serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordScope::Document => "document",
            RecordScope::Session => "session",
            RecordScope::Presence => "presence",
        }
    }
}

impl fmt::Display for RecordScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
