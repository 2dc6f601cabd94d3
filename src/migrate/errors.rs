//! Migration failure taxonomy
//!
//! Every failure mode is reported, never silently swallowed; the caller
//! decides whether to abort a load or discard the offending record. A
//! document is never left partially migrated.

use thiserror::Error;

use crate::validate::ValidationError;

/// Result type for migration operations.
pub type MigrationResult<T> = Result<T, MigrationFailure>;

/// Why a migration run could not complete.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MigrationFailure {
    /// A persisted manifest names a sequence this schema has never heard of.
    #[error("unknown migration sequence '{sequence_id}'")]
    UnknownSequence {
        /// The unrecognized sequence id
        sequence_id: String,
    },

    /// A persisted manifest claims a version beyond any known migration,
    /// meaning the data was written by newer software.
    #[error(
        "sequence '{sequence_id}' is persisted at version {persisted}, \
         but the latest known migration is {latest}"
    )]
    TargetVersionTooNew {
        /// The sequence whose persisted version is ahead of this software
        sequence_id: String,
        /// Version declared by the persisted data
        persisted: u32,
        /// Latest version this software knows
        latest: u32,
    },

    /// Rollback was requested across a migration that has no `down`.
    /// This is fail-closed: the step is never silently skipped.
    #[error("sequence '{sequence_id}' migration {version} has no down migration; cannot roll back")]
    MissingDownMigration {
        /// The sequence containing the one-directional migration
        sequence_id: String,
        /// The migration version lacking a `down`
        version: u32,
    },

    /// A record came out of migration in a shape its validator rejects.
    #[error("record '{record_id}' is incompatible after migration: {reason}")]
    IncompatibleRecord {
        /// The offending record's id
        record_id: String,
        /// What the validator rejected
        reason: String,
    },
}

impl MigrationFailure {
    /// Build an `IncompatibleRecord` from a validation error.
    pub fn incompatible(record_id: impl Into<String>, err: &ValidationError) -> Self {
        MigrationFailure::IncompatibleRecord {
            record_id: record_id.into(),
            reason: err.to_string(),
        }
    }
}
