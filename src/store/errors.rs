//! Store error types
//!
//! Every failure is synchronous and surfaces at the call that triggered
//! it. The store never remains partially mutated after a failure: a
//! transaction either commits in full or rolls back in full.

use thiserror::Error;

use crate::migrate::MigrationFailure;
use crate::validate::ValidationError;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Store operation failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// A record in the transaction failed its validator. The whole
    /// transaction was rolled back; nothing committed, no listener fired.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// An operation that requires an existing record referenced an id the
    /// store does not hold.
    #[error("unknown record id '{0}'")]
    UnknownRecordId(String),

    /// An incoming snapshot declares a sequence or sequence version this
    /// schema has never heard of. The load is refused outright; silently
    /// loading forward-incompatible data would corrupt it.
    #[error("snapshot is newer than this software: {0}")]
    SchemaVersionMismatch(MigrationFailure),

    /// A migration run failed for a reason other than version skew.
    #[error(transparent)]
    Migration(MigrationFailure),
}

impl From<MigrationFailure> for StoreError {
    fn from(failure: MigrationFailure) -> Self {
        match failure {
            MigrationFailure::UnknownSequence { .. }
            | MigrationFailure::TargetVersionTooNew { .. } => {
                StoreError::SchemaVersionMismatch(failure)
            }
            other => StoreError::Migration(other),
        }
    }
}
