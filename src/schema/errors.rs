//! Schema construction errors
//!
//! Raised by `StoreSchema::create` when the registered record types and
//! migration sequences do not form a coherent contract. These are
//! programmer errors caught at schema construction, before any store
//! exists.

use thiserror::Error;

/// Result type for schema construction.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Why a `StoreSchema` could not be constructed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// Two record types registered under the same type name.
    #[error("duplicate record type '{0}'")]
    DuplicateRecordType(String),

    /// Two migration sequences registered under the same sequence id.
    #[error("duplicate migration sequence '{0}'")]
    DuplicateSequence(String),

    /// A sequence's versions are not dense ascending integers from 1.
    #[error(
        "sequence '{sequence_id}' versions must be dense and ascending from 1: \
         expected {expected} at position {position}, found {found}"
    )]
    NonDenseVersions {
        /// The offending sequence
        sequence_id: String,
        /// Zero-based position of the bad migration
        position: usize,
        /// The version that position should carry
        expected: u32,
        /// The version actually found
        found: u32,
    },

    /// A sequence targets a record type no registered type declares.
    #[error("sequence '{sequence_id}' targets unregistered record type '{record_type}'")]
    UnknownRecordType {
        /// The offending sequence
        sequence_id: String,
        /// The type name no registration covers
        record_type: String,
    },
}
