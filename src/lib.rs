//! inkstore - a schema-versioned, transactional, in-memory record store
//!
//! The container behind a collaborative document editor: typed records,
//! commit-time validation, reversible per-transaction diffs, and a
//! bidirectional migration engine keyed by independently-versioned
//! namespaces.

pub mod cache;
pub mod diff;
pub mod migrate;
pub mod observability;
pub mod record;
pub mod schema;
pub mod store;
pub mod validate;
