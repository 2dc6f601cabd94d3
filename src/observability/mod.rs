//! Observability
//!
//! Structured JSON logging for store lifecycle events. Logging is opt-in
//! per store (see `StoreOptions::log_events`); an embedded store emits
//! nothing unless asked.
//!
//! Events emitted by the store:
//! - `TXN_COMMIT` (trace): a transaction committed, with change counts
//! - `TXN_REJECTED` (warn): commit-time validation failed, rolled back
//! - `SNAPSHOT_REFUSED` (warn): a snapshot's manifest could not be migrated
//! - `SNAPSHOT_LOADED` (info): a snapshot replaced the document contents

mod logger;

pub use logger::{Logger, Severity};

#[cfg(test)]
pub use logger::capture_log;
