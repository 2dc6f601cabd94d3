//! Change listeners
//!
//! A listener receives one `HistoryEntry` per committed transaction whose
//! changed records intersect the requested scope and whose source matches.
//! Dispatch is synchronous, in registration order, after the transaction
//! has fully committed, so a listener can safely re-read the store.

use serde::{Deserialize, Serialize};

use crate::diff::RecordsDiff;
use crate::record::RecordScope;

/// Who originated a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeSource {
    /// A local mutation.
    User,
    /// A change replayed from another store instance.
    Remote,
}

/// One committed transaction, as delivered to listeners and undo logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// The net changes the transaction committed.
    pub changes: RecordsDiff,
    /// Who originated the transaction.
    pub source: ChangeSource,
}

/// What a listener wants to hear about. `None` means "all".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreListenFilters {
    /// Deliver only entries touching at least one record of this scope.
    pub scope: Option<RecordScope>,
    /// Deliver only entries from this source.
    pub source: Option<ChangeSource>,
}

impl StoreListenFilters {
    /// Whether an entry's source passes this filter.
    pub(crate) fn matches_source(&self, source: ChangeSource) -> bool {
        self.source.map_or(true, |wanted| wanted == source)
    }
}

/// Handle identifying a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub(crate) u64);

/// Listener callback. Receives a committed entry by reference; the store
/// retains ownership of its history.
pub type ListenerCallback = Box<dyn FnMut(&HistoryEntry)>;

pub(crate) struct ListenerEntry {
    pub id: ListenerId,
    pub filters: StoreListenFilters,
    pub callback: ListenerCallback,
}
