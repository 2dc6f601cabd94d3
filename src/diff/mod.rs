//! Diff algebra
//!
//! A `RecordsDiff` captures the net effect of one committed transaction:
//! additions, updates (before/after pairs), and removals. An id appears in
//! exactly one of the three maps.
//!
//! Two operations keep diffs useful for undo and multiplayer merge:
//! - `squash_records_diffs` folds consecutive diffs into one with the same
//!   net effect
//! - `reverse_records_diff` produces the exact inverse; applying it to the
//!   post-state reproduces the pre-state
//!
//! Squash laws for the same id across consecutive diffs:
//! - add then remove cancels to no entry
//! - add then update collapses to one add carrying the final value
//! - update then update collapses to one update spanning first before to
//!   last after
//! - remove then add becomes an update (before = removed, after = re-added)

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::record::{Record, RecordId};

/// The set of changes committed by one transaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordsDiff {
    /// Records that did not exist before the transaction.
    pub added: HashMap<RecordId, Record>,
    /// Records that changed, as (before, after) pairs.
    pub updated: HashMap<RecordId, (Record, Record)>,
    /// Records that existed before and are now gone.
    pub removed: HashMap<RecordId, Record>,
}

impl RecordsDiff {
    /// An empty diff.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the diff carries no changes at all.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }

    /// Total number of ids touched.
    pub fn len(&self) -> usize {
        self.added.len() + self.updated.len() + self.removed.len()
    }
}

/// Fold a sequence of consecutive diffs into one with identical net effect.
pub fn squash_records_diffs<I>(diffs: I) -> RecordsDiff
where
    I: IntoIterator<Item = RecordsDiff>,
{
    let mut result = RecordsDiff::new();

    for diff in diffs {
        for (id, record) in diff.added {
            if let Some(removed) = result.removed.remove(&id) {
                // remove then add becomes an update
                result.updated.insert(id, (removed, record));
            } else {
                result.added.insert(id, record);
            }
        }

        for (id, (from, to)) in diff.updated {
            if let Some(added) = result.added.get_mut(&id) {
                // add then update collapses to a single add
                *added = to;
            } else if let Some((_, after)) = result.updated.get_mut(&id) {
                *after = to;
            } else if let Some(removed) = result.removed.remove(&id) {
                // a later transaction re-added then updated; net effect is
                // an update from the original removed value
                result.updated.insert(id, (removed, to));
            } else {
                result.updated.insert(id, (from, to));
            }
        }

        for (id, record) in diff.removed {
            if result.added.remove(&id).is_some() {
                // add then remove cancels out
            } else if let Some((before, _)) = result.updated.remove(&id) {
                result.removed.insert(id, before);
            } else {
                result.removed.insert(id, record);
            }
        }
    }

    result
}

/// The exact inverse of a diff: added and removed swap, every update flips
/// its (before, after) pair.
pub fn reverse_records_diff(diff: &RecordsDiff) -> RecordsDiff {
    RecordsDiff {
        added: diff.removed.clone(),
        updated: diff
            .updated
            .iter()
            .map(|(id, (from, to))| (id.clone(), (to.clone(), from.clone())))
            .collect(),
        removed: diff.added.clone(),
    }
}

/// Apply a diff to a plain id-to-record map. Used by snapshot replay and by
/// the round-trip tests; the store applies diffs through its own
/// transactional path.
pub fn apply_diff_to_map(map: &mut HashMap<RecordId, Record>, diff: &RecordsDiff) {
    for (id, record) in &diff.added {
        map.insert(id.clone(), record.clone());
    }
    for (id, (_, after)) in &diff.updated {
        map.insert(id.clone(), after.clone());
    }
    for id in diff.removed.keys() {
        map.remove(id);
    }
}
