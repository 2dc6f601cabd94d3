//! The record store
//!
//! A mutable container mapping record ids to current records, with a
//! secondary index from type name to the ids of that type, kept consistent
//! on every mutation.
//!
//! Transaction rules:
//! - Every externally visible mutation belongs to exactly one transaction;
//!   nested calls fold into the enclosing one
//! - Validation runs once at commit, against the fully-applied post-state
//! - Any validation failure rolls the whole transaction back; no partial
//!   mutation is observable and no listener fires
//! - Listener dispatch is synchronous, in registration order, after commit
//!
//! Single-writer, cooperative model: all mutations take `&mut self`, so
//! transactions never interleave and re-entrant mutation from a listener
//! callback is impossible by construction. A multi-threaded host must
//! serialize access externally, e.g. one store per owning thread.

mod errors;
mod listener;

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::diff::RecordsDiff;
use crate::observability::Logger;
use crate::record::{Record, RecordId, RecordScope};
use crate::schema::{SerializedSchema, StoreSchema};

pub use errors::{StoreError, StoreResult};
pub use listener::{
    ChangeSource, HistoryEntry, ListenerCallback, ListenerId, StoreListenFilters,
};

use listener::ListenerEntry;

/// Full-store export: the persisted (document-scope) records plus the
/// version manifest of the schema that wrote them. A consumer must check
/// `schema` against its own `StoreSchema::serialize()` before trusting
/// field shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// Document-scope records by id.
    pub store: HashMap<RecordId, Record>,
    /// The writing schema's version manifest.
    pub schema: SerializedSchema,
}

/// Store construction options.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreOptions {
    /// Emit structured log events for commits, rejections, and snapshot
    /// loads. Off by default; an embedded store is quiet unless asked.
    pub log_events: bool,
}

#[derive(Default)]
struct TxnState {
    /// First-touch before-images: `None` means the id did not exist when
    /// the transaction first touched it.
    before: HashMap<RecordId, Option<Record>>,
    /// Commit without dispatching listeners (`extracting_changes`).
    suppress: bool,
}

/// The mutable record container. Created once per open document with a
/// `StoreSchema` and torn down with it.
pub struct Store {
    schema: StoreSchema,
    records: HashMap<RecordId, Record>,
    type_index: HashMap<String, HashSet<RecordId>>,
    listeners: Vec<ListenerEntry>,
    next_listener_id: u64,
    txn: Option<TxnState>,
    source: ChangeSource,
    epoch: u64,
    epochs: HashMap<RecordId, u64>,
    log_events: bool,
}

impl Store {
    /// Create an empty store over the given schema.
    pub fn new(schema: StoreSchema) -> Self {
        Self::with_options(schema, StoreOptions::default())
    }

    /// Create an empty store with explicit options.
    pub fn with_options(schema: StoreSchema, options: StoreOptions) -> Self {
        Self {
            schema,
            records: HashMap::new(),
            type_index: HashMap::new(),
            listeners: Vec::new(),
            next_listener_id: 0,
            txn: None,
            source: ChangeSource::User,
            epoch: 0,
            epochs: HashMap::new(),
            log_events: options.log_events,
        }
    }

    /// The schema this store enforces.
    pub fn schema(&self) -> &StoreSchema {
        &self.schema
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// The current record for an id, if present.
    pub fn get(&self, id: &RecordId) -> Option<&Record> {
        self.records.get(id)
    }

    /// Whether the store holds a record with this id.
    pub fn has(&self, id: &RecordId) -> bool {
        self.records.contains_key(id)
    }

    /// All records of one type, via the secondary index. Order is
    /// unspecified.
    pub fn all_of_type(&self, type_name: &str) -> Vec<&Record> {
        self.type_index
            .get(type_name)
            .map(|ids| ids.iter().filter_map(|id| self.records.get(id)).collect())
            .unwrap_or_default()
    }

    /// Number of records currently held.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The change epoch of a record: bumped on every committed transaction
    /// that added, updated, or removed it. Drives computed-cache
    /// invalidation.
    pub fn epoch_of(&self, id: &RecordId) -> u64 {
        self.epochs.get(id).copied().unwrap_or(0)
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    /// Run `f` inside a transaction. The outermost call commits (or rolls
    /// back, if `f` returns an error or validation fails); nested calls
    /// fold into the enclosing transaction.
    pub fn atomic<T>(
        &mut self,
        f: impl FnOnce(&mut Store) -> StoreResult<T>,
    ) -> StoreResult<T> {
        self.transact(false, f).map(|(value, _)| value)
    }

    /// Upsert one or more records in a single transaction.
    pub fn put(&mut self, records: impl IntoIterator<Item = Record>) -> StoreResult<()> {
        self.atomic(|store| {
            for record in records {
                store.put_one(record);
            }
            Ok(())
        })
    }

    /// Remove records by id. Removing a nonexistent id is a no-op.
    pub fn remove(&mut self, ids: impl IntoIterator<Item = RecordId>) -> StoreResult<()> {
        self.atomic(|store| {
            for id in ids {
                store.remove_one(&id);
            }
            Ok(())
        })
    }

    /// Replace a record with a function of its current value. Fails with
    /// `UnknownRecordId` if the id does not exist. The id itself is
    /// immutable through updates.
    pub fn update(
        &mut self,
        id: &RecordId,
        f: impl FnOnce(Record) -> Record,
    ) -> StoreResult<()> {
        self.atomic(|store| {
            let current = store
                .records
                .get(id)
                .cloned()
                .ok_or_else(|| StoreError::UnknownRecordId(id.to_string()))?;
            let mut updated = f(current);
            updated.id = id.clone();
            store.put_one(updated);
            Ok(())
        })
    }

    /// Remove every record, in one transaction.
    pub fn clear(&mut self) -> StoreResult<()> {
        self.atomic(|store| {
            let ids: Vec<RecordId> = store.records.keys().cloned().collect();
            for id in ids {
                store.remove_one(&id);
            }
            Ok(())
        })
    }

    /// Run `f` and return the net diff without dispatching listeners.
    /// Used for speculative operations whose diff may be discarded or
    /// replayed elsewhere. Must be the outermost transaction; inside an
    /// enclosing one the changes fold into it and the returned diff is
    /// empty.
    pub fn extracting_changes(
        &mut self,
        f: impl FnOnce(&mut Store) -> StoreResult<()>,
    ) -> StoreResult<RecordsDiff> {
        self.transact(true, f).map(|((), diff)| diff)
    }

    /// Run `f` with its committed entry attributed to `ChangeSource::Remote`,
    /// so listeners can tell replayed multiplayer changes from local ones.
    pub fn merge_remote_changes<T>(
        &mut self,
        f: impl FnOnce(&mut Store) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let previous = std::mem::replace(&mut self.source, ChangeSource::Remote);
        let result = self.atomic(f);
        self.source = previous;
        result
    }

    /// Replay a diff produced by another store instance as one transaction.
    pub fn apply_diff(&mut self, diff: RecordsDiff, source: ChangeSource) -> StoreResult<()> {
        let previous = std::mem::replace(&mut self.source, source);
        let result = self.atomic(|store| {
            for (_, record) in diff.added {
                store.put_one(record);
            }
            for (_, (_, after)) in diff.updated {
                store.put_one(after);
            }
            for id in diff.removed.keys() {
                store.remove_one(id);
            }
            Ok(())
        });
        self.source = previous;
        result
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    /// Export the persisted (document-scope) records with the schema's
    /// version manifest.
    pub fn get_snapshot(&self) -> StoreSnapshot {
        let store = self
            .records
            .values()
            .filter(|record| self.scope_of(record) == Some(RecordScope::Document))
            .map(|record| (record.id.clone(), record.clone()))
            .collect();
        StoreSnapshot {
            store,
            schema: self.schema.serialize(),
        }
    }

    /// Replace the document-scope contents with a snapshot, migrating it
    /// first if its manifest is older than the live schema. Refuses with
    /// `SchemaVersionMismatch` if the snapshot declares a sequence or
    /// version this schema has never heard of. The replacement commits as
    /// one transaction attributed to `ChangeSource::Remote`.
    pub fn load_snapshot(&mut self, snapshot: StoreSnapshot) -> StoreResult<()> {
        let current = self.schema.serialize();
        let migrated = match self.schema.migrate_store_snapshot(snapshot, &current) {
            Ok(migrated) => migrated,
            Err(failure) => {
                let err = StoreError::from(failure);
                if self.log_events {
                    Logger::warn("SNAPSHOT_REFUSED", &[("error", &err.to_string())]);
                }
                return Err(err);
            }
        };

        let count = migrated.store.len();
        let previous = std::mem::replace(&mut self.source, ChangeSource::Remote);
        let result = self.atomic(move |store| {
            let stale: Vec<RecordId> = store
                .records
                .values()
                .filter(|record| store.scope_of(record) == Some(RecordScope::Document))
                .map(|record| record.id.clone())
                .collect();
            for id in stale {
                store.remove_one(&id);
            }
            for record in migrated.store.into_values() {
                store.put_one(record);
            }
            Ok(())
        });
        self.source = previous;

        if result.is_ok() && self.log_events {
            Logger::info("SNAPSHOT_LOADED", &[("records", &count.to_string())]);
        }
        result
    }

    // ------------------------------------------------------------------
    // Listeners
    // ------------------------------------------------------------------

    /// Register a listener. It receives one `HistoryEntry` per committed
    /// transaction whose changed records intersect the requested scope and
    /// whose source matches, starting with the next transaction.
    pub fn listen(
        &mut self,
        filters: StoreListenFilters,
        callback: impl FnMut(&HistoryEntry) + 'static,
    ) -> ListenerId {
        let id = ListenerId(self.next_listener_id);
        self.next_listener_id += 1;
        self.listeners.push(ListenerEntry {
            id,
            filters,
            callback: Box::new(callback),
        });
        id
    }

    /// Remove a listener. Removing an unknown id is a no-op.
    pub fn unlisten(&mut self, id: ListenerId) {
        self.listeners.retain(|entry| entry.id != id);
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn transact<T>(
        &mut self,
        suppress: bool,
        f: impl FnOnce(&mut Store) -> StoreResult<T>,
    ) -> StoreResult<(T, RecordsDiff)> {
        if self.txn.is_some() {
            // Nested call: fold into the enclosing transaction.
            return f(self).map(|value| (value, RecordsDiff::new()));
        }

        self.txn = Some(TxnState {
            before: HashMap::new(),
            suppress,
        });
        match f(self) {
            Ok(value) => {
                let txn = self.txn.take().unwrap_or_default();
                let diff = self.commit_txn(txn)?;
                Ok((value, diff))
            }
            Err(err) => {
                let txn = self.txn.take().unwrap_or_default();
                self.rollback_txn(txn);
                Err(err)
            }
        }
    }

    fn commit_txn(&mut self, txn: TxnState) -> StoreResult<RecordsDiff> {
        // Validate the final post-state of every touched, still-live record.
        let rejection = txn
            .before
            .keys()
            .filter_map(|id| self.records.get(id))
            .find_map(|record| self.schema.validate_record(record).err());
        if let Some(err) = rejection {
            if self.log_events {
                Logger::warn("TXN_REJECTED", &[("error", &err.to_string())]);
            }
            self.rollback_txn(txn);
            return Err(StoreError::Validation(err));
        }

        let mut diff = RecordsDiff::new();
        for (id, before) in txn.before {
            let after = self.records.get(&id).cloned();
            match (before, after) {
                (None, Some(after)) => {
                    diff.added.insert(id, after);
                }
                (Some(before), Some(after)) => {
                    if before != after {
                        diff.updated.insert(id, (before, after));
                    }
                }
                (Some(before), None) => {
                    diff.removed.insert(id, before);
                }
                (None, None) => {}
            }
        }

        if diff.is_empty() {
            return Ok(diff);
        }

        self.epoch += 1;
        for id in diff
            .added
            .keys()
            .chain(diff.updated.keys())
            .chain(diff.removed.keys())
        {
            self.epochs.insert(id.clone(), self.epoch);
        }

        if self.log_events {
            Logger::trace(
                "TXN_COMMIT",
                &[
                    ("added", &diff.added.len().to_string()),
                    ("removed", &diff.removed.len().to_string()),
                    ("updated", &diff.updated.len().to_string()),
                ],
            );
        }

        if !txn.suppress {
            let entry = HistoryEntry {
                changes: diff.clone(),
                source: self.source,
            };
            self.dispatch(&entry);
        }

        Ok(diff)
    }

    fn rollback_txn(&mut self, txn: TxnState) {
        for (id, before) in txn.before {
            match before {
                Some(record) => self.insert_raw(record),
                None => {
                    self.remove_raw(&id);
                }
            }
        }
    }

    fn dispatch(&mut self, entry: &HistoryEntry) {
        for index in 0..self.listeners.len() {
            let filters = self.listeners[index].filters;
            if !self.entry_matches(&filters, entry) {
                continue;
            }
            (self.listeners[index].callback)(entry);
        }
    }

    fn entry_matches(&self, filters: &StoreListenFilters, entry: &HistoryEntry) -> bool {
        if !filters.matches_source(entry.source) {
            return false;
        }
        let Some(scope) = filters.scope else {
            return true;
        };
        let in_scope = |record: &Record| self.scope_of(record) == Some(scope);
        entry.changes.added.values().any(in_scope)
            || entry.changes.removed.values().any(in_scope)
            || entry
                .changes
                .updated
                .values()
                .any(|(_, after)| in_scope(after))
    }

    fn scope_of(&self, record: &Record) -> Option<RecordScope> {
        self.schema.scope_of(&record.type_name)
    }

    /// Record the first-touch before-image of an id within the current
    /// transaction.
    fn touch(&mut self, id: &RecordId) {
        let Some(txn) = self.txn.as_mut() else {
            return;
        };
        if !txn.before.contains_key(id) {
            let before = self.records.get(id).cloned();
            txn.before.insert(id.clone(), before);
        }
    }

    fn put_one(&mut self, record: Record) {
        self.touch(&record.id);
        self.insert_raw(record);
    }

    fn remove_one(&mut self, id: &RecordId) {
        if self.records.contains_key(id) {
            self.touch(id);
            self.remove_raw(id);
        }
    }

    fn insert_raw(&mut self, record: Record) {
        let id = record.id.clone();
        let type_name = record.type_name.clone();
        if let Some(previous) = self.records.insert(id.clone(), record) {
            if previous.type_name != type_name {
                if let Some(ids) = self.type_index.get_mut(&previous.type_name) {
                    ids.remove(&id);
                }
            }
        }
        self.type_index.entry(type_name).or_default().insert(id);
    }

    fn remove_raw(&mut self, id: &RecordId) {
        if let Some(record) = self.records.remove(id) {
            if let Some(ids) = self.type_index.get_mut(&record.type_name) {
                ids.remove(id);
            }
        }
    }
}
