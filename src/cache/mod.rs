//! Derived-value caching
//!
//! A `ComputedCache` memoizes a pure function of a record, keyed by the
//! record's change epoch. Reads go through the cache; a hit returns the
//! stored value without recomputing, and a committed change to the record
//! (or to any declared dependency) invalidates its entry on the next read.
//!
//! Values are handed out as `Rc<T>`, so a hit is a pointer clone. With
//! `with_equality`, a recomputation that produces an equal value keeps the
//! previous `Rc` alive, so consumers comparing by pointer see no change.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use crate::record::{Record, RecordId};
use crate::store::Store;

struct CacheEntry<T> {
    epoch: u64,
    deps_epoch: u64,
    value: Rc<T>,
}

type EqualityFn<T> = Box<dyn Fn(&T, &T) -> bool>;

/// A per-record memo table over a derivation function.
///
/// The cache does not observe the store; it compares epochs at read time,
/// so it can outlive many transactions without any registration or
/// teardown protocol.
pub struct ComputedCache<T> {
    name: String,
    compute: Box<dyn Fn(&Record) -> T>,
    dependencies: Vec<RecordId>,
    equality: Option<EqualityFn<T>>,
    entries: RefCell<HashMap<RecordId, CacheEntry<T>>>,
    recomputations: Cell<u64>,
}

impl<T> ComputedCache<T> {
    /// Create a cache over a derivation function. The name labels the
    /// cache in debug output.
    pub fn new(name: impl Into<String>, compute: impl Fn(&Record) -> T + 'static) -> Self {
        Self {
            name: name.into(),
            compute: Box::new(compute),
            dependencies: Vec::new(),
            equality: None,
            entries: RefCell::new(HashMap::new()),
            recomputations: Cell::new(0),
        }
    }

    /// Declare extra records whose changes invalidate every entry, for
    /// derivations that read more than their own record (e.g. a shape
    /// derivation that also reads the document's grid size).
    pub fn with_dependencies(mut self, ids: impl IntoIterator<Item = RecordId>) -> Self {
        self.dependencies.extend(ids);
        self
    }

    /// The cache's debug label.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Times the derivation function has actually run.
    pub fn recomputations(&self) -> u64 {
        self.recomputations.get()
    }

    /// Drop all entries. The next read of each record recomputes.
    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }

    /// The derived value for a record, or `None` if the record does not
    /// exist. Recomputes only when the record (or a dependency) has
    /// changed since the last read.
    pub fn get(&self, store: &Store, id: &RecordId) -> Option<Rc<T>> {
        let record = store.get(id)?;
        let epoch = store.epoch_of(id);
        let deps_epoch = self
            .dependencies
            .iter()
            .map(|dep| store.epoch_of(dep))
            .max()
            .unwrap_or(0);

        let mut entries = self.entries.borrow_mut();
        if let Some(entry) = entries.get(id) {
            if entry.epoch == epoch && entry.deps_epoch == deps_epoch {
                return Some(entry.value.clone());
            }
        }

        self.recomputations.set(self.recomputations.get() + 1);
        let mut value = Rc::new((self.compute)(record));
        if let (Some(equals), Some(previous)) = (&self.equality, entries.get(id)) {
            if equals(&previous.value, &value) {
                value = previous.value.clone();
            }
        }

        entries.insert(
            id.clone(),
            CacheEntry {
                epoch,
                deps_epoch,
                value: value.clone(),
            },
        );
        Some(value)
    }
}

impl<T: PartialEq> ComputedCache<T> {
    /// Keep the previous value when a recomputation produces an equal one,
    /// so `Rc::ptr_eq` still holds for downstream consumers.
    pub fn with_equality(mut self) -> Self {
        self.equality = Some(Box::new(|a, b| a == b));
        self
    }
}

impl<T> std::fmt::Debug for ComputedCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputedCache")
            .field("name", &self.name)
            .field("entries", &self.entries.borrow().len())
            .field("recomputations", &self.recomputations.get())
            .finish()
    }
}

/// Build a `ComputedCache` over a derivation function.
pub fn create_computed_cache<T>(
    name: impl Into<String>,
    compute: impl Fn(&Record) -> T + 'static,
) -> ComputedCache<T> {
    ComputedCache::new(name, compute)
}
