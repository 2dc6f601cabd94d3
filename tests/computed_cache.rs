//! Computed Cache Tests
//!
//! Derived-value caching invariants:
//! - A read after no change is a hit; the derivation does not rerun
//! - A committed change to the record invalidates its entry
//! - Changes to unrelated records leave entries fresh
//! - Rolled-back transactions invalidate nothing
//! - Dependency records extend the invalidation set

use std::collections::HashMap;
use std::rc::Rc;

use inkstore::cache::create_computed_cache;
use inkstore::record::{Record, RecordId, RecordScope, RecordType};
use inkstore::schema::StoreSchema;
use inkstore::store::Store;
use inkstore::validate::{FieldDef, RecordValidator};
use serde_json::{json, Map};

// =============================================================================
// Helper Functions
// =============================================================================

fn shape_type() -> RecordType {
    let mut fields = HashMap::new();
    fields.insert("w".to_string(), FieldDef::required_number());
    fields.insert("h".to_string(), FieldDef::required_number());
    RecordType::new(
        "shape",
        RecordScope::Document,
        RecordValidator::new("shape", fields),
    )
    .with_default_properties(|| {
        json!({ "w": 1, "h": 1 }).as_object().unwrap().clone()
    })
}

fn setup_store() -> Store {
    Store::new(StoreSchema::create(vec![shape_type()], vec![]).unwrap())
}

fn shape(w: i64, h: i64) -> Record {
    let mut overrides = Map::new();
    overrides.insert("w".to_string(), json!(w));
    overrides.insert("h".to_string(), json!(h));
    shape_type().create(overrides).unwrap()
}

fn area(record: &Record) -> f64 {
    let w = record.get("w").and_then(|v| v.as_f64()).unwrap_or(0.0);
    let h = record.get("h").and_then(|v| v.as_f64()).unwrap_or(0.0);
    w * h
}

// =============================================================================
// Hit/Miss Tests
// =============================================================================

/// Repeated reads without intervening changes run the derivation once.
#[test]
fn test_repeated_reads_compute_once() {
    let mut store = setup_store();
    let record = shape(3, 4);
    let id = record.id.clone();
    store.put([record]).unwrap();

    let cache = create_computed_cache("area", area);
    for _ in 0..10 {
        assert_eq!(*cache.get(&store, &id).unwrap(), 12.0);
    }
    assert_eq!(cache.recomputations(), 1);
}

/// A committed change to the record recomputes on the next read, and
/// only then.
#[test]
fn test_commit_invalidates_entry() {
    let mut store = setup_store();
    let record = shape(3, 4);
    let id = record.id.clone();
    store.put([record]).unwrap();

    let cache = create_computed_cache("area", area);
    assert_eq!(*cache.get(&store, &id).unwrap(), 12.0);

    store
        .update(&id, |mut record| {
            record.properties.insert("w".to_string(), json!(5));
            record
        })
        .unwrap();
    assert_eq!(cache.recomputations(), 1);

    assert_eq!(*cache.get(&store, &id).unwrap(), 20.0);
    assert_eq!(cache.recomputations(), 2);
}

/// Changes to other records leave an entry fresh.
#[test]
fn test_unrelated_commit_keeps_entry_fresh() {
    let mut store = setup_store();
    let watched = shape(2, 2);
    let id = watched.id.clone();
    store.put([watched]).unwrap();

    let cache = create_computed_cache("area", area);
    cache.get(&store, &id).unwrap();

    for _ in 0..5 {
        store.put([shape(9, 9)]).unwrap();
    }
    assert_eq!(*cache.get(&store, &id).unwrap(), 4.0);
    assert_eq!(cache.recomputations(), 1);
}

/// A rolled-back transaction commits nothing and therefore invalidates
/// nothing.
#[test]
fn test_rollback_does_not_invalidate() {
    let mut store = setup_store();
    let record = shape(2, 3);
    let id = record.id.clone();
    store.put([record]).unwrap();

    let cache = create_computed_cache("area", area);
    assert_eq!(*cache.get(&store, &id).unwrap(), 6.0);

    let bad = Record::new(
        RecordId::generate("shape"),
        "shape",
        json!({ "w": "wide", "h": 1 }).as_object().unwrap().clone(),
    );
    let result = store.atomic(|store| {
        store.update(&id, |mut record| {
            record.properties.insert("w".to_string(), json!(100));
            record
        })?;
        store.put([bad])
    });
    assert!(result.is_err());

    assert_eq!(*cache.get(&store, &id).unwrap(), 6.0);
    assert_eq!(cache.recomputations(), 1);
}

/// A removed record reads as absent; re-adding it recomputes.
#[test]
fn test_removed_record_reads_none() {
    let mut store = setup_store();
    let record = shape(3, 3);
    let id = record.id.clone();
    store.put([record.clone()]).unwrap();

    let cache = create_computed_cache("area", area);
    cache.get(&store, &id).unwrap();

    store.remove([id.clone()]).unwrap();
    assert!(cache.get(&store, &id).is_none());

    store.put([record]).unwrap();
    assert_eq!(*cache.get(&store, &id).unwrap(), 9.0);
    assert_eq!(cache.recomputations(), 2);
}

// =============================================================================
// Dependency Tests
// =============================================================================

/// Declared dependencies widen the invalidation set: a change to the
/// dependency recomputes even though the record itself is unchanged.
#[test]
fn test_dependency_change_invalidates() {
    let mut store = setup_store();
    let record = shape(2, 2);
    let scale = shape(10, 1);
    let id = record.id.clone();
    let scale_id = scale.id.clone();
    store.put([record, scale]).unwrap();

    let cache = create_computed_cache("area", area).with_dependencies([scale_id.clone()]);
    cache.get(&store, &id).unwrap();

    store
        .update(&scale_id, |mut record| {
            record.properties.insert("w".to_string(), json!(20));
            record
        })
        .unwrap();
    cache.get(&store, &id).unwrap();
    assert_eq!(cache.recomputations(), 2);
}

/// With equality enabled, a recomputation yielding an equal value keeps
/// the previous allocation alive.
#[test]
fn test_equality_preserves_pointer_identity() {
    let mut store = setup_store();
    let record = shape(6, 2);
    let id = record.id.clone();
    store.put([record]).unwrap();

    let cache = create_computed_cache("area", area).with_equality();
    let first = cache.get(&store, &id).unwrap();

    // Swap width and height: the record changes, the area does not.
    store
        .update(&id, |mut record| {
            record.properties.insert("w".to_string(), json!(2));
            record.properties.insert("h".to_string(), json!(6));
            record
        })
        .unwrap();

    let second = cache.get(&store, &id).unwrap();
    assert_eq!(cache.recomputations(), 2);
    assert!(Rc::ptr_eq(&first, &second));
}
