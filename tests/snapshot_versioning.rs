//! Snapshot Versioning Tests
//!
//! Persistence and cross-version load invariants:
//! - A snapshot carries document-scope records plus the writing schema's
//!   version manifest; session and presence records never persist
//! - Loading an older snapshot migrates it to the live schema before any
//!   record enters the store
//! - Loading replaces document contents in one transaction attributed to
//!   the remote source
//! - A snapshot from newer software is refused; the store is untouched
//! - Snapshots can be rolled back to an older manifest for older peers

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use inkstore::migrate::{Migration, MigrationFailure, MigrationSequence};
use inkstore::record::{Record, RecordId, RecordScope, RecordType};
use inkstore::schema::{SerializedSchema, StoreSchema};
use inkstore::store::{
    ChangeSource, Store, StoreError, StoreListenFilters, StoreSnapshot,
};
use inkstore::validate::{FieldDef, RecordValidator};
use serde_json::{json, Map};

// =============================================================================
// Helper Functions
// =============================================================================

fn document_type() -> RecordType {
    let mut fields = HashMap::new();
    fields.insert("gridSize".to_string(), FieldDef::required_number());
    fields.insert("name".to_string(), FieldDef::required_string());
    fields.insert("meta".to_string(), FieldDef::required_any());
    RecordType::new(
        "document",
        RecordScope::Document,
        RecordValidator::new("document", fields),
    )
    .with_default_properties(|| {
        json!({ "gridSize": 10, "name": "", "meta": {} })
            .as_object()
            .unwrap()
            .clone()
    })
}

fn camera_type() -> RecordType {
    let mut fields = HashMap::new();
    fields.insert("zoom".to_string(), FieldDef::required_number());
    RecordType::new(
        "camera",
        RecordScope::Session,
        RecordValidator::new("camera", fields),
    )
    .with_default_properties(|| json!({ "zoom": 1 }).as_object().unwrap().clone())
}

fn document_sequence() -> MigrationSequence {
    MigrationSequence::new(
        "com.inkstore.document",
        vec![
            Migration::record_with_down(
                1,
                "AddName",
                |ir| {
                    ir.insert("name".to_string(), json!(""));
                },
                |ir| {
                    ir.remove("name");
                },
            ),
            Migration::record_with_down(
                2,
                "AddMeta",
                |ir| {
                    ir.insert("meta".to_string(), json!({}));
                },
                |ir| {
                    ir.remove("meta");
                },
            ),
        ],
    )
    .for_record_type("document")
}

fn setup_schema() -> StoreSchema {
    StoreSchema::create(
        vec![document_type(), camera_type()],
        vec![document_sequence()],
    )
    .unwrap()
}

fn setup_store() -> Store {
    Store::new(setup_schema())
}

/// A snapshot as v0 software would have written it: one bare document,
/// empty manifest.
fn v0_snapshot() -> StoreSnapshot {
    let id = RecordId::from_parts("document", "document");
    let mut properties = Map::new();
    properties.insert("gridSize".to_string(), json!(10));
    let record = Record::new(id.clone(), "document", properties);

    let mut store = HashMap::new();
    store.insert(id, record);
    StoreSnapshot {
        store,
        schema: SerializedSchema::new(),
    }
}

// =============================================================================
// Snapshot Shape Tests
// =============================================================================

/// The exported snapshot carries the live manifest alongside the records.
#[test]
fn test_snapshot_carries_current_manifest() {
    let mut store = setup_store();
    store
        .put([document_type()
            .create_with_id(RecordId::from_parts("document", "document"), Map::new())
            .unwrap()])
        .unwrap();

    let snapshot = store.get_snapshot();
    assert_eq!(snapshot.store.len(), 1);
    assert_eq!(snapshot.schema.version_of("com.inkstore.document"), 2);
    assert_eq!(
        serde_json::to_value(&snapshot.schema).unwrap(),
        json!({ "com.inkstore.document": 2 })
    );
}

/// Session-scope records never appear in a snapshot.
#[test]
fn test_snapshot_excludes_session_records() {
    let mut store = setup_store();
    let document = document_type().create(Map::new()).unwrap();
    let camera = camera_type().create(Map::new()).unwrap();
    store.put([document.clone(), camera]).unwrap();

    let snapshot = store.get_snapshot();
    assert_eq!(snapshot.store.len(), 1);
    assert!(snapshot.store.contains_key(&document.id));
}

/// Snapshots survive a serde round trip.
#[test]
fn test_snapshot_serde_round_trip() {
    let mut store = setup_store();
    store.put([document_type().create(Map::new()).unwrap()]).unwrap();

    let snapshot = store.get_snapshot();
    let text = serde_json::to_string(&snapshot).unwrap();
    let back: StoreSnapshot = serde_json::from_str(&text).unwrap();
    assert_eq!(back, snapshot);
}

// =============================================================================
// Load Tests
// =============================================================================

/// Loading a v0 snapshot runs AddName then AddMeta before any record
/// enters the store.
#[test]
fn test_load_v0_snapshot_migrates_up() {
    let mut store = setup_store();
    store.load_snapshot(v0_snapshot()).unwrap();

    let id = RecordId::from_parts("document", "document");
    let record = store.get(&id).unwrap();
    assert_eq!(record.get("gridSize"), Some(&json!(10)));
    assert_eq!(record.get("name"), Some(&json!("")));
    assert_eq!(record.get("meta"), Some(&json!({})));
}

/// The load is one transaction attributed to the remote source.
#[test]
fn test_load_dispatches_single_remote_entry() {
    let mut store = setup_store();
    let entries = Rc::new(RefCell::new(Vec::new()));
    let sink = entries.clone();
    store.listen(StoreListenFilters::default(), move |entry| {
        sink.borrow_mut().push(entry.clone());
    });

    store.load_snapshot(v0_snapshot()).unwrap();

    let entries = entries.borrow();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].source, ChangeSource::Remote);
    assert_eq!(entries[0].changes.added.len(), 1);
}

/// Loading replaces prior document contents but leaves session records
/// alone.
#[test]
fn test_load_replaces_document_scope_only() {
    let mut store = setup_store();
    let stale = document_type().create(Map::new()).unwrap();
    let camera = camera_type().create(Map::new()).unwrap();
    store.put([stale.clone(), camera.clone()]).unwrap();

    store.load_snapshot(v0_snapshot()).unwrap();

    assert!(!store.has(&stale.id));
    assert!(store.has(&camera.id));
    assert!(store.has(&RecordId::from_parts("document", "document")));
}

/// A snapshot from newer software is refused and the store is untouched.
#[test]
fn test_load_refuses_newer_snapshot() {
    let mut store = setup_store();
    let existing = document_type().create(Map::new()).unwrap();
    store.put([existing.clone()]).unwrap();

    let mut snapshot = v0_snapshot();
    snapshot.schema.set("com.inkstore.document", 9);

    let err = store.load_snapshot(snapshot).unwrap_err();
    assert_eq!(
        err,
        StoreError::SchemaVersionMismatch(MigrationFailure::TargetVersionTooNew {
            sequence_id: "com.inkstore.document".to_string(),
            persisted: 9,
            latest: 2,
        })
    );
    assert_eq!(store.get(&existing.id), Some(&existing));
}

/// A snapshot naming an unknown sequence is refused the same way.
#[test]
fn test_load_refuses_unknown_sequence() {
    let mut store = setup_store();
    let mut snapshot = v0_snapshot();
    snapshot.schema.set("com.other.vendor", 1);

    let err = store.load_snapshot(snapshot).unwrap_err();
    assert!(matches!(err, StoreError::SchemaVersionMismatch(_)));
    assert!(store.is_empty());
}

// =============================================================================
// Rollback Tests
// =============================================================================

/// A current snapshot can be rolled back to the empty manifest for a v0
/// peer, stripping the migrated fields.
#[test]
fn test_snapshot_rollback_for_older_peer() {
    let mut store = setup_store();
    store
        .put([document_type()
            .create_with_id(RecordId::from_parts("document", "document"), Map::new())
            .unwrap()])
        .unwrap();

    let snapshot = store.get_snapshot();
    let rolled_back = store
        .schema()
        .migrate_store_snapshot(snapshot, &SerializedSchema::new())
        .unwrap();

    let id = RecordId::from_parts("document", "document");
    let record = &rolled_back.store[&id];
    assert_eq!(record.get("gridSize"), Some(&json!(10)));
    assert_eq!(record.get("name"), None);
    assert_eq!(record.get("meta"), None);
    assert_eq!(rolled_back.schema, SerializedSchema::new());
}

/// Round trip: roll a snapshot back to v0, then load it into a fresh
/// store, which migrates it forward again.
#[test]
fn test_rollback_then_reload_round_trip() {
    let mut store = setup_store();
    let document = document_type()
        .create_with_id(RecordId::from_parts("document", "document"), Map::new())
        .unwrap();
    store.put([document.clone()]).unwrap();

    let rolled_back = store
        .schema()
        .migrate_store_snapshot(store.get_snapshot(), &SerializedSchema::new())
        .unwrap();

    let mut fresh = setup_store();
    fresh.load_snapshot(rolled_back).unwrap();
    assert_eq!(fresh.get(&document.id), Some(&document));
}

// =============================================================================
// Store-Scoped Migration Tests
// =============================================================================

/// Store-scoped migrations run on the snapshot path, where they can see
/// the whole record set at once.
#[test]
fn test_store_scoped_migration_runs_on_load() {
    let sequence = MigrationSequence::new(
        "com.inkstore.document",
        vec![Migration::store(1, "EnsureDocument", |ir_store| {
            let id = "document:document";
            if !ir_store.contains_key(id) {
                ir_store.insert(
                    id.to_string(),
                    json!({
                        "id": id,
                        "typeName": "document",
                        "gridSize": 10,
                    })
                    .as_object()
                    .unwrap()
                    .clone(),
                );
            }
        })],
    );

    let mut fields = HashMap::new();
    fields.insert("gridSize".to_string(), FieldDef::required_number());
    let document = RecordType::new(
        "document",
        RecordScope::Document,
        RecordValidator::new("document", fields),
    );
    let schema = StoreSchema::create(vec![document], vec![sequence]).unwrap();
    let mut store = Store::new(schema);

    store
        .load_snapshot(StoreSnapshot {
            store: HashMap::new(),
            schema: SerializedSchema::new(),
        })
        .unwrap();

    assert!(store.has(&RecordId::from_parts("document", "document")));
}
