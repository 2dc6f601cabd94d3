//! Migration engine
//!
//! Ordered, namespaced sequences of bidirectional transformations over
//! persisted data. Migrations are keyed by a reverse-DNS `sequence_id` and
//! a dense version number starting at 1; each sequence versions one
//! concern independently, so documents created by old and new software
//! interoperate.
//!
//! Migration bodies run on the loosely-typed intermediate representation
//! (a flat JSON object including `id` and `typeName`), never on the
//! strongly-typed current record shape: a migration's job is to transform
//! data that does *not* yet match the current type.
//!
//! Application order:
//! - sequences run in registration order (the `StoreSchema` drives this)
//! - within a sequence, strictly ascending versions when migrating up,
//!   strictly descending when migrating down
//! - a record-scoped migration applies only to records matching the
//!   sequence's `record_type` and filter, re-evaluated before every step

mod errors;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

pub use errors::{MigrationFailure, MigrationResult};

/// A record-scoped migration body: rewrites one record's IR in place.
pub type RecordMigrationFn = Arc<dyn Fn(&mut Map<String, Value>) + Send + Sync>;

/// A store-scoped migration body: rewrites the whole id-to-IR map in place.
pub type StoreMigrationFn = Arc<dyn Fn(&mut HashMap<String, Map<String, Value>>) + Send + Sync>;

/// Predicate narrowing a sequence to a subset of a record type's records.
pub type SequenceFilter = Arc<dyn Fn(&Map<String, Value>) -> bool + Send + Sync>;

/// What a migration transforms.
pub enum MigrationBody {
    /// Rewrites individual records.
    Record {
        up: RecordMigrationFn,
        down: Option<RecordMigrationFn>,
    },
    /// Rewrites the whole store contents at once.
    Store {
        up: StoreMigrationFn,
        down: Option<StoreMigrationFn>,
    },
}

/// One step in a migration sequence.
pub struct Migration {
    /// Dense version within the sequence, starting at 1.
    pub version: u32,
    /// Human-readable step name (e.g. `AddMeta`).
    pub name: String,
    /// The transformation, with an optional inverse.
    pub body: MigrationBody,
}

impl Migration {
    /// A one-directional record migration.
    pub fn record(
        version: u32,
        name: impl Into<String>,
        up: impl Fn(&mut Map<String, Value>) + Send + Sync + 'static,
    ) -> Self {
        Self {
            version,
            name: name.into(),
            body: MigrationBody::Record {
                up: Arc::new(up),
                down: None,
            },
        }
    }

    /// A bidirectional record migration.
    pub fn record_with_down(
        version: u32,
        name: impl Into<String>,
        up: impl Fn(&mut Map<String, Value>) + Send + Sync + 'static,
        down: impl Fn(&mut Map<String, Value>) + Send + Sync + 'static,
    ) -> Self {
        Self {
            version,
            name: name.into(),
            body: MigrationBody::Record {
                up: Arc::new(up),
                down: Some(Arc::new(down)),
            },
        }
    }

    /// A one-directional store migration.
    pub fn store(
        version: u32,
        name: impl Into<String>,
        up: impl Fn(&mut HashMap<String, Map<String, Value>>) + Send + Sync + 'static,
    ) -> Self {
        Self {
            version,
            name: name.into(),
            body: MigrationBody::Store {
                up: Arc::new(up),
                down: None,
            },
        }
    }

    /// A bidirectional store migration.
    pub fn store_with_down(
        version: u32,
        name: impl Into<String>,
        up: impl Fn(&mut HashMap<String, Map<String, Value>>) + Send + Sync + 'static,
        down: impl Fn(&mut HashMap<String, Map<String, Value>>) + Send + Sync + 'static,
    ) -> Self {
        Self {
            version,
            name: name.into(),
            body: MigrationBody::Store {
                up: Arc::new(up),
                down: Some(Arc::new(down)),
            },
        }
    }

    /// Whether this migration can be rolled back.
    pub fn has_down(&self) -> bool {
        match &self.body {
            MigrationBody::Record { down, .. } => down.is_some(),
            MigrationBody::Store { down, .. } => down.is_some(),
        }
    }
}

impl fmt::Debug for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scope = match self.body {
            MigrationBody::Record { .. } => "record",
            MigrationBody::Store { .. } => "store",
        };
        f.debug_struct("Migration")
            .field("version", &self.version)
            .field("name", &self.name)
            .field("scope", &scope)
            .field("has_down", &self.has_down())
            .finish()
    }
}

/// Which way a migration run walks a sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationDirection {
    /// Older data forward to the current version.
    Up,
    /// Current data back to an older version, for older peers.
    Down,
}

/// An ordered list of migrations under one namespace, optionally restricted
/// to a record type and a predicate over the IR.
pub struct MigrationSequence {
    /// Reverse-DNS namespace (e.g. `com.inkstore.document`).
    pub sequence_id: String,
    /// If set, record-scoped steps apply only to records of this type.
    pub record_type: Option<String>,
    /// If set, record-scoped steps apply only where the predicate holds.
    /// Re-evaluated before every step, since an `up` may change the
    /// discriminant the predicate tests.
    pub filter: Option<SequenceFilter>,
    /// The steps, in ascending version order.
    pub migrations: Vec<Migration>,
}

impl MigrationSequence {
    /// Declare a sequence under the given namespace.
    pub fn new(sequence_id: impl Into<String>, migrations: Vec<Migration>) -> Self {
        Self {
            sequence_id: sequence_id.into(),
            record_type: None,
            filter: None,
            migrations,
        }
    }

    /// Restrict record-scoped steps to one record type.
    pub fn for_record_type(mut self, record_type: impl Into<String>) -> Self {
        self.record_type = Some(record_type.into());
        self
    }

    /// Restrict record-scoped steps to records matching a predicate.
    pub fn with_filter(
        mut self,
        filter: impl Fn(&Map<String, Value>) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// The version this sequence is currently at (0 when empty).
    pub fn latest_version(&self) -> u32 {
        self.migrations.last().map_or(0, |m| m.version)
    }

    /// Whether record-scoped steps of this sequence apply to the given IR,
    /// evaluated against its current contents.
    pub fn applies_to(&self, ir: &Map<String, Value>) -> bool {
        if let Some(record_type) = &self.record_type {
            let matches = ir
                .get("typeName")
                .and_then(Value::as_str)
                .map_or(false, |name| name == record_type);
            if !matches {
                return false;
            }
        }
        self.filter.as_ref().map_or(true, |filter| filter(ir))
    }

    /// Walk this sequence's record-scoped steps over one record IR, from
    /// version `from` to version `to`. `from < to` migrates up, `from > to`
    /// migrates down. Store-scoped steps are skipped on the single-record
    /// path; they only run under a whole-snapshot migration.
    pub fn migrate_record_ir(
        &self,
        ir: &mut Map<String, Value>,
        from: u32,
        to: u32,
    ) -> MigrationResult<()> {
        if from < to {
            for migration in &self.migrations {
                if migration.version <= from || migration.version > to {
                    continue;
                }
                if let MigrationBody::Record { up, .. } = &migration.body {
                    if self.applies_to(ir) {
                        up(ir);
                    }
                }
            }
        } else {
            for migration in self.migrations.iter().rev() {
                if migration.version > from || migration.version <= to {
                    continue;
                }
                if let MigrationBody::Record { down, .. } = &migration.body {
                    if !self.applies_to(ir) {
                        continue;
                    }
                    let down =
                        down.as_ref()
                            .ok_or_else(|| MigrationFailure::MissingDownMigration {
                                sequence_id: self.sequence_id.clone(),
                                version: migration.version,
                            })?;
                    down(ir);
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for MigrationSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationSequence")
            .field("sequence_id", &self.sequence_id)
            .field("record_type", &self.record_type)
            .field("has_filter", &self.filter.is_some())
            .field("migrations", &self.migrations)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn image_asset_ir(with_animated: bool) -> Map<String, Value> {
        let mut ir = json!({
            "id": "asset:img1",
            "typeName": "asset",
            "type": "image",
            "w": 100,
            "h": 50
        })
        .as_object()
        .unwrap()
        .clone();
        if with_animated {
            ir.insert("isAnimated".into(), json!(false));
        }
        ir
    }

    fn image_asset_sequence() -> MigrationSequence {
        MigrationSequence::new(
            "com.inkstore.asset.image",
            vec![Migration::record_with_down(
                1,
                "AddIsAnimated",
                |ir| {
                    ir.insert("isAnimated".into(), json!(false));
                },
                |ir| {
                    ir.remove("isAnimated");
                },
            )],
        )
        .for_record_type("asset")
        .with_filter(|ir| ir.get("type") == Some(&json!("image")))
    }

    #[test]
    fn test_latest_version() {
        assert_eq!(image_asset_sequence().latest_version(), 1);
        assert_eq!(MigrationSequence::new("com.example.empty", vec![]).latest_version(), 0);
    }

    #[test]
    fn test_up_applies_to_matching_record() {
        let seq = image_asset_sequence();
        let mut ir = image_asset_ir(false);
        seq.migrate_record_ir(&mut ir, 0, 1).unwrap();
        assert_eq!(ir.get("isAnimated"), Some(&json!(false)));
    }

    #[test]
    fn test_up_skips_non_matching_type() {
        let seq = image_asset_sequence();
        let mut ir = json!({ "id": "shape:a", "typeName": "shape" })
            .as_object()
            .unwrap()
            .clone();
        let before = ir.clone();
        seq.migrate_record_ir(&mut ir, 0, 1).unwrap();
        assert_eq!(ir, before);
    }

    #[test]
    fn test_up_skips_filtered_out_record() {
        let seq = image_asset_sequence();
        let mut ir = image_asset_ir(false);
        ir.insert("type".into(), json!("video"));
        let before = ir.clone();
        seq.migrate_record_ir(&mut ir, 0, 1).unwrap();
        assert_eq!(ir, before);
    }

    #[test]
    fn test_down_inverts_up() {
        let seq = image_asset_sequence();
        let mut ir = image_asset_ir(false);
        let original = ir.clone();
        seq.migrate_record_ir(&mut ir, 0, 1).unwrap();
        seq.migrate_record_ir(&mut ir, 1, 0).unwrap();
        assert_eq!(ir, original);
    }

    #[test]
    fn test_down_without_inverse_fails_closed() {
        let seq = MigrationSequence::new(
            "com.inkstore.pointer",
            vec![Migration::record(1, "AddMeta", |ir| {
                ir.insert("meta".into(), json!({}));
            })],
        );
        let mut ir = json!({ "id": "pointer:p", "typeName": "pointer", "meta": {} })
            .as_object()
            .unwrap()
            .clone();
        let err = seq.migrate_record_ir(&mut ir, 1, 0).unwrap_err();
        assert_eq!(
            err,
            MigrationFailure::MissingDownMigration {
                sequence_id: "com.inkstore.pointer".into(),
                version: 1,
            }
        );
        // The record is untouched on failure
        assert_eq!(ir.get("meta"), Some(&json!({})));
    }

    #[test]
    fn test_filter_reevaluated_between_steps() {
        // Step 1 changes the discriminant the filter tests; step 2 must no
        // longer apply.
        let seq = MigrationSequence::new(
            "com.example.assets",
            vec![
                Migration::record(1, "RetypeLegacyImages", |ir| {
                    ir.insert("type".into(), json!("bitmap"));
                }),
                Migration::record(2, "AddDpi", |ir| {
                    ir.insert("dpi".into(), json!(72));
                }),
            ],
        )
        .for_record_type("asset")
        .with_filter(|ir| ir.get("type") == Some(&json!("image")));

        let mut ir = image_asset_ir(false);
        seq.migrate_record_ir(&mut ir, 0, 2).unwrap();
        assert_eq!(ir.get("type"), Some(&json!("bitmap")));
        assert_eq!(ir.get("dpi"), None);
    }

    #[test]
    fn test_partial_range_only_runs_requested_steps() {
        let seq = MigrationSequence::new(
            "com.inkstore.document",
            vec![
                Migration::record(1, "AddName", |ir| {
                    ir.insert("name".into(), json!(""));
                }),
                Migration::record(2, "AddMeta", |ir| {
                    ir.insert("meta".into(), json!({}));
                }),
            ],
        );
        let mut ir = json!({ "id": "document:document", "typeName": "document", "name": "x" })
            .as_object()
            .unwrap()
            .clone();
        // Already at version 1; only AddMeta should run.
        seq.migrate_record_ir(&mut ir, 1, 2).unwrap();
        assert_eq!(ir.get("name"), Some(&json!("x")));
        assert_eq!(ir.get("meta"), Some(&json!({})));
    }

    #[test]
    fn test_store_scoped_steps_skipped_on_record_path() {
        let seq = MigrationSequence::new(
            "com.example.store",
            vec![Migration::store(1, "DropOrphans", |store| {
                store.clear();
            })],
        );
        let mut ir = json!({ "id": "shape:a", "typeName": "shape" })
            .as_object()
            .unwrap()
            .clone();
        let before = ir.clone();
        seq.migrate_record_ir(&mut ir, 0, 1).unwrap();
        assert_eq!(ir, before);
    }
}
