//! Store schema
//!
//! A `StoreSchema` aggregates every registered record type and migration
//! sequence into one versioned contract. It is an explicit configuration
//! object, never a process-wide singleton: independent stores with
//! different schemas coexist in one process.
//!
//! The schema produces and consumes the serialized version manifest
//! (`SerializedSchema`) persisted alongside document data, and decides
//! which migrations must run when a snapshot is loaded — refusing outright
//! when a snapshot was written by newer software.

mod errors;

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::migrate::{
    Migration, MigrationBody, MigrationDirection, MigrationFailure, MigrationResult,
    MigrationSequence,
};
use crate::record::{Record, RecordScope, RecordType};
use crate::store::StoreSnapshot;
use crate::validate::{ValidationDetails, ValidationError};

pub use errors::{SchemaError, SchemaResult};

/// The version manifest persisted alongside document data: the current
/// version of every known sequence. Serializes as a flat
/// `{ sequenceId: version }` object with deterministic key order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SerializedSchema {
    versions: BTreeMap<String, u32>,
}

impl SerializedSchema {
    /// An empty manifest (every sequence at version 0).
    pub fn new() -> Self {
        Self::default()
    }

    /// The persisted version of a sequence. A sequence absent from the
    /// manifest is at version 0: everything in it still applies on the
    /// way up.
    pub fn version_of(&self, sequence_id: &str) -> u32 {
        self.versions.get(sequence_id).copied().unwrap_or(0)
    }

    /// Whether the manifest names this sequence at all.
    pub fn contains(&self, sequence_id: &str) -> bool {
        self.versions.contains_key(sequence_id)
    }

    /// Set a sequence's version. Used when building manifests by hand,
    /// e.g. the manifest of an older peer.
    pub fn set(&mut self, sequence_id: impl Into<String>, version: u32) {
        self.versions.insert(sequence_id.into(), version);
    }

    /// Iterate over (sequence id, version) pairs in deterministic order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.versions.iter().map(|(id, v)| (id.as_str(), *v))
    }
}

impl FromIterator<(String, u32)> for SerializedSchema {
    fn from_iter<I: IntoIterator<Item = (String, u32)>>(iter: I) -> Self {
        Self {
            versions: iter.into_iter().collect(),
        }
    }
}

/// The aggregated contract: all record types plus all migration sequences.
#[derive(Debug)]
pub struct StoreSchema {
    record_types: HashMap<String, RecordType>,
    sequences: Vec<MigrationSequence>,
}

impl StoreSchema {
    /// Validate and assemble a schema.
    ///
    /// Rejects duplicate type names, duplicate sequence ids, versions that
    /// are not dense ascending integers from 1, and sequences targeting a
    /// record type nothing registered. Sequences with overlapping filters
    /// are allowed; all matching sequences run, in registration order.
    pub fn create(
        record_types: Vec<RecordType>,
        sequences: Vec<MigrationSequence>,
    ) -> SchemaResult<Self> {
        let mut types = HashMap::with_capacity(record_types.len());
        for record_type in record_types {
            let name = record_type.type_name().to_string();
            if types.insert(name.clone(), record_type).is_some() {
                return Err(SchemaError::DuplicateRecordType(name));
            }
        }

        for (i, sequence) in sequences.iter().enumerate() {
            if sequences[..i]
                .iter()
                .any(|other| other.sequence_id == sequence.sequence_id)
            {
                return Err(SchemaError::DuplicateSequence(sequence.sequence_id.clone()));
            }

            for (position, migration) in sequence.migrations.iter().enumerate() {
                let expected = position as u32 + 1;
                if migration.version != expected {
                    return Err(SchemaError::NonDenseVersions {
                        sequence_id: sequence.sequence_id.clone(),
                        position,
                        expected,
                        found: migration.version,
                    });
                }
            }

            if let Some(record_type) = &sequence.record_type {
                if !types.contains_key(record_type) {
                    return Err(SchemaError::UnknownRecordType {
                        sequence_id: sequence.sequence_id.clone(),
                        record_type: record_type.clone(),
                    });
                }
            }
        }

        Ok(Self {
            record_types: types,
            sequences,
        })
    }

    /// Look up a registered record type.
    pub fn record_type(&self, type_name: &str) -> Option<&RecordType> {
        self.record_types.get(type_name)
    }

    /// The scope of a registered record type.
    pub fn scope_of(&self, type_name: &str) -> Option<RecordScope> {
        self.record_types.get(type_name).map(RecordType::scope)
    }

    /// The migration sequences, in registration order.
    pub fn sequences(&self) -> &[MigrationSequence] {
        &self.sequences
    }

    /// The current version of every sequence.
    pub fn serialize(&self) -> SerializedSchema {
        self.sequences
            .iter()
            .map(|seq| (seq.sequence_id.clone(), seq.latest_version()))
            .collect()
    }

    /// Validate a record against its registered type.
    ///
    /// Checks that the type is registered, that the id's embedded prefix
    /// matches the record's type name, and that the properties satisfy the
    /// type's validator.
    pub fn validate_record(&self, record: &Record) -> Result<(), ValidationError> {
        let record_type = self.record_types.get(&record.type_name).ok_or_else(|| {
            ValidationError::new(
                &record.type_name,
                ValidationDetails::new("typeName", "a registered record type", &record.type_name),
            )
            .with_record_id(record.id.as_str())
        })?;

        if record.id.type_name() != record.type_name {
            return Err(ValidationError::new(
                &record.type_name,
                ValidationDetails::new(
                    "id",
                    format!("id prefixed with '{}'", record.type_name),
                    record.id.as_str(),
                ),
            )
            .with_record_id(record.id.as_str()));
        }

        record_type
            .validator()
            .validate(&record.properties)
            .map_err(|err| err.with_record_id(record.id.as_str()))
    }

    /// Migrate one persisted record between its persisted versions and the
    /// current ones.
    ///
    /// `persisted` is the manifest stored with the record. `Up` walks each
    /// sequence from its persisted version to the latest and validates the
    /// result; `Down` walks from the latest back to the persisted version
    /// (producing data for an older peer, so the current validator is not
    /// applied).
    pub fn migrate_persisted_record(
        &self,
        record: &Record,
        persisted: &SerializedSchema,
        direction: MigrationDirection,
    ) -> MigrationResult<Record> {
        self.check_known(persisted)?;

        let mut ir = record.to_ir();
        for sequence in &self.sequences {
            let persisted_version = persisted.version_of(&sequence.sequence_id);
            let latest = sequence.latest_version();
            if persisted_version > latest {
                return Err(MigrationFailure::TargetVersionTooNew {
                    sequence_id: sequence.sequence_id.clone(),
                    persisted: persisted_version,
                    latest,
                });
            }
            match direction {
                MigrationDirection::Up => {
                    sequence.migrate_record_ir(&mut ir, persisted_version, latest)?
                }
                MigrationDirection::Down => {
                    sequence.migrate_record_ir(&mut ir, latest, persisted_version)?
                }
            }
        }

        let migrated = Record::from_ir(ir).map_err(|field| MigrationFailure::IncompatibleRecord {
            record_id: record.id.as_str().to_string(),
            reason: format!("missing or invalid '{}' after migration", field),
        })?;

        if direction == MigrationDirection::Up {
            self.validate_record(&migrated)
                .map_err(|err| MigrationFailure::incompatible(record.id.as_str(), &err))?;
        }

        Ok(migrated)
    }

    /// Migrate a whole snapshot from the manifest it carries to `target`.
    ///
    /// Each sequence walks up or down independently depending on where the
    /// two manifests place it. Store-scoped migrations run here (they are
    /// skipped on the single-record path). When `target` is the current
    /// manifest, every record is checked against its validator; snapshots
    /// rolled back for older peers are not validated, since the current
    /// validators describe the current shape.
    pub fn migrate_store_snapshot(
        &self,
        snapshot: StoreSnapshot,
        target: &SerializedSchema,
    ) -> MigrationResult<StoreSnapshot> {
        self.check_known(&snapshot.schema)?;

        let mut ir_store: HashMap<String, Map<String, Value>> = snapshot
            .store
            .values()
            .map(|record| (record.id.as_str().to_string(), record.to_ir()))
            .collect();

        for sequence in &self.sequences {
            let from = snapshot.schema.version_of(&sequence.sequence_id);
            let to = target.version_of(&sequence.sequence_id);
            let latest = sequence.latest_version();
            for version in [from, to] {
                if version > latest {
                    return Err(MigrationFailure::TargetVersionTooNew {
                        sequence_id: sequence.sequence_id.clone(),
                        persisted: version,
                        latest,
                    });
                }
            }

            if from < to {
                for migration in &sequence.migrations {
                    if migration.version <= from || migration.version > to {
                        continue;
                    }
                    Self::apply_step_up(sequence, migration, &mut ir_store);
                }
            } else if from > to {
                for migration in sequence.migrations.iter().rev() {
                    if migration.version > from || migration.version <= to {
                        continue;
                    }
                    Self::apply_step_down(sequence, migration, &mut ir_store)?;
                }
            }
        }

        let validate = *target == self.serialize();
        let mut store = HashMap::with_capacity(ir_store.len());
        for (raw_id, ir) in ir_store {
            let record =
                Record::from_ir(ir).map_err(|field| MigrationFailure::IncompatibleRecord {
                    record_id: raw_id.clone(),
                    reason: format!("missing or invalid '{}' after migration", field),
                })?;
            if validate {
                self.validate_record(&record)
                    .map_err(|err| MigrationFailure::incompatible(&raw_id, &err))?;
            }
            store.insert(record.id.clone(), record);
        }

        Ok(StoreSnapshot {
            store,
            schema: target.clone(),
        })
    }

    fn apply_step_up(
        sequence: &MigrationSequence,
        migration: &Migration,
        ir_store: &mut HashMap<String, Map<String, Value>>,
    ) {
        match &migration.body {
            MigrationBody::Record { up, .. } => {
                for ir in ir_store.values_mut() {
                    if sequence.applies_to(ir) {
                        up(ir);
                    }
                }
            }
            MigrationBody::Store { up, .. } => up(ir_store),
        }
    }

    fn apply_step_down(
        sequence: &MigrationSequence,
        migration: &Migration,
        ir_store: &mut HashMap<String, Map<String, Value>>,
    ) -> MigrationResult<()> {
        let missing_down = || MigrationFailure::MissingDownMigration {
            sequence_id: sequence.sequence_id.clone(),
            version: migration.version,
        };
        match &migration.body {
            MigrationBody::Record { down, .. } => {
                for ir in ir_store.values_mut() {
                    if sequence.applies_to(ir) {
                        down.as_ref().ok_or_else(missing_down)?(ir);
                    }
                }
            }
            MigrationBody::Store { down, .. } => {
                down.as_ref().ok_or_else(missing_down)?(ir_store);
            }
        }
        Ok(())
    }

    /// Every sequence a manifest names must be known to this schema.
    fn check_known(&self, manifest: &SerializedSchema) -> MigrationResult<()> {
        for (sequence_id, _) in manifest.iter() {
            if !self
                .sequences
                .iter()
                .any(|seq| seq.sequence_id == sequence_id)
            {
                return Err(MigrationFailure::UnknownSequence {
                    sequence_id: sequence_id.to_string(),
                });
            }
        }
        Ok(())
    }
}
