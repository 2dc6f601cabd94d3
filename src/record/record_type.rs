//! Record type registry entries
//!
//! A `RecordType` declares one record category: its scope, its validator,
//! and a default-properties factory used to hydrate new records. Consumers
//! register their types with a `StoreSchema`; the store itself knows no
//! concrete field sets.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::validate::{RecordValidator, ValidationError};

use super::{Record, RecordId, RecordScope};

/// Factory producing the default property map for new records.
pub type DefaultProperties = Arc<dyn Fn() -> Map<String, Value> + Send + Sync>;

/// Metadata and factory for one record category.
#[derive(Clone)]
pub struct RecordType {
    type_name: String,
    scope: RecordScope,
    validator: RecordValidator,
    default_properties: Option<DefaultProperties>,
}

impl RecordType {
    /// Declare a record type with its scope and validator.
    pub fn new(
        type_name: impl Into<String>,
        scope: RecordScope,
        validator: RecordValidator,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            scope,
            validator,
            default_properties: None,
        }
    }

    /// Attach a default-properties factory. Factory output is merged under
    /// caller-supplied overrides when creating records.
    pub fn with_default_properties(
        mut self,
        factory: impl Fn() -> Map<String, Value> + Send + Sync + 'static,
    ) -> Self {
        self.default_properties = Some(Arc::new(factory));
        self
    }

    /// The string key this type registers under.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The persistence/sync class of records of this type.
    pub fn scope(&self) -> RecordScope {
        self.scope
    }

    /// The validator for records of this type.
    pub fn validator(&self) -> &RecordValidator {
        &self.validator
    }

    /// Generate a fresh id for this type.
    pub fn create_id(&self) -> RecordId {
        RecordId::generate(&self.type_name)
    }

    /// Build an id from a caller-supplied suffix (e.g. a singleton key).
    pub fn create_id_from(&self, suffix: &str) -> RecordId {
        RecordId::from_parts(&self.type_name, suffix)
    }

    /// Create a record: defaults merged under the given overrides, a fresh
    /// id assigned, and the result validated.
    pub fn create(&self, overrides: Map<String, Value>) -> Result<Record, ValidationError> {
        self.create_with_id(self.create_id(), overrides)
    }

    /// Create a record with a specific id.
    pub fn create_with_id(
        &self,
        id: RecordId,
        overrides: Map<String, Value>,
    ) -> Result<Record, ValidationError> {
        let mut properties = match &self.default_properties {
            Some(factory) => factory(),
            None => Map::new(),
        };
        for (key, value) in overrides {
            properties.insert(key, value);
        }

        let record = Record::new(id, &self.type_name, properties);
        self.validator
            .validate(&record.properties)
            .map_err(|err| err.with_record_id(record.id.as_str()))?;
        Ok(record)
    }

    /// Whether a record belongs to this type.
    pub fn is_instance(&self, record: &Record) -> bool {
        record.type_name == self.type_name
    }
}

impl fmt::Debug for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordType")
            .field("type_name", &self.type_name)
            .field("scope", &self.scope)
            .field(
                "default_properties",
                &self.default_properties.as_ref().map(|_| "<factory>"),
            )
            .finish()
    }
}
