//! The record value type
//!
//! Serialized form is flat, with `id` and `typeName` alongside the
//! properties:
//!
//! ```text
//! {
//!   "id": "document:document",
//!   "typeName": "document",
//!   "gridSize": 10,
//!   "name": "",
//!   "meta": {}
//! }
//! ```
//!
//! The same flat object doubles as the migration engine's intermediate
//! representation, so a migration written against version N data can read
//! and rewrite fields the current type no longer declares.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::RecordId;

/// A uniquely-identified, typed unit of document state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Globally unique id, permanently bound to `type_name`.
    pub id: RecordId,
    /// The record category this record belongs to.
    #[serde(rename = "typeName")]
    pub type_name: String,
    /// All remaining fields, untyped.
    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

impl Record {
    /// Create a record from its parts.
    pub fn new(id: RecordId, type_name: impl Into<String>, properties: Map<String, Value>) -> Self {
        Self {
            id,
            type_name: type_name.into(),
            properties,
        }
    }

    /// Read a top-level property.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.properties.get(field)
    }

    /// Flatten into the loosely-typed intermediate representation used by
    /// migrations: one JSON object carrying `id`, `typeName`, and every
    /// property.
    pub fn to_ir(&self) -> Map<String, Value> {
        let mut ir = Map::with_capacity(self.properties.len() + 2);
        ir.insert("id".into(), Value::String(self.id.as_str().to_string()));
        ir.insert("typeName".into(), Value::String(self.type_name.clone()));
        for (key, value) in &self.properties {
            ir.insert(key.clone(), value.clone());
        }
        ir
    }

    /// Rebuild a record from the intermediate representation.
    ///
    /// Returns the name of the missing or mistyped field if the IR no
    /// longer carries a usable `id` and `typeName`.
    pub fn from_ir(mut ir: Map<String, Value>) -> Result<Self, &'static str> {
        let id = match ir.remove("id") {
            Some(Value::String(s)) => RecordId::from_raw(s),
            _ => return Err("id"),
        };
        let type_name = match ir.remove("typeName") {
            Some(Value::String(s)) => s,
            _ => return Err("typeName"),
        };
        Ok(Self {
            id,
            type_name,
            properties: ir,
        })
    }
}
