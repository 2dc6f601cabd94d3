//! Property-map validator
//!
//! Walks a record's property map against a declared field shape and
//! reports the first violation with its full dotted path. Validators are
//! pure: they never mutate the value under test and are deterministic.

use std::collections::HashMap;

use serde_json::{Map, Value};

use super::errors::{ValidationDetails, ValidationError, ValidationResult};
use super::types::{FieldDef, FieldType};

/// Validator for one record type's property map.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordValidator {
    type_name: String,
    fields: HashMap<String, FieldDef>,
}

impl RecordValidator {
    /// Build a validator for the given record type and field shape.
    pub fn new(type_name: impl Into<String>, fields: HashMap<String, FieldDef>) -> Self {
        Self {
            type_name: type_name.into(),
            fields,
        }
    }

    /// The record type this validator belongs to.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Validate a full property map (everything except `id`/`typeName`).
    pub fn validate(&self, properties: &Map<String, Value>) -> ValidationResult {
        self.validate_object(properties, &self.fields, "")
    }

    fn validate_object(
        &self,
        obj: &Map<String, Value>,
        fields: &HashMap<String, FieldDef>,
        path_prefix: &str,
    ) -> ValidationResult {
        // No undeclared fields allowed
        for key in obj.keys() {
            if !fields.contains_key(key) {
                return Err(self.fail(ValidationDetails::extra_field(make_path(path_prefix, key))));
            }
        }

        for (field_name, field_def) in fields {
            let field_path = make_path(path_prefix, field_name);

            match obj.get(field_name) {
                Some(value) => {
                    if value.is_null() {
                        if field_def.nullable {
                            continue;
                        }
                        return Err(self.fail(ValidationDetails::null_value(&field_path)));
                    }
                    self.validate_value(value, &field_def.field_type, &field_path)?;
                }
                None => {
                    if field_def.required {
                        return Err(self.fail(ValidationDetails::missing_field(field_path)));
                    }
                }
            }
        }

        Ok(())
    }

    fn validate_value(
        &self,
        value: &Value,
        expected_type: &FieldType,
        field_path: &str,
    ) -> ValidationResult {
        match expected_type {
            FieldType::String => {
                if !value.is_string() {
                    return Err(self.type_error(field_path, "string", value));
                }
            }
            FieldType::Number => {
                if !value.is_number() {
                    return Err(self.type_error(field_path, "number", value));
                }
            }
            FieldType::Boolean => {
                if !value.is_boolean() {
                    return Err(self.type_error(field_path, "boolean", value));
                }
            }
            FieldType::Object { fields } => {
                let obj = value
                    .as_object()
                    .ok_or_else(|| self.type_error(field_path, "object", value))?;
                self.validate_object(obj, fields, field_path)?;
            }
            FieldType::Array { element_type } => {
                let arr = value
                    .as_array()
                    .ok_or_else(|| self.type_error(field_path, "array", value))?;

                for (i, elem) in arr.iter().enumerate() {
                    let elem_path = format!("{}[{}]", field_path, i);
                    if elem.is_null() {
                        return Err(self.fail(ValidationDetails::null_value(&elem_path)));
                    }
                    self.validate_value(elem, element_type, &elem_path)?;
                }
            }
            FieldType::Any => {}
        }

        Ok(())
    }

    fn fail(&self, details: ValidationDetails) -> ValidationError {
        ValidationError::new(&self.type_name, details)
    }

    fn type_error(&self, field_path: &str, expected: &str, actual: &Value) -> ValidationError {
        self.fail(ValidationDetails::type_mismatch(
            field_path,
            expected,
            json_type_name(actual),
        ))
    }
}

/// Returns the JSON type name for error messages.
pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn make_path(prefix: &str, field: &str) -> String {
    if prefix.is_empty() {
        field.to_string()
    } else {
        format!("{}.{}", prefix, field)
    }
}
