//! Field-shape declarations
//!
//! A record type declares its shape as a tree of `FieldDef`s. Supported
//! types:
//! - string: UTF-8 string
//! - number: any JSON number (integer or float)
//! - boolean
//! - object: nested object with its own field shape
//! - array: homogeneous array with one element type
//! - any: arbitrary JSON, used for open metadata bags

use std::collections::HashMap;

/// Supported field types.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    /// UTF-8 string
    String,
    /// Any JSON number
    Number,
    /// Boolean
    Boolean,
    /// Nested object with its own field shape
    Object {
        /// Nested field definitions
        fields: HashMap<String, FieldDef>,
    },
    /// Homogeneous array with a single element type
    Array {
        /// Element type (boxed to allow recursive shapes)
        element_type: Box<FieldType>,
    },
    /// Arbitrary JSON
    Any,
}

impl FieldType {
    /// Returns the type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Object { .. } => "object",
            FieldType::Array { .. } => "array",
            FieldType::Any => "any",
        }
    }
}

/// One declared field: its type, whether it must be present, and whether
/// `null` is an acceptable value.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    /// Field data type
    pub field_type: FieldType,
    /// Whether the field must be present
    pub required: bool,
    /// Whether `null` is accepted in place of a typed value
    pub nullable: bool,
}

impl FieldDef {
    /// Create a required field of the given type.
    pub fn required(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: true,
            nullable: false,
        }
    }

    /// Create an optional field of the given type.
    pub fn optional(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: false,
            nullable: false,
        }
    }

    /// Accept `null` in place of a typed value.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Create a required string field.
    pub fn required_string() -> Self {
        Self::required(FieldType::String)
    }

    /// Create an optional string field.
    pub fn optional_string() -> Self {
        Self::optional(FieldType::String)
    }

    /// Create a required number field.
    pub fn required_number() -> Self {
        Self::required(FieldType::Number)
    }

    /// Create an optional number field.
    pub fn optional_number() -> Self {
        Self::optional(FieldType::Number)
    }

    /// Create a required boolean field.
    pub fn required_boolean() -> Self {
        Self::required(FieldType::Boolean)
    }

    /// Create a required object field with a nested shape.
    pub fn required_object(fields: HashMap<String, FieldDef>) -> Self {
        Self::required(FieldType::Object { fields })
    }

    /// Create a required array field.
    pub fn required_array(element_type: FieldType) -> Self {
        Self::required(FieldType::Array {
            element_type: Box::new(element_type),
        })
    }

    /// Create a required field accepting arbitrary JSON.
    pub fn required_any() -> Self {
        Self::required(FieldType::Any)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_type_names() {
        assert_eq!(FieldType::String.type_name(), "string");
        assert_eq!(FieldType::Number.type_name(), "number");
        assert_eq!(FieldType::Boolean.type_name(), "boolean");
        assert_eq!(
            FieldType::Object {
                fields: HashMap::new()
            }
            .type_name(),
            "object"
        );
        assert_eq!(
            FieldType::Array {
                element_type: Box::new(FieldType::Number)
            }
            .type_name(),
            "array"
        );
        assert_eq!(FieldType::Any.type_name(), "any");
    }

    #[test]
    fn test_nullable_builder() {
        let def = FieldDef::required_string().nullable();
        assert!(def.required);
        assert!(def.nullable);
    }
}
