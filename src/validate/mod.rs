//! Record shape validation
//!
//! Pure, deterministic checks of a candidate property map against a
//! declared field-shape tree. Validators never mutate records and never
//! coerce types; a failure names the exact dotted field path that broke.
//!
//! Validation semantics:
//! - All required fields must be present
//! - No undeclared fields may exist
//! - Field types must match exactly, no implicit coercion
//! - `null` is rejected unless the field is declared nullable
//! - `any` fields accept arbitrary JSON (used for open metadata bags)

mod errors;
mod types;
mod validator;

pub use errors::{ValidationDetails, ValidationError};
pub use types::{FieldDef, FieldType};
pub use validator::RecordValidator;
