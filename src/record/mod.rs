//! Record data model
//!
//! A record is a uniquely-identified, typed unit of document state:
//! an opaque id, a type name, and a flat bag of JSON properties.
//! Records are immutable values; the store replaces them wholesale,
//! never mutates them in place.

mod id;
mod record;
mod record_type;
mod scope;

pub use id::RecordId;
pub use record::Record;
pub use record_type::RecordType;
pub use scope::RecordScope;
