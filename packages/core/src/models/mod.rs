//! Data Structures
//!
//! Value types exchanged between the transport layer and the engine:
//!
//! - [`RecordIdentifier`] - external identity of a record (table, remote ID, aspects)
//! - [`RecordRepresentation`] - identity plus the field data to write

pub mod record;

pub use record::{
    is_valid_remote_id, RecordIdentifier, RecordRepresentation, ValidationError, DEFAULT_LANGUAGE,
};
