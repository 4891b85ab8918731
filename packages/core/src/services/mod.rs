//! Business Services
//!
//! - `RecordService` - operation lifecycle facade, batch execution and the
//!   read-only statistics surface
//!
//! Services coordinate between the engine stores, the pipeline and the
//! transport layer; they hold no state of their own beyond the shared
//! engine context.

pub mod record_service;

pub use record_service::{BatchReport, ItemStatus, RecordService};
