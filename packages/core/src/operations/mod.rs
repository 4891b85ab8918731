//! Record Operations
//!
//! The unit of work of the engine and everything it carries:
//!
//! - [`RecordOperation`] - create/update/delete/copy state machine
//! - [`OperationArgs`] - canonical constructor arguments (hashing, replay)
//! - [`EngineContext`] - shared collaborators threaded through operations
//! - [`Outbox`] / [`Message`] - typed cross-step communication
//! - [`OperationError`] / [`StopReason`] - error taxonomy and stop signals
//! - deferred replay (`MAX_REPLAY_DEPTH`)

pub mod context;
pub mod error;
pub mod hash;
pub mod message;
pub mod operation;
pub mod replay;

pub use context::{EngineContext, TableTransform, TableTransformRegistry};
pub use error::{OperationError, StopReason};
pub use hash::{canonical_json, operation_hash};
pub use message::{Consumption, Message, MessageKind, Outbox, PendingRelationMessage};
pub use operation::{OperationArgs, OperationKind, OperationState, RecordHandle, RecordOperation};
pub use replay::MAX_REPLAY_DEPTH;
