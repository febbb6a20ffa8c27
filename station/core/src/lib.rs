//! Session state and the configuration workflow of the ground-station simulator.
//!
//! [`store`] persists one [`SessionRecord`] per user behind the
//! [`SessionStore`] trait; [`workflow`] drives the ordered configuration steps
//! and derives web access from whatever is currently stored. [`schemes`] serves
//! the network diagrams and the addressing saved per diagram device.
#![deny(missing_docs)]

/// Per-user session records and their backends.
pub mod store;
/// Ordered configuration steps and access decisions.
pub mod workflow;
/// Scheme diagrams and saved device addressing.
pub mod schemes;

pub use schemes::{SchemeService, SchemeServiceError};
pub use store::{
    DeviceConfigStore, FileSessionStore, MemorySessionStore, SavedDeviceConfig, SessionField,
    SessionRecord, SessionStore, SessionUpdate, StoreError, UserId,
};
pub use workflow::{
    AccessDecision, AvailableDevices, ErrorClass, Operation, OperationReply, ReplyStatus,
    SessionStage, StationWorkflow, WorkflowError,
};
