//! Converge Core - shared model and collaborator contracts
//!
//! This crate provides everything the storage and execution layers share:
//! - Structured error facility with stable codes
//! - Logging facility (profiles, canonical macros, test capture)
//! - Resource identifiers, provisioning states and operation status
//! - Resource model capability traits consumed by the generic controllers
//! - Contracts for the operation queue, recipe engine, configuration loader
//!   and resource processors, plus an in-memory queue

pub mod errors;
pub mod logging_facility;
pub mod model;
pub mod processors;
pub mod queue;
pub mod recipes;

pub use converge_core_types as core_types;

// Re-export commonly used types
pub use errors::{Error, ErrorKind, Result};
pub use model::{
    ErrorDetails, OperationMethod, OperationStatus, OperationType, ProvisioningState, ResourceId,
    ResourceModel,
};
pub use queue::{InMemoryQueue, Message, OperationRequest, QueueClient};
