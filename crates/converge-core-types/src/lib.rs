//! Core types shared across Converge facilities
//!
//! This crate provides foundational types used by the error, logging,
//! storage and worker layers:
//!
//! - **Correlation types**: CorrelationId, TraceParent, OperationContext
//! - **Schema constants**: Canonical field keys and event names

pub mod correlation;
pub mod schema;

pub use correlation::{CorrelationId, OperationContext, TraceParent};
