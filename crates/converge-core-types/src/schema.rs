//! Canonical schema constants for structured logging and events
//!
//! These constants keep worker, controller and store log lines consistent.

// Canonical field keys for structured logging
pub const FIELD_COMPONENT: &str = "component";
pub const FIELD_OP: &str = "op";
pub const FIELD_EVENT: &str = "event";
pub const FIELD_DURATION_MS: &str = "duration_ms";
pub const FIELD_CORRELATION_ID: &str = "correlation_id";
pub const FIELD_TRACE_PARENT: &str = "trace_parent";

// Entity identifiers
pub const FIELD_RESOURCE_ID: &str = "resource_id";
pub const FIELD_OPERATION_ID: &str = "operation_id";
pub const FIELD_OPERATION_TYPE: &str = "operation_type";

// Queue delivery
pub const FIELD_DEQUEUE_COUNT: &str = "dequeue_count";

// Error fields
pub const FIELD_ERR_KIND: &str = "err.kind";
pub const FIELD_ERR_CODE: &str = "err.code";

// Canonical event names
pub const EVENT_START: &str = "start";
pub const EVENT_END: &str = "end";
pub const EVENT_END_ERROR: &str = "end_error";
