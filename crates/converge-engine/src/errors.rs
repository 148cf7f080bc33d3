//! Error handling for converge-engine
//!
//! Wraps the converge-core `Error` with engine-specific helpers

use converge_core::errors::{Error, ErrorKind};

/// Result type alias using the canonical `Error`
pub type Result<T> = std::result::Result<T, Error>;

/// Operation ran past its deadline
pub fn operation_timeout(resource_id: &str, timeout: std::time::Duration) -> Error {
    Error::new(ErrorKind::Canceled)
        .with_op("run_controller")
        .with_resource_id(resource_id)
        .with_message(format!(
            "the operation exceeded its timeout of {}s",
            timeout.as_secs()
        ))
}

/// No controller is registered for an operation type
pub fn controller_not_found(operation_type: &str) -> Error {
    Error::new(ErrorKind::Invalid)
        .with_op("dispatch")
        .with_message(format!(
            "no controller is registered for operation type '{}'",
            operation_type
        ))
}

/// Configuration file could not be read or parsed
pub fn config_error(reason: impl Into<String>) -> Error {
    Error::new(ErrorKind::Invalid)
        .with_op("load_config")
        .with_message(reason)
}
