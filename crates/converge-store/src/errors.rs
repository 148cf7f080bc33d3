//! Error handling for converge-store
//!
//! Wraps the converge-core `Error` with store-specific helpers

use std::sync::PoisonError;

use converge_core::errors::{Error, ErrorKind};

/// Result type alias using the canonical `Error`
pub type Result<T> = std::result::Result<T, Error>;

/// Create a migration error
pub fn migration_error(migration_id: &str, reason: &str) -> Error {
    Error::new(ErrorKind::Persistence)
        .with_op("migration")
        .with_message(format!("Migration {} failed: {}", migration_id, reason))
}

/// Create a checksum mismatch error
pub fn checksum_mismatch(migration_id: &str, expected: &str, actual: &str) -> Error {
    Error::new(ErrorKind::Persistence)
        .with_op("migration_checksum")
        .with_message(format!(
            "Checksum mismatch for migration {}: expected {}, got {}",
            migration_id, expected, actual
        ))
}

/// Create a database error from rusqlite::Error
pub fn from_rusqlite(err: rusqlite::Error) -> Error {
    Error::new(ErrorKind::Persistence)
        .with_op("sqlite")
        .with_message(err.to_string())
}

/// Map a poisoned lock to a persistence error
pub fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::new(ErrorKind::Persistence).with_message("store lock poisoned")
}

/// Malformed pagination token
pub fn invalid_token(token: &str) -> Error {
    Error::new(ErrorKind::Invalid)
        .with_op("query")
        .with_message(format!("pagination token '{}' is not valid", token))
}
