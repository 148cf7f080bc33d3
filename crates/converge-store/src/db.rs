//! Database connection management
//!
//! Provides utilities for opening and configuring SQLite connections

use std::path::Path;

use rusqlite::Connection;

use crate::errors::{from_rusqlite, Result};

/// Open a SQLite database at the given path
///
/// # Errors
///
/// Returns a `Persistence` error if the file cannot be opened.
pub fn open<P: AsRef<Path>>(path: P) -> Result<Connection> {
    Connection::open(path).map_err(from_rusqlite)
}

/// Open an in-memory SQLite database (for testing)
///
/// # Errors
///
/// Returns a `Persistence` error if SQLite cannot allocate the database.
pub fn open_in_memory() -> Result<Connection> {
    Connection::open_in_memory().map_err(from_rusqlite)
}

/// Configure a connection for concurrent readers and a busy writer
///
/// # Errors
///
/// Returns a `Persistence` error if a pragma is rejected.
pub fn configure(conn: &Connection) -> Result<()> {
    // In-memory databases report "memory" and keep their journal mode
    let _mode: String = conn
        .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
        .map_err(from_rusqlite)?;
    conn.busy_timeout(std::time::Duration::from_secs(5))
        .map_err(from_rusqlite)?;
    Ok(())
}
