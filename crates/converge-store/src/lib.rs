//! Converge Store - resource persistence with optimistic concurrency
//!
//! Provides:
//! - The `DatabaseClient` contract (get, query, save, delete with ETags)
//! - `Query` validation and scan predicates
//! - In-memory and SQLite clients with identical semantics
//! - SQLite schema with an embedded migrations framework
//! - `StatusManager` for async operation status records

pub mod client;
pub mod db;
pub mod errors;
pub mod memory;
pub mod migrations;
pub mod query;
pub mod sqlite;
pub mod status;

// Re-export key types
pub use client::{
    DatabaseClient, DeleteOptions, Metadata, Object, QueryOptions, QueryResult, SaveOptions,
};
pub use errors::Result;
pub use memory::InMemoryClient;
pub use query::{Query, QueryFilter};
pub use sqlite::SqliteClient;
pub use status::StatusManager;
