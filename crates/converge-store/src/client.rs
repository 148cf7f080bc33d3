//! Database client contract
//!
//! Records are whole JSON documents addressed by resource id. Writes use
//! optimistic concurrency: every successful save stamps a fresh ETag, and a
//! caller that passes the ETag it read gets a `Concurrency` error instead of
//! a write if the record changed or disappeared in between.
//!
//! | Call | No ETag | ETag matches | ETag stale / record gone |
//! |------|---------|--------------|--------------------------|
//! | `save` | upsert | replace | `Concurrency` |
//! | `delete` | remove, `NotFound` if absent | remove | `Concurrency` |

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::errors::Result;
use crate::query::Query;

/// Identity and version of a stored record
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Metadata {
    pub id: String,
    /// Assigned by the store; empty until the first save
    pub etag: String,
}

/// A stored record
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    pub metadata: Metadata,
    pub data: Value,
}

impl Object {
    pub fn new(id: impl Into<String>, data: Value) -> Self {
        Self {
            metadata: Metadata {
                id: id.into(),
                etag: String::new(),
            },
            data,
        }
    }

    /// Build a record from a typed model
    ///
    /// # Errors
    ///
    /// Returns a `Serialization` error if the model cannot be encoded.
    pub fn from_model<T: Serialize>(id: impl Into<String>, model: &T) -> Result<Self> {
        Ok(Self::new(id, serde_json::to_value(model)?))
    }

    /// Decode the payload into a typed model
    ///
    /// # Errors
    ///
    /// Returns a `Serialization` error if the payload does not match `T`.
    pub fn as_model<T: DeserializeOwned>(&self) -> Result<T> {
        T::deserialize(&self.data).map_err(|e| {
            converge_core::Error::from(e)
                .with_op("decode")
                .with_resource_id(self.metadata.id.clone())
        })
    }

    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    pub fn etag(&self) -> &str {
        &self.metadata.etag
    }
}

/// Options for [`DatabaseClient::save`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveOptions {
    /// Expected current ETag; `None` writes unconditionally
    pub etag: Option<String>,
}

impl SaveOptions {
    pub fn with_etag(etag: impl Into<String>) -> Self {
        Self {
            etag: Some(etag.into()),
        }
    }
}

/// Options for [`DatabaseClient::delete`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    /// Expected current ETag; `None` deletes unconditionally
    pub etag: Option<String>,
}

impl DeleteOptions {
    pub fn with_etag(etag: impl Into<String>) -> Self {
        Self {
            etag: Some(etag.into()),
        }
    }
}

/// Options for [`DatabaseClient::query`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Token from a previous page; resumes after the last item it named
    pub pagination_token: Option<String>,
    /// Page size; zero returns everything
    pub max_query_item_count: usize,
}

/// One page of query results
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub items: Vec<Object>,
    /// Set when more items remain
    pub pagination_token: Option<String>,
}

/// Persistence contract for resource records
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Read one record.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no record has this id.
    async fn get(&self, id: &str) -> Result<Object>;

    /// Run a validated scan.
    ///
    /// # Errors
    ///
    /// Returns `Invalid` if the query or pagination token is malformed.
    async fn query(&self, query: &Query, options: &QueryOptions) -> Result<QueryResult>;

    /// Write `object`, replacing any existing record, and stamp its new ETag
    /// into `object.metadata.etag`.
    ///
    /// # Errors
    ///
    /// Returns `Concurrency` if an ETag was given and it no longer matches,
    /// including when the record was deleted since it was read, and
    /// `Invalid` for a malformed id.
    async fn save(&self, object: &mut Object, options: &SaveOptions) -> Result<()>;

    /// Remove a record.
    ///
    /// # Errors
    ///
    /// Returns `Concurrency` if an ETag was given and it no longer matches,
    /// and `NotFound` if no ETag was given and the record is absent.
    async fn delete(&self, id: &str, options: &DeleteOptions) -> Result<()>;
}
