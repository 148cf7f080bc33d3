//! Operation queue contract
//!
//! The queue delivers each operation request at least once. A leased
//! message is hidden from other consumers until its lock lapses; the holder
//! keeps it hidden by extending the lock and finally completes or abandons
//! it. Any call made with a lock token the queue no longer honors fails with
//! [`ErrorKind::LockLost`](crate::errors::ErrorKind::LockLost).

pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core_types::OperationContext;
use crate::errors::Result;

pub use memory::InMemoryQueue;

/// Operation timeout applied when a request does not set one
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);

/// Payload of a queued async operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRequest {
    pub operation_id: Uuid,
    pub resource_id: String,
    /// Wire form of an [`OperationType`](crate::model::OperationType)
    pub operation_type: String,
    pub context: OperationContext,
    pub operation_timeout: Duration,
}

impl OperationRequest {
    pub fn new(operation_id: Uuid, resource_id: impl Into<String>, operation_type: impl Into<String>) -> Self {
        Self {
            operation_id,
            resource_id: resource_id.into(),
            operation_type: operation_type.into(),
            context: OperationContext::new(),
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }

    pub fn with_context(mut self, context: OperationContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }
}

/// A leased message
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub message_id: String,
    pub request: OperationRequest,
    /// Number of times this message has been leased, including this lease
    pub dequeue_count: u32,
    /// Proof of ownership for extend/complete/abandon
    pub lock_token: String,
    /// When the lock lapses unless extended
    pub visible_until: DateTime<Utc>,
}

/// At-least-once operation queue
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Add a request to the queue and return its message id.
    ///
    /// # Errors
    ///
    /// Returns a `Queue` error if the backend rejects the message.
    async fn enqueue(&self, request: OperationRequest) -> Result<String>;

    /// Lease up to `max_count` visible messages for `visibility`.
    ///
    /// Returns an empty vector when nothing is visible.
    ///
    /// # Errors
    ///
    /// Returns a `Queue` error if the backend fails.
    async fn lease(&self, max_count: usize, visibility: Duration) -> Result<Vec<Message>>;

    /// Push the lock deadline to `now + duration` and return the new deadline.
    ///
    /// # Errors
    ///
    /// Returns `LockLost` if the lock has lapsed or was taken by someone else.
    async fn extend(&self, lock_token: &str, duration: Duration) -> Result<DateTime<Utc>>;

    /// Remove the message permanently.
    ///
    /// # Errors
    ///
    /// Returns `LockLost` if the lock is no longer held.
    async fn complete(&self, lock_token: &str) -> Result<()>;

    /// Release the lock so the message is redelivered.
    ///
    /// # Errors
    ///
    /// Returns `LockLost` if the lock is no longer held.
    async fn abandon(&self, lock_token: &str) -> Result<()>;
}
