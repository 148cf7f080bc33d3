//! In-memory operation queue
//!
//! Single-process implementation of [`QueueClient`] used by tests and by
//! embedders that run the frontend and worker in one process.
//!
//! ## Semantics
//!
//! - FIFO among visible messages
//! - Every lease hands out a fresh lock token and bumps `dequeue_count`
//! - A lock whose deadline has passed is treated as released: the message is
//!   visible again and the old token is rejected with `LockLost`
//! - `abandon` makes the message visible immediately

use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{Message, OperationRequest, QueueClient};
use crate::errors::{Error, ErrorKind, Result};

#[derive(Debug, Clone)]
struct Lock {
    token: String,
    visible_until: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct Entry {
    message_id: String,
    request: OperationRequest,
    dequeue_count: u32,
    lock: Option<Lock>,
}

impl Entry {
    fn is_visible(&self, now: DateTime<Utc>) -> bool {
        match &self.lock {
            None => true,
            Some(lock) => lock.visible_until <= now,
        }
    }

    fn holds(&self, token: &str, now: DateTime<Utc>) -> bool {
        self.lock
            .as_ref()
            .is_some_and(|lock| lock.token == token && lock.visible_until > now)
    }
}

/// In-memory [`QueueClient`]
#[derive(Debug, Default)]
pub struct InMemoryQueue {
    entries: RwLock<Vec<Entry>>,
}

fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::new(ErrorKind::Queue).with_message("queue lock poisoned")
}

fn lock_lost(op: &str) -> Error {
    Error::new(ErrorKind::LockLost)
        .with_op(op)
        .with_message("the message lock is no longer held")
}

fn deadline(now: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    now + chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero())
}

impl InMemoryQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages not yet completed, leased or not
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn len(&self) -> Result<usize> {
        Ok(self.entries.read().map_err(poison_err)?.len())
    }

    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Messages currently hidden behind a live lock
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn in_flight(&self) -> Result<usize> {
        let now = Utc::now();
        let entries = self.entries.read().map_err(poison_err)?;
        Ok(entries.iter().filter(|e| !e.is_visible(now)).count())
    }
}

#[async_trait]
impl QueueClient for InMemoryQueue {
    async fn enqueue(&self, request: OperationRequest) -> Result<String> {
        let message_id = Uuid::now_v7().to_string();
        let mut entries = self.entries.write().map_err(poison_err)?;
        entries.push(Entry {
            message_id: message_id.clone(),
            request,
            dequeue_count: 0,
            lock: None,
        });
        drop(entries);
        Ok(message_id)
    }

    async fn lease(&self, max_count: usize, visibility: Duration) -> Result<Vec<Message>> {
        let now = Utc::now();
        let visible_until = deadline(now, visibility);

        let mut entries = self.entries.write().map_err(poison_err)?;
        let mut leased = Vec::new();
        for entry in entries.iter_mut() {
            if leased.len() >= max_count {
                break;
            }
            if !entry.is_visible(now) {
                continue;
            }
            let token = Uuid::new_v4().to_string();
            entry.dequeue_count += 1;
            entry.lock = Some(Lock {
                token: token.clone(),
                visible_until,
            });
            leased.push(Message {
                message_id: entry.message_id.clone(),
                request: entry.request.clone(),
                dequeue_count: entry.dequeue_count,
                lock_token: token,
                visible_until,
            });
        }
        drop(entries);
        Ok(leased)
    }

    async fn extend(&self, lock_token: &str, duration: Duration) -> Result<DateTime<Utc>> {
        let now = Utc::now();
        let mut entries = self.entries.write().map_err(poison_err)?;
        let entry = entries
            .iter_mut()
            .find(|e| e.holds(lock_token, now))
            .ok_or_else(|| lock_lost("extend"))?;

        let visible_until = deadline(now, duration);
        entry.lock = Some(Lock {
            token: lock_token.to_string(),
            visible_until,
        });
        drop(entries);
        Ok(visible_until)
    }

    async fn complete(&self, lock_token: &str) -> Result<()> {
        let now = Utc::now();
        let mut entries = self.entries.write().map_err(poison_err)?;
        let index = entries
            .iter()
            .position(|e| e.holds(lock_token, now))
            .ok_or_else(|| lock_lost("complete"))?;
        entries.remove(index);
        drop(entries);
        Ok(())
    }

    async fn abandon(&self, lock_token: &str) -> Result<()> {
        let now = Utc::now();
        let mut entries = self.entries.write().map_err(poison_err)?;
        let entry = entries
            .iter_mut()
            .find(|e| e.holds(lock_token, now))
            .ok_or_else(|| lock_lost("abandon"))?;
        entry.lock = None;
        drop(entries);
        Ok(())
    }
}
