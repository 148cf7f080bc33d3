//! Async operation worker
//!
//! Leases operation messages, runs the registered controller for each one
//! and records the outcome on the operation status and the resource.
//!
//! # Delivery semantics
//!
//! The queue delivers every message at least once. The status write and the
//! queue `complete` call are two separate systems, so a crash between them
//! redelivers an operation that already finished. The worker skips any
//! message whose operation reached a terminal state within
//! [`WorkerOptions::deduplication_duration`], which gives at-most-once
//! effective execution inside that window. It is not exactly-once end to end:
//! a redelivery arriving after the window runs the controller again, and
//! controllers rely on ETag-guarded writes to stay correct in that case.
//!
//! # Lock ownership
//!
//! While a controller runs, a renewal task keeps the message hidden by
//! extending its lock shortly before it lapses. If an extend fails the
//! worker assumes another worker now owns the message: the controller is
//! cancelled and neither the status nor the queue is touched.

pub mod options;

pub use options::{
    extend_duration, WorkerOptions, DEFAULT_DEDUPLICATION_DURATION,
    DEFAULT_MAX_OPERATION_CONCURRENCY, DEFAULT_MAX_OPERATION_RETRY_COUNT,
    DEFAULT_MESSAGE_EXTEND_MARGIN, DEFAULT_MESSAGE_LOCK_DURATION,
    DEFAULT_MIN_MESSAGE_LOCK_DURATION, DEFAULT_POLL_INTERVAL,
};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use converge_core::errors::{Error, ErrorKind};
use converge_core::model::api::codes;
use converge_core::model::{ErrorDetails, OperationType, ProvisioningState};
use converge_core::queue::{Message, QueueClient, DEFAULT_OPERATION_TIMEOUT};
use converge_store::{DatabaseClient, SaveOptions, StatusManager};
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::controller::{ControllerResult, Request};
use crate::errors::{controller_not_found, operation_timeout, Result};
use crate::registry::ControllerRegistry;

const PROVISIONING_STATE_PROPERTY: &str = "provisioningState";

/// How a controller invocation ended
enum Outcome {
    Finished(Result<ControllerResult>),
    TimedOut,
    /// Cancelled by shutdown or lock loss
    Aborted,
}

/// Processes queued async operations with bounded concurrency
#[derive(Clone)]
pub struct Worker {
    options: WorkerOptions,
    status: StatusManager,
    db: Arc<dyn DatabaseClient>,
    queue: Arc<dyn QueueClient>,
    registry: Arc<ControllerRegistry>,
}

impl Worker {
    /// Create a worker; unset options take their defaults
    pub fn new(
        options: WorkerOptions,
        db: Arc<dyn DatabaseClient>,
        queue: Arc<dyn QueueClient>,
        registry: Arc<ControllerRegistry>,
    ) -> Self {
        Self {
            options: options.resolved(),
            status: StatusManager::new(Arc::clone(&db), Arc::clone(&queue)),
            db,
            queue,
            registry,
        }
    }

    pub fn options(&self) -> &WorkerOptions {
        &self.options
    }

    /// Delay before the next renewal of a lock that lapses at `visible_until`
    pub fn message_extend_duration(&self, visible_until: DateTime<Utc>) -> Duration {
        extend_duration(
            visible_until,
            Utc::now(),
            self.options.message_extend_margin,
            self.options.min_message_lock_duration,
        )
    }

    /// Run until `shutdown` fires, then wait for in-flight messages
    ///
    /// Never leases more messages than there are free execution slots.
    ///
    /// # Errors
    ///
    /// Queue failures are logged and retried; this only returns once
    /// shutdown completes.
    pub async fn start(&self, shutdown: CancellationToken) -> Result<()> {
        let slots = Arc::new(Semaphore::new(self.options.max_operation_concurrency));
        let mut tasks = JoinSet::new();
        tracing::info!(
            max_operation_concurrency = self.options.max_operation_concurrency,
            "worker started"
        );

        loop {
            while let Some(joined) = tasks.try_join_next() {
                log_join_result(joined);
            }

            let first = tokio::select! {
                _ = shutdown.cancelled() => break,
                permit = Arc::clone(&slots).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            let mut permits = vec![first];
            while let Ok(permit) = Arc::clone(&slots).try_acquire_owned() {
                permits.push(permit);
            }

            let messages = match self
                .queue
                .lease(permits.len(), self.options.message_lock_duration)
                .await
            {
                Ok(messages) => messages,
                Err(err) => {
                    tracing::warn!(error = %err, "failed to lease messages");
                    Vec::new()
                }
            };

            if messages.is_empty() {
                drop(permits);
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.options.poll_interval) => continue,
                }
            }

            for (message, permit) in messages.into_iter().zip(permits) {
                let worker = self.clone();
                let token = shutdown.child_token();
                tasks.spawn(async move {
                    worker.process_message(message, token).await;
                    drop(permit);
                });
            }
        }

        tracing::info!(in_flight = tasks.len(), "worker stopping");
        while let Some(joined) = tasks.join_next().await {
            log_join_result(joined);
        }
        tracing::info!("worker stopped");
        Ok(())
    }

    /// Handle one leased message from dedup check to finalization
    pub async fn process_message(&self, message: Message, cancel: CancellationToken) {
        let span = tracing::info_span!(
            "operation",
            operation_id = %message.request.operation_id,
            resource_id = %message.request.resource_id,
            operation_type = %message.request.operation_type,
            dequeue_count = message.dequeue_count
        );
        self.process_inner(message, cancel).instrument(span).await;
    }

    async fn process_inner(&self, message: Message, cancel: CancellationToken) {
        if self.is_duplicate(&message).await {
            tracing::info!("operation already finished, skipping redelivered message");
            self.complete(&message).await;
            return;
        }

        let operation_type: OperationType = match message.request.operation_type.parse() {
            Ok(operation_type) => operation_type,
            Err(err) => {
                tracing::warn!(error = %err, "unparseable operation type");
                self.finish(&message, ProvisioningState::Failed, Some(extract_error(&err)))
                    .await;
                return;
            }
        };

        if message.dequeue_count > self.options.max_operation_retry_count {
            tracing::warn!(
                max_operation_retry_count = self.options.max_operation_retry_count,
                "operation exceeded max retry count"
            );
            self.finish(
                &message,
                ProvisioningState::Failed,
                Some(ErrorDetails::new(codes::INTERNAL, "exceeded max retry count")),
            )
            .await;
            return;
        }

        let Some(controller) = self.registry.get(&operation_type) else {
            let err = controller_not_found(&operation_type.to_string());
            tracing::warn!(error = %err, "no controller for operation");
            self.finish(&message, ProvisioningState::Failed, Some(extract_error(&err)))
                .await;
            return;
        };

        if let Err(err) = self
            .status
            .update(
                &message.request.resource_id,
                message.request.operation_id,
                ProvisioningState::Updating,
                None,
                None,
            )
            .await
        {
            tracing::warn!(error = %err, "failed to mark operation as updating");
        }

        let message_token = cancel.child_token();
        let renewal_stop = CancellationToken::new();
        let lock_lost = Arc::new(AtomicBool::new(false));
        let renewal = tokio::spawn(
            self.clone()
                .renew_lock(
                    message.lock_token.clone(),
                    message.visible_until,
                    message_token.clone(),
                    renewal_stop.clone(),
                    Arc::clone(&lock_lost),
                )
                .in_current_span(),
        );

        let request = Request::from_message(&message, operation_type);
        let timeout = if request.operation_timeout.is_zero() {
            DEFAULT_OPERATION_TIMEOUT
        } else {
            request.operation_timeout
        };

        let outcome = tokio::select! {
            _ = message_token.cancelled() => Outcome::Aborted,
            result = tokio::time::timeout(timeout, controller.run(&request)) => match result {
                Ok(result) => Outcome::Finished(result),
                Err(_) => Outcome::TimedOut,
            },
        };

        renewal_stop.cancel();
        if let Err(err) = renewal.await {
            tracing::warn!(error = %err, "lock renewal task failed");
        }

        if lock_lost.load(Ordering::SeqCst) {
            tracing::warn!("message lock lost, dropping attempt without side effects");
            return;
        }

        match outcome {
            Outcome::Aborted => {
                tracing::info!("operation interrupted by shutdown, releasing message");
                self.abandon(&message).await;
            }
            Outcome::TimedOut => {
                let err = operation_timeout(&request.resource_id, timeout);
                tracing::warn!(error = %err, "operation timed out");
                self.finish(&message, ProvisioningState::Canceled, Some(extract_error(&err)))
                    .await;
            }
            Outcome::Finished(Ok(result)) if result.requeue => {
                self.retry_or_fail(
                    &message,
                    ErrorDetails::new(codes::INTERNAL, "exceeded max retry count"),
                )
                .await;
            }
            Outcome::Finished(Ok(result)) => {
                self.finish(&message, result.provisioning_state(), result.error().cloned())
                    .await;
            }
            Outcome::Finished(Err(err)) if err.is_lock_lost() => {
                tracing::warn!(error = %err, "controller lost the message lock");
            }
            Outcome::Finished(Err(err)) if err.kind().is_transient() => {
                tracing::warn!(error = %err, "operation failed with a retryable error");
                self.retry_or_fail(&message, extract_error(&err)).await;
            }
            Outcome::Finished(Err(err)) => {
                tracing::warn!(error = %err, "operation failed");
                let state = if err.kind() == ErrorKind::Canceled {
                    ProvisioningState::Canceled
                } else {
                    ProvisioningState::Failed
                };
                self.finish(&message, state, Some(extract_error(&err))).await;
            }
        }
    }

    async fn is_duplicate(&self, message: &Message) -> bool {
        match self
            .status
            .get(&message.request.resource_id, message.request.operation_id)
            .await
        {
            Ok(status) => {
                status.is_recent_terminal(Utc::now(), self.options.deduplication_duration)
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to read operation status");
                false
            }
        }
    }

    async fn renew_lock(
        self,
        lock_token: String,
        mut visible_until: DateTime<Utc>,
        message_token: CancellationToken,
        stop: CancellationToken,
        lock_lost: Arc<AtomicBool>,
    ) {
        loop {
            let wait = self.message_extend_duration(visible_until);
            tokio::select! {
                _ = stop.cancelled() => return,
                _ = message_token.cancelled() => return,
                _ = tokio::time::sleep(wait) => {}
            }

            match self
                .queue
                .extend(&lock_token, self.options.message_lock_duration)
                .await
            {
                Ok(until) => {
                    tracing::debug!(visible_until = %until, "extended message lock");
                    visible_until = until;
                }
                Err(err) => {
                    tracing::warn!(error = %err, "failed to extend message lock");
                    lock_lost.store(true, Ordering::SeqCst);
                    message_token.cancel();
                    return;
                }
            }
        }
    }

    async fn retry_or_fail(&self, message: &Message, error: ErrorDetails) {
        if message.dequeue_count < self.options.max_operation_retry_count {
            tracing::info!("releasing message for redelivery");
            self.abandon(message).await;
        } else {
            self.finish(message, ProvisioningState::Failed, Some(error))
                .await;
        }
    }

    /// Record a terminal state on the status and resource, then complete the message
    async fn finish(&self, message: &Message, state: ProvisioningState, error: Option<ErrorDetails>) {
        let resource_id = &message.request.resource_id;

        if let Err(err) = self
            .status
            .update(
                resource_id,
                message.request.operation_id,
                state,
                Some(Utc::now()),
                error,
            )
            .await
        {
            tracing::warn!(error = %err, state = %state, "failed to update operation status");
        }

        if let Err(err) = update_resource_state(self.db.as_ref(), resource_id, state).await {
            tracing::warn!(error = %err, state = %state, "failed to update resource state");
        }

        tracing::info!(state = %state, "operation finished");
        self.complete(message).await;
    }

    async fn complete(&self, message: &Message) {
        if let Err(err) = self.queue.complete(&message.lock_token).await {
            tracing::warn!(error = %err, "failed to complete message");
        }
    }

    async fn abandon(&self, message: &Message) {
        if let Err(err) = self.queue.abandon(&message.lock_token).await {
            tracing::debug!(error = %err, "failed to abandon message");
        }
    }
}

fn log_join_result(joined: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(err) = joined {
        if err.is_panic() {
            tracing::error!(error = ?err, "operation task panicked");
        } else {
            tracing::debug!(error = ?err, "operation task cancelled");
        }
    }
}

/// Convert an error into the payload recorded on a failed operation
pub fn extract_error(err: &Error) -> ErrorDetails {
    let code = match err.kind() {
        ErrorKind::Invalid => codes::INVALID,
        ErrorKind::NotFound => codes::NOT_FOUND,
        ErrorKind::Concurrency => codes::CONFLICT,
        ErrorKind::Canceled => codes::OPERATION_CANCELED,
        _ => codes::INTERNAL,
    };
    ErrorDetails::new(code, err.message())
}

const WRITE_BACK_ATTEMPTS: usize = 3;

/// Write `state` into the resource record's `provisioningState`
///
/// Does nothing when the record is gone or already carries `state`. The write
/// is guarded by the ETag that was read; when another writer gets in between,
/// the record is read again and the write retried a bounded number of times.
///
/// # Errors
///
/// Returns the store error if the read or write fails, `Concurrency` if
/// every attempt raced another writer, or `Serialization` if the record is
/// not a JSON object.
pub async fn update_resource_state(
    db: &dyn DatabaseClient,
    resource_id: &str,
    state: ProvisioningState,
) -> Result<()> {
    let mut attempt = 1;
    loop {
        match write_resource_state(db, resource_id, state).await {
            Err(err) if err.is_concurrency() && attempt < WRITE_BACK_ATTEMPTS => {
                tracing::debug!(attempt, "resource changed during state write-back, re-reading");
                attempt += 1;
            }
            other => return other,
        }
    }
}

async fn write_resource_state(
    db: &dyn DatabaseClient,
    resource_id: &str,
    state: ProvisioningState,
) -> Result<()> {
    let mut object = match db.get(resource_id).await {
        Ok(object) => object,
        Err(err) if err.is_not_found() => return Ok(()),
        Err(err) => return Err(err),
    };

    let current = object
        .data
        .get(PROVISIONING_STATE_PROPERTY)
        .and_then(Value::as_str);
    if current == Some(state.as_str()) {
        return Ok(());
    }

    let Some(fields) = object.data.as_object_mut() else {
        return Err(Error::new(ErrorKind::Serialization)
            .with_op("update_resource_state")
            .with_resource_id(resource_id)
            .with_message("resource data is not an object"));
    };
    fields.insert(
        PROVISIONING_STATE_PROPERTY.to_string(),
        Value::String(state.as_str().to_string()),
    );

    let guard = SaveOptions::with_etag(object.etag().to_string());
    db.save(&mut object, &guard).await
}
