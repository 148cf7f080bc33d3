//! Async operation status persistence
//!
//! Status records live in the same database as resources, next to the
//! provider of the resource they track:
//!
//! ```text
//! <root scope>/providers/<namespace>/locations/global/operationStatuses/<operation id>
//! ```

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use converge_core::errors::{Error, ErrorKind};
use converge_core::model::{ErrorDetails, OperationStatus, OperationType, ProvisioningState, ResourceId};
use converge_core::queue::{OperationRequest, QueueClient};
use converge_core::{log_op_end, log_op_error, log_op_start};
use uuid::Uuid;

use crate::client::{DatabaseClient, DeleteOptions, Object, SaveOptions};
use crate::errors::Result;

const STATUS_LOCATION: &str = "global";

/// Reads and writes [`OperationStatus`] records and queues new operations
#[derive(Clone)]
pub struct StatusManager {
    db: Arc<dyn DatabaseClient>,
    queue: Arc<dyn QueueClient>,
}

impl StatusManager {
    pub fn new(db: Arc<dyn DatabaseClient>, queue: Arc<dyn QueueClient>) -> Self {
        Self { db, queue }
    }

    /// Storage id of the status record for one operation on `resource_id`
    ///
    /// # Errors
    ///
    /// Returns `Invalid` if `resource_id` is not a resource identifier.
    pub fn status_id(resource_id: &str, operation_id: Uuid) -> Result<String> {
        let id = ResourceId::parse(resource_id)?;
        let namespace = id.provider_namespace().ok_or_else(|| {
            Error::new(ErrorKind::Invalid)
                .with_op("status_id")
                .with_resource_id(resource_id)
                .with_message("operation status requires a resource id with a provider")
        })?;
        Ok(format!(
            "{}/providers/{}/locations/{}/operationStatuses/{}",
            id.root_scope(),
            namespace,
            STATUS_LOCATION,
            operation_id
        ))
    }

    /// Persist an `Accepted` status and enqueue the operation
    ///
    /// If enqueueing fails the status record is removed again so no orphan
    /// `Accepted` status is left behind.
    ///
    /// # Errors
    ///
    /// Returns the store or queue error that prevented queueing.
    pub async fn queue_async_operation(
        &self,
        request: OperationRequest,
    ) -> Result<OperationStatus> {
        let start = Instant::now();
        log_op_start!(
            "queue_async_operation",
            resource_id = %request.resource_id,
            operation_id = %request.operation_id
        );

        let result = self.queue_inner(request.clone()).await;
        let duration_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => {
                log_op_end!(
                    "queue_async_operation",
                    duration_ms = duration_ms,
                    resource_id = %request.resource_id
                );
            }
            Err(err) => {
                log_op_error!(
                    "queue_async_operation",
                    err,
                    duration_ms = duration_ms,
                    resource_id = %request.resource_id
                );
            }
        }
        result
    }

    async fn queue_inner(&self, request: OperationRequest) -> Result<OperationStatus> {
        let operation_type: OperationType = request.operation_type.parse()?;
        let id = Self::status_id(&request.resource_id, request.operation_id)?;
        let now = Utc::now();

        let status = OperationStatus {
            id: id.clone(),
            operation_id: request.operation_id,
            resource_id: request.resource_id.clone(),
            operation_type: operation_type.to_string(),
            status: ProvisioningState::Accepted,
            start_time: now,
            end_time: None,
            last_updated_time: now,
            error: None,
        };

        let mut object = Object::from_model(&id, &status)?;
        self.db.save(&mut object, &SaveOptions::default()).await?;

        if let Err(err) = self.queue.enqueue(request).await {
            if let Err(cleanup) = self.db.delete(&id, &DeleteOptions::default()).await {
                tracing::warn!(status_id = %id, error = %cleanup, "failed to remove status after enqueue failure");
            }
            return Err(err);
        }

        Ok(status)
    }

    /// Read the status of one operation
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the operation was never queued.
    pub async fn get(&self, resource_id: &str, operation_id: Uuid) -> Result<OperationStatus> {
        let id = Self::status_id(resource_id, operation_id)?;
        self.db.get(&id).await?.as_model()
    }

    /// Move an operation to `state`
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the status record is missing and `Concurrency`
    /// if it changed while being updated.
    pub async fn update(
        &self,
        resource_id: &str,
        operation_id: Uuid,
        state: ProvisioningState,
        end_time: Option<DateTime<Utc>>,
        error: Option<ErrorDetails>,
    ) -> Result<()> {
        let id = Self::status_id(resource_id, operation_id)?;
        let mut object = self.db.get(&id).await?;
        let mut status: OperationStatus = object.as_model()?;

        status.status = state;
        status.last_updated_time = Utc::now();
        if end_time.is_some() {
            status.end_time = end_time;
        }
        if error.is_some() {
            status.error = error;
        }

        let etag = object.metadata.etag.clone();
        object.data = serde_json::to_value(&status)?;
        self.db
            .save(&mut object, &SaveOptions::with_etag(etag))
            .await
    }

    /// Remove the status record of an operation
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if there is no such record.
    pub async fn delete(&self, resource_id: &str, operation_id: Uuid) -> Result<()> {
        let id = Self::status_id(resource_id, operation_id)?;
        self.db.delete(&id, &DeleteOptions::default()).await
    }
}
