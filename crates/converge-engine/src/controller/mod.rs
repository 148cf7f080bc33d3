//! Async operation controllers
//!
//! A controller executes one queued operation for one resource type and
//! method. The worker owns everything around it (leasing, lock renewal,
//! status write-back); a controller only reports what happened through a
//! [`ControllerResult`] or an error.
//!
//! Controllers are cancelled by dropping their future, so every await point
//! is a possible exit.

mod create_or_update;
mod delete;

pub use create_or_update::CreateOrUpdateResource;
pub use delete::DeleteResource;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use converge_core::core_types::OperationContext;
use converge_core::model::{ErrorDetails, OperationType, ProvisioningState};
use converge_core::queue::Message;
use converge_store::{DatabaseClient, DeleteOptions, Object, SaveOptions};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::errors::Result;

/// One operation handed to a controller
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub operation_id: Uuid,
    pub resource_id: String,
    pub operation_type: OperationType,
    pub context: OperationContext,
    pub operation_timeout: Duration,
    /// Delivery attempt, starting at 1
    pub dequeue_count: u32,
}

impl Request {
    /// Build a request from a leased message whose type is already parsed
    pub fn from_message(message: &Message, operation_type: OperationType) -> Self {
        Self {
            operation_id: message.request.operation_id,
            resource_id: message.request.resource_id.clone(),
            operation_type,
            context: message.request.context.clone(),
            operation_timeout: message.request.operation_timeout,
            dequeue_count: message.dequeue_count,
        }
    }
}

/// Outcome reported by a controller that did not fail with an error
///
/// A failed result is a business outcome: the worker records it and never
/// redelivers the message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControllerResult {
    /// Ask the worker to redeliver the message later
    pub requeue: bool,
    provisioning_state: Option<ProvisioningState>,
    error: Option<ErrorDetails>,
}

impl ControllerResult {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn failed(error: ErrorDetails) -> Self {
        Self {
            requeue: false,
            provisioning_state: Some(ProvisioningState::Failed),
            error: Some(error),
        }
    }

    pub fn canceled(error: ErrorDetails) -> Self {
        Self {
            requeue: false,
            provisioning_state: Some(ProvisioningState::Canceled),
            error: Some(error),
        }
    }

    pub fn requeue() -> Self {
        Self {
            requeue: true,
            ..Self::default()
        }
    }

    /// Terminal state to record; `Succeeded` unless set otherwise
    pub fn provisioning_state(&self) -> ProvisioningState {
        self.provisioning_state
            .unwrap_or(ProvisioningState::Succeeded)
    }

    pub fn error(&self) -> Option<&ErrorDetails> {
        self.error.as_ref()
    }

    pub fn is_failed(&self) -> bool {
        self.provisioning_state() == ProvisioningState::Failed
    }
}

/// Executes queued operations for one `(resource type, method)`
#[async_trait]
pub trait Controller: Send + Sync {
    /// Execute the operation.
    ///
    /// # Errors
    ///
    /// Errors are classified by the worker: transient kinds are redelivered
    /// up to the retry budget, everything else fails the operation.
    async fn run(&self, request: &Request) -> Result<ControllerResult>;
}

/// Shared dependencies handed to every controller factory
#[derive(Clone)]
pub struct ControllerOptions {
    pub database_client: Arc<dyn DatabaseClient>,
    /// Fully qualified type the controller is registered for
    pub resource_type: String,
}

/// Typed record access shared by controller implementations
#[derive(Clone)]
pub struct BaseController {
    options: ControllerOptions,
}

impl BaseController {
    pub fn new(options: ControllerOptions) -> Self {
        Self { options }
    }

    pub fn database_client(&self) -> &Arc<dyn DatabaseClient> {
        &self.options.database_client
    }

    pub fn resource_type(&self) -> &str {
        &self.options.resource_type
    }

    /// Read and decode a resource, returning it with its ETag
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the record is missing and `Serialization` if it
    /// does not decode as `T`.
    pub async fn get_resource<T: DeserializeOwned>(&self, id: &str) -> Result<(T, String)> {
        let object = self.options.database_client.get(id).await?;
        let resource = object.as_model()?;
        Ok((resource, object.metadata.etag))
    }

    /// Save a resource, guarded by `etag` when it is non-empty, and return
    /// the new ETag
    ///
    /// # Errors
    ///
    /// Returns `Concurrency` if the record changed since `etag` was read.
    pub async fn save_resource<T: Serialize + Sync>(
        &self,
        id: &str,
        resource: &T,
        etag: &str,
    ) -> Result<String> {
        let mut object = Object::from_model(id, resource)?;
        let options = if etag.is_empty() {
            SaveOptions::default()
        } else {
            SaveOptions::with_etag(etag)
        };
        self.options
            .database_client
            .save(&mut object, &options)
            .await?;
        Ok(object.metadata.etag)
    }

    /// Delete a resource, guarded by `etag` when given
    ///
    /// # Errors
    ///
    /// Returns `Concurrency` for a stale ETag and `NotFound` for a missing
    /// record when unguarded.
    pub async fn delete_resource(&self, id: &str, etag: Option<&str>) -> Result<()> {
        let options = DeleteOptions {
            etag: etag.map(str::to_string),
        };
        self.options.database_client.delete(id, &options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge_store::InMemoryClient;
    use serde::Deserialize;

    const ID: &str =
        "/planes/radius/local/resourceGroups/rg/providers/Applications.Core/containers/web";

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Doc {
        v: u32,
    }

    #[test]
    fn test_result_states() {
        assert_eq!(
            ControllerResult::success().provisioning_state(),
            ProvisioningState::Succeeded
        );
        let failed = ControllerResult::failed(ErrorDetails::new("Invalid", "bad"));
        assert!(failed.is_failed());
        assert_eq!(failed.error().unwrap().code, "Invalid");
        assert!(ControllerResult::requeue().requeue);
        assert_eq!(
            ControllerResult::canceled(ErrorDetails::new("OperationCanceled", "x"))
                .provisioning_state(),
            ProvisioningState::Canceled
        );
    }

    #[tokio::test]
    async fn test_base_controller_round_trip_with_etag() {
        let base = BaseController::new(ControllerOptions {
            database_client: Arc::new(InMemoryClient::new()),
            resource_type: "Applications.Core/containers".to_string(),
        });

        let first = base.save_resource(ID, &Doc { v: 1 }, "").await.unwrap();
        let (doc, etag): (Doc, String) = base.get_resource(ID).await.unwrap();
        assert_eq!(doc, Doc { v: 1 });
        assert_eq!(etag, first);

        base.save_resource(ID, &Doc { v: 2 }, &etag).await.unwrap();
        let err = base.save_resource(ID, &Doc { v: 3 }, &etag).await.unwrap_err();
        assert!(err.is_concurrency());

        base.delete_resource(ID, None).await.unwrap();
        assert!(base.get_resource::<Doc>(ID).await.unwrap_err().is_not_found());
    }
}
