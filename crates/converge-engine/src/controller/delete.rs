//! Generic delete controller

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use converge_core::model::{RecipeDeploymentStatus, ResourceId, ResourceModel};
use converge_core::processors::{ProcessorOptions, ResourceProcessor};
use converge_core::recipes::{
    ConfigurationLoader, DeleteOptions, EngineError, RecipeEngine, RecipeMetadata,
};
use converge_core::{log_op_end, log_op_error, log_op_start};
use serde::de::DeserializeOwned;

use super::{BaseController, Controller, ControllerOptions, ControllerResult, Request};
use crate::errors::Result;

/// Tears down a resource of type `T` and removes its record
///
/// A recipe failure leaves the record in place so it can be inspected and
/// the delete retried. Once downstream cleanup succeeds the record is
/// deleted without an ETag guard.
pub struct DeleteResource<T> {
    base: BaseController,
    processor: Arc<dyn ResourceProcessor<T>>,
    engine: Arc<dyn RecipeEngine>,
    configuration_loader: Arc<dyn ConfigurationLoader>,
    _resource: PhantomData<fn() -> T>,
}

impl<T> DeleteResource<T>
where
    T: ResourceModel + DeserializeOwned,
{
    pub fn new(
        options: ControllerOptions,
        processor: Arc<dyn ResourceProcessor<T>>,
        engine: Arc<dyn RecipeEngine>,
        configuration_loader: Arc<dyn ConfigurationLoader>,
    ) -> Self {
        Self {
            base: BaseController::new(options),
            processor,
            engine,
            configuration_loader,
            _resource: PhantomData,
        }
    }

    /// Options for the recipe teardown, `None` when there is nothing to tear down
    fn recipe_delete_options(resource: &T, resource_id: &ResourceId) -> Option<DeleteOptions> {
        let recipe = resource.recipe_capability()?.recipe()?;
        if recipe.deployment_status == RecipeDeploymentStatus::SetupError {
            return None;
        }

        let metadata = resource.resource_metadata();
        Some(DeleteOptions {
            recipe: RecipeMetadata {
                name: recipe.name.clone(),
                environment_id: metadata.environment_id,
                application_id: metadata.application_id,
                resource_id: resource_id.as_str().to_string(),
                parameters: recipe.parameters.clone(),
            },
            output_resources: resource.output_resources().to_vec(),
        })
    }

    async fn teardown(&self, request: &Request) -> Result<ControllerResult> {
        let (resource, _etag): (T, String) = self.base.get_resource(&request.resource_id).await?;
        let id = ResourceId::parse(&request.resource_id)?;

        match Self::recipe_delete_options(&resource, &id) {
            Some(options) => match self.engine.delete(options).await {
                Ok(()) => {}
                Err(EngineError::Recipe(recipe_err)) => {
                    tracing::warn!(
                        resource_id = %request.resource_id,
                        error = %recipe_err,
                        "recipe deletion failed, keeping the resource record"
                    );
                    return Ok(ControllerResult::failed(recipe_err.error_details));
                }
                Err(EngineError::Other(err)) => return Err(err),
            },
            None => {
                tracing::debug!(
                    resource_id = %request.resource_id,
                    "no recipe deployment to tear down"
                );
            }
        }

        let metadata = resource.resource_metadata();
        let configuration = self
            .configuration_loader
            .load_configuration(&RecipeMetadata {
                environment_id: metadata.environment_id,
                application_id: metadata.application_id,
                resource_id: request.resource_id.clone(),
                ..Default::default()
            })
            .await?;

        self.processor
            .delete(
                &resource,
                &ProcessorOptions {
                    recipe_output: None,
                    runtime_configuration: configuration.runtime,
                },
            )
            .await?;

        self.base.delete_resource(id.as_str(), None).await?;
        Ok(ControllerResult::success())
    }
}

#[async_trait]
impl<T> Controller for DeleteResource<T>
where
    T: ResourceModel + DeserializeOwned,
{
    async fn run(&self, request: &Request) -> Result<ControllerResult> {
        let start = Instant::now();
        log_op_start!("delete_resource", resource_id = %request.resource_id);

        let result = self.teardown(request).await;
        let duration_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(outcome) => {
                log_op_end!(
                    "delete_resource",
                    duration_ms = duration_ms,
                    resource_id = %request.resource_id,
                    failed = outcome.is_failed()
                );
            }
            Err(err) => {
                log_op_error!(
                    "delete_resource",
                    err,
                    duration_ms = duration_ms,
                    resource_id = %request.resource_id
                );
            }
        }
        result
    }
}
