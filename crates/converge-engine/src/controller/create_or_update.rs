//! Generic create-or-update controller
//!
//! Load, optionally run the recipe, process, save. Every write is guarded by
//! the ETag read at the start, so a concurrent writer makes this operation
//! fail instead of being overwritten.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use converge_core::model::{RecipeDeploymentStatus, ResourceModel};
use converge_core::processors::{ProcessorOptions, ResourceProcessor};
use converge_core::recipes::{
    ConfigurationLoader, EngineError, ExecuteOptions, RecipeEngine, RecipeMetadata, RecipeOutput,
};
use converge_core::{log_op_end, log_op_error, log_op_start};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{BaseController, Controller, ControllerOptions, ControllerResult, Request};
use crate::errors::Result;

/// Reconciles a resource of type `T` to its declared state
pub struct CreateOrUpdateResource<T> {
    base: BaseController,
    processor: Arc<dyn ResourceProcessor<T>>,
    engine: Arc<dyn RecipeEngine>,
    configuration_loader: Arc<dyn ConfigurationLoader>,
    _resource: PhantomData<fn() -> T>,
}

impl<T> CreateOrUpdateResource<T>
where
    T: ResourceModel + Serialize + DeserializeOwned,
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

    async fn execute_recipe_if_needed(
        &self,
        resource: &T,
        resource_id: &str,
        previous_state: Vec<String>,
        simulated: bool,
    ) -> std::result::Result<Option<RecipeOutput>, EngineError> {
        let Some(recipe) = resource.recipe_capability().and_then(|c| c.recipe()) else {
            return Ok(None);
        };

        let metadata = resource.resource_metadata();
        let output = self
            .engine
            .execute(ExecuteOptions {
                recipe: RecipeMetadata {
                    name: recipe.name.clone(),
                    environment_id: metadata.environment_id,
                    application_id: metadata.application_id,
                    resource_id: resource_id.to_string(),
                    parameters: recipe.parameters.clone(),
                },
                previous_state,
                simulated,
            })
            .await?;
        Ok(Some(output))
    }

    async fn reconcile(&self, request: &Request) -> Result<ControllerResult> {
        let (mut resource, etag): (T, String) =
            self.base.get_resource(&request.resource_id).await?;

        let previous_state: Vec<String> = resource
            .output_resources()
            .iter()
            .map(|o| o.id.clone())
            .collect();

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

        let recipe_output = match self
            .execute_recipe_if_needed(
                &resource,
                &request.resource_id,
                previous_state,
                configuration.simulated,
            )
            .await
        {
            Ok(output) => output,
            Err(EngineError::Recipe(recipe_err)) => {
                tracing::warn!(
                    resource_id = %request.resource_id,
                    error_target = recipe_err.error_details.target.as_deref().unwrap_or_default(),
                    error = %recipe_err,
                    "recipe execution failed"
                );
                if let Some(recipe) = resource.recipe_capability_mut() {
                    recipe.set_deployment_status(recipe_err.deployment_status);
                }
                self.base
                    .save_resource(&request.resource_id, &resource, &etag)
                    .await?;
                return Ok(ControllerResult::failed(recipe_err.error_details));
            }
            Err(EngineError::Other(err)) => return Err(err),
        };

        if configuration.simulated {
            tracing::info!(
                resource_id = %request.resource_id,
                "recipe executed in simulation mode, no resources were deployed"
            );
        } else {
            self.processor
                .process(
                    &mut resource,
                    &ProcessorOptions {
                        recipe_output,
                        runtime_configuration: configuration.runtime,
                    },
                )
                .await?;
        }

        if let Some(recipe) = resource.recipe_capability_mut() {
            recipe.set_deployment_status(RecipeDeploymentStatus::Success);
        }

        self.base
            .save_resource(&request.resource_id, &resource, &etag)
            .await?;
        Ok(ControllerResult::success())
    }
}

#[async_trait]
impl<T> Controller for CreateOrUpdateResource<T>
where
    T: ResourceModel + Serialize + DeserializeOwned,
{
    async fn run(&self, request: &Request) -> Result<ControllerResult> {
        let start = Instant::now();
        log_op_start!("create_or_update", resource_id = %request.resource_id);

        let result = self.reconcile(request).await;
        let duration_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(outcome) => {
                log_op_end!(
                    "create_or_update",
                    duration_ms = duration_ms,
                    resource_id = %request.resource_id,
                    failed = outcome.is_failed()
                );
            }
            Err(err) => {
                log_op_error!(
                    "create_or_update",
                    err,
                    duration_ms = duration_ms,
                    resource_id = %request.resource_id
                );
            }
        }
        result
    }
}
