//! Recipe engine and configuration loader contracts
//!
//! Both collaborators live outside this workspace. The controllers only
//! depend on the traits here; tests substitute recording fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::errors::{Error, Result};
use crate::model::{ErrorDetails, OutputResource, RecipeDeploymentStatus};

/// Identity and inputs of a recipe run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RecipeMetadata {
    /// Recipe name; empty when loading configuration only
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub environment_id: String,
    #[serde(default)]
    pub application_id: String,
    pub resource_id: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

/// Result of a successful recipe execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RecipeOutput {
    /// Ids of the resources the recipe deployed
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default)]
    pub secrets: Map<String, Value>,
    #[serde(default)]
    pub values: Map<String, Value>,
}

/// Structured, user-facing recipe failure
///
/// This is a business outcome: the controller records it on the resource
/// and reports a failed result instead of propagating an error.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("recipe failed with {deployment_status:?}: {error_details}")]
pub struct RecipeError {
    pub error_details: ErrorDetails,
    pub deployment_status: RecipeDeploymentStatus,
}

impl RecipeError {
    pub fn new(error_details: ErrorDetails, deployment_status: RecipeDeploymentStatus) -> Self {
        Self {
            error_details,
            deployment_status,
        }
    }
}

/// Failure returned by a [`RecipeEngine`]
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    /// Structured recipe failure, reported to the user
    #[error(transparent)]
    Recipe(RecipeError),

    /// Anything else, handled like any other infrastructure error
    #[error(transparent)]
    Other(Error),
}

impl From<RecipeError> for EngineError {
    fn from(err: RecipeError) -> Self {
        EngineError::Recipe(err)
    }
}

impl From<Error> for EngineError {
    fn from(err: Error) -> Self {
        EngineError::Other(err)
    }
}

/// Options for [`RecipeEngine::execute`]
#[derive(Debug, Clone, PartialEq)]
pub struct ExecuteOptions {
    pub recipe: RecipeMetadata,
    /// Output resource ids recorded before this run, for diffing
    pub previous_state: Vec<String>,
    /// Render without deploying
    pub simulated: bool,
}

/// Options for [`RecipeEngine::delete`]
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteOptions {
    pub recipe: RecipeMetadata,
    pub output_resources: Vec<OutputResource>,
}

/// Executes and tears down recipe deployments
#[async_trait]
pub trait RecipeEngine: Send + Sync {
    /// Deploy the recipe.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Recipe`] for user-facing recipe failures and
    /// [`EngineError::Other`] for everything else.
    async fn execute(
        &self,
        options: ExecuteOptions,
    ) -> std::result::Result<RecipeOutput, EngineError>;

    /// Tear down what the recipe deployed.
    ///
    /// # Errors
    ///
    /// Same classification as [`RecipeEngine::execute`].
    async fn delete(&self, options: DeleteOptions) -> std::result::Result<(), EngineError>;
}

/// Kubernetes placement for a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesRuntime {
    pub namespace: String,
    #[serde(default)]
    pub environment_namespace: String,
}

/// Platform-specific settings handed to processors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfiguration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubernetes: Option<KubernetesRuntime>,
}

/// Resolved configuration for one resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    #[serde(default)]
    pub runtime: RuntimeConfiguration,
    /// Dry-run mode: recipes render but nothing is deployed or processed
    #[serde(default)]
    pub simulated: bool,
    #[serde(default)]
    pub recipe_config: Map<String, Value>,
}

/// Resolves per-resource runtime and recipe configuration
#[async_trait]
pub trait ConfigurationLoader: Send + Sync {
    /// Load configuration for the environment/application of `metadata`.
    ///
    /// # Errors
    ///
    /// Returns an error if the environment or application cannot be read.
    async fn load_configuration(&self, metadata: &RecipeMetadata) -> Result<Configuration>;
}
