//! Resource processor contract
//!
//! A processor applies the user-visible effects of a reconciliation to the
//! typed resource (output resources, connection values, secrets) and cleans
//! up downstream state on delete.

use async_trait::async_trait;

use crate::errors::Result;
use crate::model::ResourceModel;
use crate::recipes::{RecipeOutput, RuntimeConfiguration};

/// Inputs handed to a [`ResourceProcessor`]
#[derive(Debug, Clone, Default)]
pub struct ProcessorOptions {
    /// Output of the recipe run, `None` for manually provisioned resources
    pub recipe_output: Option<RecipeOutput>,
    pub runtime_configuration: RuntimeConfiguration,
}

/// Reconciles downstream effects for one resource type
#[async_trait]
pub trait ResourceProcessor<T: ResourceModel>: Send + Sync {
    /// Update `resource` in place from the recipe output.
    ///
    /// # Errors
    ///
    /// Returns an error if the output is unusable or a downstream call fails.
    async fn process(&self, resource: &mut T, options: &ProcessorOptions) -> Result<()>;

    /// Remove downstream state created for `resource`.
    ///
    /// # Errors
    ///
    /// Returns an error if a downstream call fails.
    async fn delete(&self, resource: &T, options: &ProcessorOptions) -> Result<()>;
}
