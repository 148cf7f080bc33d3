//! Resource model capabilities consumed by the generic controllers
//!
//! Controllers are generic over a concrete resource type. The base
//! [`ResourceModel`] accessors are mandatory; recipe support is an optional
//! capability discovered at runtime through
//! [`ResourceModel::recipe_capability`].

use serde::{Deserialize, Serialize};

use crate::model::ProvisioningState;

/// Environment/application a resource belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMetadata {
    #[serde(default)]
    pub environment_id: String,
    #[serde(default)]
    pub application_id: String,
}

/// Downstream infrastructure produced while reconciling a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputResource {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_id: Option<String>,
    #[serde(default)]
    pub managed: bool,
}

/// Outcome of the last recipe run recorded on the resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum RecipeDeploymentStatus {
    /// No recipe has run yet
    #[default]
    None,
    /// Failed before any infrastructure was touched
    SetupError,
    /// Failed while applying infrastructure
    ExecutionError,
    Success,
}

/// Recipe reference declared on a resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRecipe {
    pub name: String,
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub deployment_status: RecipeDeploymentStatus,
}

/// Accessors every reconcilable resource type provides
pub trait ResourceModel: Send + Sync + 'static {
    /// Full resource id
    fn id(&self) -> &str;

    fn resource_metadata(&self) -> ResourceMetadata;

    fn output_resources(&self) -> &[OutputResource];

    fn provisioning_state(&self) -> ProvisioningState;

    fn set_provisioning_state(&mut self, state: ProvisioningState);

    /// Recipe capability of this concrete type, if it has one
    fn recipe_capability(&self) -> Option<&dyn RecipeCapable> {
        None
    }

    /// Mutable recipe capability of this concrete type, if it has one
    fn recipe_capability_mut(&mut self) -> Option<&mut dyn RecipeCapable> {
        None
    }
}

/// Optional capability for resources deployable through a recipe
pub trait RecipeCapable {
    /// Declared recipe, or `None` if the resource is provisioned manually
    fn recipe(&self) -> Option<&ResourceRecipe>;

    fn recipe_mut(&mut self) -> Option<&mut ResourceRecipe>;

    /// Record a deployment status on the declared recipe (no-op without one)
    fn set_deployment_status(&mut self, status: RecipeDeploymentStatus) {
        if let Some(recipe) = self.recipe_mut() {
            recipe.deployment_status = status;
        }
    }

    fn deployment_status(&self) -> RecipeDeploymentStatus {
        self.recipe()
            .map(|r| r.deployment_status)
            .unwrap_or_default()
    }
}
