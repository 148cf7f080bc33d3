pub mod api;
pub mod operation;
pub mod provisioning;
pub mod resource;
pub mod resource_id;

pub use api::ErrorDetails;
pub use operation::{OperationMethod, OperationStatus, OperationType};
pub use provisioning::ProvisioningState;
pub use resource::{
    OutputResource, RecipeCapable, RecipeDeploymentStatus, ResourceMetadata, ResourceModel,
    ResourceRecipe,
};
pub use resource_id::{ResourceId, ResourceIdError};
