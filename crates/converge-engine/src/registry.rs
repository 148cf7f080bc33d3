//! Controller routing table
//!
//! Maps `(resource type, method)` to the controller that executes it. Built
//! once at startup and handed to the worker.

use std::collections::HashMap;
use std::sync::Arc;

use converge_core::errors::Error;
use converge_core::model::{OperationMethod, OperationType};
use converge_store::DatabaseClient;

use crate::controller::{Controller, ControllerOptions};
use crate::errors::Result;

/// Explicit `(resource type, method) -> controller` table
pub struct ControllerRegistry {
    database_client: Arc<dyn DatabaseClient>,
    controllers: HashMap<OperationType, Arc<dyn Controller>>,
}

impl ControllerRegistry {
    pub fn new(database_client: Arc<dyn DatabaseClient>) -> Self {
        Self {
            database_client,
            controllers: HashMap::new(),
        }
    }

    /// Build a controller with `factory` and register it
    ///
    /// # Errors
    ///
    /// Returns the factory's error, or `Invalid` if the operation type is
    /// already registered.
    pub fn register<F>(
        &mut self,
        resource_type: &str,
        method: OperationMethod,
        factory: F,
    ) -> Result<()>
    where
        F: FnOnce(ControllerOptions) -> Result<Arc<dyn Controller>>,
    {
        let operation_type = OperationType::new(resource_type, method);
        if self.controllers.contains_key(&operation_type) {
            return Err(Error::invalid(format!(
                "a controller is already registered for '{}'",
                operation_type
            ))
            .with_op("register_controller"));
        }

        let controller = factory(ControllerOptions {
            database_client: Arc::clone(&self.database_client),
            resource_type: resource_type.to_string(),
        })?;
        tracing::debug!(operation_type = %operation_type, "registered controller");
        self.controllers.insert(operation_type, controller);
        Ok(())
    }

    pub fn get(&self, operation_type: &OperationType) -> Option<Arc<dyn Controller>> {
        self.controllers.get(operation_type).cloned()
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }
}
