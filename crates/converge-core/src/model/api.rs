//! Client-facing error payloads
//!
//! These are what a plain `GET` on an operation status or a resource shows
//! the user, so they must stay stable and serializable.

use serde::{Deserialize, Serialize};

/// Stable error codes surfaced to clients
pub mod codes {
    pub const INVALID: &str = "Invalid";
    pub const INTERNAL: &str = "Internal";
    pub const NOT_FOUND: &str = "NotFound";
    pub const CONFLICT: &str = "Conflict";
    pub const OPERATION_CANCELED: &str = "OperationCanceled";
    pub const RECIPE_DEPLOYMENT_FAILED: &str = "RecipeDeploymentFailed";
    pub const RECIPE_DELETION_FAILED: &str = "RecipeDeletionFailed";
}

/// Structured error payload attached to failed operations and resources
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<ErrorDetails>,
}

impl ErrorDetails {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            target: None,
            details: Vec::new(),
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_detail(mut self, detail: ErrorDetails) -> Self {
        self.details.push(detail);
        self
    }
}

impl std::fmt::Display for ErrorDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        if let Some(target) = &self.target {
            write!(f, " (target: {})", target)?;
        }
        Ok(())
    }
}
