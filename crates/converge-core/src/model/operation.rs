//! Async operation identity and status

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::Error;
use crate::model::{ErrorDetails, ProvisioningState};

/// HTTP-level verb that produced an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationMethod {
    Put,
    Patch,
    Delete,
    Post,
}

impl OperationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationMethod::Put => "PUT",
            OperationMethod::Patch => "PATCH",
            OperationMethod::Delete => "DELETE",
            OperationMethod::Post => "POST",
        }
    }
}

impl FromStr for OperationMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PUT" => Ok(OperationMethod::Put),
            "PATCH" => Ok(OperationMethod::Patch),
            "DELETE" => Ok(OperationMethod::Delete),
            "POST" => Ok(OperationMethod::Post),
            other => Err(Error::invalid(format!("unknown operation method '{}'", other))),
        }
    }
}

/// `(resource type, method)` pair used to route an operation to a controller
///
/// Wire form is `APPLICATIONS.CORE/CONTAINERS|PUT`; the resource type is
/// upper-cased so lookups are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationType {
    resource_type: String,
    method: OperationMethod,
}

impl OperationType {
    pub fn new(resource_type: &str, method: OperationMethod) -> Self {
        Self {
            resource_type: resource_type.to_ascii_uppercase(),
            method,
        }
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn method(&self) -> OperationMethod {
        self.method
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.resource_type, self.method.as_str())
    }
}

impl FromStr for OperationType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (resource_type, method) = s
            .split_once('|')
            .ok_or_else(|| Error::invalid(format!("operation type '{}' is missing '|'", s)))?;
        if resource_type.is_empty() {
            return Err(Error::invalid(format!(
                "operation type '{}' has no resource type",
                s
            )));
        }
        Ok(Self::new(resource_type, method.parse()?))
    }
}

/// Persisted status of one async operation
///
/// Created as `Accepted` when the request is queued, mutated only by the
/// worker, and frozen once it reaches a terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationStatus {
    /// Storage id of this status record
    pub id: String,
    pub operation_id: Uuid,
    pub resource_id: String,
    pub operation_type: String,
    pub status: ProvisioningState,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub last_updated_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetails>,
}

impl OperationStatus {
    /// Whether this status is terminal and was written within `window` of `now`
    pub fn is_recent_terminal(&self, now: DateTime<Utc>, window: std::time::Duration) -> bool {
        if !self.status.is_terminal() {
            return false;
        }
        match chrono::Duration::from_std(window) {
            Ok(window) => self.last_updated_time + window >= now,
            Err(_) => true,
        }
    }
}
