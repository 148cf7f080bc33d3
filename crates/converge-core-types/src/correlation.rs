//! Correlation types for operation tracking and tracing
//!
//! An operation accepted by the frontend is executed later by a worker,
//! possibly on another process. These types carry the identity of the
//! originating request across the queue so log lines on both sides join up.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of the client request that produced an async operation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generate a new random CorrelationId using UUIDv7
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Get the string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Create from an existing string (for deserialization)
    pub fn from_string(s: String) -> Self {
        Self(s)
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// W3C `traceparent` header value propagated with an operation message
///
/// Format: `00-<32 hex trace id>-<16 hex span id>-<2 hex flags>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TraceParent(String);

impl TraceParent {
    /// Start a new sampled trace with a fresh trace and span id
    pub fn new() -> Self {
        let trace = Uuid::new_v4().simple().to_string();
        let mut span = Uuid::new_v4().simple().to_string();
        span.truncate(16);
        Self(format!("00-{}-{}-01", trace, span))
    }

    /// Wrap an existing header value without validation
    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    /// Get the raw header value
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Trace id segment, if the header is well formed
    pub fn trace_id(&self) -> Option<&str> {
        let mut parts = self.0.split('-');
        let _version = parts.next()?;
        let trace_id = parts.next()?;
        (trace_id.len() == 32).then_some(trace_id)
    }
}

impl Default for TraceParent {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TraceParent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Context carried from the accepting frontend to the executing worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationContext {
    pub correlation_id: CorrelationId,
    pub trace_parent: Option<TraceParent>,
}

impl OperationContext {
    /// Create a new context with a fresh CorrelationId
    pub fn new() -> Self {
        Self {
            correlation_id: CorrelationId::new(),
            trace_parent: None,
        }
    }

    /// Create a context with an existing CorrelationId
    pub fn with_correlation_id(correlation_id: CorrelationId) -> Self {
        Self {
            correlation_id,
            trace_parent: None,
        }
    }

    /// Attach a trace parent to the context
    pub fn with_trace_parent(mut self, trace_parent: TraceParent) -> Self {
        self.trace_parent = Some(trace_parent);
        self
    }
}

impl Default for OperationContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correlation_id_generation() {
        let id1 = CorrelationId::new();
        let id2 = CorrelationId::new();

        assert_ne!(id1, id2);
        assert!(!id1.as_str().is_empty());
    }

    #[test]
    fn test_correlation_id_display() {
        let id = CorrelationId::new();
        assert_eq!(format!("{}", id), id.as_str());
    }

    #[test]
    fn test_trace_parent_shape() {
        let tp = TraceParent::new();
        let parts: Vec<&str> = tp.as_str().split('-').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "00");
        assert_eq!(parts[1].len(), 32);
        assert_eq!(parts[2].len(), 16);
        assert_eq!(tp.trace_id(), Some(parts[1]));
    }

    #[test]
    fn test_trace_parent_malformed_has_no_trace_id() {
        let tp = TraceParent::from_string("garbage".to_string());
        assert_eq!(tp.trace_id(), None);
    }

    #[test]
    fn test_operation_context_with_trace_parent() {
        let tp = TraceParent::new();
        let ctx = OperationContext::new().with_trace_parent(tp.clone());
        assert_eq!(ctx.trace_parent, Some(tp));
    }

    #[test]
    fn test_serialization() {
        let ctx = OperationContext::new().with_trace_parent(TraceParent::new());
        let json = serde_json::to_string(&ctx).unwrap();
        let back: OperationContext = serde_json::from_str(&json).unwrap();
        assert_eq!(ctx, back);
    }
}
