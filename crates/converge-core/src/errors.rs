/// Result type alias using the canonical [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Canonical error kind taxonomy
///
/// Every failure in the control plane is classified into one of these kinds.
/// The worker relies on the classification to decide between redelivery,
/// terminal failure and silent abort, so new call sites must pick the kind
/// that matches how the failure should be handled, not where it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input or a programmer error (bad query, bad resource id).
    Invalid,
    /// The addressed record does not exist.
    NotFound,
    /// An ETag precondition failed: the record changed or vanished since it was read.
    Concurrency,
    /// The backing store failed.
    Persistence,
    /// A payload could not be encoded or decoded.
    Serialization,
    /// The message queue failed.
    Queue,
    /// The queue lock on a message is no longer held by this worker.
    LockLost,
    /// Work was cancelled before it finished.
    Canceled,
    /// Work exceeded its deadline.
    Timeout,
    /// A downstream collaborator (configuration loader, processor) failed.
    ExternalService,
    /// Anything else.
    Internal,
}

impl ErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Invalid => "ERR_INVALID",
            ErrorKind::NotFound => "ERR_NOT_FOUND",
            ErrorKind::Concurrency => "ERR_CONCURRENCY",
            ErrorKind::Persistence => "ERR_PERSISTENCE",
            ErrorKind::Serialization => "ERR_SERIALIZATION",
            ErrorKind::Queue => "ERR_QUEUE",
            ErrorKind::LockLost => "ERR_LOCK_LOST",
            ErrorKind::Canceled => "ERR_CANCELED",
            ErrorKind::Timeout => "ERR_TIMEOUT",
            ErrorKind::ExternalService => "ERR_EXTERNAL_SERVICE",
            ErrorKind::Internal => "ERR_INTERNAL",
        }
    }

    /// Whether a failure of this kind may succeed if the operation is redelivered
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorKind::Persistence
                | ErrorKind::Queue
                | ErrorKind::Timeout
                | ErrorKind::ExternalService
                | ErrorKind::Internal
        )
    }
}

/// Canonical structured error type
///
/// Carries a classification plus the context needed to debug it: which
/// operation failed, on which resource, and why.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    op: Option<String>,
    resource_id: Option<String>,
    message: String,
    source: Option<Box<Error>>,
}

impl Error {
    /// Create a new error with the specified kind
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            op: None,
            resource_id: None,
            message: String::new(),
            source: None,
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add resource ID context
    pub fn with_resource_id(mut self, id: impl Into<String>) -> Self {
        self.resource_id = Some(id.into());
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Add source error
    pub fn with_source(mut self, source: Error) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Shorthand for a `NotFound` error on a resource id
    pub fn not_found(id: impl Into<String>) -> Self {
        let id = id.into();
        Self::new(ErrorKind::NotFound)
            .with_message(format!("the resource with id '{}' was not found", id))
            .with_resource_id(id)
    }

    /// Shorthand for a `Concurrency` error on a resource id
    pub fn concurrency(id: impl Into<String>) -> Self {
        Self::new(ErrorKind::Concurrency)
            .with_message("the operation failed due to a concurrency conflict")
            .with_resource_id(id)
    }

    /// Shorthand for an `Invalid` error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Invalid).with_message(message)
    }

    /// Shorthand for an `Internal` error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal).with_message(message)
    }

    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Get the operation context, if any
    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    /// Get the resource ID context, if any
    pub fn resource_id(&self) -> Option<&str> {
        self.resource_id.as_deref()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the source error, if any
    pub fn source_error(&self) -> Option<&Error> {
        self.source.as_deref()
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    pub fn is_concurrency(&self) -> bool {
        self.kind == ErrorKind::Concurrency
    }

    pub fn is_lock_lost(&self) -> bool {
        self.kind == ErrorKind::LockLost
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(resource_id) = &self.resource_id {
            write!(f, " (resource_id: {})", resource_id)?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::new(ErrorKind::Serialization).with_message(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;

    #[test]
    fn test_codes_are_unique() {
        let kinds = [
            ErrorKind::Invalid,
            ErrorKind::NotFound,
            ErrorKind::Concurrency,
            ErrorKind::Persistence,
            ErrorKind::Serialization,
            ErrorKind::Queue,
            ErrorKind::LockLost,
            ErrorKind::Canceled,
            ErrorKind::Timeout,
            ErrorKind::ExternalService,
            ErrorKind::Internal,
        ];
        let codes: std::collections::HashSet<_> = kinds.iter().map(|k| k.code()).collect();
        assert_eq!(codes.len(), kinds.len());
    }

    #[test]
    fn test_display_includes_context() {
        let err = Error::new(ErrorKind::Persistence)
            .with_op("save")
            .with_resource_id("/planes/radius/local/resourceGroups/rg")
            .with_message("disk full");
        let msg = err.to_string();
        assert!(msg.starts_with("[ERR_PERSISTENCE]"));
        assert!(msg.contains("'save'"));
        assert!(msg.contains("disk full"));
        assert!(msg.contains("resourceGroups/rg"));
    }

    #[test]
    fn test_source_chain() {
        let inner = Error::new(ErrorKind::Persistence).with_message("io");
        let outer = Error::internal("wrapped").with_source(inner);
        assert!(StdError::source(&outer).is_some());
        assert_eq!(outer.source_error().unwrap().kind(), ErrorKind::Persistence);
    }

    #[test]
    fn test_not_found_and_concurrency_are_distinct() {
        let nf = Error::not_found("a");
        let cc = Error::concurrency("a");
        assert!(nf.is_not_found());
        assert!(!nf.is_concurrency());
        assert!(cc.is_concurrency());
        assert!(!cc.is_not_found());
    }

    #[test]
    fn test_terminal_kinds_are_not_transient() {
        assert!(!ErrorKind::LockLost.is_transient());
        assert!(!ErrorKind::Concurrency.is_transient());
        assert!(!ErrorKind::Invalid.is_transient());
        assert!(!ErrorKind::Serialization.is_transient());
        assert!(ErrorKind::Persistence.is_transient());
    }

    #[test]
    fn test_from_serde_json() {
        let err: Error = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), ErrorKind::Serialization);
    }
}
