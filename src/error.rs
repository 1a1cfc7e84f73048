//! Error taxonomy for the engine.
//!
//! Every variant is observable by callers and maps to a distinct
//! failure class; the HTTP layer in [`server`](crate::server) relies on
//! the variants staying distinguishable. Timeouts are their own kind,
//! never folded into backend failures.

use std::time::Duration;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The embedding provider failed after retries were exhausted.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// A named collection does not exist in the vector index.
    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    /// A session id was referenced before any operation created it.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// A collection with this name already exists.
    #[error("collection already exists: {0}")]
    DuplicateCollection(String),

    /// A backend name was requested that the router has no registration
    /// for. Distinct from [`EngineError::Backend`]: the name itself is
    /// invalid, no call was attempted.
    #[error("unknown backend: {0}")]
    UnknownBackend(String),

    /// A registered backend was called and failed after retries.
    #[error("backend failed: {0}")]
    Backend(String),

    /// An operation exceeded its time budget.
    #[error("{operation} timed out after {budget:?}")]
    Timeout {
        operation: &'static str,
        budget: Duration,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_names_the_operation_and_budget() {
        let err = EngineError::Timeout {
            operation: "generate",
            budget: Duration::from_secs(120),
        };
        assert_eq!(err.to_string(), "generate timed out after 120s");
    }

    #[test]
    fn unknown_backend_is_distinct_from_backend_failure() {
        let unknown = EngineError::UnknownBackend("mistral".to_string());
        let failed = EngineError::Backend("quota exceeded".to_string());
        assert!(matches!(unknown, EngineError::UnknownBackend(_)));
        assert!(matches!(failed, EngineError::Backend(_)));
    }
}
