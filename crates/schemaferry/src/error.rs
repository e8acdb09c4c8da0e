//! Migration error taxonomy
//!
//! Classification drives the worker pool's retry decision: throttling,
//! timeouts, connection failures and 5xx responses are retryable; auth,
//! configuration, validation and cycle errors are not.

use thiserror::Error;

/// Result type for migration operations
pub type MigrateResult<T> = std::result::Result<T, MigrateError>;

/// Errors that can occur during a migration run
#[derive(Debug, Error)]
pub enum MigrateError {
    /// Invalid configuration (bad regex, unknown enum value, missing
    /// credentials outside dry-run). Fails fast before any I/O.
    #[error("configuration error: {0}")]
    Config(String),

    /// Authentication / authorization failure against source or target
    #[error("authentication error: {0}")]
    Auth(String),

    /// Source registry call failed
    #[error("source registry error: {0}")]
    Source(String),

    /// Target registry rejected a request
    #[error("target registry error ({status}): {message}")]
    Target { status: u16, message: String },

    /// Rate limited / throttled by a remote service
    #[error("throttled: {0}")]
    Throttled(String),

    /// Request timed out
    #[error("timeout: {0}")]
    Timeout(String),

    /// Network / transport failure
    #[error("connection error: {0}")]
    Connection(String),

    /// Schema definition could not be parsed
    #[error("parse error: {0}")]
    Parse(String),

    /// The dependency graph contains a cycle
    #[error("circular dependency detected: {}", path.join(" -> "))]
    Cycle { path: Vec<String> },

    /// Plan validation failed
    #[error("validation failed: {0}")]
    Validation(String),

    /// A schema reference could not be rewritten for the target
    #[error("reference error: {0}")]
    Reference(String),

    /// The LLM spending ceiling was reached
    #[error("LLM cost limit reached (${0:.2})")]
    CostLimit(f64),

    /// LLM provider failure
    #[error(transparent)]
    Llm(#[from] schemaferry_llm::LlmError),

    /// The run was cancelled
    #[error("cancelled")]
    Cancelled,

    /// A per-schema failure, wrapping the underlying error with the schema
    /// identity (`registry:schema`)
    #[error("schema {key}: {source}")]
    Schema {
        key: String,
        #[source]
        source: Box<MigrateError>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl MigrateError {
    /// Attach a schema identity to this error
    pub fn for_schema(self, key: impl Into<String>) -> Self {
        MigrateError::Schema {
            key: key.into(),
            source: Box::new(self),
        }
    }

    /// Whether the worker pool should retry after this error
    pub fn is_retryable(&self) -> bool {
        match self {
            MigrateError::Throttled(_)
            | MigrateError::Timeout(_)
            | MigrateError::Connection(_) => true,
            MigrateError::Target { status, .. } => *status == 429 || *status >= 500,
            MigrateError::Llm(e) => e.is_retryable(),
            MigrateError::Schema { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Whether this error is (or wraps) a cancellation
    pub fn is_cancelled(&self) -> bool {
        match self {
            MigrateError::Cancelled => true,
            MigrateError::Schema { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for MigrateError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            MigrateError::Timeout(err.to_string())
        } else {
            MigrateError::Connection(err.to_string())
        }
    }
}

impl From<serde_json::Error> for MigrateError {
    fn from(err: serde_json::Error) -> Self {
        MigrateError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for MigrateError {
    fn from(err: serde_yaml::Error) -> Self {
        MigrateError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_display() {
        let err = MigrateError::Cycle {
            path: vec!["reg:a".into(), "reg:b".into(), "reg:a".into()],
        };
        assert_eq!(
            err.to_string(),
            "circular dependency detected: reg:a -> reg:b -> reg:a"
        );
    }

    #[test]
    fn test_retryable_classification() {
        assert!(MigrateError::Throttled("429".into()).is_retryable());
        assert!(MigrateError::Timeout("t".into()).is_retryable());
        assert!(MigrateError::Connection("refused".into()).is_retryable());
        assert!(MigrateError::Target {
            status: 503,
            message: "unavailable".into()
        }
        .is_retryable());
        assert!(MigrateError::Target {
            status: 429,
            message: "slow down".into()
        }
        .is_retryable());
        assert!(!MigrateError::Target {
            status: 422,
            message: "invalid schema".into()
        }
        .is_retryable());
        assert!(!MigrateError::Auth("denied".into()).is_retryable());
        assert!(!MigrateError::Cancelled.is_retryable());
        assert!(!MigrateError::Config("bad".into()).is_retryable());
    }

    #[test]
    fn test_schema_wrapper_preserves_classification() {
        let err = MigrateError::Throttled("x".into()).for_schema("reg:orders");
        assert!(err.is_retryable());
        assert!(err.to_string().contains("reg:orders"));

        let cancelled = MigrateError::Cancelled.for_schema("reg:orders");
        assert!(cancelled.is_cancelled());
    }
}
