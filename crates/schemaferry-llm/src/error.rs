//! Error types for schemaferry-llm

/// Result type alias for LLM operations
pub type LlmResult<T> = std::result::Result<T, LlmError>;

/// Errors that can occur during LLM operations
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// Provider configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Authentication failure (invalid API key, expired credentials)
    #[error("authentication error: {0}")]
    Auth(String),

    /// Rate limited by the provider
    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        /// Retry-after hint in seconds (if provided by the API)
        retry_after_secs: Option<u64>,
    },

    /// Request timeout
    #[error("timeout: {0}")]
    Timeout(String),

    /// Provider returned an error response
    #[error("provider error ({status}): {message}")]
    Provider { status: u16, message: String },

    /// Provider returned a well-formed but unusable response
    /// (no choices, empty content)
    #[error("empty completion: {0}")]
    EmptyCompletion(String),

    /// Network / transport error
    #[error("connection error: {0}")]
    Connection(String),

    /// Serialization / deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl LlmError {
    /// Whether this error is worth retrying
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::RateLimited { .. } | LlmError::Timeout(_) | LlmError::Connection(_) => true,
            LlmError::Provider { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Whether this error is an authentication error
    pub fn is_auth(&self) -> bool {
        matches!(self, LlmError::Auth(_))
    }

    /// Retry-after hint if available
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            LlmError::RateLimited {
                retry_after_secs, ..
            } => *retry_after_secs,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout("request timed out".to_string())
        } else if err.is_connect() {
            LlmError::Connection(err.to_string())
        } else if let Some(status) = err.status() {
            match status.as_u16() {
                401 | 403 => LlmError::Auth(err.to_string()),
                429 => LlmError::RateLimited {
                    message: err.to_string(),
                    retry_after_secs: None,
                },
                s => LlmError::Provider {
                    status: s,
                    message: err.to_string(),
                },
            }
        } else {
            LlmError::Connection(err.to_string())
        }
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        LlmError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retryable() {
        assert!(LlmError::RateLimited {
            message: "slow down".into(),
            retry_after_secs: None,
        }
        .is_retryable());
        assert!(LlmError::Timeout("t".into()).is_retryable());
        assert!(LlmError::Connection("c".into()).is_retryable());
        assert!(LlmError::Provider {
            status: 503,
            message: "unavailable".into()
        }
        .is_retryable());
        assert!(!LlmError::Provider {
            status: 422,
            message: "bad request".into()
        }
        .is_retryable());
        assert!(!LlmError::Auth("a".into()).is_retryable());
        assert!(!LlmError::Config("c".into()).is_retryable());
    }

    #[test]
    fn test_is_auth() {
        assert!(LlmError::Auth("bad key".into()).is_auth());
        assert!(!LlmError::Config("x".into()).is_auth());
    }

    #[test]
    fn test_retry_after_secs() {
        let err = LlmError::RateLimited {
            message: "x".into(),
            retry_after_secs: Some(42),
        };
        assert_eq!(err.retry_after_secs(), Some(42));
        assert_eq!(LlmError::Config("x".into()).retry_after_secs(), None);
    }
}
