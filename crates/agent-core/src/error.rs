//! Error Types

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Agent error types
#[derive(Error, Debug)]
pub enum AgentError {
    /// LLM provider error
    #[error("Provider error: {0}")]
    Provider(String),

    /// Provider unavailable or not responding
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Tool requested by the model is not in the registry
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Tool callable returned an error
    #[error("Tool '{name}' failed: {message}")]
    ToolExecution { name: String, message: String },

    /// Maximum tool rounds reached in the dispatch loop
    #[error("Maximum iterations ({0}) reached")]
    MaxIterations(usize),

    /// Parse error (e.g., provider response body)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rate limited
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl AgentError {
    /// Check if error is transient.
    ///
    /// The agent never retries on its own; callers wrapping `invoke` may.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ProviderUnavailable(_) | Self::RateLimited(_)
        )
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(format!("{err:#}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(AgentError::RateLimited("slow down".into()).is_retryable());
        assert!(AgentError::ProviderUnavailable("down".into()).is_retryable());
        assert!(!AgentError::ToolNotFound("add".into()).is_retryable());
        assert!(!AgentError::MaxIterations(3).is_retryable());
    }

    #[test]
    fn test_tool_execution_display() {
        let err = AgentError::ToolExecution {
            name: "add".into(),
            message: "overflow".into(),
        };
        assert_eq!(err.to_string(), "Tool 'add' failed: overflow");
    }

    #[test]
    fn test_from_anyhow_keeps_context() {
        let err: AgentError = anyhow::anyhow!("inner").context("outer").into();
        assert_eq!(err.to_string(), "outer: inner");
    }
}
