//! Error types for the agent system.
//!
//! Every failure inside the crate is an [`AgentError`]. Most of them never
//! reach a caller: they are caught at the smallest enclosing unit (tool call,
//! collection search, workflow step, agent `process`) and turned into
//! user-legible text. [`AgentError::category`] supplies the coarse label that
//! ends up in those messages.

use std::time::Duration;

/// Result alias used throughout the crate.
pub type Result<T, E = AgentError> = std::result::Result<T, E>;

/// Errors raised by agents, services, tools and the workflow engine.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// An LLM/HTTP request failed.
    #[error("API request failed: {message}")]
    ApiRequest {
        /// Error message from the client.
        message: String,
        /// HTTP status, when the transport reported one.
        status: Option<u16>,
    },

    /// A streaming response failed mid-flight.
    #[error("stream error: {message}")]
    Stream {
        /// Error message.
        message: String,
    },

    /// A model response could not be parsed into the expected structure.
    #[error("failed to parse response: {message}")]
    ResponseParse {
        /// What went wrong.
        message: String,
        /// Raw response content.
        content: String,
    },

    /// No API key was configured for a provider that needs one.
    #[error("API key missing: set OPENAI_API_KEY or ASSISTFLOW_API_KEY")]
    ApiKeyMissing,

    /// The configured provider name is unknown.
    #[error("unsupported provider: {name}")]
    UnsupportedProvider {
        /// Provider name from configuration.
        name: String,
    },

    /// Invalid configuration value.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid value.
        message: String,
    },

    /// The embedding service is unavailable or returned nothing usable.
    #[error("embedding failed: {message}")]
    Embedding {
        /// Error message.
        message: String,
    },

    /// Vector search against one collection failed.
    #[error("vector search in '{collection}' failed: {message}")]
    VectorSearch {
        /// Collection that failed.
        collection: String,
        /// Error message.
        message: String,
    },

    /// The rerank service failed.
    #[error("rerank failed: {message}")]
    Rerank {
        /// Error message.
        message: String,
    },

    /// A tool raised an error while executing.
    #[error("tool '{name}' failed: {message}")]
    ToolExecution {
        /// Tool name.
        name: String,
        /// Error message.
        message: String,
    },

    /// A tool did not finish within its timeout.
    #[error("tool '{name}' timed out after {timeout:?}")]
    ToolTimeout {
        /// Tool name.
        name: String,
        /// Configured timeout.
        timeout: Duration,
    },

    /// Tool parameters did not match the declared schema.
    #[error("invalid parameters for tool '{name}': {message}")]
    ToolValidation {
        /// Tool name.
        name: String,
        /// What was wrong.
        message: String,
    },

    /// No agent instance is registered for a workflow step.
    #[error("no agent registered for kind '{kind}'")]
    AgentUnavailable {
        /// Agent kind label.
        kind: String,
    },

    /// An agent produced an empty response.
    #[error("agent '{agent}' returned an empty response")]
    EmptyResponse {
        /// Agent name.
        agent: String,
    },

    /// The request was cancelled before it completed.
    #[error("request cancelled")]
    Cancelled,

    /// Workflow-level failure.
    #[error("orchestration error: {message}")]
    Orchestration {
        /// Error message.
        message: String,
    },

    /// I/O failure (prompt files, knowledge files).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl AgentError {
    /// Coarse category label suitable for user-facing messages.
    ///
    /// Never exposes the underlying message, only the family it belongs to.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::ApiRequest { .. } | Self::Stream { .. } => "ServiceError",
            Self::ResponseParse { .. } | Self::Json(_) => "ParseError",
            Self::ApiKeyMissing | Self::UnsupportedProvider { .. } | Self::Config { .. } => {
                "ConfigError"
            }
            Self::Embedding { .. } => "EmbeddingError",
            Self::VectorSearch { .. } => "SearchError",
            Self::Rerank { .. } => "RerankError",
            Self::ToolExecution { .. } => "ToolError",
            Self::ToolTimeout { .. } => "TimeoutError",
            Self::ToolValidation { .. } => "ValidationError",
            Self::AgentUnavailable { .. } | Self::EmptyResponse { .. } => "AgentError",
            Self::Cancelled => "CancelledError",
            Self::Orchestration { .. } => "WorkflowError",
            Self::Io(_) => "IoError",
        }
    }

    /// Returns `true` for cancellation, which must never count as success.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_labels() {
        let err = AgentError::Embedding {
            message: "down".to_string(),
        };
        assert_eq!(err.category(), "EmbeddingError");

        let err = AgentError::ToolTimeout {
            name: "calculator".to_string(),
            timeout: Duration::from_secs(1),
        };
        assert_eq!(err.category(), "TimeoutError");
        assert_eq!(AgentError::Cancelled.category(), "CancelledError");
    }

    #[test]
    fn test_display_includes_context() {
        let err = AgentError::VectorSearch {
            collection: "faq".to_string(),
            message: "connection refused".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("faq"));
        assert!(text.contains("connection refused"));
    }

    #[test]
    fn test_is_cancelled() {
        assert!(AgentError::Cancelled.is_cancelled());
        assert!(!AgentError::ApiKeyMissing.is_cancelled());
    }
}
