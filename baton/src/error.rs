//! Unified error types for the baton runtime.
//!
//! The hierarchy mirrors how failures propagate through a run:
//! - configuration errors are raised when an agent is built, never mid-run
//! - tool errors stay local to one tool call and become conversation content
//! - everything else aborts the run and surfaces through [`Error`]

use std::fmt;
use std::time::Duration;

use crate::session::SessionError;

/// Result type alias for baton operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for the baton runtime.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Invalid agent, tool or runner configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A guardrail rejected the latest message.
    #[error("guardrail violation: [{guardrail}] {reason}")]
    GuardrailViolation {
        /// Name of the guardrail that failed.
        guardrail: String,
        /// Reason reported by the guardrail.
        reason: String,
    },

    /// The completion provider failed.
    #[error("completion failed: {0}")]
    Provider(#[from] ProviderError),

    /// A handoff named an agent outside the current agent's handoff set.
    #[error("handoff agent not found: {target}")]
    HandoffNotFound {
        /// The requested target agent name.
        target: String,
    },

    /// The turn budget was exhausted without a terminal reply.
    #[error("max turns exceeded ({max_turns})")]
    MaxTurnsExceeded {
        /// The configured turn budget.
        max_turns: usize,
    },

    /// The run exceeded its overall deadline.
    #[error("run timed out after {0:?}")]
    Timeout(Duration),

    /// The run was cancelled by the caller.
    #[error("run was cancelled")]
    Cancelled,

    /// A tool task faulted in a way that could not be captured as a tool error.
    #[error("tool dispatch aborted in '{tool}': {message}")]
    ToolDispatch {
        /// Name of the tool whose task faulted.
        tool: String,
        /// Description of the fault.
        message: String,
    },

    /// The run task itself failed (panicked or was aborted).
    #[error("internal error: {0}")]
    Internal(String),

    /// Session storage failure.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a guardrail violation error.
    #[must_use]
    pub fn guardrail(guardrail: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::GuardrailViolation {
            guardrail: guardrail.into(),
            reason: reason.into(),
        }
    }

    /// Create a handoff-not-found error.
    #[must_use]
    pub fn handoff_not_found(target: impl Into<String>) -> Self {
        Self::HandoffNotFound {
            target: target.into(),
        }
    }

    /// Create a max turns error.
    #[must_use]
    pub const fn max_turns(max_turns: usize) -> Self {
        Self::MaxTurnsExceeded { max_turns }
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a tool dispatch fault.
    #[must_use]
    pub fn tool_dispatch(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolDispatch {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

/// Errors detected while building an agent or loading runner settings.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The agent name is empty.
    #[error("agent name cannot be empty")]
    EmptyName,

    /// The model identifier is empty.
    #[error("model cannot be empty")]
    EmptyModel,

    /// A declared tool failed its own validation.
    #[error("invalid tool {tool}: {source}")]
    InvalidTool {
        /// Name of the offending tool.
        tool: String,
        /// Validation failure reported by the tool.
        #[source]
        source: ToolError,
    },

    /// The handoff graph reachable from the agent contains a cycle.
    #[error("circular handoff detected: {0}")]
    CircularHandoff(String),

    /// A runner setting is out of range or unparsable.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
}

impl ConfigError {
    /// Create an invalid settings error.
    #[must_use]
    pub fn settings(msg: impl Into<String>) -> Self {
        Self::InvalidSettings(msg.into())
    }
}

/// Error type for completion provider calls.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ProviderError {
    /// The error kind.
    pub kind: ProviderErrorKind,
    /// The provider name (e.g., "openai", "scripted").
    pub provider: Option<String>,
    /// Additional error message.
    pub message: String,
    /// Optional error code from the provider.
    pub code: Option<String>,
}

/// Categories of provider errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProviderErrorKind {
    /// Authentication or authorization failure.
    Auth,
    /// Rate limit exceeded.
    RateLimited,
    /// Context length exceeded.
    ContextExceeded,
    /// Invalid request parameters.
    InvalidRequest,
    /// Response format error.
    ResponseFormat,
    /// Network or connection error.
    Network,
    /// The backend did not answer in time.
    Timeout,
    /// Provider-specific error.
    Provider,
    /// Internal error.
    Internal,
    /// Feature not supported.
    NotSupported,
}

impl ProviderError {
    const fn new(kind: ProviderErrorKind, provider: Option<String>, message: String) -> Self {
        Self {
            kind,
            provider,
            message,
            code: None,
        }
    }

    /// Create an authentication error.
    #[must_use]
    pub fn auth(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            ProviderErrorKind::Auth,
            Some(provider.into()),
            message.into(),
        )
    }

    /// Create a rate limit error.
    #[must_use]
    pub fn rate_limited(provider: impl Into<String>) -> Self {
        Self::new(
            ProviderErrorKind::RateLimited,
            Some(provider.into()),
            "Rate limit exceeded. Please retry after some time.".into(),
        )
    }

    /// Create a context exceeded error.
    #[must_use]
    pub fn context_exceeded(used: usize, max: usize) -> Self {
        Self::new(
            ProviderErrorKind::ContextExceeded,
            None,
            format!("Context length exceeded: used {used}, max {max}"),
        )
    }

    /// Create an invalid request error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::InvalidRequest, None, message.into())
    }

    /// Create a response format error.
    #[must_use]
    pub fn response_format(expected: impl Into<String>, got: impl Into<String>) -> Self {
        Self::new(
            ProviderErrorKind::ResponseFormat,
            None,
            format!("Expected {}, got {}", expected.into(), got.into()),
        )
    }

    /// Create a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Network, None, message.into())
    }

    /// Create a timeout error.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Timeout, None, message.into())
    }

    /// Create a provider-specific error.
    #[must_use]
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            ProviderErrorKind::Provider,
            Some(provider.into()),
            message.into(),
        )
    }

    /// Create a provider error with an error code.
    #[must_use]
    pub fn provider_code(
        provider: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code: Some(code.into()),
            ..Self::provider(provider, message)
        }
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Internal, None, message.into())
    }

    /// Create a not supported error.
    #[must_use]
    pub fn not_supported(feature: impl Into<String>) -> Self {
        Self::new(
            ProviderErrorKind::NotSupported,
            None,
            format!("Feature not supported: {}", feature.into()),
        )
    }

    /// Check if this is a retryable error.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            ProviderErrorKind::RateLimited | ProviderErrorKind::Network | ProviderErrorKind::Timeout
        )
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(provider) = &self.provider {
            write!(f, "[{provider}] ")?;
        }
        write!(f, "{}", self.message)?;
        if let Some(code) = &self.code {
            write!(f, " (code: {code})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ProviderError {}

/// Error type for tool execution failures.
///
/// A tool error never aborts a run. The runner records it as the content of
/// the matching tool message so the provider can react to it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ToolError {
    /// Error during tool execution.
    #[error("execution error: {0}")]
    Execution(String),

    /// Invalid arguments provided to the tool.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The requested tool is not declared by the current agent.
    #[error("tool not found: {0}")]
    NotFound(String),

    /// The call was cancelled before it completed.
    #[error("tool call cancelled")]
    Cancelled,

    /// The tool definition itself is malformed.
    #[error("invalid tool definition: {0}")]
    InvalidDefinition(String),

    /// Generic error.
    #[error("tool error: {0}")]
    Other(String),
}

impl ToolError {
    /// Create an execution error.
    #[must_use]
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    /// Create an invalid arguments error.
    #[must_use]
    pub fn invalid_args(msg: impl Into<String>) -> Self {
        Self::InvalidArguments(msg.into())
    }

    /// Create a not found error.
    #[must_use]
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound(name.into())
    }

    /// Create an invalid definition error.
    #[must_use]
    pub fn invalid_definition(msg: impl Into<String>) -> Self {
        Self::InvalidDefinition(msg.into())
    }
}

impl From<String> for ToolError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}

impl From<&str> for ToolError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_owned())
    }
}

impl From<serde_json::Error> for ToolError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidArguments(err.to_string())
    }
}
