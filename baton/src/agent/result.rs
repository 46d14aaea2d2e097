//! Run outcome types.

use std::fmt;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;
use crate::message::Message;
use crate::usage::Usage;

/// The value a run finished with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FinalOutput {
    /// Plain assistant text.
    Text(String),
    /// A structured value accepted by the agent's output contract.
    Structured(Value),
}

impl FinalOutput {
    /// The text, if this is a text output.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Structured(_) => None,
        }
    }

    /// The value as JSON. Text becomes a JSON string.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Text(s) => Value::String(s.clone()),
            Self::Structured(v) => v.clone(),
        }
    }
}

impl Default for FinalOutput {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl fmt::Display for FinalOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Structured(v) => write!(f, "{v}"),
        }
    }
}

/// Counters accumulated over a run. They only grow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetrics {
    /// Completed turns (completion calls that returned).
    pub total_turns: usize,
    /// Tokens consumed across all turns.
    pub total_tokens: u64,
    /// Token breakdown across all turns.
    pub usage: Usage,
    /// Wall-clock run time.
    pub duration: Duration,
    /// Tool calls dispatched, including ones that failed.
    pub tool_calls: usize,
    /// Handoffs performed.
    pub handoffs: usize,
}

impl RunMetrics {
    pub(crate) fn record_usage(&mut self, usage: Usage) {
        self.usage += usage;
        self.total_tokens = self.usage.total_tokens;
    }
}

impl fmt::Display for RunMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} turns, {} tokens, {} tool calls, {} handoffs in {:.2}s",
            self.total_turns,
            self.total_tokens,
            self.tool_calls,
            self.handoffs,
            self.duration.as_secs_f64()
        )
    }
}

/// The result of a run.
#[derive(Debug, Clone)]
pub struct RunResult {
    /// What the run finished with.
    pub final_output: FinalOutput,
    /// Full ordered history, including any loaded session messages.
    pub messages: Vec<Message>,
    /// Run counters.
    pub metrics: RunMetrics,
    /// Name of the agent in control when the run ended.
    pub last_agent: String,
    /// Session id the run was bound to.
    pub session_id: Option<String>,
    /// Trace id of the run.
    pub trace_id: String,
    /// Failure description for degraded results from
    /// [`Runner::run_async`](super::Runner::run_async).
    pub error: Option<String>,
}

impl RunResult {
    /// Whether the run finished without error.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// The final text, if the run ended with text.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.final_output.as_text()
    }

    /// Deserialize the final output into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the output does not fit `T`.
    pub fn parse<T: DeserializeOwned>(&self) -> crate::Result<T> {
        Ok(serde_json::from_value(self.final_output.to_value())?)
    }

    pub(crate) fn degraded(error: &RunError, session_id: Option<String>) -> Self {
        Self {
            final_output: FinalOutput::Text(format!("Error: {}", error.error)),
            messages: error.messages.clone(),
            metrics: error.metrics,
            last_agent: error.last_agent.clone(),
            session_id,
            trace_id: error.trace_id.clone(),
            error: Some(error.error.to_string()),
        }
    }
}

/// A failed run: the fatal error plus everything gathered before it.
#[derive(Debug)]
pub struct RunError {
    /// The fatal error.
    pub error: Error,
    /// Counters up to the failure.
    pub metrics: RunMetrics,
    /// History up to the failure.
    pub messages: Vec<Message>,
    /// Name of the agent in control when the run failed.
    pub last_agent: String,
    /// Trace id of the run.
    pub trace_id: String,
}

impl RunError {
    /// The fatal error.
    #[must_use]
    pub const fn error(&self) -> &Error {
        &self.error
    }

    /// Discard the partial state and keep the error.
    #[must_use]
    pub fn into_error(self) -> Error {
        self.error
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl From<RunError> for Error {
    fn from(err: RunError) -> Self {
        err.error
    }
}
