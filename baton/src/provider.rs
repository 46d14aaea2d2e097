//! The completion provider boundary.
//!
//! A [`CompletionProvider`] maps (agent, ordered history, tool catalog) to one
//! assistant turn. The runner knows nothing about vendor request shapes; each
//! backend is one implementation of this trait.

mod scripted;

pub use scripted::{RecordedRequest, ScriptedProvider};

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::agent::{Agent, RunContext};
use crate::error::ProviderError;
use crate::message::{HandoffRequest, Message, ToolCall};
use crate::tool::ToolDefinition;
use crate::usage::Usage;

/// A shared dynamic provider.
pub type SharedProvider = Arc<dyn CompletionProvider>;

/// One assistant turn as returned by a provider.
///
/// A reply should carry at most one of structured output, a handoff or tool
/// calls. When it carries several, the runner honors them in that order.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// The assistant message appended to history.
    pub message: Message,
    /// Tokens consumed by this turn.
    pub usage: Usage,
    /// Requested tool invocations, in order.
    pub tool_calls: Vec<ToolCall>,
    /// Requested transfer of control.
    pub handoff: Option<HandoffRequest>,
    /// Structured result for agents with an output contract.
    pub structured_output: Option<Value>,
}

impl Completion {
    /// A plain text reply.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            message: Message::assistant(content),
            usage: Usage::default(),
            tool_calls: Vec::new(),
            handoff: None,
            structured_output: None,
        }
    }

    /// A reply requesting tool calls.
    #[must_use]
    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: calls,
            ..Self::text("")
        }
    }

    /// A reply requesting a handoff.
    #[must_use]
    pub fn handoff(request: HandoffRequest) -> Self {
        Self {
            handoff: Some(request),
            ..Self::text("")
        }
    }

    /// A reply carrying structured output. The message content is the JSON text.
    #[must_use]
    pub fn structured(value: Value) -> Self {
        Self {
            message: Message::assistant(value.to_string()),
            structured_output: Some(value),
            ..Self::text("")
        }
    }

    /// Set the message text.
    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.message.content = content.into();
        self
    }

    /// Set the token usage.
    #[must_use]
    pub const fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }

    /// The assistant message to record, with the requested tool calls attached.
    pub(crate) fn assistant_message(&self) -> Message {
        let mut message = self.message.clone();
        if message.tool_calls.is_empty() && !self.tool_calls.is_empty() {
            message.tool_calls.clone_from(&self.tool_calls);
        }
        message
    }
}

/// Produces assistant turns for the runner.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Provider name used in logs.
    fn name(&self) -> &str {
        "provider"
    }

    /// Produce the next assistant turn.
    ///
    /// # Errors
    ///
    /// Any error is fatal to the run.
    async fn complete(
        &self,
        ctx: &RunContext,
        agent: &Agent,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<Completion, ProviderError>;
}
