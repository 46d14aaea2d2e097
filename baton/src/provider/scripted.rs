//! A replaying provider for tests, demos and offline runs.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{Completion, CompletionProvider};
use crate::agent::{Agent, RunContext};
use crate::error::ProviderError;
use crate::message::Message;
use crate::tool::ToolDefinition;

type Step = Result<Completion, ProviderError>;

/// What a [`ScriptedProvider`] saw on one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    /// Name of the agent that was active.
    pub agent: String,
    /// Model of the active agent.
    pub model: String,
    /// Turn index (1-based).
    pub turn: usize,
    /// Number of history messages submitted.
    pub message_count: usize,
    /// Content of the last submitted message.
    pub last_message: Option<String>,
    /// Names of the tools offered.
    pub tools: Vec<String>,
}

#[derive(Debug, Default)]
struct Script {
    shared: VecDeque<Step>,
    per_agent: HashMap<String, VecDeque<Step>>,
    last: Option<Step>,
}

/// Replays a queue of completions in order.
///
/// Steps queued with [`for_agent`](Self::for_agent) are served first when that
/// agent is active; otherwise the shared queue is used. Once a queue runs dry
/// the provider either repeats its last step (see
/// [`repeat_last`](Self::repeat_last)) or fails with an internal error.
///
/// ```rust,ignore
/// let provider = ScriptedProvider::new()
///     .reply(Completion::handoff(HandoffRequest::new("Billing")))
///     .reply(Completion::text("Your refund is on its way"));
/// ```
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    script: Mutex<Script>,
    requests: Mutex<Vec<RecordedRequest>>,
    repeat_last: bool,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    /// Create an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a script from a list of completions.
    #[must_use]
    pub fn from_completions(completions: impl IntoIterator<Item = Completion>) -> Self {
        completions
            .into_iter()
            .fold(Self::new(), |provider, c| provider.reply(c))
    }

    /// Queue a completion.
    #[must_use]
    pub fn reply(self, completion: Completion) -> Self {
        self.push(None, Ok(completion))
    }

    /// Queue a provider failure.
    #[must_use]
    pub fn fail(self, error: ProviderError) -> Self {
        self.push(None, Err(error))
    }

    /// Queue a completion served only while `agent` is active.
    #[must_use]
    pub fn for_agent(self, agent: impl Into<String>, completion: Completion) -> Self {
        self.push(Some(agent.into()), Ok(completion))
    }

    /// Keep returning the last step once the script is exhausted.
    #[must_use]
    pub const fn repeat_last(mut self) -> Self {
        self.repeat_last = true;
        self
    }

    /// Sleep before every reply.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn push(mut self, agent: Option<String>, step: Step) -> Self {
        if let Ok(script) = self.script.get_mut() {
            match agent {
                Some(name) => script.per_agent.entry(name).or_default().push_back(step),
                None => script.shared.push_back(step),
            }
        }
        self
    }

    /// Every request received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Number of calls received so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or_default()
    }

    /// Number of steps still queued across all queues.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.script
            .lock()
            .map(|s| s.shared.len() + s.per_agent.values().map(VecDeque::len).sum::<usize>())
            .unwrap_or_default()
    }

    fn next_step(&self, agent: &str) -> Step {
        let mut script = self
            .script
            .lock()
            .map_err(|e| ProviderError::internal(format!("script lock poisoned: {e}")))?;
        let mut next = script.per_agent.get_mut(agent).and_then(VecDeque::pop_front);
        if next.is_none() {
            next = script.shared.pop_front();
        }
        match next {
            Some(step) => {
                script.last = Some(step.clone());
                step
            }
            None if self.repeat_last => script.last.clone().unwrap_or_else(|| {
                Err(ProviderError::internal("script is empty"))
            }),
            None => Err(ProviderError::internal(format!(
                "script exhausted for agent '{agent}'"
            ))),
        }
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        ctx: &RunContext,
        agent: &Agent,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<Completion, ProviderError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(RecordedRequest {
                agent: agent.name().to_owned(),
                model: agent.model().to_owned(),
                turn: ctx.turn(),
                message_count: messages.len(),
                last_message: messages.last().map(|m| m.content.clone()),
                tools: tools.iter().map(|t| t.name.clone()).collect(),
            });
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.next_step(agent.name())
    }
}
