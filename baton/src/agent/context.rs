//! Per-run mutable state.

use std::time::Instant;

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

/// State owned by a single in-flight run.
///
/// Providers receive a shared reference on every completion call; the runner
/// is the only writer.
#[derive(Debug, Clone)]
pub struct RunContext {
    session_id: Option<String>,
    trace_id: String,
    agent_name: String,
    turn: usize,
    max_turns: usize,
    variables: Map<String, Value>,
    cancellation: CancellationToken,
    deadline: Option<Instant>,
}

impl RunContext {
    pub(crate) fn new(
        agent_name: impl Into<String>,
        max_turns: usize,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            session_id: None,
            trace_id: format!("trace_{}", uuid::Uuid::new_v4().simple()),
            agent_name: agent_name.into(),
            turn: 0,
            max_turns,
            variables: Map::new(),
            cancellation,
            deadline: None,
        }
    }

    pub(crate) fn with_session_id(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id;
        self
    }

    pub(crate) fn with_variables(mut self, variables: Map<String, Value>) -> Self {
        self.variables = variables;
        self
    }

    pub(crate) const fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    pub(crate) const fn begin_turn(&mut self) -> usize {
        self.turn += 1;
        self.turn
    }

    pub(crate) fn switch_agent(&mut self, agent_name: impl Into<String>) {
        self.agent_name = agent_name.into();
    }

    /// Current turn index, 1-based once the first turn has started.
    #[must_use]
    pub const fn turn(&self) -> usize {
        self.turn
    }

    /// Turn budget for this run.
    #[must_use]
    pub const fn max_turns(&self) -> usize {
        self.max_turns
    }

    /// Session identifier, when the run is backed by a session.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Trace identifier shared by every span of this run.
    #[must_use]
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// Name of the agent currently in control.
    #[must_use]
    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    /// Run deadline, if a timeout is configured.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Look up a run variable.
    #[must_use]
    pub fn var(&self, key: &str) -> Option<&Value> {
        self.variables.get(key)
    }

    /// Set a run variable.
    pub fn set_var(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.variables.insert(key.into(), value.into());
    }

    /// All run variables.
    #[must_use]
    pub const fn variables(&self) -> &Map<String, Value> {
        &self.variables
    }

    /// Whether the run has been cancelled or has timed out.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// The token cancelled when the run is aborted.
    #[must_use]
    pub const fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    #[cfg(test)]
    pub(crate) fn for_test(agent_name: &str) -> Self {
        Self::new(agent_name, 10, CancellationToken::new())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn turns_count_from_one() {
        let mut ctx = RunContext::for_test("A");
        assert_eq!(ctx.turn(), 0);
        assert_eq!(ctx.begin_turn(), 1);
        assert_eq!(ctx.begin_turn(), 2);
        assert_eq!(ctx.max_turns(), 10);
    }

    #[test]
    fn trace_ids_are_unique() {
        let a = RunContext::for_test("A");
        let b = RunContext::for_test("A");
        assert_ne!(a.trace_id(), b.trace_id());
        assert!(a.trace_id().starts_with("trace_"));
    }

    #[test]
    fn variables_round_trip() {
        let mut ctx = RunContext::for_test("A");
        ctx.set_var("user_id", "u-1");
        assert_eq!(ctx.var("user_id"), Some(&json!("u-1")));
        assert_eq!(ctx.variables().len(), 1);
    }

    #[test]
    fn switch_agent_updates_name() {
        let mut ctx = RunContext::for_test("Triage").with_session_id(Some("s1".into()));
        ctx.switch_agent("Billing");
        assert_eq!(ctx.agent_name(), "Billing");
        assert_eq!(ctx.session_id(), Some("s1"));
    }

    #[test]
    fn cancellation_is_shared() {
        let token = CancellationToken::new();
        let ctx = RunContext::new("A", 3, token.clone());
        assert!(!ctx.is_cancelled());
        token.cancel();
        assert!(ctx.is_cancelled());
    }
}
