//! Run configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::session::{Session, SharedSession};
use crate::trace::{NoopTracer, SharedTracer, Tracer};

/// Knobs for a single run, shared by every run started from one
/// [`Runner`](super::Runner).
///
/// ```rust,ignore
/// let config = RunConfig::new()
///     .max_turns(5)
///     .timeout(Duration::from_secs(30))
///     .session(Arc::new(InMemorySession::new("user-42")));
/// ```
#[derive(Clone)]
pub struct RunConfig {
    pub(crate) max_turns: usize,
    pub(crate) timeout: Option<Duration>,
    pub(crate) parallel_tools: bool,
    pub(crate) max_tool_concurrency: Option<usize>,
    pub(crate) session: Option<SharedSession>,
    pub(crate) session_id: Option<String>,
    pub(crate) history_limit: usize,
    pub(crate) tracer: SharedTracer,
    pub(crate) variables: Map<String, Value>,
    pub(crate) cancellation: Option<CancellationToken>,
}

impl RunConfig {
    /// Default turn budget.
    pub const DEFAULT_MAX_TURNS: usize = 10;
    /// Default run timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);
    /// Default number of session messages loaded before a run.
    pub const DEFAULT_HISTORY_LIMIT: usize = 100;

    /// Create a config with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the turn budget.
    #[must_use]
    pub const fn max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    /// Set the overall run deadline.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Run without a deadline.
    #[must_use]
    pub const fn no_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// Enable or disable concurrent tool dispatch.
    #[must_use]
    pub const fn parallel_tools(mut self, enabled: bool) -> Self {
        self.parallel_tools = enabled;
        self
    }

    /// Cap the number of tool calls running at once. Zero means no cap.
    #[must_use]
    pub const fn max_tool_concurrency(mut self, limit: usize) -> Self {
        self.max_tool_concurrency = if limit == 0 { None } else { Some(limit) };
        self
    }

    /// Back the run with a session. Its id becomes the run's session id
    /// unless one was set explicitly.
    #[must_use]
    pub fn session(mut self, session: SharedSession) -> Self {
        self.session = Some(session);
        self
    }

    /// Set the session id reported on the run context and result.
    #[must_use]
    pub fn session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    /// Set how many session messages are loaded before a run.
    #[must_use]
    pub const fn history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Set the tracer.
    #[must_use]
    pub fn tracer<T: Tracer + 'static>(self, tracer: T) -> Self {
        self.tracer_shared(Arc::new(tracer))
    }

    /// Set an already shared tracer.
    #[must_use]
    pub fn tracer_shared(mut self, tracer: SharedTracer) -> Self {
        self.tracer = tracer;
        self
    }

    /// Seed a run variable.
    #[must_use]
    pub fn variable(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    /// Link runs to an external cancellation token. Each run gets a child
    /// token, so cancelling the parent aborts every run started afterwards or
    /// still in flight.
    #[must_use]
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// The configured turn budget.
    #[must_use]
    pub const fn get_max_turns(&self) -> usize {
        self.max_turns
    }

    /// The configured run deadline.
    #[must_use]
    pub const fn get_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub(crate) fn resolved_session_id(&self) -> Option<String> {
        self.session_id
            .clone()
            .or_else(|| self.session.as_ref().map(|s| s.id().to_owned()))
    }

    pub(crate) fn run_token(&self) -> CancellationToken {
        self.cancellation
            .as_ref()
            .map_or_else(CancellationToken::new, CancellationToken::child_token)
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_turns: Self::DEFAULT_MAX_TURNS,
            timeout: Some(Self::DEFAULT_TIMEOUT),
            parallel_tools: true,
            max_tool_concurrency: None,
            session: None,
            session_id: None,
            history_limit: Self::DEFAULT_HISTORY_LIMIT,
            tracer: Arc::new(NoopTracer),
            variables: Map::new(),
            cancellation: None,
        }
    }
}

impl fmt::Debug for RunConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunConfig")
            .field("max_turns", &self.max_turns)
            .field("timeout", &self.timeout)
            .field("parallel_tools", &self.parallel_tools)
            .field("max_tool_concurrency", &self.max_tool_concurrency)
            .field("session", &self.session.as_ref().map(|s| s.id().to_owned()))
            .field("session_id", &self.session_id)
            .field("history_limit", &self.history_limit)
            .field("variables", &self.variables)
            .finish_non_exhaustive()
    }
}
