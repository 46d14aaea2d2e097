//! The turn loop that drives an agent to a final output.
//!
//! The [`Runner`] holds a completion provider and a [`RunConfig`]; agents are
//! passed in per run. Each run:
//!
//! 1. loads recent session history and appends the user input,
//! 2. loops up to `max_turns` times over guardrail check, completion call and
//!    one of: structured output (done), handoff (swap agent), tool calls
//!    (dispatch and append results) or plain text (done, unless the agent
//!    requires structured output),
//! 3. persists the messages it produced back to the session.
//!
//! The whole loop runs under the configured deadline. When it elapses, the
//! run's cancellation token fires so in-flight tool calls observe it.
//!
//! [`Runner::run_async`] spawns [`Runner::run`] on a task and resolves to a
//! [`RunResult`] even when the run fails; [`Runner::run_blocking`] drives it
//! on a private current-thread runtime.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use tracing::{Instrument, debug, error, info, info_span, warn};

use super::dispatch::Dispatcher;
use super::{Agent, FinalOutput, RunConfig, RunContext, RunError, RunMetrics, RunResult};
use crate::error::{Error, Result};
use crate::guardrail;
use crate::message::{HandoffRequest, Message};
use crate::provider::{CompletionProvider, SharedProvider};
use crate::trace::{RunSpan, SpanContext};

/// What a finished turn asks the loop to do next.
#[derive(Debug)]
enum Step {
    Continue,
    Final(FinalOutput),
}

/// Mutable state of one run.
struct RunState<'a> {
    agent: &'a Agent,
    ctx: RunContext,
    messages: Vec<Message>,
    loaded: usize,
    metrics: RunMetrics,
}

/// Drives agents through the turn loop.
///
/// A runner is cheap to clone and may serve any number of concurrent runs;
/// each run owns its own context and history.
///
/// # Examples
///
/// ```rust,ignore
/// let runner = Runner::new(provider).with_config(RunConfig::new().max_turns(5));
/// let result = runner.run(&agent, "What is 2+2?").await?;
/// println!("{}", result.final_output);
/// ```
#[derive(Clone)]
pub struct Runner {
    provider: SharedProvider,
    config: RunConfig,
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("provider", &self.provider.name())
            .field("config", &self.config)
            .finish()
    }
}

impl Runner {
    /// Create a runner with default settings.
    #[must_use]
    pub fn new<P: CompletionProvider + 'static>(provider: P) -> Self {
        Self::with_provider(Arc::new(provider))
    }

    /// Create a runner around an already shared provider.
    #[must_use]
    pub fn with_provider(provider: SharedProvider) -> Self {
        Self {
            provider,
            config: RunConfig::default(),
        }
    }

    /// Replace the run configuration.
    #[must_use]
    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    /// The run configuration.
    #[must_use]
    pub const fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Run `agent` on `input` until it produces a final output.
    ///
    /// # Errors
    ///
    /// Returns a [`RunError`] carrying the fatal error together with the
    /// metrics and history gathered before it: a guardrail violation, a
    /// provider failure, an unknown handoff target, a tool dispatch fault,
    /// an exhausted turn budget, a timeout, cancellation, or a session
    /// storage failure.
    pub async fn run(
        &self,
        agent: &Agent,
        input: impl Into<String>,
    ) -> std::result::Result<RunResult, RunError> {
        let span = info_span!(
            "agent.run",
            agent.name = %agent.name(),
            agent.model = %agent.model(),
            session.id = tracing::field::Empty,
            trace.id = tracing::field::Empty,
            error = tracing::field::Empty,
        );
        self.execute(agent, input.into()).instrument(span).await
    }

    /// Spawn a run on the current Tokio runtime.
    ///
    /// The returned handle resolves to a [`RunResult`] in every case: a failed
    /// or panicked run yields a degraded result whose `error` is set and whose
    /// `final_output` is `Error: <message>`.
    #[must_use]
    pub fn run_async(&self, agent: Arc<Agent>, input: impl Into<String>) -> RunHandle {
        let runner = self.clone();
        let input = input.into();
        let session_id = self.config.resolved_session_id();
        let agent_name = agent.name().to_owned();
        let task = tokio::spawn(async move { runner.run(&agent, input).await });
        RunHandle {
            task,
            session_id,
            agent_name,
        }
    }

    /// Run to completion on a private current-thread runtime.
    ///
    /// Must not be called from within an async context.
    ///
    /// # Errors
    ///
    /// Same as [`run`](Self::run), plus [`Error::Internal`] if the runtime
    /// cannot be created.
    pub fn run_blocking(
        &self,
        agent: &Agent,
        input: impl Into<String>,
    ) -> std::result::Result<RunResult, RunError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|e| RunError {
                error: Error::internal(format!("failed to start runtime: {e}")),
                metrics: RunMetrics::default(),
                messages: Vec::new(),
                last_agent: agent.name().to_owned(),
                trace_id: String::new(),
            })?;
        runtime.block_on(self.run(agent, input))
    }

    async fn execute(
        &self,
        agent: &Agent,
        input: String,
    ) -> std::result::Result<RunResult, RunError> {
        let started = Instant::now();
        let config = &self.config;
        let session_id = config.resolved_session_id();
        let deadline = config.timeout.map(|t| started + t);
        let ctx = RunContext::new(agent.name(), config.max_turns, config.run_token())
            .with_session_id(session_id.clone())
            .with_variables(config.variables.clone())
            .with_deadline(deadline);

        let current = tracing::Span::current();
        current.record("trace.id", ctx.trace_id());
        if let Some(id) = &session_id {
            current.record("session.id", id.as_str());
        }

        let mut run_span = RunSpan::start(&config.tracer, ctx.trace_id(), None, "agent.run");
        run_span.attr("agent", agent.name());
        run_span.attr("max_turns", config.max_turns);
        let run_ctx = run_span.context().cloned();

        let mut state = RunState {
            agent,
            ctx,
            messages: Vec::new(),
            loaded: 0,
            metrics: RunMetrics::default(),
        };

        let outcome = match config.timeout {
            Some(limit) => {
                match tokio::time::timeout(limit, self.drive(&mut state, input, run_ctx.as_ref())).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        state.ctx.cancellation_token().cancel();
                        Err(Error::Timeout(limit))
                    }
                }
            }
            None => self.drive(&mut state, input, run_ctx.as_ref()).await,
        };
        let outcome = match outcome {
            Ok(output) => self.persist(&state).await.map(|()| output),
            Err(e) => Err(e),
        };
        state.metrics.duration = started.elapsed();

        run_span.attr("turns", state.metrics.total_turns);
        run_span.attr("tokens", state.metrics.total_tokens);
        run_span.attr("last_agent", state.agent.name());

        match outcome {
            Ok(final_output) => {
                info!(
                    turns = state.metrics.total_turns,
                    tokens = state.metrics.total_tokens,
                    tool_calls = state.metrics.tool_calls,
                    handoffs = state.metrics.handoffs,
                    last_agent = %state.agent.name(),
                    "run completed"
                );
                run_span.end();
                Ok(RunResult {
                    final_output,
                    messages: state.messages,
                    metrics: state.metrics,
                    last_agent: state.agent.name().to_owned(),
                    session_id,
                    trace_id: state.ctx.trace_id().to_owned(),
                    error: None,
                })
            }
            Err(e) => {
                tracing::Span::current().record("error", tracing::field::display(&e));
                error!(
                    error = %e,
                    turns = state.metrics.total_turns,
                    agent = %state.agent.name(),
                    "run failed"
                );
                run_span.error(&e.to_string());
                run_span.end();
                Err(RunError {
                    error: e,
                    metrics: state.metrics,
                    messages: state.messages,
                    last_agent: state.agent.name().to_owned(),
                    trace_id: state.ctx.trace_id().to_owned(),
                })
            }
        }
    }

    async fn drive(
        &self,
        state: &mut RunState<'_>,
        input: String,
        run_span: Option<&SpanContext>,
    ) -> Result<FinalOutput> {
        if let Some(session) = &self.config.session {
            let history = session.get_items(Some(self.config.history_limit)).await?;
            debug!(loaded = history.len(), session = %session.id(), "loaded session history");
            state.loaded = history.len();
            state.messages.extend(history);
        }
        state.messages.push(Message::user(input));

        while state.ctx.turn() < self.config.max_turns {
            if state.ctx.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let turn = state.ctx.begin_turn();
            let mut span =
                RunSpan::start(&self.config.tracer, state.ctx.trace_id(), run_span, "agent.turn");
            span.attr("turn", turn);
            span.attr("agent", state.agent.name());

            let step = self.turn(state, turn, &mut span).await;
            if let Err(e) = &step {
                span.error(&e.to_string());
            }
            span.end();

            if let Step::Final(output) = step? {
                return Ok(output);
            }
        }

        warn!(max_turns = self.config.max_turns, "turn budget exhausted");
        Err(Error::max_turns(self.config.max_turns))
    }

    async fn turn(
        &self,
        state: &mut RunState<'_>,
        turn: usize,
        span: &mut RunSpan,
    ) -> Result<Step> {
        let agent = state.agent;

        if let Some(last) = state.messages.last()
            && let Err((name, rejection)) = guardrail::check_all(agent.guardrails(), &last.content)
        {
            warn!(guardrail = name, reason = %rejection, turn, "guardrail rejected message");
            return Err(Error::guardrail(name, rejection.reason));
        }

        debug!(
            turn,
            agent = %agent.name(),
            messages = state.messages.len(),
            "requesting completion"
        );
        let tools = agent.tools().definitions();
        let reply = tokio::select! {
            biased;
            () = state.ctx.cancellation_token().cancelled() => Err(Error::Cancelled),
            reply = self.provider.complete(&state.ctx, agent, &state.messages, &tools) => {
                reply.map_err(Error::from)
            }
        };
        let completion = reply?;

        state.metrics.total_turns += 1;
        state.metrics.record_usage(completion.usage);
        span.attr("tokens", completion.usage.total_tokens);

        let message = completion.assistant_message();
        let calls = message.tool_calls.clone();
        state.messages.push(message);

        if let Some(schema) = agent.output_schema()
            && let Some(value) = completion.structured_output
        {
            match schema.validate(&value) {
                Ok(()) => {
                    debug!(turn, schema = schema.name(), "structured output accepted");
                    span.attr("outcome", "structured");
                    return Ok(Step::Final(FinalOutput::Structured(value)));
                }
                Err(reason) => {
                    warn!(turn, schema = schema.name(), %reason, "structured output rejected");
                }
            }
        }

        if let Some(request) = completion.handoff {
            span.attr("outcome", "handoff");
            span.attr("handoff", request.target_agent.as_str());
            Self::handoff(state, request)?;
            return Ok(Step::Continue);
        }

        if !calls.is_empty() {
            span.attr("outcome", "tool_calls");
            span.attr("tool_calls", calls.len());
            state.metrics.tool_calls += calls.len();
            let turn_span = span.context().cloned();
            let responses = Dispatcher {
                agent,
                turn,
                tracer: &self.config.tracer,
                trace_id: state.ctx.trace_id(),
                parent: turn_span.as_ref(),
                cancellation: state.ctx.cancellation_token(),
                deadline: state.ctx.deadline(),
                parallel: self.config.parallel_tools,
                max_concurrency: self.config.max_tool_concurrency,
            }
            .dispatch(&calls)
            .await?;
            state.messages.extend(responses.iter().map(Message::tool));
            return Ok(Step::Continue);
        }

        if agent.output_schema().is_none() {
            span.attr("outcome", "text");
            return Ok(Step::Final(FinalOutput::Text(completion.message.content)));
        }

        debug!(turn, agent = %agent.name(), "awaiting structured output");
        span.attr("outcome", "continue");
        Ok(Step::Continue)
    }

    fn handoff<'a>(state: &mut RunState<'a>, request: HandoffRequest) -> Result<()> {
        let from: &'a Agent = state.agent;
        let target = from
            .get_handoff(&request.target_agent)
            .ok_or_else(|| Error::handoff_not_found(&request.target_agent))?;

        info!(
            from_agent = %from.name(),
            to_agent = %target.name(),
            reason = %request.reason,
            "handoff"
        );
        if let Some(context) = request.context {
            for (key, value) in context {
                state.ctx.set_var(key, value);
            }
        }
        state.metrics.handoffs += 1;
        state.ctx.switch_agent(target.name());
        state.agent = target.as_ref();
        Ok(())
    }

    async fn persist(&self, state: &RunState<'_>) -> Result<()> {
        let Some(session) = &self.config.session else {
            return Ok(());
        };
        let produced = &state.messages[state.loaded..];
        session.add_items(produced).await?;
        debug!(stored = produced.len(), session = %session.id(), "persisted run messages");
        Ok(())
    }
}

/// A spawned run. Resolves to a [`RunResult`], degraded on failure.
///
/// A run that fails normally reports the metrics and messages it had
/// accumulated. A run whose task panicked or was stopped with
/// [`abort`](Self::abort) loses that state with the task, so its degraded
/// result carries default metrics, no messages and an empty trace id. To
/// stop a run and keep its partial state, cancel the token passed to
/// [`RunConfig::cancellation`] instead.
#[derive(Debug)]
pub struct RunHandle {
    task: tokio::task::JoinHandle<std::result::Result<RunResult, RunError>>,
    session_id: Option<String>,
    agent_name: String,
}

impl RunHandle {
    /// Abort the run. The handle then resolves to a degraded result without
    /// metrics or history.
    pub fn abort(&self) {
        self.task.abort();
    }

    /// Whether the run has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Future for RunHandle {
    type Output = RunResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        let joined = match Pin::new(&mut this.task).poll(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(joined) => joined,
        };
        let failure = match joined {
            Ok(Ok(result)) => return Poll::Ready(result),
            Ok(Err(failure)) => failure,
            Err(join) => {
                let error = if join.is_cancelled() {
                    Error::Cancelled
                } else {
                    Error::internal(format!("run task panicked: {join}"))
                };
                RunError {
                    error,
                    metrics: RunMetrics::default(),
                    messages: Vec::new(),
                    last_agent: this.agent_name.clone(),
                    trace_id: String::new(),
                }
            }
        };
        Poll::Ready(RunResult::degraded(&failure, this.session_id.take()))
    }
}
