//! Tool dispatch for one turn.
//!
//! Every call in a batch yields exactly one [`ToolResponse`], stored at the
//! call's own index so the output order always matches the input order.
//! Tool-level failures (unknown tool, bad arguments, the tool returning an
//! error, cancellation) are recorded per call. A tool that panics is a fault
//! of the dispatch itself: the rest of the batch is abandoned and the turn
//! fails with [`Error::ToolDispatch`].
//!
//! Each call gets a `tool.<name>` span, a child of the turn span, opened only
//! once the call holds its concurrency permit and ended on every path,
//! including panics and aborted batches.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::Agent;
use crate::error::{Error, Result, ToolError};
use crate::message::{ToolCall, ToolResponse};
use crate::tool::{BoxedTool, ToolContext};
use crate::trace::{RunSpan, SharedTracer, SpanContext};

type Outcome = std::result::Result<ToolResponse, String>;

/// Everything a batch needs from the surrounding turn.
pub(crate) struct Dispatcher<'a> {
    pub(crate) agent: &'a Agent,
    pub(crate) turn: usize,
    pub(crate) tracer: &'a SharedTracer,
    pub(crate) trace_id: &'a str,
    pub(crate) parent: Option<&'a SpanContext>,
    pub(crate) cancellation: &'a CancellationToken,
    pub(crate) deadline: Option<Instant>,
    pub(crate) parallel: bool,
    pub(crate) max_concurrency: Option<usize>,
}

impl Dispatcher<'_> {
    /// Execute `calls` and return one response per call, in call order.
    pub(crate) async fn dispatch(&self, calls: &[ToolCall]) -> Result<Vec<ToolResponse>> {
        if self.parallel && calls.len() > 1 {
            debug!(calls = calls.len(), limit = ?self.max_concurrency, "dispatching tools concurrently");
            self.concurrent(calls).await
        } else {
            debug!(calls = calls.len(), "dispatching tools sequentially");
            self.sequential(calls).await
        }
    }

    async fn sequential(&self, calls: &[ToolCall]) -> Result<Vec<ToolResponse>> {
        let mut responses = Vec::with_capacity(calls.len());
        for call in calls {
            let outcome = self.job(call).run().await;
            responses.push(outcome.map_err(|panic| Error::tool_dispatch(&call.name, panic))?);
        }
        Ok(responses)
    }

    async fn concurrent(&self, calls: &[ToolCall]) -> Result<Vec<ToolResponse>> {
        let semaphore = self.max_concurrency.map(|n| Arc::new(Semaphore::new(n)));
        let mut set = JoinSet::new();

        for (index, call) in calls.iter().enumerate() {
            let job = self.job(call);
            let semaphore = semaphore.clone();
            set.spawn(async move {
                let _permit = match semaphore {
                    Some(s) => s.acquire_owned().await.ok(),
                    None => None,
                };
                (index, job.run().await)
            });
        }

        let mut slots: Vec<Option<ToolResponse>> = calls.iter().map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            let fault = match joined {
                Ok((index, Ok(response))) => {
                    slots[index] = Some(response);
                    continue;
                }
                Ok((index, Err(panic))) => Error::tool_dispatch(&calls[index].name, panic),
                Err(join) => Error::tool_dispatch("<task>", join.to_string()),
            };
            set.abort_all();
            while set.join_next().await.is_some() {}
            return Err(fault);
        }

        Ok(slots
            .into_iter()
            .zip(calls)
            .map(|(slot, call)| {
                slot.unwrap_or_else(|| ToolResponse::failure(call, ToolError::Cancelled))
            })
            .collect())
    }

    fn job(&self, call: &ToolCall) -> ToolJob {
        ToolJob {
            tool: self.agent.tools().get(&call.name).map(Arc::clone),
            call: call.clone(),
            ctx: ToolContext::new(
                call.id.clone(),
                self.agent.name(),
                self.turn,
                self.cancellation.clone(),
            )
            .with_deadline(self.deadline),
            tracer: Arc::clone(self.tracer),
            trace_id: self.trace_id.to_owned(),
            parent: self.parent.cloned(),
        }
    }
}

/// One call with everything it needs to run on its own task.
struct ToolJob {
    tool: Option<BoxedTool>,
    call: ToolCall,
    ctx: ToolContext,
    tracer: SharedTracer,
    trace_id: String,
    parent: Option<SpanContext>,
}

impl ToolJob {
    /// Run the call under its span. A panicking tool yields `Err` with the
    /// panic message.
    async fn run(self) -> Outcome {
        let Self {
            tool,
            call,
            ctx,
            tracer,
            trace_id,
            parent,
        } = self;
        let mut span = RunSpan::start(
            &tracer,
            &trace_id,
            parent.as_ref(),
            &format!("tool.{}", call.name),
        );
        span.attr("tool_call_id", call.id.as_str());

        let outcome = AssertUnwindSafe(execute(tool, &call, &ctx))
            .catch_unwind()
            .await
            .map_err(|payload| panic_message(payload.as_ref()));

        match &outcome {
            Ok(response) => {
                span.attr("success", !response.is_error());
                if let Err(e) = &response.result {
                    span.error(&e.to_string());
                }
            }
            Err(panic) => span.error(&format!("tool panicked: {panic}")),
        }
        span.end();
        outcome
    }
}

async fn execute(tool: Option<BoxedTool>, call: &ToolCall, ctx: &ToolContext) -> ToolResponse {
    let Some(tool) = tool else {
        warn!(tool = %call.name, "tool not found");
        return ToolResponse::failure(call, ToolError::not_found(&call.name));
    };
    let result = tokio::select! {
        biased;
        () = ctx.cancelled() => Err(ToolError::Cancelled),
        result = tool.execute(ctx, call.arguments.clone()) => result,
    };
    match result {
        Ok(value) => ToolResponse::success(call, value),
        Err(e) => {
            warn!(tool = %call.name, error = %e, "tool execution failed");
            ToolResponse::failure(call, e)
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "tool panicked".to_owned())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use serde_json::{Value, json};

    use super::*;
    use crate::tool::FunctionTool;
    use crate::trace::NoopTracer;

    fn sleeper(name: &str, ms: u64) -> FunctionTool {
        let label = name.to_owned();
        FunctionTool::builder(name)
            .handler(move |_ctx, _args| {
                let label = label.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    Ok(Value::String(label))
                }
            })
            .build()
    }

    fn failing(name: &str) -> FunctionTool {
        FunctionTool::builder(name)
            .sync_handler(|_args| Err(ToolError::execution("disk full")))
            .build()
    }

    fn panicking(name: &str) -> FunctionTool {
        FunctionTool::builder(name)
            .sync_handler(|_args| panic!("tool blew up"))
            .build()
    }

    fn calls(names: &[&str]) -> Vec<ToolCall> {
        names
            .iter()
            .enumerate()
            .map(|(i, n)| ToolCall::new(format!("call_{i}"), *n, json!({})))
            .collect()
    }

    async fn run(agent: &Agent, parallel: bool, batch: &[ToolCall]) -> Result<Vec<ToolResponse>> {
        run_with(agent, parallel, None, &CancellationToken::new(), batch).await
    }

    async fn run_with(
        agent: &Agent,
        parallel: bool,
        max_concurrency: Option<usize>,
        token: &CancellationToken,
        batch: &[ToolCall],
    ) -> Result<Vec<ToolResponse>> {
        let tracer: SharedTracer = Arc::new(NoopTracer);
        Dispatcher {
            agent,
            turn: 1,
            tracer: &tracer,
            trace_id: "t",
            parent: None,
            cancellation: token,
            deadline: None,
            parallel,
            max_concurrency,
        }
        .dispatch(batch)
        .await
    }

    mod ordering {
        use super::*;

        #[tokio::test]
        async fn slots_follow_call_order_not_finish_order() {
            let agent = Agent::builder("A")
                .tool(sleeper("slow", 40))
                .tool(sleeper("fast", 1))
                .build()
                .unwrap();
            let batch = calls(&["slow", "fast", "slow"]);
            let out = run(&agent, true, &batch).await.unwrap();
            let ids: Vec<_> = out.iter().map(|r| r.tool_call_id.as_str()).collect();
            assert_eq!(ids, ["call_0", "call_1", "call_2"]);
            assert_eq!(out[1].result, Ok(json!("fast")));
        }

        #[tokio::test]
        async fn sequential_and_concurrent_agree() {
            let agent = Agent::builder("A")
                .tool(sleeper("a", 5))
                .tool(sleeper("b", 1))
                .tool(failing("c"))
                .build()
                .unwrap();
            let batch = calls(&["a", "b", "c", "missing", "a"]);
            let seq = run(&agent, false, &batch).await.unwrap();
            let par = run(&agent, true, &batch).await.unwrap();
            assert_eq!(seq, par);
        }
    }

    mod failures {
        use super::*;

        #[tokio::test]
        async fn unknown_tool_is_local() {
            let agent = Agent::builder("A").tool(sleeper("known", 1)).build().unwrap();
            let batch = calls(&["known", "ghost", "known"]);
            let out = run(&agent, true, &batch).await.unwrap();
            assert_eq!(out.len(), 3);
            assert!(!out[0].is_error());
            assert_eq!(out[1].result, Err(ToolError::not_found("ghost")));
            assert!(out[1].content().contains("tool not found"));
            assert!(!out[2].is_error());
        }

        #[tokio::test]
        async fn tool_error_is_local_in_sequence() {
            let agent = Agent::builder("A")
                .tool(failing("bad"))
                .tool(sleeper("good", 1))
                .build()
                .unwrap();
            let out = run(&agent, false, &calls(&["bad", "good"])).await.unwrap();
            assert!(out[0].is_error());
            assert_eq!(out[1].result, Ok(json!("good")));
        }

        #[tokio::test]
        async fn panic_aborts_concurrent_batch() {
            let agent = Agent::builder("A")
                .tool(panicking("boom"))
                .tool(sleeper("slow", 1_000))
                .build()
                .unwrap();
            let err = run(&agent, true, &calls(&["slow", "boom"])).await.unwrap_err();
            match err {
                Error::ToolDispatch { tool, message } => {
                    assert_eq!(tool, "boom");
                    assert!(message.contains("tool blew up"));
                }
                other => panic!("unexpected error: {other}"),
            }
        }

        #[tokio::test]
        async fn panic_aborts_sequential_batch() {
            let agent = Agent::builder("A").tool(panicking("boom")).build().unwrap();
            let err = run(&agent, false, &calls(&["boom"])).await.unwrap_err();
            assert!(matches!(err, Error::ToolDispatch { ref tool, .. } if tool == "boom"));
        }
    }

    mod cancellation {
        use super::*;

        #[tokio::test]
        async fn cancelled_calls_report_cancelled() {
            let agent = Agent::builder("A").tool(sleeper("slow", 5_000)).build().unwrap();
            let token = CancellationToken::new();
            let trigger = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                trigger.cancel();
            });
            let out = run_with(&agent, true, None, &token, &calls(&["slow", "slow"]))
                .await
                .unwrap();
            assert!(out.iter().all(|r| r.result == Err(ToolError::Cancelled)));
        }
    }

    mod concurrency_limit {
        use super::*;

        #[tokio::test]
        async fn semaphore_caps_in_flight_calls() {
            let in_flight = Arc::new(AtomicUsize::new(0));
            let peak = Arc::new(AtomicUsize::new(0));
            let (now, max) = (Arc::clone(&in_flight), Arc::clone(&peak));
            let tracked = FunctionTool::builder("tracked")
                .handler(move |_ctx, _args| {
                    let (now, max) = (Arc::clone(&now), Arc::clone(&max));
                    async move {
                        let current = now.fetch_add(1, Ordering::SeqCst) + 1;
                        max.fetch_max(current, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        now.fetch_sub(1, Ordering::SeqCst);
                        Ok(Value::Null)
                    }
                })
                .build();
            let agent = Agent::builder("A").tool(tracked).build().unwrap();
            let batch = calls(&["tracked"; 6]);
            let out = run_with(&agent, true, Some(2), &CancellationToken::new(), &batch)
                .await
                .unwrap();
            assert_eq!(out.len(), 6);
            assert!(peak.load(Ordering::SeqCst) <= 2);
        }
    }
}
