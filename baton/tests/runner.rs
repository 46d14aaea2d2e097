//! Turn-loop scenarios driven end to end through the public API.

#![allow(clippy::unwrap_used, clippy::panic, clippy::clone_on_ref_ptr)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use baton::prelude::*;
use serde::Deserialize;
use serde_json::{Value, json};

/// Adds two integers.
#[derive(Debug, Clone, Copy, Default)]
struct AddTool;

#[derive(Debug, Deserialize)]
struct AddArgs {
    a: i64,
    b: i64,
}

#[async_trait]
impl Tool for AddTool {
    const NAME: &'static str = "add";
    type Args = AddArgs;
    type Output = i64;
    type Error = ToolError;

    fn description(&self) -> String {
        "Add two integers".to_owned()
    }

    fn parameters(&self) -> ParameterSchema {
        ParameterSchema::object()
            .required_property("a", PropertySchema::integer("First addend"))
            .required_property("b", PropertySchema::integer("Second addend"))
    }

    async fn call(&self, _ctx: &ToolContext, args: AddArgs) -> std::result::Result<i64, ToolError> {
        Ok(args.a + args.b)
    }
}

fn echo(delay_ms: u64) -> FunctionTool {
    FunctionTool::builder("echo")
        .description("Echo the text back")
        .parameters(
            ParameterSchema::object().required_property("text", PropertySchema::string("Text")),
        )
        .handler(move |_ctx, args| async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            Ok(args["text"].clone())
        })
        .build()
}

fn call(id: &str, name: &str, args: Value) -> ToolCall {
    ToolCall::new(id, name, args)
}

fn scripted(provider: ScriptedProvider) -> (Arc<ScriptedProvider>, Runner) {
    let provider = Arc::new(provider);
    let runner = Runner::with_provider(provider.clone() as SharedProvider);
    (provider, runner)
}

mod scenarios {
    use super::*;

    #[tokio::test]
    async fn math_answers_in_one_turn() {
        let (_, runner) = scripted(ScriptedProvider::new().reply(Completion::text("4")));
        let math = Agent::builder("Math").build().unwrap();

        let result = runner.run(&math, "2+2").await.unwrap();

        assert_eq!(result.final_output, FinalOutput::Text("4".into()));
        assert_eq!(result.metrics.total_turns, 1);
        assert_eq!(result.metrics.tool_calls, 0);
        assert_eq!(result.metrics.handoffs, 0);
    }

    #[tokio::test]
    async fn triage_hands_off_to_billing() {
        let (provider, runner) = scripted(
            ScriptedProvider::new()
                .reply(
                    Completion::handoff(HandoffRequest::new("Billing").reason("refund request"))
                        .with_content("Transferring you to billing"),
                )
                .reply(Completion::text("Your refund has been issued")),
        );
        let billing = Agent::builder("Billing")
            .instructions("You handle refunds.")
            .model("billing-model")
            .build()
            .unwrap();
        let triage = Agent::builder("Triage")
            .instructions("Route the customer.")
            .handoff(billing)
            .build()
            .unwrap();

        let result = runner.run(&triage, "I was charged twice").await.unwrap();

        assert_eq!(result.text(), Some("Your refund has been issued"));
        assert_eq!(result.metrics.handoffs, 1);
        assert_eq!(result.metrics.total_turns, 2);
        assert_eq!(result.last_agent, "Billing");

        let replies: Vec<_> = result
            .messages
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(
            replies,
            ["Transferring you to billing", "Your refund has been issued"]
        );

        let requests = provider.requests();
        assert_eq!(requests[0].agent, "Triage");
        assert_eq!(requests[1].agent, "Billing");
        assert_eq!(requests[1].model, "billing-model");
        assert_eq!(requests[1].turn, 2);
    }

    #[tokio::test]
    async fn unknown_tool_does_not_abort_siblings() {
        let (_, runner) = scripted(
            ScriptedProvider::new()
                .reply(Completion::tool_calls(vec![
                    call("c1", "add", json!({"a": 2, "b": 3})),
                    call("c2", "teleport", json!({"to": "mars"})),
                    call("c3", "echo", json!({"text": "hello"})),
                ]))
                .reply(Completion::text("done")),
        );
        let agent = Agent::builder("Worker")
            .tool(AddTool)
            .tool(echo(0))
            .build()
            .unwrap();

        let result = runner.run(&agent, "go").await.unwrap();

        let tool_messages: Vec<_> = result
            .messages
            .iter()
            .filter(|m| m.role == Role::Tool)
            .collect();
        assert_eq!(tool_messages.len(), 3);
        assert_eq!(tool_messages[0].tool_call_id(), Some("c1"));
        assert_eq!(tool_messages[0].content, "5");
        assert!(!tool_messages[0].is_tool_error());
        assert_eq!(tool_messages[1].tool_call_id(), Some("c2"));
        assert!(tool_messages[1].is_tool_error());
        assert!(tool_messages[1].content.contains("tool not found"));
        assert_eq!(tool_messages[2].tool_call_id(), Some("c3"));
        assert_eq!(tool_messages[2].content, "hello");
        assert_eq!(result.metrics.tool_calls, 3);
    }

    #[tokio::test]
    async fn structured_output_terminates() {
        let (_, runner) = scripted(
            ScriptedProvider::new()
                .reply(Completion::text("let me think"))
                .reply(Completion::structured(json!({"city": "Paris", "population": 2})))
        );
        let agent = Agent::builder("Geo")
            .output_schema(OutputSchema::new(
                "city",
                json!({"type": "object", "required": ["city", "population"]}),
            ))
            .build()
            .unwrap();

        let result = runner.run(&agent, "Largest French city?").await.unwrap();

        #[derive(Deserialize)]
        struct City {
            city: String,
            population: u32,
        }
        let city: City = result.parse().unwrap();
        assert_eq!(city.city, "Paris");
        assert_eq!(city.population, 2);
        assert_eq!(result.metrics.total_turns, 2);
    }
}

mod budgets {
    use super::*;

    #[tokio::test]
    async fn max_turns_is_exact() {
        let (provider, runner) = scripted(
            ScriptedProvider::new()
                .reply(Completion::tool_calls(vec![call("c", "echo", json!({"text": "again"}))]))
                .repeat_last(),
        );
        let runner = runner.with_config(RunConfig::new().max_turns(4));
        let agent = Agent::builder("Looper").tool(echo(0)).build().unwrap();

        let err = runner.run(&agent, "loop").await.unwrap_err();

        assert!(matches!(err.error, Error::MaxTurnsExceeded { max_turns: 4 }));
        assert_eq!(err.metrics.total_turns, 4);
        assert_eq!(err.metrics.tool_calls, 4);
        assert_eq!(provider.call_count(), 4);
    }

    #[tokio::test]
    async fn guardrail_on_second_turn_reports_one_turn() {
        let (provider, runner) = scripted(
            ScriptedProvider::new()
                .reply(Completion::tool_calls(vec![call(
                    "c1",
                    "echo",
                    json!({"text": "the password is hunter2"}),
                )]))
                .reply(Completion::text("unreachable")),
        );
        let agent = Agent::builder("Guarded")
            .tool(echo(0))
            .guardrail(MaxLengthGuardrail::new(500))
            .guardrail(KeywordGuardrail::new("privacy", ["password", "ssn"]))
            .build()
            .unwrap();

        let err = runner.run(&agent, "hello").await.unwrap_err();

        match &err.error {
            Error::GuardrailViolation { guardrail, reason } => {
                assert_eq!(guardrail, "privacy");
                assert!(reason.contains("password"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(err.metrics.total_turns, 1);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn usage_survives_failure() {
        let (_, runner) = scripted(
            ScriptedProvider::new()
                .reply(Completion::handoff(HandoffRequest::new("Ghost")).with_usage(Usage::new(7, 3))),
        );
        let agent = Agent::builder("A").build().unwrap();

        let err = runner.run(&agent, "q").await.unwrap_err();

        assert!(matches!(err.error, Error::HandoffNotFound { ref target } if target == "Ghost"));
        assert_eq!(err.metrics.total_tokens, 10);
        assert_eq!(err.metrics.total_turns, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_cancels_waiting_tool() {
        let waiter = FunctionTool::builder("wait")
            .handler(|ctx, _args| async move {
                ctx.cancelled().await;
                Err(ToolError::Cancelled)
            })
            .build();
        let (_, runner) = scripted(
            ScriptedProvider::new().reply(Completion::tool_calls(vec![call("w", "wait", json!({}))])),
        );
        let runner = runner.with_config(RunConfig::new().timeout(Duration::from_secs(2)));
        let agent = Agent::builder("A").tool(waiter).build().unwrap();

        let err = runner.run(&agent, "q").await.unwrap_err();

        assert!(matches!(err.error, Error::Timeout(d) if d == Duration::from_secs(2)));
        assert_eq!(err.metrics.total_turns, 1);
        assert_eq!(err.metrics.tool_calls, 1);
    }
}

mod dispatch_policies {
    use super::*;

    async fn tool_messages(parallel: bool) -> Vec<(String, String)> {
        let batch = vec![
            call("a", "echo", json!({"text": "slow"})),
            call("b", "add", json!({"a": 1, "b": 1})),
            call("c", "missing", json!({})),
            call("d", "add", json!({"a": "not a number", "b": 1})),
        ];
        let (_, runner) = scripted(
            ScriptedProvider::new()
                .reply(Completion::tool_calls(batch))
                .reply(Completion::text("ok")),
        );
        let runner = runner.with_config(RunConfig::new().parallel_tools(parallel));
        let agent = Agent::builder("A")
            .tool(echo(20))
            .tool(AddTool)
            .build()
            .unwrap();
        runner
            .run(&agent, "go")
            .await
            .unwrap()
            .messages
            .into_iter()
            .filter(|m| m.role == Role::Tool)
            .map(|m| (m.tool_call_id().unwrap().to_owned(), m.content))
            .collect()
    }

    #[tokio::test]
    async fn sequential_and_concurrent_agree() {
        let sequential = tool_messages(false).await;
        let concurrent = tool_messages(true).await;
        assert_eq!(sequential, concurrent);
        let ids: Vec<_> = concurrent.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c", "d"]);
        assert_eq!(concurrent[1].1, "2");
        assert!(concurrent[3].1.starts_with("Error: invalid arguments"));
    }

    #[tokio::test]
    async fn concurrent_batch_overlaps() {
        let batch = (0..4)
            .map(|i| call(&format!("c{i}"), "echo", json!({"text": i.to_string()})))
            .collect();
        let (_, runner) = scripted(
            ScriptedProvider::new()
                .reply(Completion::tool_calls(batch))
                .reply(Completion::text("ok")),
        );
        let agent = Agent::builder("A").tool(echo(100)).build().unwrap();

        let started = std::time::Instant::now();
        runner.run(&agent, "go").await.unwrap();

        assert!(started.elapsed() < Duration::from_millis(350));
    }
}

mod handoffs {
    use super::*;

    /// Hands off from Triage with context, then reports what the target sees.
    struct ContextInspector;

    #[async_trait]
    impl CompletionProvider for ContextInspector {
        async fn complete(
            &self,
            ctx: &RunContext,
            agent: &Agent,
            _messages: &[Message],
            tools: &[ToolDefinition],
        ) -> std::result::Result<Completion, ProviderError> {
            assert_eq!(ctx.agent_name(), agent.name());
            if agent.name() == "Triage" {
                return Ok(Completion::handoff(
                    HandoffRequest::new("Billing")
                        .with_context("account", "A-17")
                        .reason("billing question"),
                ));
            }
            let account = ctx.var("account").and_then(Value::as_str).unwrap_or("?");
            Ok(Completion::text(format!(
                "{} ({} tools) handles {account} for {}",
                agent.name(),
                tools.len(),
                ctx.var("tier").and_then(Value::as_str).unwrap_or("?"),
            )))
        }
    }

    #[tokio::test]
    async fn context_flows_into_variables() {
        let billing = Agent::builder("Billing").tool(AddTool).build().unwrap();
        let triage = Agent::builder("Triage").handoff(billing).build().unwrap();
        let runner = Runner::new(ContextInspector).with_config(RunConfig::new().variable("tier", "gold"));

        let result = runner.run(&triage, "help").await.unwrap();

        assert_eq!(result.text(), Some("Billing (1 tools) handles A-17 for gold"));
        assert_eq!(result.metrics.handoffs, 1);
    }

    #[tokio::test]
    async fn chained_handoffs_count_each_transfer() {
        let (_, runner) = scripted(
            ScriptedProvider::new()
                .for_agent("Front", Completion::handoff(HandoffRequest::new("Middle")))
                .for_agent("Middle", Completion::handoff(HandoffRequest::new("Back")))
                .for_agent("Back", Completion::text("resolved")),
        );
        let back = Agent::builder("Back").build().unwrap();
        let middle = Agent::builder("Middle").handoff(back).build().unwrap();
        let front = Agent::builder("Front").handoff(middle).build().unwrap();

        let result = runner.run(&front, "q").await.unwrap();

        assert_eq!(result.metrics.handoffs, 2);
        assert_eq!(result.metrics.total_turns, 3);
        assert_eq!(result.last_agent, "Back");
    }

    #[tokio::test]
    async fn target_guardrails_apply_after_handoff() {
        let (_, runner) = scripted(
            ScriptedProvider::new()
                .reply(Completion::handoff(HandoffRequest::new("Strict")).with_content("forbidden"))
                .reply(Completion::text("never")),
        );
        let strict = Agent::builder("Strict")
            .guardrail(KeywordGuardrail::new("strict", ["forbidden"]))
            .build()
            .unwrap();
        let lax = Agent::builder("Lax").handoff(strict).build().unwrap();

        let err = runner.run(&lax, "hi").await.unwrap_err();

        assert!(matches!(err.error, Error::GuardrailViolation { ref guardrail, .. } if guardrail == "strict"));
        assert_eq!(err.last_agent, "Strict");
        assert_eq!(err.metrics.handoffs, 1);
    }
}

mod validation {
    use super::*;

    #[test]
    fn cyclic_graph_rejected_at_build() {
        let inner_triage = Agent::builder("Triage").build().unwrap();
        let billing = Agent::builder("Billing").handoff(inner_triage).build().unwrap();
        let err = Agent::builder("Triage").handoff(billing).build().unwrap_err();
        assert!(matches!(err, ConfigError::CircularHandoff(ref name) if name == "Triage"));
        assert_eq!(err.to_string(), "circular handoff detected: Triage");
    }

    #[test]
    fn empty_identity_rejected() {
        assert!(matches!(Agent::builder("").build(), Err(ConfigError::EmptyName)));
        assert!(matches!(
            Agent::builder("A").model("").build(),
            Err(ConfigError::EmptyModel)
        ));
    }

    #[test]
    fn invalid_tool_rejected() {
        let nameless = FunctionTool::builder(" ")
            .sync_handler(|_args| Ok(Value::Null))
            .build();
        let err = Agent::builder("A").tool(nameless).build().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTool { .. }));
    }

    #[test]
    fn reachable_agents_listed_once() {
        let shared = Arc::new(Agent::builder("Shared").build().unwrap());
        let left = Agent::builder("Left").handoff(shared.clone()).build().unwrap();
        let right = Agent::builder("Right").handoff(shared).build().unwrap();
        let root = Agent::builder("Root").handoff(left).handoff(right).build().unwrap();
        assert_eq!(root.reachable_agents(), ["Root", "Left", "Shared", "Right"]);
    }
}
