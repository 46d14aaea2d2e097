//! JSON scenario files: an agent graph plus a scripted provider.
//!
//! ```json
//! {
//!   "entry": "Triage",
//!   "input": "I was charged twice",
//!   "agents": [
//!     { "name": "Billing", "tools": ["echo"] },
//!     { "name": "Triage", "handoffs": ["Billing"], "blocked_keywords": ["password"] }
//!   ],
//!   "script": [
//!     { "handoff": { "target_agent": "Billing", "reason": "billing question" } },
//!     { "agent": "Billing", "text": "Refund issued" }
//!   ]
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use baton::prelude::*;
use serde::Deserialize;
use serde_json::Value;

/// A runnable scenario.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    /// Name of the agent that receives the input.
    pub entry: String,
    /// The user input.
    pub input: String,
    /// Session identifier reported on the result.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Agent definitions, in any order.
    pub agents: Vec<AgentSpec>,
    /// Provider replies, served in order.
    #[serde(default)]
    pub script: Vec<ScriptStep>,
    /// Repeat the last reply once the script runs out.
    #[serde(default)]
    pub repeat_last: bool,
}

/// One agent definition.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentSpec {
    pub name: String,
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Built-in tools by name.
    #[serde(default)]
    pub tools: Vec<String>,
    /// Names of agents this one may hand off to.
    #[serde(default)]
    pub handoffs: Vec<String>,
    /// Case-insensitive blocklist checked before every turn.
    #[serde(default)]
    pub blocked_keywords: Vec<String>,
    /// JSON schema the final output must satisfy.
    #[serde(default)]
    pub output_schema: Option<Value>,
}

/// One scripted provider reply.
#[derive(Debug, Deserialize)]
pub struct ScriptStep {
    /// Serve this step only while the named agent is active.
    #[serde(default)]
    pub agent: Option<String>,
    #[serde(default)]
    pub usage: Option<Usage>,
    #[serde(flatten)]
    pub reply: Reply,
}

/// What the provider answers.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reply {
    Text(String),
    ToolCalls(Vec<ToolCall>),
    Handoff(HandoffRequest),
    Structured(Value),
    /// A provider failure with this message.
    Error(String),
}

impl Scenario {
    /// Parse a scenario from JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid scenario.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("invalid scenario")
    }

    /// Read and parse a scenario file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub async fn load(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        Self::from_json(&text)
    }

    /// Build every agent, resolving handoffs by name.
    ///
    /// # Errors
    ///
    /// Returns an error on duplicate or unknown agent names, unknown tools,
    /// cyclic handoffs, or any agent configuration error.
    pub fn build_agents(&self) -> Result<HashMap<String, Arc<Agent>>> {
        let mut specs = HashMap::new();
        for spec in &self.agents {
            if specs.insert(spec.name.as_str(), spec).is_some() {
                bail!("duplicate agent '{}'", spec.name);
            }
        }

        let mut graph = Graph {
            specs,
            built: HashMap::new(),
            path: HashSet::new(),
        };
        for spec in &self.agents {
            graph.build(&spec.name)?;
        }
        Ok(graph.built)
    }

    /// The entry agent.
    ///
    /// # Errors
    ///
    /// Returns an error if the agents fail to build or `entry` is not one of them.
    pub fn entry_agent(&self) -> Result<Arc<Agent>> {
        let mut agents = self.build_agents()?;
        agents
            .remove(&self.entry)
            .with_context(|| format!("entry agent '{}' is not defined", self.entry))
    }

    /// A provider replaying the script.
    #[must_use]
    pub fn provider(&self) -> ScriptedProvider {
        let provider = self.script.iter().fold(ScriptedProvider::new(), |provider, step| {
            let completion = match &step.reply {
                Reply::Text(text) => Completion::text(text.as_str()),
                Reply::ToolCalls(calls) => Completion::tool_calls(calls.clone()),
                Reply::Handoff(request) => Completion::handoff(request.clone()),
                Reply::Structured(value) => Completion::structured(value.clone()),
                Reply::Error(message) => {
                    return provider.fail(ProviderError::provider("scripted", message.as_str()));
                }
            };
            let completion = completion.with_usage(step.usage.unwrap_or_default());
            match &step.agent {
                Some(agent) => provider.for_agent(agent.as_str(), completion),
                None => provider.reply(completion),
            }
        });
        if self.repeat_last {
            provider.repeat_last()
        } else {
            provider
        }
    }
}

struct Graph<'a> {
    specs: HashMap<&'a str, &'a AgentSpec>,
    built: HashMap<String, Arc<Agent>>,
    path: HashSet<&'a str>,
}

impl<'a> Graph<'a> {
    fn build(&mut self, name: &'a str) -> Result<Arc<Agent>> {
        if let Some(agent) = self.built.get(name) {
            return Ok(Arc::clone(agent));
        }
        if !self.path.insert(name) {
            return Err(ConfigError::CircularHandoff(name.to_owned()).into());
        }
        let spec = *self
            .specs
            .get(name)
            .with_context(|| format!("unknown agent '{name}'"))?;

        let mut builder = Agent::builder(&spec.name).instructions(spec.instructions.as_str());
        if let Some(model) = &spec.model {
            builder = builder.model(model.as_str());
        }
        for tool in &spec.tools {
            builder = match tool.as_str() {
                "echo" => builder.tool(echo_tool()),
                other => bail!("agent '{name}' declares unknown tool '{other}'"),
            };
        }
        if !spec.blocked_keywords.is_empty() {
            builder = builder.guardrail(KeywordGuardrail::new(
                format!("{name}.blocklist"),
                spec.blocked_keywords.iter().map(String::as_str),
            ));
        }
        if let Some(schema) = &spec.output_schema {
            builder = builder.output_schema(OutputSchema::new(format!("{name}.output"), schema.clone()));
        }
        for target in &spec.handoffs {
            builder = builder.handoff(self.build(target)?);
        }

        let agent = Arc::new(
            builder
                .build()
                .with_context(|| format!("invalid agent '{name}'"))?,
        );
        self.path.remove(name);
        self.built.insert(name.to_owned(), Arc::clone(&agent));
        Ok(agent)
    }
}

/// Returns its `text` argument unchanged.
fn echo_tool() -> FunctionTool {
    FunctionTool::builder("echo")
        .description("Echo the text back")
        .parameters(ParameterSchema::object().required_property("text", PropertySchema::string("Text to echo")))
        .sync_handler(|args| Ok(args.get("text").cloned().unwrap_or_default()))
        .build()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use serde_json::json;

    use super::*;

    fn scenario(value: &Value) -> Scenario {
        Scenario::from_json(&value.to_string()).unwrap()
    }

    mod parsing {
        use super::*;

        #[test]
        fn reads_every_reply_kind() {
            let s = scenario(&json!({
                "entry": "A",
                "input": "hi",
                "agents": [{ "name": "A" }],
                "script": [
                    { "text": "hello", "usage": { "prompt_tokens": 3, "completion_tokens": 1, "total_tokens": 4 } },
                    { "tool_calls": [{ "id": "c1", "name": "echo", "arguments": { "text": "x" } }] },
                    { "handoff": { "target_agent": "B" } },
                    { "structured": { "ok": true } },
                    { "agent": "A", "error": "down" }
                ]
            }));
            assert_eq!(s.script.len(), 5);
            assert!(matches!(s.script[1].reply, Reply::ToolCalls(ref c) if c[0].name == "echo"));
            assert_eq!(s.script[4].agent.as_deref(), Some("A"));
            assert_eq!(s.script[0].usage.unwrap().total_tokens, 4);
        }

        #[test]
        fn unknown_scenario_keys_rejected() {
            let err = Scenario::from_json(r#"{"entry":"A","input":"x","agents":[],"extra":1}"#);
            assert!(err.is_err());
        }
    }

    mod graph {
        use super::*;

        #[test]
        fn resolves_handoffs_in_any_order() {
            let s = scenario(&json!({
                "entry": "Triage",
                "input": "x",
                "agents": [
                    { "name": "Triage", "handoffs": ["Billing", "Support"] },
                    { "name": "Billing", "tools": ["echo"] },
                    { "name": "Support", "handoffs": ["Billing"] }
                ]
            }));
            let agents = s.build_agents().unwrap();
            assert_eq!(agents.len(), 3);
            let triage = s.entry_agent().unwrap();
            assert_eq!(triage.reachable_agents(), ["Triage", "Billing", "Support"]);
            assert!(agents["Billing"].tools().contains("echo"));
        }

        #[test]
        fn cycle_is_reported() {
            let s = scenario(&json!({
                "entry": "A",
                "input": "x",
                "agents": [
                    { "name": "A", "handoffs": ["B"] },
                    { "name": "B", "handoffs": ["A"] }
                ]
            }));
            let err = s.build_agents().unwrap_err();
            assert!(err.to_string().contains("circular handoff"));
        }

        #[test]
        fn unknown_tool_and_agent_rejected() {
            let tool = scenario(&json!({
                "entry": "A", "input": "x",
                "agents": [{ "name": "A", "tools": ["shell"] }]
            }));
            assert!(tool.build_agents().unwrap_err().to_string().contains("shell"));

            let missing = scenario(&json!({
                "entry": "A", "input": "x",
                "agents": [{ "name": "A", "handoffs": ["Ghost"] }]
            }));
            assert!(missing.build_agents().unwrap_err().to_string().contains("Ghost"));
        }

        #[test]
        fn missing_entry_rejected() {
            let s = scenario(&json!({
                "entry": "Nobody", "input": "x",
                "agents": [{ "name": "A" }]
            }));
            assert!(s.entry_agent().is_err());
        }
    }

    mod running {
        use super::*;

        #[tokio::test]
        async fn triage_scenario_completes() {
            let s = scenario(&json!({
                "entry": "Triage",
                "input": "I was charged twice",
                "agents": [
                    { "name": "Triage", "handoffs": ["Billing"] },
                    { "name": "Billing", "tools": ["echo"] }
                ],
                "script": [
                    { "handoff": { "target_agent": "Billing", "reason": "billing" } },
                    { "agent": "Billing", "tool_calls": [{ "id": "c1", "name": "echo", "arguments": { "text": "refund" } }] },
                    { "agent": "Billing", "text": "Refund issued" }
                ]
            }));
            let runner = Runner::new(s.provider());
            let result = runner.run(&s.entry_agent().unwrap(), &s.input).await.unwrap();
            assert_eq!(result.text(), Some("Refund issued"));
            assert_eq!(result.last_agent, "Billing");
            assert_eq!(result.metrics.handoffs, 1);
            assert_eq!(result.metrics.tool_calls, 1);
        }

        #[tokio::test]
        async fn blocked_keyword_stops_run() {
            let s = scenario(&json!({
                "entry": "A",
                "input": "my password is hunter2",
                "agents": [{ "name": "A", "blocked_keywords": ["Password"] }],
                "script": [{ "text": "never" }]
            }));
            let runner = Runner::new(s.provider());
            let err = runner.run(&s.entry_agent().unwrap(), &s.input).await.unwrap_err();
            assert!(matches!(err.error, Error::GuardrailViolation { .. }));
        }
    }
}
