//! Agent definition and its builder.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::handoff;
use crate::error::ConfigError;
use crate::guardrail::{BoxedGuardrail, Guardrail};
use crate::tool::{BoxedTool, DynTool, ToolSet};

/// Sampling parameters passed to the completion provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Model identifier.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum completion tokens.
    pub max_tokens: u32,
    /// Nucleus sampling mass.
    pub top_p: f32,
}

impl ModelSettings {
    /// Default model identifier.
    pub const DEFAULT_MODEL: &'static str = "gpt-4";
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model: Self::DEFAULT_MODEL.to_owned(),
            temperature: 0.7,
            max_tokens: 2000,
            top_p: 1.0,
        }
    }
}

/// Structured output contract for an agent.
///
/// An agent with an output schema only finishes a run when the provider
/// returns a structured value that passes [`validate`](Self::validate); plain
/// text replies keep the loop going.
///
/// ```rust,ignore
/// let schema = OutputSchema::new("invoice", json!({
///     "type": "object",
///     "properties": { "total": { "type": "number" } },
///     "required": ["total"]
/// }));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSchema {
    name: String,
    schema: Value,
    strict: bool,
}

impl OutputSchema {
    /// Creates a new output schema with strict mode enabled.
    #[must_use]
    pub fn new(name: impl Into<String>, schema: Value) -> Self {
        Self::with_strict(name, schema, true)
    }

    /// Creates a new output schema with strict mode explicitly set.
    #[must_use]
    pub fn with_strict(name: impl Into<String>, schema: Value, strict: bool) -> Self {
        Self {
            name: name.into(),
            schema,
            strict,
        }
    }

    /// Returns the schema name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the JSON Schema definition.
    #[must_use]
    pub const fn schema(&self) -> &Value {
        &self.schema
    }

    /// Returns whether strict mode is enabled.
    #[must_use]
    pub const fn is_strict(&self) -> bool {
        self.strict
    }

    /// Check `value` against the top-level `type` and `required` keys.
    ///
    /// Non-strict schemas accept any value.
    ///
    /// # Errors
    ///
    /// Returns a description of the first mismatch.
    pub fn validate(&self, value: &Value) -> Result<(), String> {
        if !self.strict {
            return Ok(());
        }
        if let Some(expected) = self.schema.get("type").and_then(Value::as_str)
            && !type_matches(expected, value)
        {
            return Err(format!("expected {expected}, got {}", type_name(value)));
        }
        if let Some(required) = self.schema.get("required").and_then(Value::as_array) {
            let object = value.as_object();
            for key in required.iter().filter_map(Value::as_str) {
                if !object.is_some_and(|o| o.contains_key(key)) {
                    return Err(format!("missing required field '{key}'"));
                }
            }
        }
        Ok(())
    }

    /// Creates an output schema from a type deriving [`schemars::JsonSchema`].
    ///
    /// The schema name is the type name.
    #[cfg(feature = "schema")]
    #[must_use]
    pub fn from_type<T: schemars::JsonSchema>() -> Self {
        let root = schemars::schema_for!(T);
        let mut schema_value = serde_json::to_value(&root).unwrap_or_default();

        if let Value::Object(ref mut map) = schema_value {
            map.remove("$schema");
        }

        Self::new(<T as schemars::JsonSchema>::schema_name(), schema_value)
    }
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        _ => true,
    }
}

const fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Instructions that guide the agent's behavior.
///
/// Either a static string, or a closure resolved against the agent name each
/// time a provider asks for them.
#[derive(Clone)]
pub enum Instructions {
    /// Static instruction string.
    Static(String),
    /// Dynamic instruction generator.
    Dynamic(Arc<dyn Fn(&str) -> String + Send + Sync>),
}

impl Instructions {
    /// Resolve the instructions to a string for the given agent name.
    #[must_use]
    pub fn resolve(&self, agent_name: &str) -> String {
        match self {
            Self::Static(s) => s.clone(),
            Self::Dynamic(f) => f(agent_name),
        }
    }
}

impl Default for Instructions {
    fn default() -> Self {
        Self::Static(String::new())
    }
}

impl fmt::Debug for Instructions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(s) => f.debug_tuple("Static").field(s).finish(),
            Self::Dynamic(_) => f.debug_tuple("Dynamic").field(&"<closure>").finish(),
        }
    }
}

impl<S: Into<String>> From<S> for Instructions {
    fn from(s: S) -> Self {
        Self::Static(s.into())
    }
}

/// A validated, immutable agent definition.
///
/// An `Agent` describes *what* the agent is: identity, sampling settings,
/// tools, guardrails, handoff targets and an optional output contract. The
/// [`Runner`](super::Runner) decides *how* it runs. Agents are built once with
/// [`Agent::builder`] and can then be shared (behind `Arc`) by any number of
/// concurrent runs.
///
/// # Examples
///
/// ```rust,ignore
/// let billing = Agent::builder("Billing")
///     .instructions("You handle refunds.")
///     .build()?;
///
/// let triage = Agent::builder("Triage")
///     .instructions("Route the customer to the right team.")
///     .handoff(billing)
///     .build()?;
/// ```
#[derive(Clone)]
pub struct Agent {
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) instructions: Instructions,
    pub(crate) settings: ModelSettings,
    pub(crate) tools: ToolSet,
    pub(crate) handoffs: Vec<Arc<Self>>,
    pub(crate) handoff_index: HashMap<String, usize>,
    pub(crate) guardrails: Vec<BoxedGuardrail>,
    pub(crate) output_schema: Option<OutputSchema>,
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("instructions", &self.instructions)
            .field("settings", &self.settings)
            .field("tools", &self.tools.names())
            .field(
                "handoffs",
                &self.handoffs.iter().map(|a| &a.name).collect::<Vec<_>>(),
            )
            .field(
                "guardrails",
                &self.guardrails.iter().map(|g| g.name()).collect::<Vec<_>>(),
            )
            .field(
                "output_schema",
                &self.output_schema.as_ref().map(OutputSchema::name),
            )
            .finish()
    }
}

impl Agent {
    /// Start building an agent named `name` with default model settings.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> AgentBuilder {
        AgentBuilder {
            agent: Self {
                name: name.into(),
                description: String::new(),
                instructions: Instructions::default(),
                settings: ModelSettings::default(),
                tools: ToolSet::new(),
                handoffs: Vec::new(),
                handoff_index: HashMap::new(),
                guardrails: Vec::new(),
                output_schema: None,
            },
        }
    }

    /// The agent name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human-readable description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The model identifier.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.settings.model
    }

    /// Sampling settings.
    #[must_use]
    pub const fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    /// Resolve the instructions for this agent.
    #[must_use]
    pub fn instructions(&self) -> String {
        self.instructions.resolve(&self.name)
    }

    /// Declared tools.
    #[must_use]
    pub const fn tools(&self) -> &ToolSet {
        &self.tools
    }

    /// Declared guardrails, in check order.
    #[must_use]
    pub fn guardrails(&self) -> &[BoxedGuardrail] {
        &self.guardrails
    }

    /// Declared handoff targets, in declaration order.
    #[must_use]
    pub fn handoffs(&self) -> &[Arc<Self>] {
        &self.handoffs
    }

    /// The structured output contract, if any.
    #[must_use]
    pub const fn output_schema(&self) -> Option<&OutputSchema> {
        self.output_schema.as_ref()
    }

    /// Look up a declared handoff target by name.
    #[must_use]
    pub fn get_handoff(&self, name: &str) -> Option<&Arc<Self>> {
        self.handoff_index.get(name).map(|&i| &self.handoffs[i])
    }

    /// Names of this agent and every agent reachable through handoffs.
    #[must_use]
    pub fn reachable_agents(&self) -> Vec<&str> {
        handoff::reachable(self)
    }

    /// Check name, model, tools and the handoff graph rooted here.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if self.settings.model.is_empty() {
            return Err(ConfigError::EmptyModel);
        }
        for tool in self.tools.iter() {
            tool.validate().map_err(|source| ConfigError::InvalidTool {
                tool: tool.name().to_owned(),
                source,
            })?;
        }
        handoff::check_acyclic(self)
    }

    fn reindex_handoffs(&mut self) {
        self.handoff_index = self
            .handoffs
            .iter()
            .enumerate()
            .map(|(i, a)| (a.name.clone(), i))
            .collect();
    }
}

/// Builder for [`Agent`]. Finalized with [`build`](Self::build).
#[derive(Debug)]
pub struct AgentBuilder {
    agent: Agent,
}

impl AgentBuilder {
    /// Set static or dynamic instructions.
    #[must_use]
    pub fn instructions(mut self, instructions: impl Into<Instructions>) -> Self {
        self.agent.instructions = instructions.into();
        self
    }

    /// Set instructions computed from the agent name.
    #[must_use]
    pub fn dynamic_instructions<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.agent.instructions = Instructions::Dynamic(Arc::new(f));
        self
    }

    /// Set the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.agent.description = description.into();
        self
    }

    /// Set the model identifier.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.agent.settings.model = model.into();
        self
    }

    /// Set the sampling temperature.
    #[must_use]
    pub const fn temperature(mut self, temperature: f32) -> Self {
        self.agent.settings.temperature = temperature;
        self
    }

    /// Set the completion token cap.
    #[must_use]
    pub const fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.agent.settings.max_tokens = max_tokens;
        self
    }

    /// Set the nucleus sampling mass.
    #[must_use]
    pub const fn top_p(mut self, top_p: f32) -> Self {
        self.agent.settings.top_p = top_p;
        self
    }

    /// Replace all sampling settings.
    #[must_use]
    pub fn settings(mut self, settings: ModelSettings) -> Self {
        self.agent.settings = settings;
        self
    }

    /// Declare a tool. A tool with the same name replaces the earlier one.
    #[must_use]
    pub fn tool<T: DynTool + 'static>(mut self, tool: T) -> Self {
        self.agent.tools.add(tool);
        self
    }

    /// Declare an already shared tool.
    #[must_use]
    pub fn tool_shared(mut self, tool: BoxedTool) -> Self {
        self.agent.tools.add_shared(tool);
        self
    }

    /// Declare a handoff target.
    ///
    /// Declaring two targets with the same name keeps both in
    /// [`Agent::handoffs`], but lookups resolve to the last one.
    #[must_use]
    pub fn handoff(mut self, agent: impl Into<Arc<Agent>>) -> Self {
        self.agent.handoffs.push(agent.into());
        self
    }

    /// Append a guardrail.
    #[must_use]
    pub fn guardrail<G: Guardrail + 'static>(mut self, guardrail: G) -> Self {
        self.agent.guardrails.push(Arc::new(guardrail));
        self
    }

    /// Append an already shared guardrail.
    #[must_use]
    pub fn guardrail_shared(mut self, guardrail: BoxedGuardrail) -> Self {
        self.agent.guardrails.push(guardrail);
        self
    }

    /// Require structured output conforming to `schema`.
    #[must_use]
    pub fn output_schema(mut self, schema: OutputSchema) -> Self {
        self.agent.output_schema = Some(schema);
        self
    }

    /// Require structured output shaped like `T`.
    #[cfg(feature = "schema")]
    #[must_use]
    pub fn output_type<T: schemars::JsonSchema>(self) -> Self {
        self.output_schema(OutputSchema::from_type::<T>())
    }

    /// Index the handoff targets and validate the agent.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the name or model is empty, a tool fails
    /// its own validation, or the handoff graph contains a cycle.
    pub fn build(self) -> Result<Agent, ConfigError> {
        let mut agent = self.agent;
        agent.reindex_handoffs();
        agent.validate()?;
        Ok(agent)
    }
}
