//! Tool traits and the context tools execute under.
//!
//! Tools are the capabilities an agent exposes to the completion provider.
//! Two traits describe them:
//!
//! - [`Tool`] is the typed form with associated argument and output types.
//! - [`DynTool`] is the object-safe form the runner dispatches through. Every
//!   [`Tool`] is a [`DynTool`] via a blanket impl.
//!
//! [`FunctionTool`] builds a tool from a closure with an explicit schema.

mod function;
mod schema;
mod set;

pub use function::{FunctionTool, FunctionToolBuilder};
pub use schema::{ParameterSchema, PropertySchema};
pub use set::ToolSet;

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::error::ToolError;

/// A type alias for `Result<T, ToolError>`.
pub type ToolResult<T> = Result<T, ToolError>;

/// A shared dynamic tool.
pub type BoxedTool = Arc<dyn DynTool>;

/// Definition of a tool as presented to a completion provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    /// Name of the tool.
    pub name: String,
    /// What the tool does.
    pub description: String,
    /// Argument schema.
    pub parameters: ParameterSchema,
}

impl ToolDefinition {
    /// Create a new tool definition.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ParameterSchema,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// Serializes to the function-calling shape most chat APIs accept:
/// `{"type": "function", "function": {"name", "description", "parameters"}}`.
impl Serialize for ToolDefinition {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;

        let mut function = Map::new();
        function.insert("name".to_owned(), Value::String(self.name.clone()));
        function.insert(
            "description".to_owned(),
            Value::String(self.description.clone()),
        );
        function.insert("parameters".to_owned(), self.parameters.to_value());

        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("type", "function")?;
        map.serialize_entry("function", &function)?;
        map.end()
    }
}

/// Per-call execution context handed to a tool.
#[derive(Clone)]
pub struct ToolContext {
    /// Id of the tool call being served.
    pub tool_call_id: String,
    /// Name of the agent that declared the tool.
    pub agent_name: String,
    /// Turn index (1-based) the call belongs to.
    pub turn: usize,
    /// Run deadline, if any.
    pub deadline: Option<Instant>,
    cancellation: CancellationToken,
}

impl ToolContext {
    /// Create a context bound to `cancellation`.
    #[must_use]
    pub fn new(
        tool_call_id: impl Into<String>,
        agent_name: impl Into<String>,
        turn: usize,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            agent_name: agent_name.into(),
            turn,
            deadline: None,
            cancellation,
        }
    }

    /// Attach the run deadline.
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Whether the run has been cancelled or has timed out.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Resolves once the run is cancelled.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await;
    }

    /// The token shared by every call in the run.
    #[must_use]
    pub const fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }
}

impl fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolContext")
            .field("tool_call_id", &self.tool_call_id)
            .field("agent_name", &self.agent_name)
            .field("turn", &self.turn)
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// A tool with statically typed arguments and output.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Static name of the tool.
    const NAME: &'static str;

    /// Arguments type for the tool.
    type Args: for<'de> Deserialize<'de> + Send;

    /// Output type of the tool.
    type Output: Serialize + Send;

    /// Error type for tool execution.
    type Error: Into<ToolError> + Send;

    /// Get the description of the tool.
    fn description(&self) -> String;

    /// Get the parameter schema.
    fn parameters(&self) -> ParameterSchema;

    /// Execute the tool.
    async fn call(&self, ctx: &ToolContext, args: Self::Args) -> Result<Self::Output, Self::Error>;
}

/// Object-safe tool interface used by agents and the runner.
#[async_trait]
pub trait DynTool: Send + Sync {
    /// Get the name of the tool.
    fn name(&self) -> &str;

    /// Get the description of the tool.
    fn description(&self) -> String;

    /// Get the parameter schema.
    fn schema(&self) -> ParameterSchema;

    /// Execute with JSON arguments.
    async fn execute(&self, ctx: &ToolContext, args: Map<String, Value>) -> ToolResult<Value>;

    /// Check the tool's own definition.
    ///
    /// # Errors
    ///
    /// Fails on an empty name or a malformed schema.
    fn validate(&self) -> ToolResult<()> {
        if self.name().trim().is_empty() {
            return Err(ToolError::invalid_definition("tool name cannot be empty"));
        }
        self.schema().validate()
    }

    /// Get the provider-facing definition.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description(), self.schema())
    }
}

#[async_trait]
impl<T: Tool + 'static> DynTool for T {
    fn name(&self) -> &str {
        T::NAME
    }

    fn description(&self) -> String {
        Tool::description(self)
    }

    fn schema(&self) -> ParameterSchema {
        self.parameters()
    }

    async fn execute(&self, ctx: &ToolContext, args: Map<String, Value>) -> ToolResult<Value> {
        let typed: T::Args = serde_json::from_value(Value::Object(args))?;
        let output = self.call(ctx, typed).await.map_err(Into::into)?;
        serde_json::to_value(output).map_err(|e| ToolError::execution(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Add;

    #[derive(Deserialize)]
    struct AddArgs {
        a: i64,
        b: i64,
    }

    #[async_trait]
    impl Tool for Add {
        const NAME: &'static str = "add";
        type Args = AddArgs;
        type Output = i64;
        type Error = ToolError;

        fn description(&self) -> String {
            "Add two integers".into()
        }

        fn parameters(&self) -> ParameterSchema {
            ParameterSchema::object()
                .required_property("a", PropertySchema::integer("left"))
                .required_property("b", PropertySchema::integer("right"))
        }

        async fn call(&self, _ctx: &ToolContext, args: AddArgs) -> Result<i64, ToolError> {
            Ok(args.a + args.b)
        }
    }

    fn ctx() -> ToolContext {
        ToolContext::new("call_1", "Math", 1, CancellationToken::new())
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    mod typed_tool {
        use super::*;

        #[tokio::test]
        async fn executes_with_typed_args() {
            let out = Add.execute(&ctx(), args(json!({"a": 2, "b": 3}))).await;
            assert_eq!(out.unwrap(), json!(5));
        }

        #[tokio::test]
        async fn bad_args_are_invalid_arguments() {
            let err = Add
                .execute(&ctx(), args(json!({"a": "x"})))
                .await
                .unwrap_err();
            assert!(matches!(err, ToolError::InvalidArguments(_)));
        }

        #[test]
        fn validates_and_defines() {
            assert!(DynTool::validate(&Add).is_ok());
            let def = Add.definition();
            assert_eq!(def.name, "add");
            assert_eq!(def.parameters.required.len(), 2);
        }

        #[test]
        fn usable_as_boxed_tool() {
            let tool: BoxedTool = Arc::new(Add);
            assert_eq!(tool.name(), "add");
        }
    }

    mod tool_definition {
        use super::*;

        #[test]
        fn serializes_function_shape() {
            let def = ToolDefinition::new("noop", "Does nothing", ParameterSchema::object());
            let value = serde_json::to_value(def).unwrap();
            assert_eq!(value["type"], "function");
            assert_eq!(value["function"]["name"], "noop");
            assert_eq!(value["function"]["parameters"]["type"], "object");
        }
    }

    mod tool_context {
        use super::*;

        #[tokio::test]
        async fn observes_cancellation() {
            let token = CancellationToken::new();
            let ctx = ToolContext::new("c", "A", 1, token.clone());
            assert!(!ctx.is_cancelled());
            token.cancel();
            ctx.cancelled().await;
            assert!(ctx.is_cancelled());
        }
    }
}
