//! Closure-backed tools with an explicit schema.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::{Map, Value};

use super::{DynTool, ParameterSchema, ToolContext, ToolResult};
use crate::error::ToolError;

type Handler = Arc<
    dyn Fn(ToolContext, Map<String, Value>) -> BoxFuture<'static, ToolResult<Value>> + Send + Sync,
>;

/// A tool whose behavior is an async closure.
///
/// ```rust,ignore
/// let echo = FunctionTool::builder("echo")
///     .description("Echo the input back")
///     .parameters(ParameterSchema::object().required_property("text", PropertySchema::string("Text")))
///     .handler(|_ctx, args| async move { Ok(args["text"].clone()) })
///     .build();
/// ```
#[derive(Clone)]
pub struct FunctionTool {
    name: String,
    description: String,
    parameters: ParameterSchema,
    handler: Option<Handler>,
}

impl FunctionTool {
    /// Start building a tool named `name`.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> FunctionToolBuilder {
        FunctionToolBuilder {
            name: name.into(),
            description: String::new(),
            parameters: ParameterSchema::object(),
            handler: None,
        }
    }
}

impl fmt::Debug for FunctionTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("has_handler", &self.handler.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DynTool for FunctionTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        self.description.clone()
    }

    fn schema(&self) -> ParameterSchema {
        self.parameters.clone()
    }

    async fn execute(&self, ctx: &ToolContext, args: Map<String, Value>) -> ToolResult<Value> {
        let Some(handler) = &self.handler else {
            return Err(ToolError::invalid_definition(format!(
                "tool '{}' has no handler",
                self.name
            )));
        };
        self.parameters.check_arguments(&args)?;
        handler(ctx.clone(), args).await
    }

    fn validate(&self) -> ToolResult<()> {
        if self.name.trim().is_empty() {
            return Err(ToolError::invalid_definition("tool name cannot be empty"));
        }
        if self.handler.is_none() {
            return Err(ToolError::invalid_definition(format!(
                "tool '{}' has no handler",
                self.name
            )));
        }
        self.parameters.validate()
    }
}

/// Builder for [`FunctionTool`].
pub struct FunctionToolBuilder {
    name: String,
    description: String,
    parameters: ParameterSchema,
    handler: Option<Handler>,
}

impl FunctionToolBuilder {
    /// Set the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the parameter schema.
    #[must_use]
    pub fn parameters(mut self, parameters: ParameterSchema) -> Self {
        self.parameters = parameters;
        self
    }

    /// Set an async handler.
    #[must_use]
    pub fn handler<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(ToolContext, Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ToolResult<Value>> + Send + 'static,
    {
        self.handler = Some(Arc::new(
            move |ctx: ToolContext, args: Map<String, Value>| f(ctx, args).boxed(),
        ));
        self
    }

    /// Set a synchronous handler over the arguments alone.
    #[must_use]
    pub fn sync_handler<F>(mut self, f: F) -> Self
    where
        F: Fn(Map<String, Value>) -> ToolResult<Value> + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(move |_ctx: ToolContext, args: Map<String, Value>| {
            let out = f(args);
            async move { out }.boxed()
        }));
        self
    }

    /// Finish the tool. Problems surface through [`DynTool::validate`].
    #[must_use]
    pub fn build(self) -> FunctionTool {
        FunctionTool {
            name: self.name,
            description: self.description,
            parameters: self.parameters,
            handler: self.handler,
        }
    }
}

impl fmt::Debug for FunctionToolBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionToolBuilder")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::tool::PropertySchema;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    fn echo() -> FunctionTool {
        FunctionTool::builder("echo")
            .description("Echo the text")
            .parameters(
                ParameterSchema::object().required_property("text", PropertySchema::string("Text")),
            )
            .handler(|_ctx, args| async move { Ok(args["text"].clone()) })
            .build()
    }

    fn ctx() -> ToolContext {
        ToolContext::new("c1", "A", 1, CancellationToken::new())
    }

    #[tokio::test]
    async fn runs_async_handler() {
        let args = json!({"text": "hi"}).as_object().cloned().unwrap();
        assert_eq!(echo().execute(&ctx(), args).await.unwrap(), json!("hi"));
    }

    #[tokio::test]
    async fn runs_sync_handler() {
        let tool = FunctionTool::builder("len")
            .sync_handler(|args| Ok(json!(args.len())))
            .build();
        let args = json!({"a": 1, "b": 2}).as_object().cloned().unwrap();
        assert_eq!(tool.execute(&ctx(), args).await.unwrap(), json!(2));
    }

    #[tokio::test]
    async fn missing_required_argument_rejected() {
        let err = echo().execute(&ctx(), Map::new()).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn handler_sees_call_context() {
        let tool = FunctionTool::builder("whoami")
            .handler(|ctx, _| async move { Ok(json!(ctx.tool_call_id)) })
            .build();
        assert_eq!(
            tool.execute(&ctx(), Map::new()).await.unwrap(),
            json!("c1")
        );
    }

    #[test]
    fn validate_accepts_complete_tool() {
        assert!(echo().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_name() {
        let tool = FunctionTool::builder(" ")
            .sync_handler(|_| Ok(Value::Null))
            .build();
        let err = tool.validate().unwrap_err();
        assert!(err.to_string().contains("name cannot be empty"));
    }

    #[test]
    fn validate_rejects_missing_handler() {
        let tool = FunctionTool::builder("orphan").build();
        assert!(tool.validate().is_err());
    }

    #[test]
    fn validate_rejects_undeclared_required() {
        let mut schema = ParameterSchema::object();
        schema.required.push("x".into());
        let tool = FunctionTool::builder("bad")
            .parameters(schema)
            .sync_handler(|_| Ok(Value::Null))
            .build();
        assert!(tool.validate().is_err());
    }
}
