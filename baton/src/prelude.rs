//! Prelude module for convenient imports.
//!
//! ```rust,ignore
//! use baton::prelude::*;
//! ```

pub use crate::agent::{
    Agent, AgentBuilder, FinalOutput, Instructions, ModelSettings, OutputSchema, RunConfig,
    RunContext, RunError, RunHandle, RunMetrics, RunResult, Runner,
};
pub use crate::config::{RunnerSettings, SettingsError};
pub use crate::error::{ConfigError, Error, ProviderError, ProviderErrorKind, Result, ToolError};
pub use crate::guardrail::{
    BoxedGuardrail, FnGuardrail, Guardrail, GuardrailResult, KeywordGuardrail, MaxLengthGuardrail,
    PatternGuardrail, Rejection,
};
pub use crate::message::{HandoffRequest, Message, Role, ToolCall, ToolResponse};
pub use crate::provider::{Completion, CompletionProvider, ScriptedProvider, SharedProvider};
#[cfg(feature = "sqlite")]
pub use crate::session::SqliteSession;
pub use crate::session::{InMemorySession, Session, SessionError, SharedSession};
pub use crate::tool::{
    BoxedTool, DynTool, FunctionTool, ParameterSchema, PropertySchema, Tool, ToolContext,
    ToolDefinition, ToolSet,
};
pub use crate::trace::{LogTracer, NoopTracer, Span, SpanContext, Tracer};
pub use crate::usage::Usage;
