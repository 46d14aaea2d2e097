//! Conversation data types exchanged between the runner, providers and tools.
//!
//! History is an ordered, append-only `Vec<Message>` within a run. Providers
//! receive the full ordered history on every turn.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ToolError;

/// Metadata key carrying the originating tool call id on tool messages.
pub const TOOL_CALL_ID_KEY: &str = "tool_call_id";

/// Metadata key marking a tool message whose call failed.
pub const IS_ERROR_KEY: &str = "is_error";

/// Role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User message.
    User,
    /// Assistant (model) message.
    Assistant,
    /// Tool result message.
    Tool,
}

impl Role {
    /// Get the string representation of the role.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tool invocation requested by the completion provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Correlation token, unique within a turn.
    pub id: String,
    /// Name of the tool to invoke.
    pub name: String,
    /// Arguments keyed by parameter name.
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolCall {
    /// Create a tool call.
    ///
    /// Non-object `arguments` are wrapped as `{"input": arguments}`; `null`
    /// becomes an empty map.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        let arguments = match arguments {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => Map::from_iter([("input".to_owned(), other)]),
        };
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Deserialize the arguments into a typed value.
    ///
    /// # Errors
    ///
    /// Returns an error when the arguments do not match `T`.
    pub fn parse_arguments<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.arguments.clone()))
    }
}

/// The outcome of one tool call. Exactly one is produced per [`ToolCall`].
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResponse {
    /// Id of the originating tool call.
    pub tool_call_id: String,
    /// Name of the tool that was requested.
    pub tool_name: String,
    /// Success payload or the call's error.
    pub result: Result<Value, ToolError>,
}

impl ToolResponse {
    /// Create a successful response.
    #[must_use]
    pub fn success(call: &ToolCall, content: Value) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            result: Ok(content),
        }
    }

    /// Create a failed response.
    #[must_use]
    pub fn failure(call: &ToolCall, error: ToolError) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            result: Err(error),
        }
    }

    /// Whether the call failed.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.result.is_err()
    }

    /// Render the payload as message text.
    ///
    /// Strings are used verbatim, other values as compact JSON, errors as
    /// `Error: <message>`.
    #[must_use]
    pub fn content(&self) -> String {
        match &self.result {
            Ok(Value::String(s)) => s.clone(),
            Ok(value) => value.to_string(),
            Err(err) => format!("Error: {err}"),
        }
    }
}

/// A request to transfer control to another agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffRequest {
    /// Name of the target agent.
    pub target_agent: String,
    /// Optional values merged into the run's variables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Map<String, Value>>,
    /// Human-readable reason for the transfer.
    #[serde(default)]
    pub reason: String,
}

impl HandoffRequest {
    /// Create a handoff request to `target_agent`.
    #[must_use]
    pub fn new(target_agent: impl Into<String>) -> Self {
        Self {
            target_agent: target_agent.into(),
            context: None,
            reason: String::new(),
        }
    }

    /// Set the reason.
    #[must_use]
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    /// Add a context entry.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }
}

/// A single conversation message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// The role of the message author.
    pub role: Role,
    /// Text content.
    #[serde(default)]
    pub content: String,
    /// Tool calls requested by the assistant, in request order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Free-form metadata; tool messages carry their call id here.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    /// Creation time.
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a message with the given role and content.
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            metadata: Map::new(),
            timestamp: Utc::now(),
        }
    }

    /// Create a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a tool message from a tool response.
    #[must_use]
    pub fn tool(response: &ToolResponse) -> Self {
        let mut msg = Self::new(Role::Tool, response.content());
        msg.metadata.insert(
            TOOL_CALL_ID_KEY.to_owned(),
            Value::String(response.tool_call_id.clone()),
        );
        if response.is_error() {
            msg.metadata.insert(IS_ERROR_KEY.to_owned(), Value::Bool(true));
        }
        msg
    }

    /// Attach tool calls.
    #[must_use]
    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    /// Insert a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The originating tool call id, for tool messages.
    #[must_use]
    pub fn tool_call_id(&self) -> Option<&str> {
        self.metadata.get(TOOL_CALL_ID_KEY).and_then(Value::as_str)
    }

    /// Whether this is a tool message recording a failed call.
    #[must_use]
    pub fn is_tool_error(&self) -> bool {
        self.role == Role::Tool
            && self
                .metadata
                .get(IS_ERROR_KEY)
                .and_then(Value::as_bool)
                .unwrap_or(false)
    }

    /// Check if the message requests tool calls.
    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}
