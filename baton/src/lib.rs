//! Baton - a turn-execution engine for LLM agents.
//!
//! Given a user request, a [`Runner`](agent::Runner) drives a multi-turn
//! conversation with a pluggable [`CompletionProvider`](provider::CompletionProvider),
//! dispatches the tool calls it requests, enforces guardrails, and follows
//! handoffs between specialized agents until a final output is reached.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`agent`] | Agent definitions, run configuration and the runner |
//! | [`tool`] | Tool traits, function tools and tool sets |
//! | [`guardrail`] | Content validators checked before each turn |
//! | [`provider`] | The completion backend boundary and a scripted backend |
//! | [`session`] | Conversation history storage |
//! | [`trace`] | Span hooks emitted around runs |
//! | [`config`] | TOML/environment runner settings |

pub mod agent;
pub mod config;
pub mod error;
pub mod guardrail;
pub mod message;
pub mod prelude;
pub mod provider;
pub mod session;
pub mod tool;
pub mod trace;
pub mod usage;

pub use error::{ConfigError, Error, ProviderError, Result, ToolError};
