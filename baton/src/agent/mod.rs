//! Agents and the runner that drives them.
//!
//! This module implements a **Runner-driven, handoff-based** architecture:
//!
//! - **[`Agent`]** is an immutable definition: identity, model settings,
//!   tools, guardrails, handoff targets and an optional output contract.
//!   Built once with [`Agent::builder`] and validated at construction, so a
//!   cyclic handoff graph never reaches a run.
//! - **[`Runner`]** owns the turn loop. It asks the completion provider for
//!   the next turn, checks guardrails, dispatches tool calls (concurrently by
//!   default) and follows handoffs, until a final output or a fatal error.
//! - **Handoffs** transfer control to another agent mid-run. The history is
//!   shared; the new agent's instructions, tools and guardrails apply from
//!   the next turn.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use baton::prelude::*;
//!
//! let billing = Agent::builder("Billing")
//!     .instructions("You resolve billing questions.")
//!     .build()?;
//! let triage = Agent::builder("Triage")
//!     .instructions("Route the customer.")
//!     .handoff(billing)
//!     .build()?;
//!
//! let runner = Runner::new(provider).with_config(RunConfig::new().max_turns(5));
//! let result = runner.run(&triage, "I was charged twice").await?;
//! println!("{} ({})", result.final_output, result.metrics);
//! ```

mod config;
mod context;
mod dispatch;
mod handoff;
mod options;
mod result;
mod runner;

pub use config::{Agent, AgentBuilder, Instructions, ModelSettings, OutputSchema};
pub use context::RunContext;
pub use options::RunConfig;
pub use result::{FinalOutput, RunError, RunMetrics, RunResult};
pub use runner::{RunHandle, Runner};
