//! Baton CLI - run and check agent scenarios offline.
//!
//! Scenarios are JSON files describing an agent graph and a scripted
//! provider; runner settings come from a TOML file plus `BATON_*`
//! environment overrides.

#![allow(clippy::print_stdout)] // CLI program intentionally uses stdout

mod scenario;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use baton::prelude::{FinalOutput, RunConfig, Runner, RunnerSettings};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::scenario::Scenario;

/// Baton - turn-execution runtime for tool-using agents
#[derive(Parser)]
#[command(name = "baton")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Runner settings file
    #[arg(short, long, env = "BATON_SETTINGS", default_value = "baton.toml", global = true)]
    settings: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario to completion
    Run(RunArgs),

    /// Build a scenario's agents and report configuration errors
    Validate(ValidateArgs),

    /// Print the effective runner settings
    Settings,
}

/// Arguments for the run command
#[derive(Args)]
struct RunArgs {
    /// Scenario file (JSON)
    scenario: PathBuf,

    /// Override the input from the scenario
    #[arg(short, long)]
    input: Option<String>,

    /// Dispatch tool calls one at a time
    #[arg(long)]
    sequential: bool,

    /// Print the full result as JSON
    #[arg(long)]
    json: bool,
}

/// Arguments for the validate command
#[derive(Args)]
struct ValidateArgs {
    /// Scenario file (JSON)
    scenario: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize logging with the given verbosity level.
fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("baton={level},baton_cli={level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbosity >= 2)
        .with_writer(std::io::stderr)
        .init();
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Run(args) => cmd_run(args, &cli.settings).await,
        Commands::Validate(args) => cmd_validate(args).await,
        Commands::Settings => cmd_settings(&cli.settings).await,
    }
}

/// Run a scenario.
async fn cmd_run(args: RunArgs, settings_path: &Path) -> Result<ExitCode> {
    let settings = RunnerSettings::load(settings_path)
        .await
        .context("failed to load settings")?;
    let scenario = Scenario::load(&args.scenario).await?;
    let agent = scenario.entry_agent()?;

    let mut config: RunConfig = settings.to_run_config();
    if args.sequential {
        config = config.parallel_tools(false);
    }
    if let Some(id) = &scenario.session_id {
        config = config.session_id(id.as_str());
    }

    let input = args.input.unwrap_or_else(|| scenario.input.clone());
    let runner = Runner::new(scenario.provider()).with_config(config);
    tracing::info!(agent = %agent.name(), "starting run");

    let (report, code) = match runner.run(&agent, input).await {
        Ok(result) => {
            let report = json!({
                "final_output": result.final_output,
                "last_agent": result.last_agent,
                "trace_id": result.trace_id,
                "session_id": result.session_id,
                "metrics": result.metrics,
                "messages": result.messages,
            });
            if !args.json {
                match &result.final_output {
                    FinalOutput::Text(text) => println!("{text}"),
                    FinalOutput::Structured(value) => {
                        println!("{}", serde_json::to_string_pretty(value)?);
                    }
                }
                println!();
                println!("agent:   {}", result.last_agent);
                println!("metrics: {}", result.metrics);
            }
            (report, ExitCode::SUCCESS)
        }
        Err(failure) => {
            let report = json!({
                "error": failure.error.to_string(),
                "last_agent": failure.last_agent,
                "trace_id": failure.trace_id,
                "metrics": failure.metrics,
                "messages": failure.messages,
            });
            if !args.json {
                println!("error:   {}", failure.error);
                println!("agent:   {}", failure.last_agent);
                println!("metrics: {}", failure.metrics);
            }
            (report, ExitCode::FAILURE)
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(code)
}

/// Check a scenario without running it.
async fn cmd_validate(args: ValidateArgs) -> Result<ExitCode> {
    let scenario = Scenario::load(&args.scenario).await?;
    let agents = scenario.build_agents()?;
    let entry = scenario.entry_agent()?;

    println!("Scenario is valid");
    println!("  agents:    {}", agents.len());
    println!("  entry:     {}", entry.name());
    println!("  reachable: {}", entry.reachable_agents().join(" -> "));
    println!("  replies:   {}", scenario.script.len());
    Ok(ExitCode::SUCCESS)
}

/// Print the effective settings.
async fn cmd_settings(settings_path: &Path) -> Result<ExitCode> {
    let settings = RunnerSettings::load(settings_path)
        .await
        .context("failed to load settings")?;
    println!("# {}", settings_path.display());
    print!("{}", settings.to_toml_string()?);
    Ok(ExitCode::SUCCESS)
}
