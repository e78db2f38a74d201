use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value as JsonValue;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::engine::Engine;
use crate::substrate::OperationRegistry;
use crate::types::Variables;

#[derive(Parser, Debug)]
#[command(name = "dslflow")]
#[command(about = "dslflow - run declarative workflow definitions", long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default search)
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a workflow definition to completion
    Run {
        /// Definition name or path to a definition file
        locator: String,

        /// Variable override as key=value (value parsed as JSON, else taken as a string)
        #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_var)]
        vars: Vec<(String, JsonValue)>,
    },

    /// Load and validate a workflow definition without running it
    Check {
        /// Definition name or path to a definition file
        locator: String,
    },
}

/// Parse a `key=value` override
pub fn parse_var(raw: &str) -> Result<(String, JsonValue), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty variable name in '{raw}'"));
    }
    let value =
        serde_json::from_str(value).unwrap_or_else(|_| JsonValue::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// Run the CLI by parsing process arguments
pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    run_cli_with_args(cli).await
}

/// Run the CLI with provided arguments
pub async fn run_cli_from_args(args: Vec<String>) -> Result<()> {
    let cli = Cli::parse_from(args);
    run_cli_with_args(cli).await
}

async fn run_cli_with_args(cli: Cli) -> Result<()> {
    // Load config up front so errors show before any command output
    let config = Config::builder()
        .config_path(cli.config.map(PathBuf::from))
        .build()
        .context("Failed to load configuration")?;

    let engine = Engine::local(&config, OperationRegistry::with_builtins());

    match cli.command {
        Commands::Run { locator, vars } => {
            let overrides: Variables = vars.into_iter().collect();

            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    eprintln!("Interrupted, cancelling run...");
                    on_interrupt.cancel();
                }
            });

            let outcome = engine
                .start_run_with_cancel(locator.as_str(), overrides, cancel)
                .await
                .with_context(|| format!("Workflow '{}' failed", locator))?;

            println!("✓ Workflow {} completed", outcome.workflow_id);
            println!("  Run: {}", outcome.run_id);
            println!(
                "  Duration: {}ms",
                (outcome.completed_at - outcome.started_at).num_milliseconds()
            );
            println!("\nVariables:");
            println!("{}", serde_json::to_string_pretty(&outcome.variables)?);
        }

        Commands::Check { locator } => {
            let definition = engine
                .loader()
                .load(&locator)
                .with_context(|| format!("Invalid workflow definition '{}'", locator))?;

            println!(
                "✓ {} is valid ({} statements, {} activities, {} variables)",
                definition.name,
                definition.root.node_count(),
                definition.root.activity_names().len(),
                definition.variables.len()
            );
            println!("  Version: {}", definition.version_hash);
        }
    }

    Ok(())
}
