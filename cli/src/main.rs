// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # PingPong Player CLI
//!
//! The `pingpong` binary runs one side of a two-player turn-taking game over
//! a single counter row in PostgreSQL / Aurora DSQL.
//!
//! ## Commands
//!
//! - `pingpong play --role initiator|responder` - Play one role until Ctrl+C
//! - `pingpong reset` - Seed the counter (optionally making the first move)
//! - `pingpong status` - Show the counter and whose turn it is
//! - `pingpong demo` - Both roles in one process against the in-memory store
//! - `pingpong config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use pingpong_cli::commands::{self, ConfigCommand, DemoArgs, PlayArgs, ResetArgs, StatusArgs};
use pingpong_core::domain::config::{LoggingConfig, PingPongConfig};

/// PingPong - two players, one counter, strict alternation
#[derive(Parser)]
#[command(name = "pingpong")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "PINGPONG_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); defaults to the config file
    #[arg(long, global = true, env = "PINGPONG_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Play one role against the shared counter
    #[command(name = "play")]
    Play(PlayArgs),

    /// Seed the counter row, starting a fresh game
    #[command(name = "reset")]
    Reset(ResetArgs),

    /// Show the current counter value
    #[command(name = "status")]
    Status(StatusArgs),

    /// Run both roles in-process against the in-memory store
    #[command(name = "demo")]
    Demo(DemoArgs),

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is normal
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Silent read: the subscriber does not exist yet. Commands load the
    // config again and report broken files themselves.
    let mut logging = PingPongConfig::logging_settings(cli.config.as_deref());
    if let Some(level) = cli.log_level {
        logging.level = level;
    }
    init_logging(&logging)?;

    match cli.command {
        Some(Commands::Play(args)) => commands::play::execute(args, cli.config).await,
        Some(Commands::Reset(args)) => commands::reset::execute(args, cli.config).await,
        Some(Commands::Status(args)) => commands::status::execute(args, cli.config).await,
        Some(Commands::Demo(args)) => commands::demo::execute(args, cli.config).await,
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config).await
        }
        None => {
            // No command provided - show help
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&logging.level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.compact().init();
    }

    Ok(())
}
