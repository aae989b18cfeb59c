// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use pingpong_core::domain::config::{
    IsolationLevel, LoggingConfig, ObservabilityConfig, PingPongConfig, PostgresStoreConfig,
    StoreBackend,
};

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./pingpong-config.yaml)
        #[arg(short, long, default_value = "./pingpong-config.yaml")]
        output: PathBuf,

        /// Include an Aurora DSQL store section
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, examples } => generate(output, examples).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = PingPongConfig::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. PINGPONG_CONFIG_PATH: {}",
            std::env::var("PINGPONG_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./pingpong-config.yaml");
        println!("  4. ~/.pingpong/config.yaml");
        println!("  5. /etc/pingpong/config.yaml");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Player:".bold());
    println!("  Name: {}", config.metadata.name);
    println!();

    let store = &config.spec.store;
    println!("{}", "Turn Counter Store:".bold());
    println!("  Backend: {:?}", store.backend);
    println!("  Table: {}", store.table);
    println!("  Key: {}", store.key);
    if let Some(postgres) = &store.postgres {
        println!("  Host: {}:{}", postgres.host, postgres.port);
        println!("  Database: {}", postgres.database);
        println!("  User: {}", postgres.user);
        println!(
            "  Password: {}",
            if postgres.password.is_some() {
                "(set)"
            } else {
                "(not set)"
            }
        );
        if let Some(command) = &postgres.password_command {
            println!("  Token command: {}", command);
            println!("  Token refresh: every {}s", postgres.token_refresh_secs);
        }
        println!("  SSL mode: {}", postgres.sslmode);
        println!("  Isolation: {:?}", postgres.isolation);
    }
    println!();

    let coordinator = &config.spec.coordinator;
    println!("{}", "Coordinator:".bold());
    println!("  Idle backoff: {}ms", coordinator.idle_backoff_ms);
    match coordinator.max_moves {
        Some(max) => println!("  Max moves: {}", max),
        None => println!("  Max moves: {}", "(unbounded)".dimmed()),
    }
    println!();

    let logging = config.logging();
    println!("{}", "Logging:".bold());
    println!("  Level: {}", logging.level);
    println!("  Format: {}", logging.format);
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = PingPongConfig::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf, with_examples: bool) -> Result<()> {
    sample_config(with_examples)
        .to_yaml_file(&output)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

pub fn sample_config(with_examples: bool) -> PingPongConfig {
    let mut config = PingPongConfig::default();
    config.spec.observability = Some(ObservabilityConfig {
        logging: Some(LoggingConfig::default()),
    });

    if with_examples {
        let mut postgres = PostgresStoreConfig::for_dsql_cluster("<cluster-id>", "us-east-1");
        postgres.password = Some("env:PINGPONG_DB_PASSWORD".to_string());
        postgres.isolation = IsolationLevel::RepeatableRead;
        config.spec.store.backend = StoreBackend::Postgres;
        config.spec.store.postgres = Some(postgres);
        config.spec.coordinator.idle_backoff_ms = 10;
    }

    config
}
