// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Connection Pool
//!
//! Wraps `sqlx::postgres::PgPool` in a thin `Database` newtype that the
//! PostgreSQL Turn Counter store is built from.
//!
//! Aurora DSQL authenticates with short-lived IAM tokens. Minting them is
//! outside this crate: a [`TokenSource`] is asked for a password every time
//! connect options are built, and a background task rebuilds the pool's
//! connect options every `token_refresh_secs` so connections opened later
//! in a long game never use an expired token.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::domain::config::PostgresStoreConfig;
use crate::infrastructure::repositories::PostgresTurnCounterStore;

/// Supplies the password for the next database connection.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// `None` connects without a password.
    async fn token(&self) -> Result<Option<String>>;
}

/// Password from the config file (`env:VAR_NAME` supported), resolved on
/// every call.
pub struct ConfiguredPassword {
    config: PostgresStoreConfig,
}

impl ConfiguredPassword {
    pub fn new(config: PostgresStoreConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl TokenSource for ConfiguredPassword {
    async fn token(&self) -> Result<Option<String>> {
        self.config.resolved_password()
    }
}

/// Runs `password_command` through `sh -c` and uses its trimmed stdout.
pub struct CommandTokenSource {
    command: String,
}

impl CommandTokenSource {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl TokenSource for CommandTokenSource {
    async fn token(&self) -> Result<Option<String>> {
        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .output()
            .await
            .with_context(|| format!("Failed to run token command '{}'", self.command))?;

        if !output.status.success() {
            anyhow::bail!(
                "Token command exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let token = String::from_utf8(output.stdout)
            .context("Token command printed non-UTF-8 output")?
            .trim()
            .to_string();
        if token.is_empty() {
            anyhow::bail!("Token command printed no token");
        }
        Ok(Some(token))
    }
}

/// The token source a config asks for: `password_command` if set, else the
/// configured password.
pub fn token_source_for(config: &PostgresStoreConfig) -> Arc<dyn TokenSource> {
    match &config.password_command {
        Some(command) => Arc::new(CommandTokenSource::new(command.clone())),
        None => Arc::new(ConfiguredPassword::new(config.clone())),
    }
}

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn connect(config: &PostgresStoreConfig) -> Result<Self> {
        Self::connect_with(config, token_source_for(config)).await
    }

    pub async fn connect_with(
        config: &PostgresStoreConfig,
        tokens: Arc<dyn TokenSource>,
    ) -> Result<Self> {
        let options = connect_options(config, tokens.as_ref()).await?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to connect to {}:{}", config.host, config.port))?;

        spawn_token_refresh(pool.clone(), config.clone(), tokens);

        tracing::info!(host = %config.host, database = %config.database, "PostgreSQL pool initialized");
        Ok(Self { pool })
    }

    pub fn get_pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn turn_counter_store(&self, config: &PostgresStoreConfig, table: &str) -> PostgresTurnCounterStore {
        PostgresTurnCounterStore::new(self.pool.clone(), table, config.isolation)
    }
}

/// Rebuild the pool's connect options with a fresh token. Connections
/// already open are unaffected.
pub async fn refresh_connect_options(
    pool: &PgPool,
    config: &PostgresStoreConfig,
    tokens: &dyn TokenSource,
) -> Result<()> {
    let options = connect_options(config, tokens).await?;
    pool.set_connect_options(options);
    debug!(host = %config.host, "Database auth token refreshed");
    Ok(())
}

/// Runs until the pool is closed. `None` when refresh is disabled.
fn spawn_token_refresh(
    pool: PgPool,
    config: PostgresStoreConfig,
    tokens: Arc<dyn TokenSource>,
) -> Option<JoinHandle<()>> {
    if config.token_refresh_secs == 0 {
        return None;
    }
    let period = Duration::from_secs(config.token_refresh_secs);

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if pool.is_closed() {
                break;
            }
            if let Err(e) = refresh_connect_options(&pool, &config, tokens.as_ref()).await {
                warn!(error = %e, "Failed to refresh database auth token; keeping the previous one");
            }
        }
    }))
}

async fn connect_options(config: &PostgresStoreConfig, tokens: &dyn TokenSource) -> Result<PgConnectOptions> {
    let ssl_mode = PgSslMode::from_str(&config.sslmode)
        .map_err(|e| anyhow::anyhow!("Invalid sslmode '{}': {}", config.sslmode, e))?;

    let mut options = PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .database(&config.database)
        .username(&config.user)
        .ssl_mode(ssl_mode);

    if let Some(password) = tokens.token().await? {
        options = options.password(&password);
    }

    Ok(options)
}
