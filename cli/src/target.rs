// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Store selection.
//!
//! Merges the connection flags shared by `play`, `reset` and `status` into
//! the loaded configuration and opens the Turn Counter store it names.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use pingpong_core::domain::config::{PingPongConfig, PostgresStoreConfig, StoreBackend};
use pingpong_core::infrastructure::repositories::PostgresTurnCounterStore;
use pingpong_core::infrastructure::Database;

/// Where the shared counter lives.
#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// Aurora DSQL cluster identifier; the endpoint is derived with --region
    #[arg(long, env = "PINGPONG_CLUSTER_ID", conflicts_with = "host")]
    pub identifier: Option<String>,

    /// AWS region of the cluster
    #[arg(long, env = "AWS_REGION", default_value = "us-east-1")]
    pub region: String,

    /// Explicit database host
    #[arg(long, env = "PINGPONG_DB_HOST")]
    pub host: Option<String>,
}

impl TargetArgs {
    /// Fold the flags into `config`. Either flag selects the postgres backend.
    pub fn apply(&self, config: &mut PingPongConfig) {
        let host = match (&self.identifier, &self.host) {
            (Some(identifier), _) => {
                pingpong_core::domain::config::dsql_endpoint(identifier, &self.region)
            }
            (None, Some(host)) => host.clone(),
            (None, None) => return,
        };

        let store = &mut config.spec.store;
        store.backend = StoreBackend::Postgres;
        match store.postgres.as_mut() {
            Some(postgres) => postgres.host = host,
            None => {
                let mut postgres = PostgresStoreConfig::for_dsql_cluster("", &self.region);
                postgres.host = host;
                store.postgres = Some(postgres);
            }
        }

        // PINGPONG_DB_PASSWORD must reach a section created above. The other
        // overrides already ran at load and would undo the backend choice.
        config.apply_password_override();
    }
}

/// Load, merge and validate configuration for a store-facing command.
pub fn load_config(config_path: Option<PathBuf>, target: &TargetArgs) -> Result<PingPongConfig> {
    let mut config =
        PingPongConfig::load_or_default(config_path).context("Failed to load configuration")?;
    target.apply(&mut config);
    config
        .validate()
        .context("Configuration validation failed")?;
    Ok(config)
}

/// Connect to the postgres store named in `config`.
pub async fn connect_postgres(config: &PingPongConfig) -> Result<PostgresTurnCounterStore> {
    let store = &config.spec.store;
    let postgres = store
        .postgres
        .as_ref()
        .context("No postgres store configured; pass --identifier or --host")?;

    let database = Database::connect(postgres)
        .await
        .context("Failed to connect to the turn counter database")?;
    Ok(database.turn_counter_store(postgres, &store.table))
}

/// Fail unless the postgres backend is selected. A per-process in-memory
/// counter cannot be shared with the other player.
pub fn require_shared_store(config: &PingPongConfig) -> Result<()> {
    if config.spec.store.backend != StoreBackend::Postgres {
        anyhow::bail!(
            "The in-memory store is private to one process; pass --identifier or --host, \
             or use `pingpong demo` to play both roles locally"
        );
    }
    Ok(())
}
