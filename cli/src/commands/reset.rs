// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `pingpong reset` - seed the counter for a fresh game.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

use pingpong_core::application::{initiator_bootstrap, reset_counter};
use pingpong_core::domain::{CounterKey, TurnCounterStore, TurnValue};

use crate::target::{connect_postgres, load_config, require_shared_store, TargetArgs};

#[derive(Args, Debug)]
pub struct ResetArgs {
    /// Also make the initiator's opening move (counter ends at 1)
    #[arg(long)]
    pub start: bool,

    #[command(flatten)]
    pub target: TargetArgs,
}

pub async fn execute(args: ResetArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path, &args.target)?;
    require_shared_store(&config)?;
    let store = connect_postgres(&config).await?;

    let value = reset(&store, config.counter_key(), args.start).await?;
    println!(
        "{}",
        format!(
            "✓ Turn counter {} in {} reset to {}",
            config.counter_key(),
            config.spec.store.table,
            value
        )
        .green()
    );
    Ok(())
}

/// Seed the row to 0, optionally following up with the opening move.
/// Returns the value left on the counter.
pub async fn reset<S: TurnCounterStore>(store: &S, key: CounterKey, start: bool) -> Result<TurnValue> {
    if start {
        Ok(initiator_bootstrap(store, key).await?)
    } else {
        reset_counter(store, key).await?;
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pingpong_core::infrastructure::repositories::InMemoryTurnCounterStore;

    #[tokio::test]
    async fn test_reset_with_and_without_opening_move() {
        let store = InMemoryTurnCounterStore::new();
        let key = CounterKey::default();
        store.seed(key, 17).await.unwrap();

        assert_eq!(reset(&store, key, false).await.unwrap(), 0);
        assert_eq!(store.value(key), Some(0));

        assert_eq!(reset(&store, key, true).await.unwrap(), 1);
        assert_eq!(store.value(key), Some(1));
    }
}
