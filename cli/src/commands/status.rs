// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `pingpong status` - show the counter and whose turn it is.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

use pingpong_core::domain::{CounterKey, Role, TurnCounterStore, TurnValue};

use crate::commands::render::role_label;
use crate::target::{connect_postgres, load_config, require_shared_store, TargetArgs};

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Print the status as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub target: TargetArgs,
}

pub async fn execute(args: StatusArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path, &args.target)?;
    require_shared_store(&config)?;
    let store = connect_postgres(&config).await?;

    let key = config.counter_key();
    let value = read_status(&store, key).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&status_json(key, value))?);
        return Ok(());
    }

    println!("{}", "Turn counter:".bold());
    println!("  Table: {}", config.spec.store.table);
    println!("  Key: {}", key);
    match value {
        None => println!("  Value: {}", "(row missing - run `pingpong reset`)".yellow()),
        Some(value) => {
            println!("  Value: {}", value);
            println!("  Last move by: {}", last_mover(value));
            println!("  Next to move: {}", role_label(Role::next_to_move(value)));
        }
    }

    Ok(())
}

pub async fn read_status<S: TurnCounterStore>(store: &S, key: CounterKey) -> Result<Option<TurnValue>> {
    store
        .current_value(key)
        .await
        .context("Failed to read the turn counter")
}

fn last_mover(value: TurnValue) -> String {
    match Role::owner_of(value) {
        Some(role) => role_label(role).to_string(),
        None => "nobody yet".dimmed().to_string(),
    }
}

fn status_json(key: CounterKey, value: Option<TurnValue>) -> serde_json::Value {
    serde_json::json!({
        "key": key.0,
        "value": value,
        "last_mover": value.and_then(Role::owner_of),
        "next_to_move": value.map(Role::next_to_move),
    })
}
