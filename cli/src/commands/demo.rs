// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `pingpong demo` - both roles in one process, sharing an in-memory
//! counter with first-committer-wins semantics.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;

use pingpong_core::application::{
    initiator_bootstrap, run_loop, CoordinatorError, CoordinatorSettings, RunReport,
};
use pingpong_core::domain::config::PingPongConfig;
use pingpong_core::domain::Role;
use pingpong_core::infrastructure::repositories::InMemoryTurnCounterStore;
use pingpong_core::infrastructure::EventBus;

use crate::commands::render::{print_events, print_failure, print_report, Verbosity};
use crate::shutdown::cancel_on_shutdown;

#[derive(Args, Debug)]
pub struct DemoArgs {
    /// Confirmed moves per player
    #[arg(short, long, default_value_t = 10)]
    pub moves: u64,

    /// Also print idle ticks
    #[arg(short, long)]
    pub verbose: bool,
}

pub async fn execute(args: DemoArgs, config_path: Option<PathBuf>) -> Result<()> {
    if args.moves == 0 {
        anyhow::bail!("--moves must be at least 1");
    }
    let config =
        PingPongConfig::load_or_default(config_path).context("Failed to load configuration")?;
    let settings = CoordinatorSettings {
        max_moves: Some(args.moves),
        ..CoordinatorSettings::from_config(&config)
    };
    let verbosity = if args.verbose {
        Verbosity::All
    } else {
        Verbosity::Moves
    };

    println!(
        "{}",
        format!("Playing {} moves per side against the in-memory store", args.moves).bold()
    );

    let store = Arc::new(InMemoryTurnCounterStore::new());
    let reports = run_demo(store.clone(), settings, verbosity).await;

    let mut failure = None;
    for report in reports {
        match report {
            Ok(report) => print_report(&report),
            Err(e) => {
                print_failure(&e);
                failure.get_or_insert(e);
            }
        }
    }
    if let Some(e) = failure {
        return Err(e.into());
    }

    println!();
    println!(
        "{}",
        format!(
            "✓ {} commits, counter at {}",
            store.history().len(),
            store.value(config.counter_key()).unwrap_or_default()
        )
        .green()
    );
    Ok(())
}

/// Bootstrap, then run both roles concurrently until each reaches its move
/// limit or the process is interrupted.
pub async fn run_demo(
    store: Arc<InMemoryTurnCounterStore>,
    settings: CoordinatorSettings,
    verbosity: Verbosity,
) -> Vec<Result<RunReport, CoordinatorError>> {
    if let Err(e) = initiator_bootstrap(store.as_ref(), settings.key).await {
        return vec![Err(e)];
    }

    let bus = EventBus::with_default_capacity();
    let printer = tokio::spawn(print_events(bus.subscribe(), verbosity));
    let cancel = cancel_on_shutdown();

    let mut players = Vec::new();
    for role in [Role::Initiator, Role::Responder] {
        let store = store.clone();
        let settings = settings.clone();
        let bus = bus.clone();
        let cancel = cancel.clone();
        players.push(tokio::spawn(async move {
            run_loop(role, store, settings, &bus, &cancel).await
        }));
    }

    let mut reports = Vec::new();
    for player in players {
        match player.await {
            Ok(report) => reports.push(report),
            Err(e) => tracing::error!(error = %e, "Player task panicked"),
        }
    }

    cancel.cancel();
    drop(bus);
    let _ = printer.await;
    reports
}

#[cfg(test)]
mod tests {
    use super::*;
    use pingpong_core::application::RunStop;
    use pingpong_core::domain::CounterKey;

    #[tokio::test]
    async fn test_demo_plays_both_sides() {
        let store = Arc::new(InMemoryTurnCounterStore::new());
        let settings = CoordinatorSettings {
            max_moves: Some(5),
            ..CoordinatorSettings::default()
        };

        let reports = run_demo(store.clone(), settings, Verbosity::Moves).await;
        assert_eq!(reports.len(), 2);
        for report in reports {
            let report = report.unwrap();
            assert_eq!(report.stop, RunStop::MoveLimitReached);
            assert_eq!(report.moves, 5);
        }

        // Opening move plus five answers and five follow-ups.
        assert_eq!(store.value(CounterKey::default()), Some(11));
        let values: Vec<i64> = store.history().iter().map(|w| w.value).collect();
        assert_eq!(values, (1..=11).collect::<Vec<_>>());
    }
}
