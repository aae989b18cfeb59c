// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `pingpong play` - run one role until Ctrl+C, the move limit, or a fatal
//! store error.

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use pingpong_core::application::{initiator_bootstrap, run_loop, CoordinatorSettings};
use pingpong_core::domain::{Role, TurnCounterStore};
use pingpong_core::infrastructure::EventBus;

use crate::commands::render::{print_events, print_failure, print_report, Verbosity};
use crate::shutdown::cancel_on_shutdown;
use crate::target::{connect_postgres, load_config, require_shared_store, TargetArgs};

#[derive(Args, Debug)]
pub struct PlayArgs {
    /// Role to play: initiator (ping) or responder (pong)
    #[arg(long, required_unless_present = "start", conflicts_with = "start")]
    pub role: Option<Role>,

    /// Play the initiator and make the opening move
    #[arg(long)]
    pub start: bool,

    /// Initiator only: continue the game on the counter instead of resetting it
    #[arg(long)]
    pub resume: bool,

    /// Stop after this many confirmed moves
    #[arg(long)]
    pub max_moves: Option<u64>,

    /// Also print idle ticks
    #[arg(short, long)]
    pub verbose: bool,

    #[command(flatten)]
    pub target: TargetArgs,
}

impl PlayArgs {
    pub fn role(&self) -> Role {
        self.role.unwrap_or(Role::Initiator)
    }
}

pub async fn execute(args: PlayArgs, config_path: Option<PathBuf>) -> Result<()> {
    let mut config = load_config(config_path, &args.target)?;
    require_shared_store(&config)?;
    if args.max_moves.is_some() {
        config.spec.coordinator.max_moves = args.max_moves;
        config.validate()?;
    }

    let store = Arc::new(connect_postgres(&config).await?);
    let settings = CoordinatorSettings::from_config(&config);
    let verbosity = if args.verbose {
        Verbosity::All
    } else {
        Verbosity::Moves
    };

    info!(player = %config.metadata.name, role = %args.role(), "Joining game");
    play(args.role(), args.resume, store, settings, verbosity).await
}

/// Bootstrap if this is a fresh initiator, then play until stopped.
pub async fn play<S: TurnCounterStore + 'static>(
    role: Role,
    resume: bool,
    store: Arc<S>,
    settings: CoordinatorSettings,
    verbosity: Verbosity,
) -> Result<()> {
    if role == Role::Initiator && !resume {
        initiator_bootstrap(store.as_ref(), settings.key).await?;
    }

    let bus = EventBus::with_default_capacity();
    let printer = tokio::spawn(print_events(bus.subscribe(), verbosity));
    let cancel = cancel_on_shutdown();

    let result = run_loop(role, store, settings, &bus, &cancel).await;
    cancel.cancel();
    drop(bus);
    let _ = printer.await;

    match result {
        Ok(report) => {
            print_report(&report);
            Ok(())
        }
        Err(e) => {
            print_failure(&e);
            Err(e.into())
        }
    }
}
