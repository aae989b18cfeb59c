// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Role Bootstrap
//!
//! Establishes the precondition the coordinator loop relies on: the Turn
//! Counter row exists and holds 1, written by the Initiator.
//!
//! Must be run by exactly one process, exactly once, before either loop
//! starts. Running it mid-game resets the game.

use tracing::info;

use crate::application::coordinator::CoordinatorError;
use crate::domain::repository::{StoreError, TurnCounterStore};
use crate::domain::turn::{CounterKey, TurnValue};

/// Seed the row to 0, then perform the Initiator's first move 0 → 1.
///
/// The first move is an unconditional update in its own transaction and is
/// expected to succeed exactly once at the start of a fresh game. Returns
/// the value written.
pub async fn initiator_bootstrap<S: TurnCounterStore>(
    store: &S,
    key: CounterKey,
) -> Result<TurnValue, CoordinatorError> {
    reset_counter(store, key).await?;

    let first_move: TurnValue = 1;
    let mut tx = store.begin_transaction().await.map_err(bootstrap_error)?;
    if let Err(e) = store.write(&mut tx, key, first_move).await {
        store.rollback(tx).await;
        return Err(bootstrap_error(e));
    }
    store.commit(tx).await.map_err(bootstrap_error)?;

    info!(key = %key, value = first_move, "Initiator performed the first move");
    Ok(first_move)
}

/// Create the table if needed and seed the row to 0. No move is made.
pub async fn reset_counter<S: TurnCounterStore>(
    store: &S,
    key: CounterKey,
) -> Result<(), CoordinatorError> {
    store.ensure_schema().await.map_err(bootstrap_error)?;
    store.seed(key, 0).await.map_err(bootstrap_error)?;
    info!(key = %key, "Turn counter seeded to 0");
    Ok(())
}

fn bootstrap_error(source: StoreError) -> CoordinatorError {
    CoordinatorError::Bootstrap { source }
}
