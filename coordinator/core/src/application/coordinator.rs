// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Turn-Taking Coordinator
//!
//! Drives one role through an unbounded sequence of attempts to detect and
//! take its next turn against the shared Turn Counter.
//!
//! # State Machine
//!
//! ```text
//! Idle ──▶ Observing ──▶ Deciding ──▶ Writing ──▶ Confirmed ──▶ Observing
//!              ▲            │            │
//!              │            ▼            ├──▶ Retry (conflict) ──▶ Observing
//!              └────── Backoff           └──▶ Terminal (fatal)
//!
//! any state ──(cancellation)──▶ Terminal
//! ```
//!
//! A conflict can also surface at the locked read (PostgreSQL under
//! `REPEATABLE READ` reports 40001 there); it takes the same Retry edge.
//!
//! Each pass through Observing opens exactly one transaction, and that
//! transaction is committed or rolled back before the pass ends. The
//! Local Last-Written marker only moves in Confirmed.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** The only stateful algorithm in the crate

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::application::conflict::{classify, ErrorClass};
use crate::domain::config::PingPongConfig;
use crate::domain::events::{TurnEvent, TurnEventSink};
use crate::domain::repository::{StoreError, TurnCounterStore};
use crate::domain::turn::{CounterKey, LastWritten, Role, TurnValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Idle,
    Observing,
    Deciding { observed: TurnValue },
    Writing { observed: TurnValue, attempted: TurnValue },
    Confirmed { value: TurnValue },
    /// `observed` is `None` when the locked read itself hit the conflict.
    Retry {
        observed: Option<TurnValue>,
        attempted: Option<TurnValue>,
    },
    Backoff { observed: TurnValue },
    Terminal,
}

/// Result of a single Observing pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The write of this value was committed and acknowledged.
    Moved(TurnValue),
    /// The store reported a retryable conflict; the marker is unchanged.
    /// Conflicts raised by the locked read carry neither value.
    Contended {
        observed: Option<TurnValue>,
        attempted: Option<TurnValue>,
        reason: String,
    },
    /// Not this role's turn; nothing was written.
    Idle { observed: TurnValue },
    /// Cancellation was observed; any open transaction was rolled back.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStop {
    Cancelled,
    MoveLimitReached,
}

/// Final report of a loop that ended without a fatal error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub role: Role,
    pub last_confirmed: TurnValue,
    pub moves: u64,
    pub contentions: u64,
    pub idle_ticks: u64,
    pub stop: RunStop,
}

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("{role} stopped on a fatal store error (last confirmed value {last_confirmed}{}): {source}", attempted_suffix(.attempted))]
    Fatal {
        role: Role,
        last_confirmed: TurnValue,
        /// Value this instance was trying to write, if it got that far.
        attempted: Option<TurnValue>,
        source: StoreError,
    },

    #[error("{role} coordinator has already terminated")]
    Terminated { role: Role },

    #[error("Initiator bootstrap failed: {source}")]
    Bootstrap { source: StoreError },
}

fn attempted_suffix(attempted: &Option<TurnValue>) -> String {
    attempted
        .map(|v| format!(", attempted {}", v))
        .unwrap_or_default()
}

impl CoordinatorError {
    /// The underlying store error, if any.
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            CoordinatorError::Fatal { source, .. } | CoordinatorError::Bootstrap { source } => {
                Some(source)
            }
            CoordinatorError::Terminated { .. } => None,
        }
    }
}

/// Tunables for a [`TurnCoordinator`].
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub key: CounterKey,
    /// Pause after an idle tick. Zero only yields to the scheduler.
    pub idle_backoff: Duration,
    /// Stop after this many confirmed moves.
    pub max_moves: Option<u64>,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            key: CounterKey::default(),
            idle_backoff: Duration::ZERO,
            max_moves: None,
        }
    }
}

impl CoordinatorSettings {
    pub fn from_config(config: &PingPongConfig) -> Self {
        Self {
            key: config.counter_key(),
            idle_backoff: config.spec.coordinator.idle_backoff(),
            max_moves: config.spec.coordinator.max_moves,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct RunStats {
    moves: u64,
    contentions: u64,
    idle_ticks: u64,
}

pub struct TurnCoordinator<S: TurnCounterStore> {
    store: Arc<S>,
    settings: CoordinatorSettings,
    marker: LastWritten,
    state: CoordinatorState,
    last_observed: Option<TurnValue>,
    stats: RunStats,
}

impl<S: TurnCounterStore> TurnCoordinator<S> {
    pub fn new(role: Role, store: Arc<S>, settings: CoordinatorSettings) -> Self {
        Self {
            store,
            settings,
            marker: LastWritten::for_role(role),
            state: CoordinatorState::Idle,
            last_observed: None,
            stats: RunStats::default(),
        }
    }

    pub fn role(&self) -> Role {
        self.marker.role()
    }

    pub fn last_written(&self) -> TurnValue {
        self.marker.value()
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    /// Run until cancelled, until `max_moves` confirmed moves, or until a
    /// fatal error. Every outcome is reported to `sink`.
    pub async fn run(
        &mut self,
        cancel: &CancellationToken,
        sink: &dyn TurnEventSink,
    ) -> Result<RunReport, CoordinatorError> {
        info!(
            role = %self.role(),
            last_written = self.marker.value(),
            key = %self.settings.key,
            "Starting turn-taking loop"
        );

        loop {
            if let Some(max) = self.settings.max_moves {
                if self.stats.moves >= max {
                    self.transition(CoordinatorState::Terminal);
                    let report = self.report(RunStop::MoveLimitReached);
                    info!(role = %report.role, moves = report.moves, "Move limit reached");
                    return Ok(report);
                }
            }

            let outcome = match self.step(cancel).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(role = %self.role(), last_written = self.marker.value(), error = %e, "Turn-taking loop failed");
                    return Err(e);
                }
            };

            match outcome {
                StepOutcome::Moved(value) => {
                    sink.emit(TurnEvent::Moved {
                        role: self.role(),
                        value,
                        moved_at: Utc::now(),
                    });
                }
                StepOutcome::Contended {
                    observed,
                    attempted,
                    reason,
                } => {
                    sink.emit(TurnEvent::Contention {
                        role: self.role(),
                        observed,
                        attempted,
                        reason,
                        detected_at: Utc::now(),
                    });
                }
                StepOutcome::Idle { observed } => {
                    sink.emit(TurnEvent::IdleTick {
                        role: self.role(),
                        observed,
                        ticked_at: Utc::now(),
                    });
                    self.pause(cancel).await;
                }
                StepOutcome::Cancelled => {
                    let report = self.report(RunStop::Cancelled);
                    info!(
                        role = %report.role,
                        last_confirmed = report.last_confirmed,
                        moves = report.moves,
                        "Turn-taking loop cancelled"
                    );
                    return Ok(report);
                }
            }
        }
    }

    /// One Observing pass: a single transaction that ends committed or
    /// rolled back.
    pub async fn step(&mut self, cancel: &CancellationToken) -> Result<StepOutcome, CoordinatorError> {
        if self.state == CoordinatorState::Terminal {
            return Err(CoordinatorError::Terminated { role: self.role() });
        }
        if cancel.is_cancelled() {
            self.transition(CoordinatorState::Terminal);
            return Ok(StepOutcome::Cancelled);
        }

        let store = Arc::clone(&self.store);
        let key = self.settings.key;

        self.transition(CoordinatorState::Observing);
        let mut tx = match until_cancelled(cancel, store.begin_transaction()).await {
            None => {
                self.transition(CoordinatorState::Terminal);
                return Ok(StepOutcome::Cancelled);
            }
            Some(Err(e)) => return Err(self.fatal(e, None)),
            Some(Ok(tx)) => tx,
        };

        let observed = match until_cancelled(cancel, store.read_locked(&mut tx, key)).await {
            None => return Ok(self.abandon(tx).await),
            Some(Err(e)) => {
                store.rollback(tx).await;
                return self.failed_attempt(e, None, None);
            }
            Some(Ok(value)) => value,
        };
        self.note_observed(observed);

        self.transition(CoordinatorState::Deciding { observed });
        if !self.marker.is_my_turn(observed) {
            store.rollback(tx).await;
            self.stats.idle_ticks += 1;
            self.transition(CoordinatorState::Backoff { observed });
            return Ok(StepOutcome::Idle { observed });
        }

        let attempted = match observed.checked_add(1) {
            Some(v) => v,
            None => {
                store.rollback(tx).await;
                return Err(self.fatal(
                    StoreError::Unknown(format!("counter value {} cannot be advanced", observed)),
                    None,
                ));
            }
        };

        self.transition(CoordinatorState::Writing { observed, attempted });
        match until_cancelled(cancel, store.write(&mut tx, key, attempted)).await {
            None => return Ok(self.abandon(tx).await),
            Some(Err(e)) => {
                store.rollback(tx).await;
                return self.failed_attempt(e, Some(observed), Some(attempted));
            }
            Some(Ok(())) => {}
        }

        // Last point at which the write can still be withdrawn.
        if cancel.is_cancelled() {
            return Ok(self.abandon(tx).await);
        }

        match store.commit(tx).await {
            Ok(()) => {
                self.marker.confirm(attempted);
                self.stats.moves += 1;
                self.transition(CoordinatorState::Confirmed { value: attempted });
                debug!(role = %self.role(), value = attempted, "Move confirmed");
                Ok(StepOutcome::Moved(attempted))
            }
            Err(e) => self.failed_attempt(e, Some(observed), Some(attempted)),
        }
    }

    /// Route a failed read, write or commit through the classifier. The
    /// transaction is already gone.
    fn failed_attempt(
        &mut self,
        error: StoreError,
        observed: Option<TurnValue>,
        attempted: Option<TurnValue>,
    ) -> Result<StepOutcome, CoordinatorError> {
        match classify(&error) {
            ErrorClass::Retryable => {
                self.stats.contentions += 1;
                self.transition(CoordinatorState::Retry { observed, attempted });
                debug!(
                    role = %self.role(),
                    observed = ?observed,
                    attempted = ?attempted,
                    error = %error,
                    "Lost the race for this turn, re-observing"
                );
                Ok(StepOutcome::Contended {
                    observed,
                    attempted,
                    reason: error.to_string(),
                })
            }
            ErrorClass::Fatal => Err(self.fatal(error, attempted)),
        }
    }

    async fn abandon(&mut self, tx: S::Transaction) -> StepOutcome {
        self.store.rollback(tx).await;
        self.transition(CoordinatorState::Terminal);
        info!(role = %self.role(), "Cancelled with a transaction open; rolled back");
        StepOutcome::Cancelled
    }

    fn fatal(&mut self, source: StoreError, attempted: Option<TurnValue>) -> CoordinatorError {
        self.transition(CoordinatorState::Terminal);
        CoordinatorError::Fatal {
            role: self.role(),
            last_confirmed: self.marker.value(),
            attempted,
            source,
        }
    }

    fn note_observed(&mut self, observed: TurnValue) {
        if let Some(previous) = self.last_observed {
            if observed < previous {
                warn!(
                    role = %self.role(),
                    previous,
                    observed,
                    "Turn counter moved backwards; was the row reset during the game?"
                );
            }
        }
        self.last_observed = Some(observed);
    }

    async fn pause(&self, cancel: &CancellationToken) {
        if self.settings.idle_backoff.is_zero() {
            tokio::task::yield_now().await;
        } else {
            let _ = until_cancelled(cancel, tokio::time::sleep(self.settings.idle_backoff)).await;
        }
    }

    fn transition(&mut self, next: CoordinatorState) {
        trace!(role = %self.role(), from = ?self.state, to = ?next, "Coordinator transition");
        self.state = next;
    }

    fn report(&self, stop: RunStop) -> RunReport {
        RunReport {
            role: self.role(),
            last_confirmed: self.marker.value(),
            moves: self.stats.moves,
            contentions: self.stats.contentions,
            idle_ticks: self.stats.idle_ticks,
            stop,
        }
    }
}

/// Coordinator entry point: play `role` until cancellation, the configured
/// move limit, or a fatal error.
pub async fn run_loop<S: TurnCounterStore>(
    role: Role,
    store: Arc<S>,
    settings: CoordinatorSettings,
    sink: &dyn TurnEventSink,
    cancel: &CancellationToken,
) -> Result<RunReport, CoordinatorError> {
    TurnCoordinator::new(role, store, settings)
        .run(cancel, sink)
        .await
}

async fn until_cancelled<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        out = fut => Some(out),
    }
}
