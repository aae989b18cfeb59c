// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Turn-taking tests against the in-memory store.
//!
//! Covers the alternation invariant, monotonicity, at-most-one-write per
//! turn, and the contention / lost-acknowledgment / cancellation scenarios.

use async_trait::async_trait;
use pingpong_core::application::{
    initiator_bootstrap, run_loop, CoordinatorError, CoordinatorSettings, CoordinatorState,
    RunStop, StepOutcome, TurnCoordinator,
};
use pingpong_core::domain::{CounterKey, Role, StoreError, TurnCounterStore, TurnEvent, TurnValue};
use pingpong_core::infrastructure::repositories::{
    CommitFault, InMemoryTransaction, InMemoryTurnCounterStore,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const KEY: CounterKey = CounterKey(1);

fn settings() -> CoordinatorSettings {
    CoordinatorSettings {
        key: KEY,
        ..CoordinatorSettings::default()
    }
}

async fn fresh_game() -> Arc<InMemoryTurnCounterStore> {
    let store = Arc::new(InMemoryTurnCounterStore::new());
    initiator_bootstrap(store.as_ref(), KEY).await.unwrap();
    store
}

fn committed_values(store: &InMemoryTurnCounterStore) -> Vec<TurnValue> {
    store.history().iter().map(|w| w.value).collect()
}

/// Observation trail of one instance: every value it saw or wrote, in order.
fn trail(events: &[TurnEvent]) -> Vec<TurnValue> {
    events
        .iter()
        .filter_map(|e| match e {
            TurnEvent::Moved { value, .. } => Some(*value),
            TurnEvent::Contention { observed, .. } => *observed,
            TurnEvent::IdleTick { observed, .. } => Some(*observed),
        })
        .collect()
}

fn moved(events: &[TurnEvent]) -> Vec<TurnValue> {
    events.iter().filter_map(TurnEvent::moved_value).collect()
}

#[tokio::test]
async fn test_scenario_a_strict_alternation_from_fresh_row() {
    let store = fresh_game().await;
    let cancel = CancellationToken::new();
    let mut initiator = TurnCoordinator::new(Role::Initiator, store.clone(), settings());
    let mut responder = TurnCoordinator::new(Role::Responder, store.clone(), settings());

    assert_eq!(initiator.step(&cancel).await.unwrap(), StepOutcome::Idle { observed: 1 });
    assert_eq!(responder.step(&cancel).await.unwrap(), StepOutcome::Moved(2));
    assert_eq!(responder.step(&cancel).await.unwrap(), StepOutcome::Idle { observed: 2 });
    assert_eq!(initiator.step(&cancel).await.unwrap(), StepOutcome::Moved(3));
    assert_eq!(initiator.step(&cancel).await.unwrap(), StepOutcome::Idle { observed: 3 });
    assert_eq!(responder.step(&cancel).await.unwrap(), StepOutcome::Moved(4));

    assert_eq!(committed_values(&store), vec![1, 2, 3, 4]);
    assert_eq!(initiator.last_written(), 3);
    assert_eq!(responder.last_written(), 4);
    assert_eq!(store.open_transactions(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_players_alternate() {
    let store = fresh_game().await;
    let cancel = CancellationToken::new();
    let moves = 50;

    let mut handles = Vec::new();
    for role in [Role::Initiator, Role::Responder] {
        let store = store.clone();
        let cancel = cancel.clone();
        handles.push(tokio::spawn(async move {
            let events = Arc::new(Mutex::new(Vec::new()));
            let sink_events = events.clone();
            let sink = move |event: TurnEvent| sink_events.lock().unwrap().push(event);
            let settings = CoordinatorSettings {
                max_moves: Some(moves),
                ..settings()
            };
            let report = run_loop(role, store, settings, &sink, &cancel).await.unwrap();
            let events = events.lock().unwrap().clone();
            (report, events)
        }));
    }

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }

    let expected: Vec<TurnValue> = (1..=2 * moves as TurnValue + 1).collect();
    assert_eq!(committed_values(&store), expected);

    for (report, events) in &results {
        assert_eq!(report.stop, RunStop::MoveLimitReached);
        assert_eq!(report.moves, moves);
        assert!(events.iter().all(|e| e.role() == report.role));

        let values = moved(events);
        match report.role {
            Role::Initiator => assert!(values.iter().all(|v| v % 2 == 1)),
            Role::Responder => assert!(values.iter().all(|v| v % 2 == 0)),
        }
        // One write per turn: consecutive own moves are exactly one round apart.
        assert!(values.windows(2).all(|w| w[1] == w[0] + 2));

        let seen = trail(events);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]), "observations went backwards");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 3)]
async fn test_two_responders_never_duplicate_a_value() {
    let store = fresh_game().await;
    let stop_responders = CancellationToken::new();
    let initiator_moves = 30;

    let mut responders = Vec::new();
    for _ in 0..2 {
        let store = store.clone();
        let cancel = stop_responders.clone();
        responders.push(tokio::spawn(async move {
            let events = Arc::new(Mutex::new(Vec::new()));
            let sink_events = events.clone();
            let sink = move |event: TurnEvent| sink_events.lock().unwrap().push(event);
            let report = run_loop(Role::Responder, store, settings(), &sink, &cancel)
                .await
                .unwrap();
            let events = events.lock().unwrap().clone();
            (report, events)
        }));
    }

    let initiator_settings = CoordinatorSettings {
        max_moves: Some(initiator_moves),
        ..settings()
    };
    let initiator_report = run_loop(
        Role::Initiator,
        store.clone(),
        initiator_settings,
        &pingpong_core::domain::NullSink,
        &CancellationToken::new(),
    )
    .await
    .unwrap();
    let last_odd = 2 * initiator_moves as TurnValue + 1;
    assert_eq!(initiator_report.last_confirmed, last_odd);

    // One of the responders still answers the final move.
    tokio::time::timeout(Duration::from_secs(5), async {
        while store.value(KEY) != Some(last_odd + 1) {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("final move was never answered");
    stop_responders.cancel();

    let mut responder_moves = Vec::new();
    for handle in responders {
        let (report, events) = handle.await.unwrap();
        assert_eq!(report.stop, RunStop::Cancelled);
        responder_moves.extend(moved(&events));
    }
    responder_moves.sort_unstable();

    let expected_even: Vec<TurnValue> = (1..=initiator_moves as TurnValue + 1).map(|n| 2 * n).collect();
    assert_eq!(responder_moves, expected_even);

    let values = committed_values(&store);
    let expected: Vec<TurnValue> = (1..=last_odd + 1).collect();
    assert_eq!(values, expected);
    assert_eq!(store.open_transactions(), 0);
}

/// Store wrapper that interleaves foreign activity with a coordinator's
/// transaction.
struct ScriptedStore {
    inner: InMemoryTurnCounterStore,
    rival_after_read: Mutex<bool>,
    read_conflicts: Mutex<u32>,
    cancel_during_write: Option<CancellationToken>,
    hang_on_write: bool,
}

impl ScriptedStore {
    fn new(inner: InMemoryTurnCounterStore) -> Self {
        Self {
            inner,
            rival_after_read: Mutex::new(false),
            read_conflicts: Mutex::new(0),
            cancel_during_write: None,
            hang_on_write: false,
        }
    }

    /// Another instance of the same role commits `observed + 1` right after
    /// the next locked read.
    fn with_rival(self) -> Self {
        *self.rival_after_read.lock().unwrap() = true;
        self
    }

    /// The next `n` locked reads fail with a serialization failure, as a
    /// blocked `SELECT ... FOR UPDATE` does under `REPEATABLE READ`.
    fn with_read_conflicts(self, n: u32) -> Self {
        *self.read_conflicts.lock().unwrap() = n;
        self
    }
}

#[async_trait]
impl TurnCounterStore for ScriptedStore {
    type Transaction = InMemoryTransaction;

    async fn begin_transaction(&self) -> Result<Self::Transaction, StoreError> {
        self.inner.begin_transaction().await
    }

    async fn read_locked(&self, tx: &mut Self::Transaction, key: CounterKey) -> Result<TurnValue, StoreError> {
        let conflict = {
            let mut remaining = self.read_conflicts.lock().unwrap();
            let hit = *remaining > 0;
            *remaining = remaining.saturating_sub(1);
            hit
        };
        if conflict {
            return Err(StoreError::conflict(
                "could not serialize access due to concurrent update",
            ));
        }
        let observed = self.inner.read_locked(tx, key).await?;
        let rival = std::mem::replace(&mut *self.rival_after_read.lock().unwrap(), false);
        if rival {
            let mut rival_tx = self.inner.begin_transaction().await?;
            let value = self.inner.read_locked(&mut rival_tx, key).await?;
            self.inner.write(&mut rival_tx, key, value + 1).await?;
            self.inner.commit(rival_tx).await?;
        }
        Ok(observed)
    }

    async fn write(&self, tx: &mut Self::Transaction, key: CounterKey, new_value: TurnValue) -> Result<(), StoreError> {
        if self.hang_on_write {
            std::future::pending::<()>().await;
        }
        self.inner.write(tx, key, new_value).await?;
        if let Some(cancel) = &self.cancel_during_write {
            cancel.cancel();
        }
        Ok(())
    }

    async fn commit(&self, tx: Self::Transaction) -> Result<(), StoreError> {
        self.inner.commit(tx).await
    }

    async fn rollback(&self, tx: Self::Transaction) {
        self.inner.rollback(tx).await
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        self.inner.ensure_schema().await
    }

    async fn seed(&self, key: CounterKey, value: TurnValue) -> Result<(), StoreError> {
        self.inner.seed(key, value).await
    }

    async fn current_value(&self, key: CounterKey) -> Result<Option<TurnValue>, StoreError> {
        self.inner.current_value(key).await
    }
}

#[tokio::test]
async fn test_scenario_b_losing_responder_backs_off() {
    let inner = InMemoryTurnCounterStore::new();
    initiator_bootstrap(&inner, KEY).await.unwrap();
    let store = Arc::new(ScriptedStore::new(inner.clone()).with_rival());
    let cancel = CancellationToken::new();
    let mut responder = TurnCoordinator::new(Role::Responder, store, settings());

    // Both saw 1 and tried to write 2; the rival committed first.
    match responder.step(&cancel).await.unwrap() {
        StepOutcome::Contended { observed, attempted, reason } => {
            assert_eq!((observed, attempted), (Some(1), Some(2)));
            assert!(reason.contains("40001"));
        }
        other => panic!("expected contention, got {:?}", other),
    }
    assert_eq!(responder.state(), CoordinatorState::Retry { observed: Some(1), attempted: Some(2) });
    assert_eq!(responder.last_written(), 0);

    // Re-observing finds the rival's 2, which is not an odd value to answer.
    assert_eq!(responder.step(&cancel).await.unwrap(), StepOutcome::Idle { observed: 2 });
    assert_eq!(committed_values(&inner), vec![1, 2]);
    assert_eq!(inner.open_transactions(), 0);
}

#[tokio::test]
async fn test_contention_event_is_emitted() {
    let inner = InMemoryTurnCounterStore::new();
    initiator_bootstrap(&inner, KEY).await.unwrap();
    let store = Arc::new(ScriptedStore::new(inner.clone()).with_rival());
    let cancel = CancellationToken::new();

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink_events = events.clone();
    let canceller = cancel.clone();
    let sink = move |event: TurnEvent| {
        if matches!(event, TurnEvent::IdleTick { .. }) {
            canceller.cancel();
        }
        sink_events.lock().unwrap().push(event);
    };

    let report = run_loop(Role::Responder, store, settings(), &sink, &cancel).await.unwrap();
    assert_eq!(report.stop, RunStop::Cancelled);
    assert_eq!(report.contentions, 1);
    assert_eq!(report.moves, 0);
    assert_eq!(report.last_confirmed, 0);

    let events = events.lock().unwrap();
    assert!(matches!(events[0], TurnEvent::Contention { observed: Some(1), attempted: Some(2), .. }));
    assert!(matches!(events[1], TurnEvent::IdleTick { observed: 2, .. }));
}

#[tokio::test]
async fn test_conflict_on_locked_read_is_retried() {
    let inner = InMemoryTurnCounterStore::new();
    initiator_bootstrap(&inner, KEY).await.unwrap();
    let store = Arc::new(ScriptedStore::new(inner.clone()).with_read_conflicts(1));
    let cancel = CancellationToken::new();
    let mut responder = TurnCoordinator::new(Role::Responder, store, settings());

    match responder.step(&cancel).await.unwrap() {
        StepOutcome::Contended { observed, attempted, reason } => {
            assert_eq!((observed, attempted), (None, None));
            assert!(reason.contains("40001"));
        }
        other => panic!("expected contention, got {:?}", other),
    }
    assert_eq!(responder.state(), CoordinatorState::Retry { observed: None, attempted: None });
    assert_eq!(responder.last_written(), 0);
    assert_eq!(inner.open_transactions(), 0);
    assert_eq!(inner.rollbacks(), 1);

    // The next pass reads normally and takes the turn.
    assert_eq!(responder.step(&cancel).await.unwrap(), StepOutcome::Moved(2));
    assert_eq!(committed_values(&inner), vec![1, 2]);
}

#[tokio::test]
async fn test_read_conflicts_do_not_end_the_loop() {
    let inner = InMemoryTurnCounterStore::new();
    initiator_bootstrap(&inner, KEY).await.unwrap();
    let store = Arc::new(ScriptedStore::new(inner.clone()).with_read_conflicts(3));
    let settings = CoordinatorSettings {
        max_moves: Some(1),
        ..settings()
    };

    let report = run_loop(
        Role::Responder,
        store,
        settings,
        &pingpong_core::domain::NullSink,
        &CancellationToken::new(),
    )
    .await
    .unwrap();
    assert_eq!(report.stop, RunStop::MoveLimitReached);
    assert_eq!(report.contentions, 3);
    assert_eq!(report.last_confirmed, 2);
}

#[tokio::test]
async fn test_missing_row_on_read_stays_fatal() {
    let store = Arc::new(InMemoryTurnCounterStore::new());
    let cancel = CancellationToken::new();
    let mut initiator = TurnCoordinator::new(Role::Initiator, store.clone(), settings());

    let err = initiator.step(&cancel).await.unwrap_err();
    assert!(matches!(
        err.store_error(),
        Some(StoreError::NotFound { .. })
    ));
    assert_eq!(initiator.state(), CoordinatorState::Terminal);
    assert_eq!(store.open_transactions(), 0);
}

#[tokio::test]
async fn test_scenario_c_lost_ack_then_restart_does_not_write_twice() {
    let store = fresh_game().await;
    let cancel = CancellationToken::new();
    store.inject_commit_fault(CommitFault::ApplyThenFail(StoreError::Connection(
        "connection closed while awaiting COMMIT response".into(),
    )));

    let mut responder = TurnCoordinator::new(Role::Responder, store.clone(), settings());
    let err = responder.step(&cancel).await.unwrap_err();
    match err {
        CoordinatorError::Fatal { role, last_confirmed, attempted, .. } => {
            assert_eq!(role, Role::Responder);
            assert_eq!(last_confirmed, 0);
            assert_eq!(attempted, Some(2));
        }
        other => panic!("expected fatal error, got {:?}", other),
    }
    // The write landed even though this instance never heard back.
    assert_eq!(store.value(KEY), Some(2));
    assert_eq!(responder.last_written(), 0);

    // Restarted process: fresh marker, same role.
    let mut restarted = TurnCoordinator::new(Role::Responder, store.clone(), settings());
    assert_eq!(restarted.step(&cancel).await.unwrap(), StepOutcome::Idle { observed: 2 });
    assert_eq!(committed_values(&store), vec![1, 2]);
}

#[tokio::test]
async fn test_lost_ack_reported_as_conflict_is_not_repeated() {
    let store = fresh_game().await;
    let cancel = CancellationToken::new();
    store.inject_commit_fault(CommitFault::ApplyThenFail(StoreError::conflict("OC000")));

    let mut responder = TurnCoordinator::new(Role::Responder, store.clone(), settings());
    assert!(matches!(
        responder.step(&cancel).await.unwrap(),
        StepOutcome::Contended { observed: Some(1), attempted: Some(2), .. }
    ));
    assert_eq!(responder.last_written(), 0);

    assert_eq!(responder.step(&cancel).await.unwrap(), StepOutcome::Idle { observed: 2 });
    assert_eq!(committed_values(&store), vec![1, 2]);

    // The game carries on normally from there.
    let mut initiator = TurnCoordinator::new(Role::Initiator, store.clone(), settings());
    assert_eq!(initiator.step(&cancel).await.unwrap(), StepOutcome::Moved(3));
    assert_eq!(responder.step(&cancel).await.unwrap(), StepOutcome::Moved(4));
}

#[tokio::test]
async fn test_rejected_commit_is_fatal_and_leaves_counter() {
    let store = fresh_game().await;
    let cancel = CancellationToken::new();
    store.inject_commit_fault(CommitFault::Reject(StoreError::Database {
        code: Some("23505".into()),
        message: "duplicate key value violates unique constraint".into(),
    }));

    let mut responder = TurnCoordinator::new(Role::Responder, store.clone(), settings());
    let err = responder.step(&cancel).await.unwrap_err();
    assert_eq!(err.store_error().and_then(StoreError::code), Some("23505"));
    assert_eq!(store.value(KEY), Some(1));
    assert_eq!(responder.state(), CoordinatorState::Terminal);
}

#[tokio::test]
async fn test_scenario_d_cancel_before_commit_rolls_back() {
    let inner = InMemoryTurnCounterStore::new();
    initiator_bootstrap(&inner, KEY).await.unwrap();
    let cancel = CancellationToken::new();
    let mut scripted = ScriptedStore::new(inner.clone());
    scripted.cancel_during_write = Some(cancel.clone());
    let mut responder = TurnCoordinator::new(Role::Responder, Arc::new(scripted), settings());

    assert_eq!(responder.step(&cancel).await.unwrap(), StepOutcome::Cancelled);
    assert_eq!(responder.state(), CoordinatorState::Terminal);
    assert_eq!(responder.last_written(), 0);
    assert_eq!(inner.value(KEY), Some(1));
    assert_eq!(inner.open_transactions(), 0);
    assert_eq!(inner.rollbacks(), 1);
}

#[tokio::test]
async fn test_scenario_d_cancel_while_write_blocks() {
    let inner = InMemoryTurnCounterStore::new();
    initiator_bootstrap(&inner, KEY).await.unwrap();
    let cancel = CancellationToken::new();
    let mut scripted = ScriptedStore::new(inner.clone());
    scripted.hang_on_write = true;
    let store = Arc::new(scripted);

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let report = run_loop(Role::Responder, store, settings(), &pingpong_core::domain::NullSink, &cancel)
        .await
        .unwrap();
    assert_eq!(report.stop, RunStop::Cancelled);
    assert_eq!(report.last_confirmed, 0);
    assert_eq!(inner.value(KEY), Some(1));
    assert_eq!(inner.open_transactions(), 0);
}

#[tokio::test]
async fn test_idle_backoff_is_interrupted_by_cancellation() {
    let store = fresh_game().await;
    let cancel = CancellationToken::new();
    let settings = CoordinatorSettings {
        idle_backoff: Duration::from_secs(3600),
        ..settings()
    };

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let report = tokio::time::timeout(
        Duration::from_secs(5),
        run_loop(Role::Initiator, store, settings, &pingpong_core::domain::NullSink, &cancel),
    )
    .await
    .expect("backoff should not outlive cancellation")
    .unwrap();
    assert_eq!(report.stop, RunStop::Cancelled);
    assert!(report.idle_ticks >= 1);
    assert_eq!(report.last_confirmed, 1);
}

#[tokio::test]
async fn test_responder_waits_for_bootstrap() {
    let store = Arc::new(InMemoryTurnCounterStore::new());
    store.seed(KEY, 0).await.unwrap();
    let cancel = CancellationToken::new();
    let mut responder = TurnCoordinator::new(Role::Responder, store.clone(), settings());

    assert_eq!(responder.step(&cancel).await.unwrap(), StepOutcome::Idle { observed: 0 });
    initiator_bootstrap(store.as_ref(), KEY).await.unwrap();
    assert_eq!(responder.step(&cancel).await.unwrap(), StepOutcome::Moved(2));
}

#[tokio::test]
async fn test_counter_jump_writes_only_next_value() {
    let store = fresh_game().await;
    let cancel = CancellationToken::new();
    let mut responder = TurnCoordinator::new(Role::Responder, store.clone(), settings());
    assert_eq!(responder.step(&cancel).await.unwrap(), StepOutcome::Moved(2));

    // Counter jumps ahead out of band.
    store.seed(KEY, 7).await.unwrap();
    assert_eq!(responder.step(&cancel).await.unwrap(), StepOutcome::Moved(8));
    assert_eq!(store.value(KEY), Some(8));
}

#[test]
fn test_events_serialize_with_type_tag() {
    let event = TurnEvent::Moved {
        role: Role::Initiator,
        value: 3,
        moved_at: chrono::Utc::now(),
    };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "moved");
    assert_eq!(json["role"], "initiator");
    assert_eq!(json["value"], 3);
}
