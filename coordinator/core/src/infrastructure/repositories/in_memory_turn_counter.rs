// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # In-Memory Turn Counter Store
//!
//! Development and test implementation of `TurnCounterStore` with
//! first-committer-wins semantics: a transaction that read (or blindly wrote)
//! a row at version `n` fails at commit with a `40001` conflict if the row
//! has moved on since. Clones share the same rows, so two coordinators in one
//! process can play against each other.
//!
//! Commit faults can be injected to reproduce lost acknowledgments and
//! unreachable stores.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::domain::repository::{StoreError, TurnCounterStore};
use crate::domain::turn::{CounterKey, TurnValue};

/// Behaviour forced onto an upcoming commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitFault {
    /// Discard the transaction and report `error`.
    Reject(StoreError),
    /// Apply the transaction, then report `error` as if the acknowledgment
    /// was lost on the way back.
    ApplyThenFail(StoreError),
}

/// A committed change, kept for inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommittedWrite {
    pub txn_id: u64,
    pub key: CounterKey,
    pub value: TurnValue,
}

#[derive(Debug, Clone, Copy)]
struct Row {
    value: TurnValue,
    version: u64,
}

#[derive(Debug, Default)]
struct Inner {
    rows: HashMap<CounterKey, Row>,
    next_txn_id: u64,
    transactions_started: u64,
    rollbacks: u64,
    open: u64,
    faults: VecDeque<CommitFault>,
    history: Vec<CommittedWrite>,
}

#[derive(Debug)]
pub struct InMemoryTransaction {
    id: u64,
    /// Row version observed by the first read or write of each key.
    versions: HashMap<CounterKey, u64>,
    writes: HashMap<CounterKey, TurnValue>,
}

impl InMemoryTransaction {
    pub fn id(&self) -> u64 {
        self.id
    }
}

#[derive(Clone, Default)]
pub struct InMemoryTurnCounterStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryTurnCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a fault for the next commit that does not already have one.
    pub fn inject_commit_fault(&self, fault: CommitFault) {
        self.inner.lock().faults.push_back(fault);
    }

    /// Committed value of the row, bypassing transactions.
    pub fn value(&self, key: CounterKey) -> Option<TurnValue> {
        self.inner.lock().rows.get(&key).map(|row| row.value)
    }

    pub fn history(&self) -> Vec<CommittedWrite> {
        self.inner.lock().history.clone()
    }

    pub fn transactions_started(&self) -> u64 {
        self.inner.lock().transactions_started
    }

    pub fn rollbacks(&self) -> u64 {
        self.inner.lock().rollbacks
    }

    /// Transactions begun but neither committed nor rolled back.
    pub fn open_transactions(&self) -> u64 {
        self.inner.lock().open
    }
}

impl Inner {
    fn row(&self, key: CounterKey) -> Result<Row, StoreError> {
        self.rows.get(&key).copied().ok_or(StoreError::NotFound { key })
    }

    fn validate(&self, tx: &InMemoryTransaction) -> Result<(), StoreError> {
        for (key, seen) in &tx.versions {
            let current = self.row(*key)?;
            if current.version != *seen {
                return Err(StoreError::conflict(format!(
                    "row {} changed since transaction {} read it (version {} -> {})",
                    key, tx.id, seen, current.version
                )));
            }
        }
        Ok(())
    }

    fn apply(&mut self, tx: &InMemoryTransaction) {
        for (key, value) in &tx.writes {
            let row = self.rows.entry(*key).or_insert(Row { value: 0, version: 0 });
            row.value = *value;
            row.version += 1;
            self.history.push(CommittedWrite {
                txn_id: tx.id,
                key: *key,
                value: *value,
            });
        }
    }
}

#[async_trait]
impl TurnCounterStore for InMemoryTurnCounterStore {
    type Transaction = InMemoryTransaction;

    async fn begin_transaction(&self) -> Result<Self::Transaction, StoreError> {
        let mut inner = self.inner.lock();
        inner.next_txn_id += 1;
        inner.transactions_started += 1;
        inner.open += 1;
        Ok(InMemoryTransaction {
            id: inner.next_txn_id,
            versions: HashMap::new(),
            writes: HashMap::new(),
        })
    }

    async fn read_locked(
        &self,
        tx: &mut Self::Transaction,
        key: CounterKey,
    ) -> Result<TurnValue, StoreError> {
        if let Some(pending) = tx.writes.get(&key) {
            return Ok(*pending);
        }
        let row = self.inner.lock().row(key)?;
        tx.versions.entry(key).or_insert(row.version);
        Ok(row.value)
    }

    async fn write(
        &self,
        tx: &mut Self::Transaction,
        key: CounterKey,
        new_value: TurnValue,
    ) -> Result<(), StoreError> {
        let row = self.inner.lock().row(key)?;
        tx.versions.entry(key).or_insert(row.version);
        tx.writes.insert(key, new_value);
        Ok(())
    }

    async fn commit(&self, tx: Self::Transaction) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner.open = inner.open.saturating_sub(1);

        match inner.faults.pop_front() {
            Some(CommitFault::Reject(error)) => return Err(error),
            Some(CommitFault::ApplyThenFail(error)) => {
                inner.validate(&tx)?;
                inner.apply(&tx);
                return Err(error);
            }
            None => {}
        }

        inner.validate(&tx)?;
        inner.apply(&tx);
        Ok(())
    }

    async fn rollback(&self, _tx: Self::Transaction) {
        let mut inner = self.inner.lock();
        inner.open = inner.open.saturating_sub(1);
        inner.rollbacks += 1;
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn seed(&self, key: CounterKey, value: TurnValue) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let row = inner.rows.entry(key).or_insert(Row { value, version: 0 });
        row.value = value;
        row.version += 1;
        Ok(())
    }

    async fn current_value(&self, key: CounterKey) -> Result<Option<TurnValue>, StoreError> {
        Ok(self.value(key))
    }
}
