// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Shared State Accessor Contract
//!
//! Persistence contract for the Turn Counter, defined in the domain layer and
//! implemented in `crate::infrastructure::repositories`.
//!
//! | Trait | Record | Implementations |
//! |-------|--------|----------------|
//! | `TurnCounterStore` | Turn Counter row | `InMemoryTurnCounterStore`, `PostgresTurnCounterStore` |
//!
//! Every read that precedes a write must be a locked read inside the same
//! transaction, so that two read-then-write sequences on the same value
//! cannot both commit.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::turn::{CounterKey, TurnValue};

/// SQLSTATE reported by PostgreSQL (and Aurora DSQL) for a serialization
/// failure.
pub const SQLSTATE_SERIALIZATION_FAILURE: &str = "40001";

/// Transactional access to the Turn Counter row.
///
/// A transaction is an owned value: `commit` and `rollback` consume it, so
/// no instance can hold a lock across iterations.
#[async_trait]
pub trait TurnCounterStore: Send + Sync {
    type Transaction: Send;

    /// Open a new transaction. Fails with [`StoreError::Connection`] when the
    /// store is unreachable.
    async fn begin_transaction(&self) -> Result<Self::Transaction, StoreError>;

    /// Locking read of the counter. Fails with [`StoreError::NotFound`] when
    /// the row is missing.
    async fn read_locked(
        &self,
        tx: &mut Self::Transaction,
        key: CounterKey,
    ) -> Result<TurnValue, StoreError>;

    /// Set the counter to `new_value` inside `tx`.
    async fn write(
        &self,
        tx: &mut Self::Transaction,
        key: CounterKey,
        new_value: TurnValue,
    ) -> Result<(), StoreError>;

    async fn commit(&self, tx: Self::Transaction) -> Result<(), StoreError>;

    /// Roll back `tx`. Failures are logged by the implementation, never
    /// surfaced.
    async fn rollback(&self, tx: Self::Transaction);

    /// Create the backing table if it does not exist.
    async fn ensure_schema(&self) -> Result<(), StoreError>;

    /// Create or overwrite the row with `value`, in its own transaction.
    async fn seed(&self, key: CounterKey, value: TurnValue) -> Result<(), StoreError>;

    /// Unlocked read for display purposes. `None` when the row is missing.
    async fn current_value(&self, key: CounterKey) -> Result<Option<TurnValue>, StoreError>;
}

/// Failures reported by a [`TurnCounterStore`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Store unreachable: {0}")]
    Connection(String),

    #[error("Turn counter row {key} not found")]
    NotFound { key: CounterKey },

    #[error("Database error{}: {message}", code_suffix(.code))]
    Database {
        /// SQLSTATE or store-specific error code, when the store reported one.
        code: Option<String>,
        message: String,
    },

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl StoreError {
    /// A serialization failure, as reported by a store that lost a
    /// first-committer-wins race.
    pub fn conflict(message: impl Into<String>) -> Self {
        StoreError::Database {
            code: Some(SQLSTATE_SERIALIZATION_FAILURE.to_string()),
            message: message.into(),
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            StoreError::Database { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

fn code_suffix(code: &Option<String>) -> String {
    code.as_deref()
        .map(|c| format!(" [{}]", c))
        .unwrap_or_default()
}
