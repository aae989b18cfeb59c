// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Turn Counter Store
//!
//! Production `TurnCounterStore` backed by a single-row table in PostgreSQL
//! or Aurora DSQL via `sqlx`.
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS turn_counter (
//!     id    BIGINT PRIMARY KEY,
//!     value BIGINT NOT NULL
//! );
//! ```
//!
//! The locked read is `SELECT ... FOR UPDATE`. On PostgreSQL that takes a row
//! lock; on Aurora DSQL it adds the row to the optimistic conflict check, so
//! a competing commit surfaces as SQLSTATE `40001` at commit time.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, Postgres};
use tracing::warn;

use crate::domain::config::IsolationLevel;
use crate::domain::repository::{StoreError, TurnCounterStore};
use crate::domain::turn::{CounterKey, TurnValue};

pub struct PostgresTurnCounterStore {
    pool: PgPool,
    isolation: IsolationLevel,
    create_sql: String,
    select_locked_sql: String,
    select_sql: String,
    update_sql: String,
    upsert_sql: String,
}

impl PostgresTurnCounterStore {
    /// `table` must be a plain identifier; configuration validation enforces
    /// this before a store is built.
    pub fn new(pool: PgPool, table: &str, isolation: IsolationLevel) -> Self {
        Self {
            pool,
            isolation,
            create_sql: format!(
                "CREATE TABLE IF NOT EXISTS {} (id BIGINT PRIMARY KEY, value BIGINT NOT NULL)",
                table
            ),
            select_locked_sql: format!("SELECT value FROM {} WHERE id = $1 FOR UPDATE", table),
            select_sql: format!("SELECT value FROM {} WHERE id = $1", table),
            update_sql: format!("UPDATE {} SET value = $2 WHERE id = $1", table),
            upsert_sql: format!(
                "INSERT INTO {} (id, value) VALUES ($1, $2) \
                 ON CONFLICT (id) DO UPDATE SET value = EXCLUDED.value",
                table
            ),
        }
    }
}

#[async_trait]
impl TurnCounterStore for PostgresTurnCounterStore {
    type Transaction = sqlx::Transaction<'static, Postgres>;

    async fn begin_transaction(&self) -> Result<Self::Transaction, StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        if let Some(level) = self.isolation.as_sql() {
            let statement = format!("SET TRANSACTION ISOLATION LEVEL {}", level);
            if let Err(e) = sqlx::query(&statement).execute(&mut *tx).await {
                let error = map_sqlx_error(e);
                self.rollback(tx).await;
                return Err(error);
            }
        }

        Ok(tx)
    }

    async fn read_locked(
        &self,
        tx: &mut Self::Transaction,
        key: CounterKey,
    ) -> Result<TurnValue, StoreError> {
        sqlx::query_scalar::<_, i64>(&self.select_locked_sql)
            .bind(key.0)
            .fetch_optional(&mut **tx)
            .await
            .map_err(map_sqlx_error)?
            .ok_or(StoreError::NotFound { key })
    }

    async fn write(
        &self,
        tx: &mut Self::Transaction,
        key: CounterKey,
        new_value: TurnValue,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(&self.update_sql)
            .bind(key.0)
            .bind(new_value)
            .execute(&mut **tx)
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { key });
        }
        Ok(())
    }

    async fn commit(&self, tx: Self::Transaction) -> Result<(), StoreError> {
        tx.commit().await.map_err(map_sqlx_error)
    }

    async fn rollback(&self, tx: Self::Transaction) {
        if let Err(e) = tx.rollback().await {
            warn!(error = %e, "Rollback failed; the connection will discard the transaction");
        }
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(&self.create_sql)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn seed(&self, key: CounterKey, value: TurnValue) -> Result<(), StoreError> {
        sqlx::query(&self.upsert_sql)
            .bind(key.0)
            .bind(value)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn current_value(&self, key: CounterKey) -> Result<Option<TurnValue>, StoreError> {
        sqlx::query_scalar::<_, i64>(&self.select_sql)
            .bind(key.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }
}

/// Translate a `sqlx` error into the store taxonomy, keeping the SQLSTATE
/// so the conflict classifier can see it.
pub fn map_sqlx_error(error: sqlx::Error) -> StoreError {
    match &error {
        sqlx::Error::Database(db) => StoreError::Database {
            code: db.code().map(|c| c.into_owned()),
            message: db.message().to_string(),
        },
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => StoreError::Connection(error.to_string()),
        _ => StoreError::Unknown(error.to_string()),
    }
}
