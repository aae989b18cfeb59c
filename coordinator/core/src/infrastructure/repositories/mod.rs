// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Turn Counter Store Implementations
//!
//! Infrastructure implementations of the `TurnCounterStore` contract defined
//! in the domain layer.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Transactional access to the shared Turn Counter row
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! # Available Implementations
//!
//! - **PostgresTurnCounterStore** - PostgreSQL / Aurora DSQL via `sqlx`
//! - **InMemoryTurnCounterStore** - first-committer-wins store for tests,
//!   demos and single-process play

pub mod in_memory_turn_counter;
pub mod postgres_turn_counter;

pub use in_memory_turn_counter::{CommitFault, CommittedWrite, InMemoryTransaction, InMemoryTurnCounterStore};
pub use postgres_turn_counter::{map_sqlx_error, PostgresTurnCounterStore};
