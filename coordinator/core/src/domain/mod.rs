// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Layer
//!
//! Pure types and persistence contracts. No I/O dependencies.
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`turn`] | `Role`, `CounterKey`, `TurnValue`, `LastWritten` |
//! | [`events`] | `TurnEvent`, `TurnEventSink` |
//! | [`repository`] | `TurnCounterStore`, `StoreError` |
//! | [`config`] | `PingPongConfig` manifest |

pub mod turn;
pub mod events;
pub mod repository;
pub mod config;

pub use turn::*;
pub use events::*;
pub use repository::*;
