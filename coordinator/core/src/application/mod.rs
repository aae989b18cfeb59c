// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Application Layer
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`conflict`] | Retryable / fatal classification of store errors |
//! | [`coordinator`] | `TurnCoordinator` state machine and `run_loop` |
//! | [`bootstrap`] | `initiator_bootstrap`, `reset_counter` |

pub mod conflict;
pub mod coordinator;
pub mod bootstrap;

pub use bootstrap::{initiator_bootstrap, reset_counter};
pub use conflict::{classify, ErrorClass};
pub use coordinator::{
    run_loop, CoordinatorError, CoordinatorSettings, CoordinatorState, RunReport, RunStop,
    StepOutcome, TurnCoordinator,
};
