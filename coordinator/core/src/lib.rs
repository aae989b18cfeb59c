// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `pingpong-core` - Turn-Taking Coordination Crate
//!
//! Two processes take strictly alternating turns by advancing a single
//! shared counter row in a transactional store. The store is the only
//! channel between them; all mutual exclusion comes from its isolation
//! guarantees.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | `Role`, `LastWritten`, `TurnEvent`, `TurnCounterStore`, `PingPongConfig` |
//! | [`application`] | Application | Conflict classifier, `TurnCoordinator`, initiator bootstrap |
//! | [`infrastructure`] | Infrastructure | PostgreSQL and in-memory stores, event bus |
//!
//! ## Parity Convention
//!
//! The Initiator performs the first move 0 → 1, so odd counter values were
//! written by the Initiator and even nonzero values by the Responder.

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
