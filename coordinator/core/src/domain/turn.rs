// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Turn Domain Types
//!
//! - [`Role`] - one of the two fixed participants.
//! - [`CounterKey`] - identity of the shared Turn Counter row.
//! - [`LastWritten`] - the process-local marker of the highest value this
//!   instance has seen committed by its own hand.
//!
//! ## Parity Convention
//!
//! The Initiator performs the first move (0 → 1). From then on odd values
//! are written by the Initiator and even nonzero values by the Responder.
//! A role *answers* a value when the next value belongs to it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Counter value stored in the shared row. 64-bit store-wide.
pub type TurnValue = i64;

/// One of the two fixed participants in the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Performs the first move and owns odd values.
    Initiator,
    /// Answers the Initiator and owns even nonzero values.
    Responder,
}

impl Role {
    /// Value of the Local Last-Written marker when the coordinator starts.
    ///
    /// The Initiator has already written 1 during bootstrap.
    pub fn initial_last_written(self) -> TurnValue {
        match self {
            Role::Initiator => 1,
            Role::Responder => 0,
        }
    }

    /// The role that writes `value`, or `None` for the seed value 0
    /// (and for negative values, which a healthy row never holds).
    pub fn owner_of(value: TurnValue) -> Option<Role> {
        if value <= 0 {
            None
        } else if value % 2 == 1 {
            Some(Role::Initiator)
        } else {
            Some(Role::Responder)
        }
    }

    /// The role expected to move the counter away from `value`.
    pub fn next_to_move(value: TurnValue) -> Role {
        if value.rem_euclid(2) == 0 {
            Role::Initiator
        } else {
            Role::Responder
        }
    }

    /// Whether `value` is one this role responds to.
    pub fn answers(self, value: TurnValue) -> bool {
        value >= 0 && Self::next_to_move(value) == self
    }

    pub fn opponent(self) -> Role {
        match self {
            Role::Initiator => Role::Responder,
            Role::Responder => Role::Initiator,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Initiator => "initiator",
            Role::Responder => "responder",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "initiator" | "ping" => Ok(Role::Initiator),
            "responder" | "pong" => Ok(Role::Responder),
            other => Err(format!(
                "unknown role '{}': expected 'initiator' or 'responder'",
                other
            )),
        }
    }
}

/// Primary key of the Turn Counter row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CounterKey(pub i64);

impl Default for CounterKey {
    fn default() -> Self {
        Self(1)
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Local Last-Written marker, exclusively owned by one coordinator.
///
/// # Invariants
///
/// - Advanced only after the store acknowledged a commit.
/// - Never decremented.
/// - Never persisted; a restarted process starts again from
///   [`Role::initial_last_written`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastWritten {
    role: Role,
    value: TurnValue,
}

impl LastWritten {
    pub fn for_role(role: Role) -> Self {
        Self {
            role,
            value: role.initial_last_written(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn value(&self) -> TurnValue {
        self.value
    }

    /// Own-turn detection for a freshly observed counter value.
    ///
    /// The observed value must be strictly greater than the marker, so a role
    /// never responds to its own most recent move. It must also be a value the
    /// role answers: if this instance's write landed but the acknowledgment
    /// was lost, the counter now holds a value of its own parity and the
    /// instance backs off instead of writing a second time.
    pub fn is_my_turn(&self, observed: TurnValue) -> bool {
        observed > self.value && self.role.answers(observed)
    }

    /// Record a confirmed write. Returns `false` and leaves the marker
    /// untouched when `confirmed` would not move it forward.
    pub fn confirm(&mut self, confirmed: TurnValue) -> bool {
        if confirmed <= self.value {
            return false;
        }
        self.value = confirmed;
        true
    }
}
