// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::turn::{Role, TurnValue};

/// Events emitted by a coordinator while it plays.
///
/// The sequence is unbounded; it ends only when the loop is cancelled or
/// fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// A write was committed and acknowledged by the store.
    Moved {
        role: Role,
        value: TurnValue,
        moved_at: DateTime<Utc>,
    },
    /// The store rejected the read or the write with a retryable conflict.
    /// `observed` and `attempted` are absent when the read was rejected.
    Contention {
        role: Role,
        observed: Option<TurnValue>,
        attempted: Option<TurnValue>,
        reason: String,
        detected_at: DateTime<Utc>,
    },
    /// It was not this role's turn.
    IdleTick {
        role: Role,
        observed: TurnValue,
        ticked_at: DateTime<Utc>,
    },
}

impl TurnEvent {
    pub fn role(&self) -> Role {
        match self {
            TurnEvent::Moved { role, .. }
            | TurnEvent::Contention { role, .. }
            | TurnEvent::IdleTick { role, .. } => *role,
        }
    }

    /// The committed value for `Moved`, `None` otherwise.
    pub fn moved_value(&self) -> Option<TurnValue> {
        match self {
            TurnEvent::Moved { value, .. } => Some(*value),
            _ => None,
        }
    }
}

/// Caller-supplied destination for [`TurnEvent`]s (display, bus, test probe).
pub trait TurnEventSink: Send + Sync {
    fn emit(&self, event: TurnEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl TurnEventSink for NullSink {
    fn emit(&self, _event: TurnEvent) {}
}

impl<F> TurnEventSink for F
where
    F: Fn(TurnEvent) + Send + Sync,
{
    fn emit(&self, event: TurnEvent) {
        self(event)
    }
}
