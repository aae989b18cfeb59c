// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Conflict Classifier
//!
//! Decides whether a failed write attempt may be retried by re-observing the
//! counter. The decision is a pure function of the error's reported code.
//!
//! Only a fixed allow-list of optimistic-concurrency SQLSTATEs is retryable.
//! Everything else is fatal, including every class 23 integrity violation,
//! a missing row and a lost connection.

use crate::domain::repository::{StoreError, SQLSTATE_SERIALIZATION_FAILURE};

/// SQLSTATE for `deadlock_detected`.
pub const SQLSTATE_DEADLOCK_DETECTED: &str = "40P01";

const RETRYABLE_SQLSTATES: [&str; 2] = [SQLSTATE_SERIALIZATION_FAILURE, SQLSTATE_DEADLOCK_DETECTED];

/// Classification of a store error for retry decision-making.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Another transaction won the race; re-observe and try again.
    Retryable,
    /// Terminate the loop and surface the error.
    Fatal,
}

pub fn classify(error: &StoreError) -> ErrorClass {
    match error {
        StoreError::Database {
            code: Some(code), ..
        } if is_retryable_sqlstate(code) => ErrorClass::Retryable,
        StoreError::Database { .. }
        | StoreError::Connection(_)
        | StoreError::NotFound { .. }
        | StoreError::Unknown(_) => ErrorClass::Fatal,
    }
}

pub fn is_retryable(error: &StoreError) -> bool {
    classify(error) == ErrorClass::Retryable
}

pub fn is_retryable_sqlstate(code: &str) -> bool {
    RETRYABLE_SQLSTATES.contains(&code)
}
