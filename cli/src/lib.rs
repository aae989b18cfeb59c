// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! PingPong CLI library - exposes testable components
//!
//! # Architecture
//!
//! - **Layer:** Interface / Presentation Layer
//! - **Purpose:** Command handlers, store selection and shutdown handling
//!   for the `pingpong` binary

pub mod commands;
pub mod shutdown;
pub mod target;
