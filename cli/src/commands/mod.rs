// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for PingPong CLI

pub mod config;
pub mod demo;
pub mod play;
pub mod render;
pub mod reset;
pub mod status;

pub use self::config::ConfigCommand;
pub use self::demo::DemoArgs;
pub use self::play::PlayArgs;
pub use self::reset::ResetArgs;
pub use self::status::StatusArgs;
