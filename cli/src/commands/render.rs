// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Terminal output for turn events and run reports.

use colored::Colorize;

use pingpong_core::application::{CoordinatorError, RunReport, RunStop};
use pingpong_core::domain::{Role, TurnEvent};
use pingpong_core::infrastructure::{EventBusError, EventReceiver};

/// Whether idle ticks are printed. They arrive once per poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Moves,
    All,
}

pub fn role_label(role: Role) -> colored::ColoredString {
    match role {
        Role::Initiator => "ping".cyan().bold(),
        Role::Responder => "pong".magenta().bold(),
    }
}

/// One line per event, or `None` when `verbosity` filters it out.
pub fn format_event(event: &TurnEvent, verbosity: Verbosity) -> Option<String> {
    match event {
        TurnEvent::Moved { role, value, moved_at } => Some(format!(
            "{} {} {}",
            moved_at.format("%H:%M:%S%.3f").to_string().dimmed(),
            role_label(*role),
            value.to_string().bold()
        )),
        TurnEvent::Contention {
            role,
            observed,
            attempted,
            reason,
            ..
        } => Some(match (observed, attempted) {
            (Some(observed), Some(attempted)) => format!(
                "{} lost the race writing {} over {}: {}",
                role_label(*role),
                attempted,
                observed,
                reason.yellow()
            ),
            _ => format!("{} lost the race reading the counter: {}", role_label(*role), reason.yellow()),
        }),
        TurnEvent::IdleTick { role, observed, .. } if verbosity == Verbosity::All => Some(format!(
            "{} waiting ({} on the counter)",
            role_label(*role),
            observed
        )),
        TurnEvent::IdleTick { .. } => None,
    }
}

/// Print events until the bus closes.
pub async fn print_events(mut receiver: EventReceiver, verbosity: Verbosity) {
    loop {
        match receiver.recv().await {
            Ok(event) => {
                if let Some(line) = format_event(&event, verbosity) {
                    println!("{}", line);
                }
            }
            // Already logged by the receiver; keep going from the newest event
            Err(EventBusError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
}

pub fn print_report(report: &RunReport) {
    let why = match report.stop {
        RunStop::Cancelled => "cancelled",
        RunStop::MoveLimitReached => "move limit reached",
    };
    println!();
    println!("{} {} ({})", role_label(report.role), "finished".green().bold(), why);
    println!("  Last confirmed value: {}", report.last_confirmed);
    println!("  Moves: {}", report.moves);
    println!("  Contentions: {}", report.contentions);
    println!("  Idle ticks: {}", report.idle_ticks);
}

pub fn print_failure(error: &CoordinatorError) {
    eprintln!();
    eprintln!("{}", "✗ Player stopped on a fatal error".red().bold());
    if let CoordinatorError::Fatal {
        role,
        last_confirmed,
        attempted,
        ..
    } = error
    {
        eprintln!("  Role: {}", role);
        eprintln!("  Last confirmed value: {}", last_confirmed);
        if let Some(attempted) = attempted {
            eprintln!(
                "  Attempted value: {} (it may or may not have been committed)",
                attempted
            );
        }
    }
    if let Some(source) = error.store_error() {
        eprintln!("  Store error: {}", source);
    }
}
