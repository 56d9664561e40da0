//! Per-notification attempt lifecycle.
//!
//! ```text
//! NotQueued -> Attempting -> Delivered
//!                  ^   \
//!                  |    -> Postponed
//!                  '---------'
//! ```
//!
//! `Delivered` is terminal. `Postponed` is re-entered by a resend of the
//! pending entry the postponement left behind.

use std::fmt;

use courier_types::{DeliveryReceipt, PostponeReason};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    NotQueued,
    Attempting,
    Delivered,
    Postponed,
}

impl AttemptState {
    pub fn can_move_to(self, next: AttemptState) -> bool {
        use AttemptState::*;
        matches!(
            (self, next),
            (NotQueued, Attempting)
                | (Attempting, Delivered)
                | (Attempting, Postponed)
                | (Postponed, Attempting)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == AttemptState::Delivered
    }
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptState::NotQueued => write!(f, "not queued"),
            AttemptState::Attempting => write!(f, "attempting"),
            AttemptState::Delivered => write!(f, "delivered"),
            AttemptState::Postponed => write!(f, "postponed"),
        }
    }
}

/// Tracks one notification through its states.
#[derive(Debug, Clone)]
pub struct Attempt {
    state: AttemptState,
}

impl Attempt {
    /// A fresh notification from a build's queue
    pub fn queued() -> Self {
        Self {
            state: AttemptState::NotQueued,
        }
    }

    /// A notification replayed from a pending entry
    pub fn resumed() -> Self {
        Self {
            state: AttemptState::Postponed,
        }
    }

    pub fn state(&self) -> AttemptState {
        self.state
    }

    /// Move to `next`, returning whether the transition was allowed. A rejected
    /// transition leaves the state untouched.
    pub fn advance(&mut self, next: AttemptState) -> bool {
        if !self.state.can_move_to(next) {
            return false;
        }
        self.state = next;
        true
    }

    /// Start talking to the registry.
    pub fn begin(&mut self) {
        let moved = self.advance(AttemptState::Attempting);
        debug_assert!(moved, "cannot start an attempt that is {}", self.state);
    }

    /// Settle the attempt with `outcome`, moving to the state it implies.
    pub fn finish(&mut self, outcome: AttemptOutcome) -> AttemptOutcome {
        if let Some(next) = outcome.state() {
            let moved = self.advance(next);
            debug_assert!(moved, "cannot move from {} to {next}", self.state);
        }
        outcome
    }
}

/// Result of processing one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Accepted by the registry
    Delivered(DeliveryReceipt),
    /// Kept as a pending entry for a later resend
    Postponed(PostponeReason),
    /// Dropped without a registry call; never retried
    Skipped(String),
}

impl AttemptOutcome {
    /// The attempt state this outcome leaves the notification in, if any.
    pub fn state(&self) -> Option<AttemptState> {
        match self {
            AttemptOutcome::Delivered(_) => Some(AttemptState::Delivered),
            AttemptOutcome::Postponed(_) => Some(AttemptState::Postponed),
            AttemptOutcome::Skipped(_) => None,
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, AttemptOutcome::Delivered(_))
    }

    pub fn is_postponed(&self) -> bool {
        matches!(self, AttemptOutcome::Postponed(_))
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptOutcome::Delivered(receipt) => {
                write!(f, "delivered to {} ({})", receipt.registry, receipt.status)
            }
            AttemptOutcome::Postponed(reason) => write!(f, "postponed: {reason}"),
            AttemptOutcome::Skipped(reason) => write!(f, "skipped: {reason}"),
        }
    }
}
