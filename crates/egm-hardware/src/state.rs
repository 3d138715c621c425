//! Validated state machines with bounded transition history.
//!
//! [`StateMachine`] enforces the transition rules of a [`StateGraph`] and
//! keeps the most recent transitions for diagnostics. It is not
//! thread-safe; owners wrap it in a lock. Timestamps come from
//! [`tokio::time::Instant`] so paused-clock tests control them.
//!
//! ```
//! use egm_hardware::state::StateMachine;
//! use egm_hardware::LinkState;
//!
//! let mut machine = StateMachine::new(LinkState::Disconnected);
//! machine.transition_to(LinkState::Connecting).unwrap();
//! assert!(machine.transition_to(LinkState::Busy).is_err());
//! assert_eq!(machine.history().len(), 1);
//! ```

use egm_core::constants::MAX_HISTORY_SIZE;
use egm_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// State set with a fixed transition table.
pub trait StateGraph: Copy + Eq + fmt::Debug + fmt::Display {
    fn can_transition_to(&self, target: &Self) -> bool;
}

/// A single state transition with timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition<S> {
    pub from: S,
    pub to: S,
    pub at: Instant,
}

impl<S> Transition<S> {
    pub fn elapsed(&self) -> Duration {
        self.at.elapsed()
    }
}

/// State machine over a [`StateGraph`].
#[derive(Debug)]
pub struct StateMachine<S> {
    current: S,
    entered_at: Instant,
    history: VecDeque<Transition<S>>,
}

impl<S: StateGraph> StateMachine<S> {
    pub fn new(initial: S) -> Self {
        Self {
            current: initial,
            entered_at: Instant::now(),
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
        }
    }

    pub fn current(&self) -> S {
        self.current
    }

    pub fn time_in_current_state(&self) -> Duration {
        self.entered_at.elapsed()
    }

    /// Recent transitions, oldest first.
    pub fn history(&self) -> &VecDeque<Transition<S>> {
        &self.history
    }

    /// Transition to `to`, validating against the graph.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidStateTransition` if the graph forbids the move.
    pub fn transition_to(&mut self, to: S) -> Result<Transition<S>> {
        if !self.current.can_transition_to(&to) {
            return Err(Error::InvalidStateTransition {
                from: self.current.to_string(),
                to: to.to_string(),
            });
        }
        Ok(self.record(to))
    }

    /// Move to `to` regardless of the graph. Used for link loss.
    pub fn force(&mut self, to: S) -> Transition<S> {
        self.record(to)
    }

    fn record(&mut self, to: S) -> Transition<S> {
        let transition = Transition {
            from: self.current,
            to,
            at: Instant::now(),
        };
        self.current = to;
        self.entered_at = transition.at;

        if self.history.len() >= MAX_HISTORY_SIZE {
            self.history.pop_front();
        }
        self.history.push_back(transition);
        transition
    }
}

/// Connection state of a device.
///
/// ```text
/// Disconnected ──► Connecting ──► Idle ◄──► Busy
///                      │           │ ▲
///                      ▼           ▼ │
///                   Faulted ◄── Resetting
/// ```
///
/// Any state may drop to `Disconnected` on link loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    Disconnected,
    Connecting,
    Idle,
    Busy,
    Resetting,
    Faulted,
}

impl LinkState {
    /// Returns `true` if the device accepts commands.
    pub fn accepts_commands(&self) -> bool {
        matches!(
            self,
            LinkState::Idle | LinkState::Busy | LinkState::Resetting | LinkState::Faulted
        )
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LinkState::Disconnected => "Disconnected",
            LinkState::Connecting => "Connecting",
            LinkState::Idle => "Idle",
            LinkState::Busy => "Busy",
            LinkState::Resetting => "Resetting",
            LinkState::Faulted => "Faulted",
        };
        write!(f, "{name}")
    }
}

impl StateGraph for LinkState {
    fn can_transition_to(&self, target: &LinkState) -> bool {
        use LinkState::*;

        matches!(
            (self, target),
            (Disconnected, Connecting)
                | (Connecting, Idle | Faulted | Disconnected)
                | (Idle, Busy | Resetting | Faulted | Disconnected)
                | (Busy, Idle | Faulted | Disconnected)
                | (Resetting, Idle | Faulted | Disconnected)
                | (Faulted, Idle | Resetting | Disconnected)
        )
    }
}
