//! Escrow state machine for note and ticket acceptors.
//!
//! | From        | Event          | To          |
//! |-------------|----------------|-------------|
//! | `Empty`     | note detected  | `InEscrow`  |
//! | `InEscrow`  | begin accept   | `Accepting` |
//! | `InEscrow`  | begin return   | `Returning` |
//! | `InEscrow`  | guard expiry   | `TimedOut`  |
//! | `Accepting` | stacked        | `Empty`     |
//! | `Accepting` | abort          | `InEscrow`  |
//! | `Returning` | returned       | `Empty`     |
//! | `Returning` | abort          | prior hold  |
//! | `TimedOut`  | begin return   | `Returning` |
//! | `TimedOut`  | path clear     | `Empty`     |
//!
//! Accepting and extending the hold are blocked while the stacker reports a
//! disabling condition (fault, disconnected, full or jam). Returning the
//! held item is always permitted, and an aborted return goes back to the
//! state it started from (`InEscrow` or `TimedOut`) so it can be retried.
//!
//! The guard uses the monotonic [`tokio::time::Instant`]. The task from
//! [`EscrowController::spawn_guard`] expires a held session once its guard
//! elapses; [`EscrowController::check_timeout`] does the same on demand.

use crate::events::{EventBus, EventKind};
use crate::state::{StateGraph, StateMachine, Transition};
use egm_core::DeviceIdentity;
use egm_protocol::reports::StackerStatus;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowState {
    Empty,
    InEscrow,
    Accepting,
    Returning,
    TimedOut,
}

impl fmt::Display for EscrowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EscrowState::Empty => "Empty",
            EscrowState::InEscrow => "InEscrow",
            EscrowState::Accepting => "Accepting",
            EscrowState::Returning => "Returning",
            EscrowState::TimedOut => "TimedOut",
        };
        write!(f, "{name}")
    }
}

impl StateGraph for EscrowState {
    fn can_transition_to(&self, target: &EscrowState) -> bool {
        use EscrowState::*;

        matches!(
            (self, target),
            (Empty, InEscrow)
                | (InEscrow, Accepting | Returning | TimedOut)
                | (Accepting, Empty | InEscrow)
                | (Returning, Empty | InEscrow | TimedOut)
                | (TimedOut, Returning | Empty)
        )
    }
}

/// How an escrow session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowOutcome {
    Accepted,
    Returned,
    TimedOut,
}

/// A note or ticket currently held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscrowSession {
    pub id: Uuid,
    /// Guard start; restarted by an extend.
    pub started_at: Instant,
    pub guard: Duration,
}

impl EscrowSession {
    fn new(guard: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Instant::now(),
            guard,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn is_expired(&self) -> bool {
        self.elapsed() > self.guard
    }

    pub fn remaining(&self) -> Duration {
        self.guard.saturating_sub(self.elapsed())
    }

    /// First instant at which the session counts as expired.
    pub fn expires_at(&self) -> Instant {
        // Expiry is strictly after the guard; timers resolve to 1 ms
        self.started_at + self.guard + Duration::from_millis(1)
    }
}

#[derive(Debug)]
struct Inner {
    machine: StateMachine<EscrowState>,
    session: Option<EscrowSession>,
    /// Hold state a return started from.
    returning_from: Option<EscrowState>,
    stacker: Option<StackerStatus>,
    last_outcome: Option<EscrowOutcome>,
}

/// Hold/accept/return controller for one acceptor.
#[derive(Debug)]
pub struct EscrowController {
    device: DeviceIdentity,
    guard: Duration,
    inner: Mutex<Inner>,
    events: EventBus,
    /// Wakes the guard task when a session starts or is extended.
    rearm: Notify,
}

impl EscrowController {
    pub fn new(device: DeviceIdentity, guard: Duration, events: EventBus) -> Self {
        Self {
            device,
            guard,
            inner: Mutex::new(Inner {
                machine: StateMachine::new(EscrowState::Empty),
                session: None,
                returning_from: None,
                stacker: None,
                last_outcome: None,
            }),
            events,
            rearm: Notify::new(),
        }
    }

    pub fn state(&self) -> EscrowState {
        self.inner.lock().machine.current()
    }

    pub fn session(&self) -> Option<EscrowSession> {
        self.inner.lock().session
    }

    pub fn last_outcome(&self) -> Option<EscrowOutcome> {
        self.inner.lock().last_outcome
    }

    pub fn history(&self) -> Vec<Transition<EscrowState>> {
        self.inner.lock().machine.history().iter().copied().collect()
    }

    /// Returns `true` if the cached stacker status blocks accepting.
    pub fn has_disabling_fault(&self) -> bool {
        self.inner
            .lock()
            .stacker
            .is_some_and(|stacker| stacker.is_disabling())
    }

    /// Cache a stacker status. Returns `false` if it equals the cached one.
    pub fn update_stacker_status(&self, status: StackerStatus) -> bool {
        let mut inner = self.inner.lock();
        if inner.stacker == Some(status) {
            return false;
        }
        inner.stacker = Some(status);
        true
    }

    pub fn stacker_status(&self) -> Option<StackerStatus> {
        self.inner.lock().stacker
    }

    /// A note entered escrow. Ignored unless the escrow is empty.
    pub fn note_detected(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.machine.current() != EscrowState::Empty {
            debug!(
                device = %self.device,
                state = %inner.machine.current(),
                "Ignoring note detection"
            );
            return false;
        }
        inner.session = Some(EscrowSession::new(self.guard));
        let moved = self.move_to(&mut inner, EscrowState::InEscrow);
        self.rearm.notify_one();
        moved
    }

    /// Restart the guard. No-op under a disabling fault.
    pub fn extend_timeout(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.machine.current() != EscrowState::InEscrow || Self::disabled(&inner) {
            return false;
        }
        if let Some(session) = inner.session.as_mut() {
            session.started_at = Instant::now();
            debug!(device = %self.device, session = %session.id, "Escrow guard restarted");
        }
        self.rearm.notify_one();
        true
    }

    /// Start accepting the held note. No-op under a disabling fault.
    pub fn begin_accept(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.machine.current() != EscrowState::InEscrow {
            return false;
        }
        if Self::disabled(&inner) {
            warn!(device = %self.device, "Accept blocked by stacker condition");
            return false;
        }
        self.move_to(&mut inner, EscrowState::Accepting)
    }

    /// Start returning the held item. Permitted under any fault.
    pub fn begin_return(&self) -> bool {
        let mut inner = self.inner.lock();
        let from = inner.machine.current();
        match from {
            EscrowState::InEscrow | EscrowState::TimedOut => {
                inner.returning_from = Some(from);
                self.move_to(&mut inner, EscrowState::Returning)
            }
            _ => false,
        }
    }

    /// The accept or return command never reached the device; the note is
    /// held again in the state the command started from.
    pub fn abort(&self) -> bool {
        let mut inner = self.inner.lock();
        let back = match inner.machine.current() {
            EscrowState::Accepting => EscrowState::InEscrow,
            EscrowState::Returning => inner
                .returning_from
                .take()
                .unwrap_or(EscrowState::InEscrow),
            _ => return false,
        };
        warn!(device = %self.device, to = %back, "Escrow command aborted");
        let moved = self.move_to(&mut inner, back);
        self.rearm.notify_one();
        moved
    }

    /// The device finished stacking or returning. Ends the session with
    /// the outcome in progress.
    pub fn complete(&self) -> Option<EscrowOutcome> {
        self.complete_as(None)
    }

    /// As [`EscrowController::complete`], with the outcome the device
    /// reported taking precedence over the one in progress.
    pub fn complete_as(&self, reported: Option<EscrowOutcome>) -> Option<EscrowOutcome> {
        let mut inner = self.inner.lock();
        let in_progress = match inner.machine.current() {
            EscrowState::Accepting => EscrowOutcome::Accepted,
            EscrowState::Returning => EscrowOutcome::Returned,
            _ => return None,
        };
        let outcome = reported.unwrap_or(in_progress);
        if outcome != in_progress {
            warn!(device = %self.device, ?in_progress, ?outcome, "Device overrode escrow command");
        }
        self.move_to(&mut inner, EscrowState::Empty);
        inner.last_outcome = Some(outcome);
        inner.session = None;
        inner.returning_from = None;
        info!(device = %self.device, ?outcome, "Escrow session ended");
        Some(outcome)
    }

    /// Expire the session once the guard has elapsed.
    pub fn check_timeout(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.machine.current() != EscrowState::InEscrow {
            return false;
        }
        let Some(session) = inner.session else {
            return false;
        };
        if !session.is_expired() {
            return false;
        }

        warn!(
            device = %self.device,
            session = %session.id,
            elapsed_ms = session.elapsed().as_millis() as u64,
            "Escrow timed out"
        );
        self.move_to(&mut inner, EscrowState::TimedOut);
        inner.last_outcome = Some(EscrowOutcome::TimedOut);
        true
    }

    /// Expiry instant of the held session, if a guard is running.
    pub fn deadline(&self) -> Option<Instant> {
        let inner = self.inner.lock();
        match (inner.machine.current(), inner.session) {
            (EscrowState::InEscrow, Some(session)) => Some(session.expires_at()),
            _ => None,
        }
    }

    /// Spawn the task that expires held sessions as their guard elapses.
    ///
    /// Runs until aborted; starting and extending a session re-arms it.
    pub fn spawn_guard(self: &Arc<Self>) -> JoinHandle<()> {
        let escrow = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let rearmed = escrow.rearm.notified();
                match escrow.deadline() {
                    Some(deadline) => {
                        tokio::select! {
                            _ = tokio::time::sleep_until(deadline) => {
                                escrow.check_timeout();
                            }
                            _ = rearmed => {}
                        }
                    }
                    None => rearmed.await,
                }
            }
        })
    }

    /// The note path is clear after a timeout.
    pub fn path_cleared(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.machine.current() != EscrowState::TimedOut {
            return false;
        }
        let moved = self.move_to(&mut inner, EscrowState::Empty);
        inner.session = None;
        inner.returning_from = None;
        moved
    }

    fn disabled(inner: &Inner) -> bool {
        inner.stacker.is_some_and(|stacker| stacker.is_disabling())
    }

    fn move_to(&self, inner: &mut Inner, to: EscrowState) -> bool {
        match inner.machine.transition_to(to) {
            Ok(transition) => {
                debug!(
                    device = %self.device,
                    from = %transition.from,
                    to = %transition.to,
                    "Escrow transition"
                );
                self.events.publish(
                    &self.device,
                    EventKind::EscrowChanged {
                        session: inner.session.map(|session| session.id),
                        from: transition.from,
                        to: transition.to,
                    },
                );
                true
            }
            Err(e) => {
                warn!(device = %self.device, error = %e, "Rejected escrow transition");
                false
            }
        }
    }
}
