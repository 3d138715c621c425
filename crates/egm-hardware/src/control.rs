//! Device control state machine.
//!
//! A [`DeviceControl`] owns one device's transport, report dispatcher and
//! fault aggregator, and sequences everything written to the device.
//!
//! # Concurrency
//!
//! - Outbound writes are serialized by an async mutex around the transport.
//!   Each write is bounded; a write that fails or times out takes the device
//!   to `Disconnected`. There is no automatic reconnect.
//! - Inbound frames are consumed by a single task ([`DeviceControl::spawn_inbound`])
//!   that calls [`DeviceControl::on_frame`]. Handlers run on that task.
//! - State changes are published on a watch channel and as
//!   `ConnectionChanged` events.
//!
//! # Faults
//!
//! A newly raised fault moves an `Idle` or `Busy` device to `Faulted`.
//! Faults raised while connecting or resetting are held until the next
//! inbound traffic settles the state. Resetting does not clear faults;
//! only [`DeviceControl::clear_faults`] does.

use crate::config::DeviceConfig;
use crate::error::{HardwareError, Result};
use crate::events::{EventBus, EventKind};
use crate::fault::FaultAggregator;
use crate::state::{LinkState, StateMachine, Transition};
use crate::transport::Transport;
use bytes::Bytes;
use egm_core::{DeviceIdentity, FaultCode, FaultSet};
use egm_protocol::reports::SelfTest;
use egm_protocol::{DispatchOutcome, Report, ReportDispatcher, ReportTable, encode};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Control surface of one device.
pub struct DeviceControl<T, C: FaultCode> {
    identity: DeviceIdentity,
    config: DeviceConfig,
    transport: Mutex<T>,
    inbound: parking_lot::Mutex<Option<mpsc::Receiver<Bytes>>>,
    dispatcher: ReportDispatcher,
    faults: FaultAggregator<C>,
    link: parking_lot::Mutex<StateMachine<LinkState>>,
    state_tx: watch::Sender<LinkState>,
    events: EventBus,
}

impl<T: Transport, C: FaultCode> DeviceControl<T, C> {
    /// Create a disconnected device over `transport`.
    ///
    /// `table` is the device family's report catalog.
    pub fn new(
        config: DeviceConfig,
        mut transport: T,
        table: ReportTable,
        events: EventBus,
    ) -> Arc<Self> {
        let identity = config.identity.clone();
        let inbound = transport.take_inbound();
        if inbound.is_none() {
            warn!(device = %identity, "Transport inbound channel already taken");
        }

        let (state_tx, _) = watch::channel(LinkState::Disconnected);

        Arc::new(Self {
            faults: FaultAggregator::new(identity.clone(), events.clone()),
            identity,
            config,
            transport: Mutex::new(transport),
            inbound: parking_lot::Mutex::new(inbound),
            dispatcher: ReportDispatcher::new(table),
            link: parking_lot::Mutex::new(StateMachine::new(LinkState::Disconnected)),
            state_tx,
            events,
        })
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn state(&self) -> LinkState {
        self.link.lock().current()
    }

    /// Watch channel following the connection state.
    pub fn subscribe_state(&self) -> watch::Receiver<LinkState> {
        self.state_tx.subscribe()
    }

    pub fn history(&self) -> Vec<Transition<LinkState>> {
        self.link.lock().history().iter().copied().collect()
    }

    pub fn dispatcher(&self) -> &ReportDispatcher {
        &self.dispatcher
    }

    pub fn faults(&self) -> FaultSet<C> {
        self.faults.faults()
    }

    /// Register the handler for inbound reports of type `R`.
    ///
    /// Last registration wins; returns `true` if a handler was replaced.
    pub fn on<R, F>(&self, handler: F) -> bool
    where
        R: Report,
        F: Fn(&R) + Send + Sync + 'static,
    {
        self.dispatcher.register::<R, F>(handler)
    }

    /// Connect: configure and enable the transport, then send `handshake`
    /// every handshake interval until the device answers.
    ///
    /// Resolves with the settled state (`Idle`, or `Faulted` if faults were
    /// reported during the handshake). Retries indefinitely; drop the
    /// future to abort. Requires [`DeviceControl::spawn_inbound`] so replies
    /// are seen.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::InvalidState` unless disconnected, or a
    /// transport error if configuring or writing fails.
    pub async fn open<R: Report>(&self, handshake: &R) -> Result<LinkState> {
        let frame = encode(handshake)?;

        {
            let mut transport = self.transport.lock().await;
            let state = self.state();
            if state != LinkState::Disconnected {
                return Err(HardwareError::invalid_state("open", state));
            }
            transport.configure(&self.config.serial).await?;
            transport.set_enabled(true).await?;
            self.transition(LinkState::Connecting)?;
        }

        info!(device = %self.identity, handshake = R::NAME, "Connecting");
        let mut state_rx = self.state_tx.subscribe();
        let interval = self.config.handshake_interval();

        loop {
            {
                let mut transport = self.transport.lock().await;
                if self.state() != LinkState::Connecting {
                    break;
                }
                self.write_locked(&mut transport, &frame, self.config.serial.write_timeout())
                    .await?;
            }

            let settled =
                tokio::time::timeout(interval, state_rx.wait_for(|s| *s != LinkState::Connecting))
                    .await;
            match settled {
                Ok(_) => break,
                Err(_) => trace!(device = %self.identity, "Handshake unanswered, retrying"),
            }
        }

        match self.state() {
            LinkState::Disconnected => Err(HardwareError::disconnected(self.identity.to_string())),
            state => Ok(state),
        }
    }

    /// Encode and write `command`. Fire-and-forget with respect to replies.
    ///
    /// An `Idle` device passes through `Busy` for the duration of the write.
    /// A `Faulted` or `Resetting` device accepts the write without changing
    /// state.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::InvalidState` if the device is not connected,
    /// or the transport failure that disconnected it.
    pub async fn send_command<R: Report>(&self, command: &R) -> Result<()> {
        self.send(command, self.config.serial.write_timeout()).await
    }

    /// As [`DeviceControl::send_command`], bounded by the keep-alive timeout.
    ///
    /// # Errors
    ///
    /// See [`DeviceControl::send_command`].
    pub async fn send_keep_alive<R: Report>(&self, keep_alive: &R) -> Result<()> {
        self.send(keep_alive, self.config.serial.keep_alive_timeout())
            .await
    }

    /// Write `command` and enter `Resetting`.
    ///
    /// The next decoded inbound report settles the device to `Idle`, or to
    /// `Faulted` if faults are still recorded.
    ///
    /// # Errors
    ///
    /// See [`DeviceControl::send_command`].
    pub async fn reset<R: Report>(&self, command: &R) -> Result<()> {
        let frame = encode(command)?;
        let mut transport = self.transport.lock().await;
        let state = self.state();
        if !state.accepts_commands() {
            return Err(HardwareError::invalid_state("reset", state));
        }

        self.write_locked(&mut transport, &frame, self.config.serial.write_timeout())
            .await?;
        if self.state() != LinkState::Resetting {
            self.transition(LinkState::Resetting)?;
        }
        info!(device = %self.identity, "Reset requested");
        Ok(())
    }

    /// Request a self test.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::Unsupported` if the device lacks the
    /// capability; the request is not retried.
    pub async fn self_test(&self, nvm: bool) -> Result<()> {
        if !self.config.supports_self_test {
            warn!(device = %self.identity, "Self test not supported");
            return Err(HardwareError::unsupported("self_test"));
        }
        self.send_command(&SelfTest { nvm }).await
    }

    /// Disable the transport and enter `Disconnected`.
    ///
    /// # Errors
    ///
    /// Returns the transport's error if it cannot be disabled; the device is
    /// disconnected either way.
    pub async fn close(&self) -> Result<()> {
        let mut transport = self.transport.lock().await;
        let result = transport.set_enabled(false).await;
        self.force_disconnect();
        info!(device = %self.identity, "Closed");
        result
    }

    /// Dispatch one inbound frame.
    ///
    /// Returns `None` if the device is disconnected and the frame was
    /// ignored. A decoded frame settles `Connecting` and `Resetting`.
    pub fn on_frame(&self, frame: &[u8]) -> Option<DispatchOutcome> {
        if self.state() == LinkState::Disconnected {
            trace!(device = %self.identity, len = frame.len(), "Ignoring frame while disconnected");
            return None;
        }

        let outcome = self.dispatcher.dispatch(frame);
        if outcome.is_decoded() {
            self.settle();
        }
        Some(outcome)
    }

    /// Spawn the inbound consumer. Returns `None` if already spawned.
    pub fn spawn_inbound(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let mut inbound = self.inbound.lock().take()?;
        let control = Arc::clone(self);

        Some(tokio::spawn(async move {
            while let Some(frame) = inbound.recv().await {
                control.on_frame(&frame);
            }
            debug!(device = %control.identity, "Inbound channel closed");
            control.force_disconnect();
        }))
    }

    /// Record a fault. A rising edge moves an `Idle` or `Busy` device to
    /// `Faulted`.
    pub fn raise_fault(&self, code: C) -> bool {
        let newly = self.faults.set_fault(code);
        if newly {
            let mut link = self.link.lock();
            if matches!(link.current(), LinkState::Idle | LinkState::Busy) {
                self.apply(&mut link, LinkState::Faulted);
            }
        }
        newly
    }

    /// Clear every fault; a `Faulted` device returns to `Idle`.
    pub fn clear_faults(&self) -> FaultSet<C> {
        let previous = self.faults.clear_all();
        let mut link = self.link.lock();
        if link.current() == LinkState::Faulted {
            self.apply(&mut link, LinkState::Idle);
        }
        previous
    }

    async fn send<R: Report>(&self, command: &R, limit: Duration) -> Result<()> {
        let frame = encode(command)?;
        let mut transport = self.transport.lock().await;

        let state = self.state();
        if !state.accepts_commands() {
            return Err(HardwareError::invalid_state(
                format!("send {}", R::NAME),
                state,
            ));
        }

        let busy = self.transition_if(LinkState::Idle, LinkState::Busy);
        self.write_locked(&mut transport, &frame, limit).await?;
        if busy {
            self.transition_if(LinkState::Busy, LinkState::Idle);
        }

        debug!(device = %self.identity, command = R::NAME, "Command sent");
        Ok(())
    }

    async fn write_locked(&self, transport: &mut T, frame: &[u8], limit: Duration) -> Result<()> {
        match tokio::time::timeout(limit, transport.write(frame)).await {
            Ok(Ok(())) => {
                trace!(device = %self.identity, len = frame.len(), "Frame written");
                Ok(())
            }
            Ok(Err(e)) => {
                error!(device = %self.identity, error = %e, "Write failed");
                self.force_disconnect();
                Err(e)
            }
            Err(_) => {
                let limit_ms = limit.as_millis() as u64;
                error!(device = %self.identity, limit_ms, "Write timed out");
                self.force_disconnect();
                Err(HardwareError::timeout(limit_ms))
            }
        }
    }

    fn settle(&self) {
        let mut link = self.link.lock();
        if matches!(link.current(), LinkState::Connecting | LinkState::Resetting) {
            let to = if self.faults.is_empty() {
                LinkState::Idle
            } else {
                LinkState::Faulted
            };
            self.apply(&mut link, to);
        }
    }

    fn transition(&self, to: LinkState) -> Result<()> {
        let mut link = self.link.lock();
        let transition = link.transition_to(to)?;
        self.publish(transition);
        Ok(())
    }

    fn transition_if(&self, from: LinkState, to: LinkState) -> bool {
        let mut link = self.link.lock();
        if link.current() != from {
            return false;
        }
        self.apply(&mut link, to)
    }

    fn apply(&self, link: &mut StateMachine<LinkState>, to: LinkState) -> bool {
        match link.transition_to(to) {
            Ok(transition) => {
                self.publish(transition);
                true
            }
            Err(e) => {
                warn!(device = %self.identity, error = %e, "Rejected link transition");
                false
            }
        }
    }

    fn force_disconnect(&self) {
        let mut link = self.link.lock();
        if link.current() != LinkState::Disconnected {
            let transition = link.force(LinkState::Disconnected);
            self.publish(transition);
        }
    }

    fn publish(&self, transition: Transition<LinkState>) {
        info!(
            device = %self.identity,
            from = %transition.from,
            to = %transition.to,
            "Link state changed"
        );
        self.state_tx.send_replace(transition.to);
        self.events.publish(
            &self.identity,
            EventKind::ConnectionChanged {
                from: transition.from,
                to: transition.to,
            },
        );
    }
}

impl<T, C: FaultCode> std::fmt::Debug for DeviceControl<T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceControl")
            .field("identity", &self.identity)
            .field("state", &self.link.lock().current())
            .field("faults", &self.faults.faults())
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}
