//! Common test utilities for peripheral integration tests.
//!
//! Every helper plays the device side through a [`MockTransportHandle`]:
//! frames pushed on the handle travel the inbound channel and are
//! dispatched by the device's inbound task, exactly as a real transport
//! would deliver them.

#![allow(dead_code)]

use egm_core::{DeviceIdentity, DeviceKind};
use egm_hardware::config::{DeviceConfig, EscrowConfig};
use egm_hardware::mock::{MockTransport, MockTransportHandle};
use egm_hardware::{
    CoinAcceptor, EventBus, EventKind, Hopper, LinkState, NoteAcceptor, PeripheralEvent,
};
use egm_protocol::Report;
use egm_protocol::reports::{CoinAcceptorStatus, HopperStatus, StackerStatus};
use std::time::Duration;
use tokio::sync::broadcast;

/// Upper bound on waiting for an event that must arrive.
pub const EVENT_WAIT: Duration = Duration::from_secs(1);

pub struct Rig<D> {
    pub device: D,
    pub handle: MockTransportHandle,
    pub events: broadcast::Receiver<PeripheralEvent>,
}

fn config(kind: DeviceKind) -> DeviceConfig {
    DeviceConfig::new(DeviceIdentity::new(kind, 0x0A, 0x01))
}

async fn answer_handshake<R: Report>(mut device: MockTransportHandle, reply: R) {
    device.wait_for_writes(1).await;
    device.push_report(&reply).await.unwrap();
}

pub async fn coin_acceptor() -> Rig<CoinAcceptor<MockTransport>> {
    let (transport, handle) = MockTransport::new();
    let bus = EventBus::default();
    let device = CoinAcceptor::new(config(DeviceKind::CoinAcceptor), transport, bus.clone());
    device.spawn_inbound().unwrap();

    let (state, _) = tokio::join!(
        device.open(),
        answer_handshake(handle.clone(), CoinAcceptorStatus::default())
    );
    assert_eq!(state.unwrap(), LinkState::Idle);
    handle.clear_written();

    Rig {
        device,
        handle,
        events: bus.subscribe(),
    }
}

pub async fn hopper() -> Rig<Hopper<MockTransport>> {
    let (transport, handle) = MockTransport::new();
    let bus = EventBus::default();
    let device = Hopper::new(config(DeviceKind::Hopper), transport, bus.clone());
    device.spawn_inbound().unwrap();

    let (state, _) = tokio::join!(
        device.open(),
        answer_handshake(handle.clone(), HopperStatus::default())
    );
    assert_eq!(state.unwrap(), LinkState::Idle);
    handle.clear_written();

    Rig {
        device,
        handle,
        events: bus.subscribe(),
    }
}

pub async fn note_acceptor(escrow: EscrowConfig) -> Rig<NoteAcceptor<MockTransport>> {
    let (transport, handle) = MockTransport::new();
    let bus = EventBus::default();
    let device = NoteAcceptor::new(
        config(DeviceKind::NoteAcceptor),
        &escrow,
        transport,
        bus.clone(),
    );
    device.spawn_inbound().unwrap();

    let (state, _) = tokio::join!(
        device.open(),
        answer_handshake(handle.clone(), StackerStatus::default())
    );
    assert_eq!(state.unwrap(), LinkState::Idle);
    handle.clear_written();

    Rig {
        device,
        handle,
        events: bus.subscribe(),
    }
}

/// Wait for the next event accepted by `matches`, returning it together
/// with every event skipped on the way.
pub async fn next_event<F>(
    rx: &mut broadcast::Receiver<PeripheralEvent>,
    mut matches: F,
) -> (PeripheralEvent, Vec<EventKind>)
where
    F: FnMut(&EventKind) -> bool,
{
    let wait = async {
        let mut skipped = Vec::new();
        loop {
            let event = rx.recv().await.expect("event bus closed");
            if matches(&event.kind) {
                return (event, skipped);
            }
            skipped.push(event.kind);
        }
    };
    tokio::time::timeout(EVENT_WAIT, wait)
        .await
        .expect("timed out waiting for event")
}

/// Events already published and not yet received.
pub fn drain(rx: &mut broadcast::Receiver<PeripheralEvent>) -> Vec<EventKind> {
    let mut kinds = Vec::new();
    while let Ok(event) = rx.try_recv() {
        kinds.push(event.kind);
    }
    kinds
}

pub fn is_fault_occurred(kind: &EventKind) -> bool {
    matches!(kind, EventKind::FaultOccurred { .. })
}
