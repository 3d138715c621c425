//! Outbound peripheral notifications.
//!
//! Every device publishes onto one shared [`EventBus`]. Subscribers get
//! their own receiver; a slow subscriber lags and loses the oldest events
//! rather than blocking the device.

use crate::escrow::EscrowState;
use crate::state::LinkState;
use chrono::{DateTime, Utc};
use egm_core::DeviceIdentity;
use egm_core::constants::EVENT_BUS_CAPACITY;
use egm_protocol::reports::{NoteStatus, StackerStatus};
use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

/// Notification from one peripheral.
#[derive(Debug, Clone, PartialEq)]
pub struct PeripheralEvent {
    /// Full identity, so two devices of one kind stay distinguishable.
    pub device: DeviceIdentity,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
}

impl PeripheralEvent {
    pub fn new(device: DeviceIdentity, kind: EventKind) -> Self {
        Self {
            device,
            timestamp: Utc::now(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum EventKind {
    /// A fault was newly recorded. `active` holds every active fault bit.
    FaultOccurred { fault: &'static str, active: u32 },

    /// The fault set was cleared. `previous` holds the cleared bits.
    FaultsCleared { previous: u32 },

    CoinIn {
        channel: u8,
        legal: bool,
        to_hopper: bool,
        value_cents: u16,
    },

    CoinOut { legal: bool, count: u16 },

    NoteStatusChanged(NoteStatus),

    StackerStatusChanged(StackerStatus),

    EscrowChanged {
        session: Option<Uuid>,
        from: EscrowState,
        to: EscrowState,
    },

    ConnectionChanged { from: LinkState, to: LinkState },

    SelfTestCompleted { passed: bool, code: u8 },
}

/// Broadcast bus for [`PeripheralEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PeripheralEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PeripheralEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, device: &DeviceIdentity, kind: EventKind) {
        // No subscriber is not an error.
        if self.tx.send(PeripheralEvent::new(device.clone(), kind)).is_err() {
            trace!(%device, "No event subscribers");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EVENT_BUS_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use egm_core::DeviceKind;

    #[tokio::test]
    async fn test_every_subscriber_receives() {
        let bus = EventBus::default();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
        let hopper = DeviceIdentity::new(DeviceKind::Hopper, 0x20, 1);

        bus.publish(
            &hopper,
            EventKind::CoinOut {
                legal: true,
                count: 1,
            },
        );

        for rx in [&mut first, &mut second] {
            let event = rx.recv().await.unwrap();
            assert_eq!(event.device, hopper);
            assert_eq!(
                event.kind,
                EventKind::CoinOut {
                    legal: true,
                    count: 1
                }
            );
        }
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new(4);
        bus.publish(
            &DeviceIdentity::new(DeviceKind::CoinAcceptor, 1, 1),
            EventKind::FaultsCleared { previous: 1 },
        );
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_same_kind_devices_distinguishable() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let left = DeviceIdentity::new(DeviceKind::Hopper, 0x20, 1).with_serial_number("L-01");
        let right = DeviceIdentity::new(DeviceKind::Hopper, 0x20, 1).with_serial_number("R-01");

        for device in [&left, &right] {
            bus.publish(device, EventKind::FaultsCleared { previous: 1 });
        }

        assert_eq!(rx.recv().await.unwrap().device, left);
        assert_eq!(rx.recv().await.unwrap().device, right);
    }
}
