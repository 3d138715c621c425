//! Per-device fault aggregation with edge-triggered notification.

use crate::events::{EventBus, EventKind};
use egm_core::{DeviceIdentity, FaultCode, FaultSet};
use parking_lot::Mutex;
use tracing::{info, trace, warn};

/// Persistent set of active faults for one device.
///
/// A fault stays set until [`FaultAggregator::clear_all`]; there is no
/// per-fault clear. Setting an already active fault is a no-op, so each
/// fault produces exactly one `FaultOccurred` event per rising edge.
#[derive(Debug)]
pub struct FaultAggregator<C: FaultCode> {
    device: DeviceIdentity,
    faults: Mutex<FaultSet<C>>,
    events: EventBus,
}

impl<C: FaultCode> FaultAggregator<C> {
    pub fn new(device: DeviceIdentity, events: EventBus) -> Self {
        Self {
            device,
            faults: Mutex::new(FaultSet::empty()),
            events,
        }
    }

    /// Record `code`. Returns `true` on a rising edge.
    pub fn set_fault(&self, code: C) -> bool {
        let active = {
            let mut faults = self.faults.lock();
            if faults.toggled(code).is_empty() {
                trace!(device = %self.device, fault = code.name(), "Fault already active");
                return false;
            }
            faults.insert(code);
            *faults
        };

        warn!(device = %self.device, fault = code.name(), active = %active, "Fault raised");
        self.events.publish(
            &self.device,
            EventKind::FaultOccurred {
                fault: code.name(),
                active: active.bits(),
            },
        );
        true
    }

    /// Clear every fault, returning the cleared set.
    pub fn clear_all(&self) -> FaultSet<C> {
        let previous = self.faults.lock().take();
        if !previous.is_empty() {
            info!(device = %self.device, cleared = %previous, "Faults cleared");
            self.events.publish(
                &self.device,
                EventKind::FaultsCleared {
                    previous: previous.bits(),
                },
            );
        }
        previous
    }

    /// Snapshot of the active faults.
    pub fn faults(&self) -> FaultSet<C> {
        *self.faults.lock()
    }

    pub fn contains(&self, code: C) -> bool {
        self.faults.lock().contains(code)
    }

    pub fn is_empty(&self) -> bool {
        self.faults.lock().is_empty()
    }
}
