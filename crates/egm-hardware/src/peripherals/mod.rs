//! Cash-handling peripherals.
//!
//! Each peripheral embeds an `Arc<DeviceControl>` and adds the commands and
//! report handlers of its family. [`Peripherals`] builds the configured set
//! over one shared [`EventBus`].

pub mod coin_acceptor;
pub mod hopper;
pub mod note_acceptor;

pub use coin_acceptor::CoinAcceptor;
pub use hopper::Hopper;
pub use note_acceptor::NoteAcceptor;

use crate::config::{DeviceConfig, PeripheralConfig};
use crate::control::DeviceControl;
use crate::error::Result;
use crate::events::{EventBus, EventKind, PeripheralEvent};
use crate::transport::Transport;
use egm_core::FaultCode;
use egm_protocol::reports::SelfTestResult;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Publish `SelfTestCompleted` for every self test result.
fn on_self_test_result<T: Transport, C: FaultCode>(
    control: &Arc<DeviceControl<T, C>>,
    events: &EventBus,
) {
    let identity = control.identity().clone();
    let events = events.clone();
    control.on::<SelfTestResult, _>(move |result| {
        if result.passed {
            info!(device = %identity, "Self test passed");
        } else {
            warn!(device = %identity, code = result.code, "Self test failed");
        }
        events.publish(
            &identity,
            EventKind::SelfTestCompleted {
                passed: result.passed,
                code: result.code,
            },
        );
    });
}

/// The configured peripherals of one machine.
///
/// # Examples
///
/// ```
/// use egm_hardware::config::PeripheralConfig;
/// use egm_hardware::mock::MockTransport;
/// use egm_hardware::peripherals::Peripherals;
///
/// let config = PeripheralConfig::from_json(r#"{
///     "hopper": { "identity": { "kind": "hopper", "vendor_id": 1, "product_id": 2 } }
/// }"#)?;
///
/// let peripherals = Peripherals::from_config(&config, |_| Ok(MockTransport::new().0))?;
/// assert!(peripherals.hopper.is_some());
/// assert!(peripherals.coin_acceptor.is_none());
/// # Ok::<(), egm_hardware::HardwareError>(())
/// ```
#[derive(Debug)]
pub struct Peripherals<T: Transport> {
    pub coin_acceptor: Option<CoinAcceptor<T>>,
    pub hopper: Option<Hopper<T>>,
    pub note_acceptor: Option<NoteAcceptor<T>>,
    events: EventBus,
}

impl<T: Transport> Peripherals<T> {
    /// Build every configured device. `connect` supplies the transport for
    /// each device config.
    ///
    /// # Errors
    ///
    /// Returns the first validation error, or the first error from
    /// `connect`.
    pub fn from_config<F>(config: &PeripheralConfig, mut connect: F) -> Result<Self>
    where
        F: FnMut(&DeviceConfig) -> Result<T>,
    {
        config.validate()?;
        let events = EventBus::new(config.event_bus_capacity);

        let coin_acceptor = match &config.coin_acceptor {
            Some(device) => Some(CoinAcceptor::new(
                device.clone(),
                connect(device)?,
                events.clone(),
            )),
            None => None,
        };
        let hopper = match &config.hopper {
            Some(device) => Some(Hopper::new(device.clone(), connect(device)?, events.clone())),
            None => None,
        };
        let note_acceptor = match &config.note_acceptor {
            Some(device) => Some(NoteAcceptor::new(
                device.clone(),
                &config.escrow,
                connect(device)?,
                events.clone(),
            )),
            None => None,
        };

        info!(
            coin_acceptor = coin_acceptor.is_some(),
            hopper = hopper.is_some(),
            note_acceptor = note_acceptor.is_some(),
            "Peripherals configured"
        );

        Ok(Self {
            coin_acceptor,
            hopper,
            note_acceptor,
            events,
        })
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PeripheralEvent> {
        self.events.subscribe()
    }

    /// Start the inbound consumer of every device.
    pub fn spawn_inbound(&self) -> Vec<JoinHandle<()>> {
        let mut tasks = Vec::new();
        if let Some(device) = &self.coin_acceptor {
            tasks.extend(device.spawn_inbound());
        }
        if let Some(device) = &self.hopper {
            tasks.extend(device.spawn_inbound());
        }
        if let Some(device) = &self.note_acceptor {
            tasks.extend(device.spawn_inbound());
        }
        tasks
    }

    /// Close every device, returning the first error.
    ///
    /// # Errors
    ///
    /// Every device is closed even if an earlier close fails.
    pub async fn close_all(&self) -> Result<()> {
        let mut result = Ok(());
        if let Some(device) = &self.coin_acceptor {
            result = result.and(device.close().await);
        }
        if let Some(device) = &self.hopper {
            result = result.and(device.close().await);
        }
        if let Some(device) = &self.note_acceptor {
            result = result.and(device.close().await);
        }
        result
    }
}


#[cfg(test)]
pub(crate) mod testing {
    use crate::mock::MockTransportHandle;
    use egm_protocol::Report;

    /// Play the device side of a handshake: wait for the first write, then
    /// reply with `report`.
    pub async fn answer_handshake<R: Report>(mut device: MockTransportHandle, report: R) {
        device.wait_for_writes(1).await;
        device.push_report(&report).await.unwrap();
    }
}
