//! Coin hopper.

use super::on_self_test_result;
use crate::config::DeviceConfig;
use crate::control::DeviceControl;
use crate::error::Result;
use crate::events::{EventBus, EventKind};
use crate::state::LinkState;
use crate::status::StatusCache;
use crate::transport::Transport;
use egm_core::FaultSet;
use egm_protocol::reports::{
    CoinOutStatus, DeviceReset, HopperFault, HopperFaultStatus, HopperMotor, HopperPayoutLimit,
    HopperStatus, StatusRequest, hopper_reports,
};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Coin hopper: pays coins out of its bowl.
///
/// `HopperStatus` reports feed both the change-suppressed status cache and
/// a watch channel. The watch sees every report, equal or not, so
/// [`Hopper::query_bowl_full`] resolves on the next report after its
/// request.
#[derive(Debug)]
pub struct Hopper<T: Transport> {
    control: Arc<DeviceControl<T, HopperFault>>,
    status: Arc<StatusCache<HopperStatus>>,
    status_rx: watch::Receiver<Option<HopperStatus>>,
}

impl<T: Transport> Hopper<T> {
    pub fn new(config: DeviceConfig, transport: T, events: EventBus) -> Self {
        let control = DeviceControl::new(config, transport, hopper_reports(), events.clone());
        let status = Arc::new(StatusCache::new());
        let (status_tx, status_rx) = watch::channel(None);
        let identity = control.identity().clone();

        control.on::<CoinOutStatus, _>({
            let identity = identity.clone();
            let events = events.clone();
            move |coin| {
                if !coin.legal {
                    warn!(device = %identity, count = coin.count, "Illegal coin out");
                }
                events.publish(
                    &identity,
                    EventKind::CoinOut {
                        legal: coin.legal,
                        count: coin.count,
                    },
                );
            }
        });

        control.on::<HopperFaultStatus, _>({
            let control = Arc::downgrade(&control);
            move |report| {
                if let Some(control) = control.upgrade() {
                    control.raise_fault(report.fault);
                }
            }
        });

        control.on::<HopperStatus, _>({
            let status = Arc::clone(&status);
            move |report| {
                if status.update(*report) {
                    debug!(
                        device = %identity,
                        bowl_full = report.bowl_full,
                        bowl_low = report.bowl_low,
                        motor_running = report.motor_running,
                        coins_paid = report.coins_paid,
                        "Hopper status changed"
                    );
                }
                status_tx.send_replace(Some(*report));
            }
        });

        on_self_test_result(&control, &events);

        Self {
            control,
            status,
            status_rx,
        }
    }

    /// Connect, handshaking with `StatusRequest`.
    ///
    /// # Errors
    ///
    /// See [`DeviceControl::open`].
    pub async fn open(&self) -> Result<LinkState> {
        self.control.open(&StatusRequest).await
    }

    /// # Errors
    ///
    /// See [`DeviceControl::close`].
    pub async fn close(&self) -> Result<()> {
        self.control.close().await
    }

    /// # Errors
    ///
    /// See [`DeviceControl::send_command`].
    pub async fn start_motor(&self) -> Result<()> {
        self.control.send_command(&HopperMotor { run: true }).await?;
        info!(device = %self.control.identity(), "Hopper motor started");
        Ok(())
    }

    /// # Errors
    ///
    /// See [`DeviceControl::send_command`].
    pub async fn stop_motor(&self) -> Result<()> {
        self.control.send_command(&HopperMotor { run: false }).await?;
        info!(device = %self.control.identity(), "Hopper motor stopped");
        Ok(())
    }

    /// Limit the coins paid per motor run.
    ///
    /// # Errors
    ///
    /// See [`DeviceControl::send_command`].
    pub async fn set_max_payout(&self, max_count: u16) -> Result<()> {
        self.control
            .send_command(&HopperPayoutLimit { max_count })
            .await
    }

    /// # Errors
    ///
    /// See [`DeviceControl::reset`].
    pub async fn reset(&self) -> Result<()> {
        self.control.reset(&DeviceReset).await
    }

    /// # Errors
    ///
    /// See [`DeviceControl::self_test`].
    pub async fn self_test(&self, nvm: bool) -> Result<()> {
        self.control.self_test(nvm).await
    }

    /// Bowl-full flag of the last status report. May be stale; `None` until
    /// the first report.
    pub fn is_bowl_full(&self) -> Option<bool> {
        self.status.get().map(|status| status.bowl_full)
    }

    /// Request a status report and wait up to the configured status wait
    /// for it. Falls back to the cached flag if none arrives in time.
    ///
    /// # Errors
    ///
    /// Returns an error only if the status request cannot be sent.
    pub async fn query_bowl_full(&self) -> Result<Option<bool>> {
        let mut rx = self.status_rx.clone();
        rx.borrow_and_update();

        self.control.send_command(&StatusRequest).await?;

        let wait = self.control.config().status_wait();
        match tokio::time::timeout(wait, rx.changed()).await {
            Ok(Ok(())) => {
                let latest = *rx.borrow();
                Ok(latest.map(|status| status.bowl_full))
            }
            Ok(Err(_)) | Err(_) => {
                warn!(
                    device = %self.control.identity(),
                    wait_ms = wait.as_millis() as u64,
                    "No status report, using cached bowl state"
                );
                Ok(self.is_bowl_full())
            }
        }
    }

    pub fn status(&self) -> Option<HopperStatus> {
        self.status.get()
    }

    pub fn faults(&self) -> FaultSet<HopperFault> {
        self.control.faults()
    }

    pub fn clear_faults(&self) -> FaultSet<HopperFault> {
        self.control.clear_faults()
    }

    pub fn state(&self) -> LinkState {
        self.control.state()
    }

    pub fn control(&self) -> &Arc<DeviceControl<T, HopperFault>> {
        &self.control
    }

    pub fn spawn_inbound(&self) -> Option<JoinHandle<()>> {
        self.control.spawn_inbound()
    }
}
