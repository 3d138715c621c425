//! Coin acceptor.

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
    CoinAcceptorStatus, CoinDivert, CoinFault, CoinFaultStatus, CoinInStatus, CoinReject,
    DeviceReset, DivertTarget, StatusRequest, coin_acceptor_reports,
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Coin acceptor: validates coins and routes them to the cashbox or hopper.
///
/// Inbound reports:
/// - `CoinInStatus` publishes `CoinIn`.
/// - `CoinFaultStatus` records the fault.
/// - `CoinAcceptorStatus` updates the cached reject/divert state.
#[derive(Debug)]
pub struct CoinAcceptor<T: Transport> {
    control: Arc<DeviceControl<T, CoinFault>>,
    status: Arc<StatusCache<CoinAcceptorStatus>>,
}

impl<T: Transport> CoinAcceptor<T> {
    pub fn new(config: DeviceConfig, transport: T, events: EventBus) -> Self {
        let control =
            DeviceControl::new(config, transport, coin_acceptor_reports(), events.clone());
        let status = Arc::new(StatusCache::new());
        let identity = control.identity().clone();

        control.on::<CoinInStatus, _>({
            let identity = identity.clone();
            let events = events.clone();
            move |coin| {
                debug!(
                    device = %identity,
                    channel = coin.channel,
                    legal = coin.legal,
                    value_cents = coin.value_cents,
                    "Coin in"
                );
                events.publish(
                    &identity,
                    EventKind::CoinIn {
                        channel: coin.channel,
                        legal: coin.legal,
                        to_hopper: coin.to_hopper,
                        value_cents: coin.value_cents,
                    },
                );
            }
        });

        control.on::<CoinFaultStatus, _>({
            let control = Arc::downgrade(&control);
            move |report| {
                if let Some(control) = control.upgrade() {
                    control.raise_fault(report.fault);
                }
            }
        });

        control.on::<CoinAcceptorStatus, _>({
            let status = Arc::clone(&status);
            move |report| {
                if status.update(*report) {
                    debug!(
                        device = %identity,
                        reject = report.reject,
                        divert = ?report.divert,
                        "Acceptor status changed"
                    );
                }
            }
        });

        on_self_test_result(&control, &events);

        Self { control, status }
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

    /// Reject (`true`) or accept (`false`) every inserted coin.
    ///
    /// # Errors
    ///
    /// See [`DeviceControl::send_command`].
    pub async fn set_reject(&self, reject: bool) -> Result<()> {
        self.control.send_command(&CoinReject { reject }).await?;
        info!(device = %self.control.identity(), reject, "Coin reject set");
        Ok(())
    }

    /// Route accepted coins.
    ///
    /// # Errors
    ///
    /// See [`DeviceControl::send_command`].
    pub async fn set_divert(&self, target: DivertTarget) -> Result<()> {
        self.control.send_command(&CoinDivert { target }).await?;
        info!(device = %self.control.identity(), ?target, "Coin divert set");
        Ok(())
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

    /// Last reported reject/divert state, if any.
    pub fn status(&self) -> Option<CoinAcceptorStatus> {
        self.status.get()
    }

    pub fn faults(&self) -> FaultSet<CoinFault> {
        self.control.faults()
    }

    pub fn clear_faults(&self) -> FaultSet<CoinFault> {
        self.control.clear_faults()
    }

    pub fn state(&self) -> LinkState {
        self.control.state()
    }

    pub fn control(&self) -> &Arc<DeviceControl<T, CoinFault>> {
        &self.control
    }

    pub fn spawn_inbound(&self) -> Option<JoinHandle<()>> {
        self.control.spawn_inbound()
    }
}
