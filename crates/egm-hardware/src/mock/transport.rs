//! Mock transport implementation for testing and development.
//!
//! This module provides a simulated link that records outbound frames and
//! lets a test inject inbound frames, without requiring physical hardware.

use crate::config::SerialConfig;
use crate::error::{HardwareError, Result};
use crate::transport::Transport;
use bytes::Bytes;
use egm_core::constants::INBOUND_CHANNEL_CAPACITY;
use egm_protocol::{Report, decode_as, encode};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

#[derive(Debug, Default)]
struct Shared {
    written: Vec<Bytes>,
    enabled: bool,
    config: Option<SerialConfig>,
    fail_writes: bool,
    stall_writes: bool,
}

/// Mock transport for testing and development.
///
/// # Examples
///
/// ```
/// use egm_hardware::Transport;
/// use egm_hardware::mock::MockTransport;
/// use egm_protocol::reports::StatusRequest;
///
/// #[tokio::main]
/// async fn main() -> egm_hardware::Result<()> {
///     let (mut transport, handle) = MockTransport::new();
///
///     transport.set_enabled(true).await?;
///     transport.write(&[0x02]).await?;
///
///     assert_eq!(handle.written_reports::<StatusRequest>().len(), 1);
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockTransport {
    shared: Arc<Mutex<Shared>>,
    inbound_rx: Option<mpsc::Receiver<Bytes>>,
    writes_tx: watch::Sender<usize>,
}

impl MockTransport {
    /// Create a new mock transport.
    ///
    /// Returns a tuple of (MockTransport, MockTransportHandle) where the
    /// handle plays the device side of the link.
    pub fn new() -> (Self, MockTransportHandle) {
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
        let (writes_tx, writes_rx) = watch::channel(0);
        let shared = Arc::new(Mutex::new(Shared::default()));

        let transport = Self {
            shared: Arc::clone(&shared),
            inbound_rx: Some(inbound_rx),
            writes_tx,
        };

        let handle = MockTransportHandle {
            shared,
            inbound_tx,
            writes_rx,
        };

        (transport, handle)
    }
}

impl Transport for MockTransport {
    async fn configure(&mut self, config: &SerialConfig) -> Result<()> {
        config.validate()?;
        self.shared.lock().config = Some(config.clone());
        Ok(())
    }

    async fn write(&mut self, frame: &[u8]) -> Result<()> {
        let stall = {
            let mut shared = self.shared.lock();
            if !shared.enabled {
                return Err(HardwareError::disconnected("mock transport disabled"));
            }
            if shared.fail_writes {
                return Err(HardwareError::communication("mock write failure"));
            }
            if !shared.stall_writes {
                shared.written.push(Bytes::copy_from_slice(frame));
            }
            shared.stall_writes
        };

        if stall {
            std::future::pending::<()>().await;
        }

        self.writes_tx.send_modify(|count| *count += 1);
        Ok(())
    }

    async fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        self.shared.lock().enabled = enabled;
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.shared.lock().enabled
    }

    fn take_inbound(&mut self) -> Option<mpsc::Receiver<Bytes>> {
        self.inbound_rx.take()
    }
}

/// Handle for controlling a mock transport.
///
/// Clones share the same link: frames written by the host are visible to
/// every clone.
#[derive(Debug, Clone)]
pub struct MockTransportHandle {
    shared: Arc<Mutex<Shared>>,
    inbound_tx: mpsc::Sender<Bytes>,
    writes_rx: watch::Receiver<usize>,
}

impl MockTransportHandle {
    /// Deliver a raw inbound frame to the host.
    ///
    /// # Errors
    ///
    /// Returns an error if the host side dropped its receiver.
    pub async fn push_frame(&self, frame: impl Into<Bytes>) -> Result<()> {
        self.inbound_tx
            .send(frame.into())
            .await
            .map_err(|_| HardwareError::disconnected("mock inbound channel closed"))
    }

    /// Encode `report` and deliver it to the host.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails or the host dropped its receiver.
    pub async fn push_report<R: Report>(&self, report: &R) -> Result<()> {
        self.push_frame(encode(report)?).await
    }

    /// Every frame the host has written, oldest first.
    pub fn written(&self) -> Vec<Bytes> {
        self.shared.lock().written.clone()
    }

    /// Written frames that decode as `R`.
    pub fn written_reports<R: Report>(&self) -> Vec<R> {
        self.shared
            .lock()
            .written
            .iter()
            .filter_map(|frame| decode_as::<R>(frame).ok())
            .collect()
    }

    pub fn clear_written(&self) {
        self.shared.lock().written.clear();
    }

    /// Wait until at least `count` writes completed since creation.
    pub async fn wait_for_writes(&mut self, count: usize) {
        // The sender lives in the transport; a dropped transport ends the wait.
        let _ = self.writes_rx.wait_for(|written| *written >= count).await;
    }

    /// Make every subsequent write fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.shared.lock().fail_writes = fail;
    }

    /// Make every subsequent write hang until cancelled.
    pub fn set_stall_writes(&self, stall: bool) {
        self.shared.lock().stall_writes = stall;
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.lock().enabled
    }

    /// Settings applied by the last `configure` call.
    pub fn config(&self) -> Option<SerialConfig> {
        self.shared.lock().config.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use egm_protocol::reports::{HopperMotor, StatusRequest};

    #[tokio::test]
    async fn test_write_requires_enable() {
        let (mut transport, handle) = MockTransport::new();

        let result = transport.write(&[0x02]).await;
        assert!(matches!(result, Err(HardwareError::Disconnected { .. })));

        transport.set_enabled(true).await.unwrap();
        assert!(handle.is_enabled());
        transport.write(&[0x02]).await.unwrap();
        assert_eq!(handle.written().len(), 1);
    }

    #[tokio::test]
    async fn test_written_reports_filters_by_type() {
        let (mut transport, handle) = MockTransport::new();
        transport.set_enabled(true).await.unwrap();

        transport.write(&encode(&StatusRequest).unwrap()).await.unwrap();
        transport
            .write(&encode(&HopperMotor { run: true }).unwrap())
            .await
            .unwrap();

        assert_eq!(handle.written_reports::<StatusRequest>().len(), 1);
        assert_eq!(
            handle.written_reports::<HopperMotor>(),
            vec![HopperMotor { run: true }]
        );

        handle.clear_written();
        assert!(handle.written().is_empty());
    }

    #[tokio::test]
    async fn test_inbound_delivery() {
        let (mut transport, handle) = MockTransport::new();
        let mut inbound = transport.take_inbound().unwrap();
        assert!(transport.take_inbound().is_none());

        handle.push_report(&StatusRequest).await.unwrap();
        assert_eq!(&inbound.recv().await.unwrap()[..], &[0x02]);
    }

    #[tokio::test]
    async fn test_fail_writes() {
        let (mut transport, handle) = MockTransport::new();
        transport.set_enabled(true).await.unwrap();
        handle.set_fail_writes(true);

        let result = transport.write(&[0x02]).await;
        assert!(matches!(result, Err(HardwareError::CommunicationError { .. })));
        assert!(handle.written().is_empty());
    }

    #[tokio::test]
    async fn test_configure_validates() {
        let (mut transport, handle) = MockTransport::new();
        let bad = SerialConfig {
            baud_rate: 0,
            ..SerialConfig::default()
        };
        assert!(transport.configure(&bad).await.is_err());
        assert!(handle.config().is_none());

        transport
            .configure(&SerialConfig::new("/dev/ttyS0"))
            .await
            .unwrap();
        assert_eq!(handle.config().unwrap().port_name, "/dev/ttyS0");
    }
}
