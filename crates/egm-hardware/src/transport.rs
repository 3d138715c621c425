//! Transport collaborator.
//!
//! The physical link (serial port, USB HID pipe) lives outside this crate.
//! A [`Transport`] accepts outbound frames and delivers complete inbound
//! frames on a channel; framing of the byte stream is the transport's
//! concern.
//!
//! ```text
//! DeviceControl ──write(frame)──► Transport ──► device
//!       ▲                             │
//!       └──── inbound frames (mpsc) ◄─┘
//! ```

use crate::config::SerialConfig;
use crate::error::Result;
use bytes::Bytes;
use std::future::Future;
use tokio::sync::mpsc;

/// Link to one peripheral.
///
/// Write futures are `Send` so device control can be driven from any tokio
/// task.
pub trait Transport: Send + 'static {
    /// Apply line settings. Called before the transport is enabled.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings cannot be applied.
    fn configure(&mut self, config: &SerialConfig) -> impl Future<Output = Result<()>> + Send;

    /// Write one complete frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the link is closed or disabled.
    fn write(&mut self, frame: &[u8]) -> impl Future<Output = Result<()>> + Send;

    /// Suspend or resume I/O without closing the link.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying port rejects the change.
    fn set_enabled(&mut self, enabled: bool) -> impl Future<Output = Result<()>> + Send;

    fn is_enabled(&self) -> bool;

    /// Take the inbound frame channel. Returns `None` once taken.
    fn take_inbound(&mut self) -> Option<mpsc::Receiver<Bytes>>;
}
