//! Peripheral configuration.
//!
//! Configuration is plain data: every struct has sensible defaults and can be
//! loaded from JSON. Nothing here opens a port; the values are handed to the
//! transport and the device control state machine at construction.
//!
//! ```
//! use egm_hardware::config::PeripheralConfig;
//!
//! let config = PeripheralConfig::from_json(
//!     r#"{
//!         "note_acceptor": {
//!             "identity": { "kind": "note_acceptor", "vendor_id": 1, "product_id": 2, "serial_number": null },
//!             "serial": { "port_name": "/dev/ttyS1", "baud_rate": 19200 }
//!         },
//!         "escrow": { "timeout_ms": 8000 }
//!     }"#,
//! )
//! .unwrap();
//!
//! let note = config.note_acceptor.unwrap();
//! assert_eq!(note.serial.baud_rate, 19200);
//! assert_eq!(note.serial.data_bits, 8);
//! assert_eq!(config.escrow.timeout_ms, 8000);
//! ```

use crate::error::{HardwareError, Result};
use egm_core::constants::{
    DEFAULT_BAUD_RATE, DEFAULT_ESCROW_TIMEOUT_MS, DEFAULT_HANDSHAKE_INTERVAL_MS,
    DEFAULT_KEEP_ALIVE_TIMEOUT_MS, DEFAULT_SERIAL_BUFFER_SIZE, DEFAULT_STATUS_WAIT_MS,
    DEFAULT_WRITE_TIMEOUT_MS, EVENT_BUS_CAPACITY,
};
use egm_core::{DeviceIdentity, DeviceKind};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopBits {
    #[default]
    One,
    Two,
}

/// Serial handshake (flow control).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowControl {
    #[default]
    None,
    Software,
    Hardware,
}

/// Settings handed to [`crate::Transport::configure`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port_name: String,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
    pub read_buffer_size: usize,
    pub write_buffer_size: usize,
    /// Inbound reads are unbounded unless set.
    pub read_timeout_ms: Option<u64>,
    pub write_timeout_ms: u64,
    pub keep_alive_timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: 8,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
            read_buffer_size: DEFAULT_SERIAL_BUFFER_SIZE,
            write_buffer_size: DEFAULT_SERIAL_BUFFER_SIZE,
            read_timeout_ms: None,
            write_timeout_ms: DEFAULT_WRITE_TIMEOUT_MS,
            keep_alive_timeout_ms: DEFAULT_KEEP_ALIVE_TIMEOUT_MS,
        }
    }
}

impl SerialConfig {
    pub fn new(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            ..Self::default()
        }
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn keep_alive_timeout(&self) -> Duration {
        Duration::from_millis(self.keep_alive_timeout_ms)
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::ConfigurationError` naming the first invalid
    /// setting.
    pub fn validate(&self) -> Result<()> {
        if self.baud_rate == 0 {
            return Err(HardwareError::configuration("baud_rate must be non-zero"));
        }
        if !(5..=8).contains(&self.data_bits) {
            return Err(HardwareError::configuration(format!(
                "data_bits must be 5-8, got {}",
                self.data_bits
            )));
        }
        if self.read_buffer_size == 0 || self.write_buffer_size == 0 {
            return Err(HardwareError::configuration("buffer sizes must be non-zero"));
        }
        if self.write_timeout_ms == 0 || self.keep_alive_timeout_ms == 0 {
            return Err(HardwareError::configuration(
                "write and keep-alive timeouts must be non-zero",
            ));
        }
        Ok(())
    }
}

/// Per-device settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub identity: DeviceIdentity,
    #[serde(default)]
    pub serial: SerialConfig,
    /// Interval between handshake retries while connecting.
    #[serde(default = "default_handshake_interval_ms")]
    pub handshake_interval_ms: u64,
    /// Bounded wait for a status report after a status request.
    #[serde(default = "default_status_wait_ms")]
    pub status_wait_ms: u64,
    #[serde(default = "default_true")]
    pub supports_self_test: bool,
}

fn default_handshake_interval_ms() -> u64 {
    DEFAULT_HANDSHAKE_INTERVAL_MS
}

fn default_status_wait_ms() -> u64 {
    DEFAULT_STATUS_WAIT_MS
}

fn default_true() -> bool {
    true
}

impl DeviceConfig {
    pub fn new(identity: DeviceIdentity) -> Self {
        Self {
            identity,
            serial: SerialConfig::default(),
            handshake_interval_ms: DEFAULT_HANDSHAKE_INTERVAL_MS,
            status_wait_ms: DEFAULT_STATUS_WAIT_MS,
            supports_self_test: true,
        }
    }

    pub fn with_serial(mut self, serial: SerialConfig) -> Self {
        self.serial = serial;
        self
    }

    pub fn with_self_test(mut self, supported: bool) -> Self {
        self.supports_self_test = supported;
        self
    }

    pub fn handshake_interval(&self) -> Duration {
        Duration::from_millis(self.handshake_interval_ms)
    }

    pub fn status_wait(&self) -> Duration {
        Duration::from_millis(self.status_wait_ms)
    }

    /// # Errors
    ///
    /// Returns `HardwareError::ConfigurationError` if the serial settings or
    /// intervals are invalid.
    pub fn validate(&self) -> Result<()> {
        self.serial.validate()?;
        if self.handshake_interval_ms == 0 {
            return Err(HardwareError::configuration(
                "handshake_interval_ms must be non-zero",
            ));
        }
        Ok(())
    }
}

/// Escrow guard settings for note acceptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscrowConfig {
    /// How long a note may be held before the session times out.
    pub timeout_ms: u64,
}

impl Default for EscrowConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_ESCROW_TIMEOUT_MS,
        }
    }
}

impl EscrowConfig {
    pub fn guard(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Configuration of every peripheral on the terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeripheralConfig {
    pub coin_acceptor: Option<DeviceConfig>,
    pub hopper: Option<DeviceConfig>,
    pub note_acceptor: Option<DeviceConfig>,
    pub escrow: EscrowConfig,
    pub event_bus_capacity: usize,
}

impl Default for PeripheralConfig {
    fn default() -> Self {
        Self {
            coin_acceptor: None,
            hopper: None,
            note_acceptor: None,
            escrow: EscrowConfig::default(),
            event_bus_capacity: EVENT_BUS_CAPACITY,
        }
    }
}

impl PeripheralConfig {
    /// Parse and validate a JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::ConfigurationError` if the document is
    /// malformed or fails [`PeripheralConfig::validate`].
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| HardwareError::configuration(format!("invalid JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every configured device, and that each sits in the slot of its
    /// own kind.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::ConfigurationError` describing the first
    /// problem found.
    pub fn validate(&self) -> Result<()> {
        let slots = [
            (DeviceKind::CoinAcceptor, &self.coin_acceptor),
            (DeviceKind::Hopper, &self.hopper),
            (DeviceKind::NoteAcceptor, &self.note_acceptor),
        ];

        for (kind, slot) in slots {
            let Some(device) = slot else { continue };
            if device.identity.kind != kind {
                return Err(HardwareError::configuration(format!(
                    "{} configured in the {kind} slot",
                    device.identity.kind
                )));
            }
            device.validate()?;
        }

        if self.escrow.timeout_ms == 0 {
            return Err(HardwareError::configuration(
                "escrow timeout_ms must be non-zero",
            ));
        }
        if self.event_bus_capacity == 0 {
            return Err(HardwareError::configuration(
                "event_bus_capacity must be non-zero",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn hopper() -> DeviceConfig {
        DeviceConfig::new(DeviceIdentity::new(DeviceKind::Hopper, 0x10, 0x20))
    }

    #[test]
    fn test_defaults() {
        let serial = SerialConfig::default();
        assert_eq!(serial.baud_rate, 9600);
        assert_eq!(serial.write_timeout(), Duration::from_millis(1000));
        assert_eq!(serial.read_timeout_ms, None);

        assert_eq!(EscrowConfig::default().guard(), Duration::from_millis(5000));
        assert!(PeripheralConfig::default().validate().is_ok());
    }

    #[rstest]
    #[case(SerialConfig { baud_rate: 0, ..SerialConfig::default() })]
    #[case(SerialConfig { data_bits: 9, ..SerialConfig::default() })]
    #[case(SerialConfig { read_buffer_size: 0, ..SerialConfig::default() })]
    #[case(SerialConfig { write_timeout_ms: 0, ..SerialConfig::default() })]
    fn test_invalid_serial(#[case] serial: SerialConfig) {
        let result = serial.validate();
        assert!(matches!(
            result,
            Err(HardwareError::ConfigurationError { .. })
        ));
    }

    #[test]
    fn test_device_in_wrong_slot() {
        let config = PeripheralConfig {
            coin_acceptor: Some(hopper()),
            ..PeripheralConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid configuration: Hopper configured in the CoinAcceptor slot"
        );
    }

    #[test]
    fn test_json_round_trip() {
        let config = PeripheralConfig {
            hopper: Some(hopper().with_serial(SerialConfig::new("/dev/ttyUSB0"))),
            ..PeripheralConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(PeripheralConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_json_defaults_fill_missing_fields() {
        let config = PeripheralConfig::from_json(
            r#"{ "hopper": { "identity": { "kind": "hopper", "vendor_id": 1, "product_id": 1, "serial_number": null } } }"#,
        )
        .unwrap();
        let hopper = config.hopper.unwrap();
        assert_eq!(hopper.status_wait(), Duration::from_millis(1000));
        assert!(hopper.supports_self_test);
        assert_eq!(config.event_bus_capacity, EVENT_BUS_CAPACITY);
    }

    #[test]
    fn test_malformed_json() {
        let result = PeripheralConfig::from_json("{ not json");
        assert!(matches!(
            result,
            Err(HardwareError::ConfigurationError { .. })
        ));
    }
}
