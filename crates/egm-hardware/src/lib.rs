//! Device control for cash-handling peripherals of an electronic gaming
//! machine: coin acceptors, hoppers and note/ticket acceptors.
//!
//! The physical link is abstracted by the [`Transport`] trait. Each device
//! is driven by a [`DeviceControl`], which sequences outbound commands,
//! routes inbound reports to handlers and tracks the connection state:
//!
//! ```text
//! Disconnected ──open()──► Connecting ──reply──► Idle ◄──► Busy
//!                                                 │  ▲
//!                                           fault │  │ clear_faults()
//!                                                 ▼  │
//!                                               Faulted
//! ```
//!
//! A failed or timed-out write, a closed inbound channel or `close()`
//! returns any state to `Disconnected`. `reset()` passes through
//! `Resetting` until the device answers.
//!
//! # Design Philosophy
//!
//! - **Async-first**: commands are `async` and bounded by timeouts; a write
//!   that times out disconnects the device.
//! - **Edge-triggered**: a fault or status change is reported once, when it
//!   happens, on the shared [`EventBus`].
//! - **No hidden retries**: the only automatic retry is the handshake while
//!   connecting.
//!
//! # Peripherals
//!
//! ```no_run
//! use egm_core::{DeviceIdentity, DeviceKind};
//! use egm_hardware::config::DeviceConfig;
//! use egm_hardware::mock::MockTransport;
//! use egm_hardware::{EventBus, Hopper};
//!
//! #[tokio::main]
//! async fn main() -> egm_hardware::Result<()> {
//!     let (transport, _device) = MockTransport::new();
//!     let config = DeviceConfig::new(DeviceIdentity::new(DeviceKind::Hopper, 0x20, 1));
//!     let hopper = Hopper::new(config, transport, EventBus::default());
//!
//!     hopper.spawn_inbound();
//!     hopper.open().await?;
//!     hopper.set_max_payout(10).await?;
//!     hopper.start_motor().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod control;
pub mod error;
pub mod escrow;
pub mod events;
pub mod fault;
pub mod mock;
pub mod peripherals;
pub mod state;
pub mod status;
pub mod transport;

pub use control::DeviceControl;
pub use error::{HardwareError, Result};
pub use escrow::{EscrowController, EscrowOutcome, EscrowSession, EscrowState};
pub use events::{EventBus, EventKind, PeripheralEvent};
pub use fault::FaultAggregator;
pub use peripherals::{CoinAcceptor, Hopper, NoteAcceptor, Peripherals};
pub use state::{LinkState, StateGraph, StateMachine, Transition};
pub use status::StatusCache;
pub use transport::Transport;
