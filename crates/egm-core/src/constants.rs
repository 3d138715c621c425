//! Engine-wide defaults for the peripheral protocol engine.
//!
//! Timeouts are expressed in milliseconds. Use them with
//! [`std::time::Duration::from_millis`]:
//!
//! ```
//! use egm_core::constants::DEFAULT_ESCROW_TIMEOUT_MS;
//! use std::time::Duration;
//!
//! let guard = Duration::from_millis(DEFAULT_ESCROW_TIMEOUT_MS);
//! assert_eq!(guard.as_secs(), 5);
//! ```

// ============================================================================
// Wire format
// ============================================================================

/// Width of the leading report identifier in bytes.
pub const REPORT_ID_LEN: usize = 1;

/// Maximum width of a single field in bits.
pub const MAX_FIELD_BITS: u8 = 64;

/// Number of distinct fault codes a [`crate::FaultSet`] can hold.
pub const MAX_FAULT_CODES: u8 = 32;

// ============================================================================
// Timeouts
// ============================================================================

/// Default escrow guard: how long a note may stay held before timing out.
pub const DEFAULT_ESCROW_TIMEOUT_MS: u64 = 5000;

/// Default bound on a single outbound write.
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 1000;

/// Default bound on a keep-alive write.
pub const DEFAULT_KEEP_ALIVE_TIMEOUT_MS: u64 = 1000;

/// Interval between handshake retries while connecting.
pub const DEFAULT_HANDSHAKE_INTERVAL_MS: u64 = 500;

/// Default bounded wait for a status report after a status request.
pub const DEFAULT_STATUS_WAIT_MS: u64 = 1000;

// ============================================================================
// Serial link
// ============================================================================

/// Default serial baud rate.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default serial read/write buffer size in bytes.
pub const DEFAULT_SERIAL_BUFFER_SIZE: usize = 4096;

// ============================================================================
// Bookkeeping
// ============================================================================

/// Capacity of the peripheral event bus.
pub const EVENT_BUS_CAPACITY: usize = 128;

/// Maximum number of transitions kept in state machine histories.
pub const MAX_HISTORY_SIZE: usize = 100;

/// Capacity of the inbound frame channel of a transport.
pub const INBOUND_CHANNEL_CAPACITY: usize = 64;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeouts_are_bounded() {
        assert_eq!(DEFAULT_ESCROW_TIMEOUT_MS, 5000);
        assert!(DEFAULT_WRITE_TIMEOUT_MS <= 1000);
        assert!(DEFAULT_KEEP_ALIVE_TIMEOUT_MS <= 1000);
    }

    #[test]
    fn test_fault_capacity_matches_bitset() {
        assert_eq!(MAX_FAULT_CODES as u32, u32::BITS);
    }
}
