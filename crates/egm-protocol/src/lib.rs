//! Binary report codec and dispatch for cash-handling peripherals.
//!
//! Every frame exchanged with a peripheral starts with a one-byte report id
//! followed by the fields of that report in declared order:
//!
//! ```text
//! ┌───────────┬──────────────────────────────────────────────┐
//! │ report id │ fields (byte-aligned or bit-packed, LE)      │
//! └───────────┴──────────────────────────────────────────────┘
//! ```
//!
//! - [`field`] declares the layout of a report.
//! - [`bits`] packs and unpacks bit fields.
//! - [`report`] is the typed view: the [`Report`] trait.
//! - [`codec`] turns reports into frames and back.
//! - [`table`] maps report ids to types for untyped decoding.
//! - [`dispatcher`] routes inbound frames to the single registered handler.
//! - [`reports`] holds the representative report catalog.

pub mod bits;
pub mod codec;
pub mod dispatcher;
pub mod field;
pub mod report;
pub mod reports;
pub mod table;

pub use codec::{decode, decode_as, encode, wire_len};
pub use dispatcher::{DispatchOutcome, DispatchStats, ReportDispatcher};
pub use field::{Field, FieldType, Width};
pub use report::{FieldCursor, FieldValues, Report, WireEnum};
pub use table::{DecodedReport, ReportTable};
