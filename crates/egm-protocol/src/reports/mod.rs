//! Representative report catalog.
//!
//! Report ids are grouped by device family:
//!
//! | Range | Family |
//! |-------|--------|
//! | `0x01..=0x0F` | shared device control |
//! | `0x20..=0x2F` | coin acceptor |
//! | `0x30..=0x3F` | hopper |
//! | `0x40..=0x4F` | note/ticket acceptor |
//!
//! Commands travel host to device, status reports device to host. Each
//! family exposes a `*_reports()` constructor returning its catalog.

/// Implements [`crate::Report`] for a report without fields.
macro_rules! empty_report {
    ($ty:ident, $id:expr, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct $ty;

        impl $crate::report::Report for $ty {
            const ID: egm_core::ReportId = egm_core::ReportId::new($id);
            const NAME: &'static str = stringify!($ty);
            const LAYOUT: &'static [$crate::field::Field] = &[];

            fn write_fields(&self, _out: &mut $crate::report::FieldValues) {}

            fn read_fields(
                _fields: &mut $crate::report::FieldCursor<'_>,
            ) -> egm_core::Result<Self> {
                Ok($ty)
            }
        }
    };
}

pub(crate) use empty_report;

pub mod coin;
pub mod common;
pub mod hopper;
pub mod note;

pub use coin::{
    CoinAcceptorStatus, CoinDivert, CoinFault, CoinFaultStatus, CoinInStatus, CoinReject,
    DivertTarget, coin_acceptor_reports,
};
pub use common::{DeviceReset, KeepAlive, SelfTest, SelfTestResult, StatusRequest};
pub use hopper::{
    CoinOutStatus, HopperFault, HopperFaultStatus, HopperMotor, HopperPayoutLimit, HopperStatus,
    hopper_reports,
};
pub use note::{
    EscrowExtend, NoteAccept, NoteFault, NoteInhibit, NoteReturn, NoteState, NoteStatus,
    NoteTableEntry, NoteTableRequest, StackerStatus, note_acceptor_reports,
};
