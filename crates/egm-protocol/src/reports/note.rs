//! Note and ticket acceptor reports.

use super::empty_report;
use crate::field::Field;
use crate::report::{FieldCursor, FieldValues, Report, WireEnum};
use crate::table::ReportTable;
use egm_core::{FaultCode, ReportId, Result};
use serde::{Deserialize, Serialize};

use super::common::{DeviceReset, SelfTest, SelfTestResult, StatusRequest};

empty_report!(NoteAccept, 0x42, "Command: stack the note held in escrow.");
empty_report!(NoteReturn, 0x43, "Command: return the note held in escrow.");
empty_report!(EscrowExtend, 0x44, "Command: restart the escrow hold timer.");
empty_report!(NoteTableRequest, 0x45, "Command: ask for the note table.");

/// Transport path state of the current note.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteState {
    #[default]
    Idle = 0,
    InEscrow = 1,
    Stacking = 2,
    Stacked = 3,
    Returning = 4,
    Returned = 5,
    Rejected = 6,
}

impl NoteState {
    /// Returns `true` once the note path is clear again.
    pub fn is_path_clear(self) -> bool {
        matches!(
            self,
            NoteState::Idle | NoteState::Stacked | NoteState::Returned | NoteState::Rejected
        )
    }
}

impl WireEnum for NoteState {
    fn to_code(self) -> u8 {
        self as u8
    }

    fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => NoteState::Idle,
            1 => NoteState::InEscrow,
            2 => NoteState::Stacking,
            3 => NoteState::Stacked,
            4 => NoteState::Returning,
            5 => NoteState::Returned,
            6 => NoteState::Rejected,
            _ => return None,
        })
    }
}

/// Note acceptor faults, one per stacker status flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteFault {
    StackerFault,
    Disconnected,
    StackerFull,
    Jam,
    DoorOpen,
}

impl FaultCode for NoteFault {
    fn index(self) -> u8 {
        self as u8
    }

    fn name(self) -> &'static str {
        match self {
            NoteFault::StackerFault => "StackerFault",
            NoteFault::Disconnected => "Disconnected",
            NoteFault::StackerFull => "StackerFull",
            NoteFault::Jam => "Jam",
            NoteFault::DoorOpen => "DoorOpen",
        }
    }

    fn all() -> &'static [Self] {
        &[
            NoteFault::StackerFault,
            NoteFault::Disconnected,
            NoteFault::StackerFull,
            NoteFault::Jam,
            NoteFault::DoorOpen,
        ]
    }
}

/// Status: note path state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoteStatus {
    pub state: NoteState,
    /// The item is a ticket rather than a banknote.
    pub ticket: bool,
    /// Index into the note table, `0` when unknown.
    pub note_id: u8,
}

impl Report for NoteStatus {
    const ID: ReportId = ReportId::new(0x40);
    const NAME: &'static str = "NoteStatus";
    const LAYOUT: &'static [Field] = &[
        Field::enum_bits("state", 4),
        Field::flag("ticket"),
        Field::reserved(3),
        Field::u8("note_id"),
    ];

    fn write_fields(&self, out: &mut FieldValues) {
        out.code(self.state);
        out.flag(self.ticket);
        out.push(self.note_id);
    }

    fn read_fields(fields: &mut FieldCursor<'_>) -> Result<Self> {
        Ok(Self {
            state: fields.code()?,
            ticket: fields.flag()?,
            note_id: fields.u8()?,
        })
    }
}

/// Status: stacker health flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StackerStatus {
    pub fault: bool,
    pub disconnected: bool,
    pub full: bool,
    pub jam: bool,
    pub door_open: bool,
}

impl StackerStatus {
    /// Any condition that blocks accepting a note.
    pub fn is_disabling(&self) -> bool {
        self.fault || self.disconnected || self.full || self.jam
    }

    /// Fault codes raised by the set flags.
    pub fn faults(&self) -> impl Iterator<Item = NoteFault> {
        [
            (self.fault, NoteFault::StackerFault),
            (self.disconnected, NoteFault::Disconnected),
            (self.full, NoteFault::StackerFull),
            (self.jam, NoteFault::Jam),
            (self.door_open, NoteFault::DoorOpen),
        ]
        .into_iter()
        .filter_map(|(set, code)| set.then_some(code))
    }
}

impl Report for StackerStatus {
    const ID: ReportId = ReportId::new(0x41);
    const NAME: &'static str = "StackerStatus";
    const LAYOUT: &'static [Field] = &[
        Field::flag("fault"),
        Field::flag("disconnected"),
        Field::flag("full"),
        Field::flag("jam"),
        Field::flag("door_open"),
        Field::reserved(3),
    ];

    fn write_fields(&self, out: &mut FieldValues) {
        out.flag(self.fault);
        out.flag(self.disconnected);
        out.flag(self.full);
        out.flag(self.jam);
        out.flag(self.door_open);
    }

    fn read_fields(fields: &mut FieldCursor<'_>) -> Result<Self> {
        Ok(Self {
            fault: fields.flag()?,
            disconnected: fields.flag()?,
            full: fields.flag()?,
            jam: fields.flag()?,
            door_open: fields.flag()?,
        })
    }
}

/// Status: one row of the device's note table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoteTableEntry {
    pub note_id: u8,
    /// ISO 4217 alphabetic code as ASCII.
    pub currency: [u8; 3],
    /// Face value in minor units.
    pub value: u32,
    /// Final row of the table.
    pub last: bool,
}

impl NoteTableEntry {
    pub fn currency_code(&self) -> String {
        String::from_utf8_lossy(&self.currency).into_owned()
    }
}

impl Report for NoteTableEntry {
    const ID: ReportId = ReportId::new(0x46);
    const NAME: &'static str = "NoteTableEntry";
    const LAYOUT: &'static [Field] = &[
        Field::u8("note_id"),
        Field::u8("currency0"),
        Field::u8("currency1"),
        Field::u8("currency2"),
        Field::u32("value"),
        Field::flag("last"),
        Field::reserved(7),
    ];

    fn write_fields(&self, out: &mut FieldValues) {
        out.push(self.note_id);
        for byte in self.currency {
            out.push(byte);
        }
        out.push(self.value);
        out.flag(self.last);
    }

    fn read_fields(fields: &mut FieldCursor<'_>) -> Result<Self> {
        Ok(Self {
            note_id: fields.u8()?,
            currency: [fields.u8()?, fields.u8()?, fields.u8()?],
            value: fields.u32()?,
            last: fields.flag()?,
        })
    }
}

/// Command: inhibit or enable note insertion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoteInhibit {
    pub inhibit: bool,
}

impl Report for NoteInhibit {
    const ID: ReportId = ReportId::new(0x47);
    const NAME: &'static str = "NoteInhibit";
    const LAYOUT: &'static [Field] = &[Field::flag("inhibit"), Field::reserved(7)];

    fn write_fields(&self, out: &mut FieldValues) {
        out.flag(self.inhibit);
    }

    fn read_fields(fields: &mut FieldCursor<'_>) -> Result<Self> {
        Ok(Self {
            inhibit: fields.flag()?,
        })
    }
}

/// Reports a note acceptor emits or understands.
pub fn note_acceptor_reports() -> ReportTable {
    ReportTable::new()
        .with::<DeviceReset>()
        .with::<StatusRequest>()
        .with::<SelfTest>()
        .with::<SelfTestResult>()
        .with::<NoteStatus>()
        .with::<StackerStatus>()
        .with::<NoteAccept>()
        .with::<NoteReturn>()
        .with::<EscrowExtend>()
        .with::<NoteTableRequest>()
        .with::<NoteTableEntry>()
        .with::<NoteInhibit>()
}
