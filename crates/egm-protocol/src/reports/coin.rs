//! Coin acceptor reports.

use crate::field::Field;
use crate::report::{FieldCursor, FieldValues, Report, WireEnum};
use crate::table::ReportTable;
use egm_core::{FaultCode, ReportId, Result};
use serde::{Deserialize, Serialize};

use super::common::{DeviceReset, SelfTestResult, StatusRequest};

/// Where an accepted coin is routed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DivertTarget {
    #[default]
    Cashbox = 0,
    Hopper = 1,
}

impl WireEnum for DivertTarget {
    fn to_code(self) -> u8 {
        self as u8
    }

    fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(DivertTarget::Cashbox),
            1 => Some(DivertTarget::Hopper),
            _ => None,
        }
    }
}

/// Coin acceptor fault codes as reported on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoinFault {
    Jam = 1,
    SensorFault = 2,
    RejectMechanism = 3,
    DivertFault = 4,
    Stringing = 5,
}

impl WireEnum for CoinFault {
    fn to_code(self) -> u8 {
        self as u8
    }

    fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(CoinFault::Jam),
            2 => Some(CoinFault::SensorFault),
            3 => Some(CoinFault::RejectMechanism),
            4 => Some(CoinFault::DivertFault),
            5 => Some(CoinFault::Stringing),
            _ => None,
        }
    }
}

impl FaultCode for CoinFault {
    fn index(self) -> u8 {
        self as u8 - 1
    }

    fn name(self) -> &'static str {
        match self {
            CoinFault::Jam => "Jam",
            CoinFault::SensorFault => "SensorFault",
            CoinFault::RejectMechanism => "RejectMechanism",
            CoinFault::DivertFault => "DivertFault",
            CoinFault::Stringing => "Stringing",
        }
    }

    fn all() -> &'static [Self] {
        &[
            CoinFault::Jam,
            CoinFault::SensorFault,
            CoinFault::RejectMechanism,
            CoinFault::DivertFault,
            CoinFault::Stringing,
        ]
    }
}

/// Command: enable or disable the reject mechanism.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoinReject {
    /// `true` rejects every inserted coin.
    pub reject: bool,
}

impl Report for CoinReject {
    const ID: ReportId = ReportId::new(0x20);
    const NAME: &'static str = "CoinReject";
    const LAYOUT: &'static [Field] = &[Field::flag("reject"), Field::reserved(7)];

    fn write_fields(&self, out: &mut FieldValues) {
        out.flag(self.reject);
    }

    fn read_fields(fields: &mut FieldCursor<'_>) -> Result<Self> {
        Ok(Self {
            reject: fields.flag()?,
        })
    }
}

/// Command: route accepted coins to the cashbox or the hopper.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoinDivert {
    pub target: DivertTarget,
}

impl Report for CoinDivert {
    const ID: ReportId = ReportId::new(0x21);
    const NAME: &'static str = "CoinDivert";
    const LAYOUT: &'static [Field] = &[Field::enum_bits("target", 1), Field::reserved(7)];

    fn write_fields(&self, out: &mut FieldValues) {
        out.code(self.target);
    }

    fn read_fields(fields: &mut FieldCursor<'_>) -> Result<Self> {
        Ok(Self {
            target: fields.code()?,
        })
    }
}

/// Status: a coin was inserted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoinInStatus {
    /// Recognition channel (0-31).
    pub channel: u8,
    /// Coin was recognised and accepted.
    pub legal: bool,
    /// Coin went to the hopper instead of the cashbox.
    pub to_hopper: bool,
    /// Face value in cents; `0` for an illegal coin.
    pub value_cents: u16,
}

impl Report for CoinInStatus {
    const ID: ReportId = ReportId::new(0x22);
    const NAME: &'static str = "CoinInStatus";
    const LAYOUT: &'static [Field] = &[
        Field::bits("channel", 5),
        Field::flag("legal"),
        Field::flag("to_hopper"),
        Field::reserved(1),
        Field::u16("value_cents"),
    ];

    fn write_fields(&self, out: &mut FieldValues) {
        out.push(self.channel);
        out.flag(self.legal);
        out.flag(self.to_hopper);
        out.push(self.value_cents);
    }

    fn read_fields(fields: &mut FieldCursor<'_>) -> Result<Self> {
        Ok(Self {
            channel: fields.u8()?,
            legal: fields.flag()?,
            to_hopper: fields.flag()?,
            value_cents: fields.u16()?,
        })
    }
}

/// Status: the acceptor observed one fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoinFaultStatus {
    pub fault: CoinFault,
}

impl Report for CoinFaultStatus {
    const ID: ReportId = ReportId::new(0x23);
    const NAME: &'static str = "CoinFaultStatus";
    const LAYOUT: &'static [Field] = &[Field::enum_u8("fault")];

    fn write_fields(&self, out: &mut FieldValues) {
        out.code(self.fault);
    }

    fn read_fields(fields: &mut FieldCursor<'_>) -> Result<Self> {
        Ok(Self {
            fault: fields.code()?,
        })
    }
}

/// Status: current reject and divert configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoinAcceptorStatus {
    pub reject: bool,
    pub divert: DivertTarget,
}

impl Report for CoinAcceptorStatus {
    const ID: ReportId = ReportId::new(0x24);
    const NAME: &'static str = "CoinAcceptorStatus";
    const LAYOUT: &'static [Field] = &[
        Field::flag("reject"),
        Field::enum_bits("divert", 1),
        Field::reserved(6),
    ];

    fn write_fields(&self, out: &mut FieldValues) {
        out.flag(self.reject);
        out.code(self.divert);
    }

    fn read_fields(fields: &mut FieldCursor<'_>) -> Result<Self> {
        Ok(Self {
            reject: fields.flag()?,
            divert: fields.code()?,
        })
    }
}

/// Reports a coin acceptor emits or understands.
pub fn coin_acceptor_reports() -> ReportTable {
    ReportTable::new()
        .with::<DeviceReset>()
        .with::<StatusRequest>()
        .with::<SelfTestResult>()
        .with::<CoinReject>()
        .with::<CoinDivert>()
        .with::<CoinInStatus>()
        .with::<CoinFaultStatus>()
        .with::<CoinAcceptorStatus>()
}
