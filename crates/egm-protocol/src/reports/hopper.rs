//! Coin hopper reports.

use crate::field::Field;
use crate::report::{FieldCursor, FieldValues, Report, WireEnum};
use crate::table::ReportTable;
use egm_core::{FaultCode, ReportId, Result};
use serde::{Deserialize, Serialize};

use super::common::{DeviceReset, SelfTestResult, StatusRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HopperFault {
    Jam = 1,
    MotorFault = 2,
    SensorFault = 3,
    PayoutOverrun = 4,
}

impl WireEnum for HopperFault {
    fn to_code(self) -> u8 {
        self as u8
    }

    fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(HopperFault::Jam),
            2 => Some(HopperFault::MotorFault),
            3 => Some(HopperFault::SensorFault),
            4 => Some(HopperFault::PayoutOverrun),
            _ => None,
        }
    }
}

impl FaultCode for HopperFault {
    fn index(self) -> u8 {
        self as u8 - 1
    }

    fn name(self) -> &'static str {
        match self {
            HopperFault::Jam => "Jam",
            HopperFault::MotorFault => "MotorFault",
            HopperFault::SensorFault => "SensorFault",
            HopperFault::PayoutOverrun => "PayoutOverrun",
        }
    }

    fn all() -> &'static [Self] {
        &[
            HopperFault::Jam,
            HopperFault::MotorFault,
            HopperFault::SensorFault,
            HopperFault::PayoutOverrun,
        ]
    }
}

/// Command: start or stop the payout motor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HopperMotor {
    pub run: bool,
}

impl Report for HopperMotor {
    const ID: ReportId = ReportId::new(0x30);
    const NAME: &'static str = "HopperMotor";
    const LAYOUT: &'static [Field] = &[Field::flag("run"), Field::reserved(7)];

    fn write_fields(&self, out: &mut FieldValues) {
        out.flag(self.run);
    }

    fn read_fields(fields: &mut FieldCursor<'_>) -> Result<Self> {
        Ok(Self { run: fields.flag()? })
    }
}

/// Command: stop the motor after `max_count` coins. `0` means no limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HopperPayoutLimit {
    pub max_count: u16,
}

impl Report for HopperPayoutLimit {
    const ID: ReportId = ReportId::new(0x31);
    const NAME: &'static str = "HopperPayoutLimit";
    const LAYOUT: &'static [Field] = &[Field::u16("max_count")];

    fn write_fields(&self, out: &mut FieldValues) {
        out.push(self.max_count);
    }

    fn read_fields(fields: &mut FieldCursor<'_>) -> Result<Self> {
        Ok(Self {
            max_count: fields.u16()?,
        })
    }
}

/// Status: bowl level and motor state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HopperStatus {
    pub bowl_full: bool,
    pub bowl_low: bool,
    pub motor_running: bool,
    /// Coins paid since the motor last started.
    pub coins_paid: u16,
}

impl Report for HopperStatus {
    const ID: ReportId = ReportId::new(0x32);
    const NAME: &'static str = "HopperStatus";
    const LAYOUT: &'static [Field] = &[
        Field::flag("bowl_full"),
        Field::flag("bowl_low"),
        Field::flag("motor_running"),
        Field::reserved(5),
        Field::u16("coins_paid"),
    ];

    fn write_fields(&self, out: &mut FieldValues) {
        out.flag(self.bowl_full);
        out.flag(self.bowl_low);
        out.flag(self.motor_running);
        out.push(self.coins_paid);
    }

    fn read_fields(fields: &mut FieldCursor<'_>) -> Result<Self> {
        Ok(Self {
            bowl_full: fields.flag()?,
            bowl_low: fields.flag()?,
            motor_running: fields.flag()?,
            coins_paid: fields.u16()?,
        })
    }
}

/// Status: coins dispensed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoinOutStatus {
    pub legal: bool,
    pub count: u16,
}

impl Report for CoinOutStatus {
    const ID: ReportId = ReportId::new(0x33);
    const NAME: &'static str = "CoinOutStatus";
    const LAYOUT: &'static [Field] = &[
        Field::flag("legal"),
        Field::reserved(7),
        Field::u16("count"),
    ];

    fn write_fields(&self, out: &mut FieldValues) {
        out.flag(self.legal);
        out.push(self.count);
    }

    fn read_fields(fields: &mut FieldCursor<'_>) -> Result<Self> {
        Ok(Self {
            legal: fields.flag()?,
            count: fields.u16()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HopperFaultStatus {
    pub fault: HopperFault,
}

impl Report for HopperFaultStatus {
    const ID: ReportId = ReportId::new(0x34);
    const NAME: &'static str = "HopperFaultStatus";
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

/// Reports a hopper emits or understands.
pub fn hopper_reports() -> ReportTable {
    ReportTable::new()
        .with::<DeviceReset>()
        .with::<StatusRequest>()
        .with::<SelfTestResult>()
        .with::<HopperMotor>()
        .with::<HopperPayoutLimit>()
        .with::<HopperStatus>()
        .with::<CoinOutStatus>()
        .with::<HopperFaultStatus>()
}
