//! Device control reports shared by every peripheral family.

use super::empty_report;
use crate::field::Field;
use crate::report::{FieldCursor, FieldValues, Report};
use egm_core::{ReportId, Result};

empty_report!(DeviceReset, 0x01, "Command: reset the device.");
empty_report!(StatusRequest, 0x02, "Command: ask the device to report its status.");
empty_report!(KeepAlive, 0x05, "Command: link keep-alive.");

/// Command: run the device self test.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelfTest {
    /// Also verify non-volatile memory.
    pub nvm: bool,
}

impl Report for SelfTest {
    const ID: ReportId = ReportId::new(0x03);
    const NAME: &'static str = "SelfTest";
    const LAYOUT: &'static [Field] = &[Field::flag("nvm"), Field::reserved(7)];

    fn write_fields(&self, out: &mut FieldValues) {
        out.flag(self.nvm);
    }

    fn read_fields(fields: &mut FieldCursor<'_>) -> Result<Self> {
        Ok(Self { nvm: fields.flag()? })
    }
}

/// Status: outcome of a self test.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelfTestResult {
    pub passed: bool,
    pub nvm: bool,
    /// Vendor diagnostic code, `0` when passed.
    pub code: u8,
}

impl Report for SelfTestResult {
    const ID: ReportId = ReportId::new(0x04);
    const NAME: &'static str = "SelfTestResult";
    const LAYOUT: &'static [Field] = &[
        Field::flag("passed"),
        Field::flag("nvm"),
        Field::reserved(6),
        Field::u8("code"),
    ];

    fn write_fields(&self, out: &mut FieldValues) {
        out.flag(self.passed);
        out.flag(self.nvm);
        out.push(self.code);
    }

    fn read_fields(fields: &mut FieldCursor<'_>) -> Result<Self> {
        Ok(Self {
            passed: fields.flag()?,
            nvm: fields.flag()?,
            code: fields.u8()?,
        })
    }
}
