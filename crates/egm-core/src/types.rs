use serde::{Deserialize, Serialize};
use std::fmt;

/// Wire discriminator identifying a report's concrete shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReportId(u8);

impl ReportId {
    #[must_use]
    pub const fn new(id: u8) -> Self {
        ReportId(id)
    }

    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self.0
    }
}

impl From<u8> for ReportId {
    fn from(id: u8) -> Self {
        ReportId(id)
    }
}

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "0x{:02X}", self.0)
    }
}

/// Kind of cash-handling peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    CoinAcceptor,
    Hopper,
    NoteAcceptor,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DeviceKind::CoinAcceptor => write!(f, "CoinAcceptor"),
            DeviceKind::Hopper => write!(f, "Hopper"),
            DeviceKind::NoteAcceptor => write!(f, "NoteAcceptor"),
        }
    }
}

/// Identity of a physical peripheral.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub kind: DeviceKind,
    pub vendor_id: u16,
    pub product_id: u16,
    pub serial_number: Option<String>,
}

impl DeviceIdentity {
    pub fn new(kind: DeviceKind, vendor_id: u16, product_id: u16) -> Self {
        Self {
            kind,
            vendor_id,
            product_id,
            serial_number: None,
        }
    }

    /// Set the serial number.
    pub fn with_serial_number(mut self, serial_number: impl Into<String>) -> Self {
        self.serial_number = Some(serial_number.into());
        self
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}[{:04X}:{:04X}]",
            self.kind, self.vendor_id, self.product_id
        )?;
        if let Some(serial) = &self.serial_number {
            write!(f, "#{serial}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0x00, "0x00")]
    #[case(0x0A, "0x0A")]
    #[case(0xFF, "0xFF")]
    fn test_report_id_display(#[case] id: u8, #[case] expected: &str) {
        assert_eq!(ReportId::new(id).to_string(), expected);
        assert_eq!(ReportId::from(id).as_u8(), id);
    }

    #[rstest]
    #[case(DeviceKind::CoinAcceptor, "CoinAcceptor[0ACD:0201]")]
    #[case(DeviceKind::Hopper, "Hopper[0ACD:0201]")]
    #[case(DeviceKind::NoteAcceptor, "NoteAcceptor[0ACD:0201]")]
    fn test_identity_display(#[case] kind: DeviceKind, #[case] expected: &str) {
        let identity = DeviceIdentity::new(kind, 0x0ACD, 0x0201);
        assert_eq!(identity.to_string(), expected);
    }

    #[test]
    fn test_identity_with_serial() {
        let identity =
            DeviceIdentity::new(DeviceKind::NoteAcceptor, 1, 2).with_serial_number("NA-001");
        assert_eq!(identity.serial_number.as_deref(), Some("NA-001"));
        assert_eq!(identity.to_string(), "NoteAcceptor[0001:0002]#NA-001");
    }

    #[test]
    fn test_device_kind_serialization() {
        let json = serde_json::to_string(&DeviceKind::NoteAcceptor).unwrap();
        assert_eq!(json, "\"note_acceptor\"");
        let kind: DeviceKind = serde_json::from_str("\"hopper\"").unwrap();
        assert_eq!(kind, DeviceKind::Hopper);
    }
}
