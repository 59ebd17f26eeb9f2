//! Firmware version response parsing.

use std::fmt;

use crate::error::WireError;

const VERSION_PAYLOAD_LEN: usize = 5;

/// Firmware version reported by `GET_VERSION`.
///
/// Wire layout after the command and result bytes:
/// `major(1) || minor(1) || build(2, BE) || revision(1)`. The printed form is
/// `"{major}.{minor}.{build}"`; the revision byte is kept but not displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
    pub build: u16,
    pub revision: u8,
}

impl FirmwareVersion {
    pub fn from_wire(payload: &[u8]) -> Result<Self, WireError> {
        if payload.len() < VERSION_PAYLOAD_LEN {
            return Err(WireError::TooShort {
                expected: VERSION_PAYLOAD_LEN,
                actual: payload.len(),
            });
        }
        Ok(Self {
            major: payload[0],
            minor: payload[1],
            build: u16::from_be_bytes([payload[2], payload[3]]),
            revision: payload[4],
        })
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.build)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_render() {
        let version = FirmwareVersion::from_wire(&[0x02, 0x04, 0x01, 0x2C, 0x07]).unwrap();
        assert_eq!(version.major, 2);
        assert_eq!(version.minor, 4);
        assert_eq!(version.build, 300);
        assert_eq!(version.revision, 7);
        assert_eq!(version.to_string(), "2.4.300");
    }

    #[test]
    fn revision_not_printed() {
        let a = FirmwareVersion::from_wire(&[1, 0, 0, 1, 0]).unwrap();
        let b = FirmwareVersion::from_wire(&[1, 0, 0, 1, 9]).unwrap();
        assert_eq!(a.to_string(), b.to_string());
        assert_ne!(a, b);
    }

    #[test]
    fn parse_short_fails() {
        assert!(FirmwareVersion::from_wire(&[1, 2, 3, 4]).is_err());
    }
}
