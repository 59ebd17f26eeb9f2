//! Lock serial numbers and advertisement matching.
//!
//! A serial has the form `NNNNNNNN-NNNNNN` (8 digits, a dash, 6 digits). The
//! lock advertises its serial as the last 14 hex characters of one of its
//! service UUIDs (dashes removed); the 14 serial digits are valid hex, so the
//! comparison is a case-insensitive suffix match.

use std::fmt;

use crate::error::SerialError;

/// A validated lock serial number.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SerialNumber {
    text: String,
}

impl SerialNumber {
    /// Parse and validate a serial number string.
    pub fn parse(input: &str) -> Result<Self, SerialError> {
        let bytes = input.as_bytes();
        let well_formed = bytes.len() == 15
            && bytes[8] == b'-'
            && bytes[..8].iter().all(u8::is_ascii_digit)
            && bytes[9..].iter().all(u8::is_ascii_digit);
        if !well_formed {
            return Err(SerialError::Malformed(input.to_string()));
        }
        Ok(Self {
            text: input.to_string(),
        })
    }

    /// The serial in its dashed display form.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// The 14 serial digits with the dash removed.
    pub fn digits(&self) -> String {
        self.text.chars().filter(|c| *c != '-').collect()
    }

    /// Whether an advertised service UUID string encodes this serial.
    ///
    /// The UUID's dashes are removed and its last 14 hex characters are
    /// compared against the serial digits, case-insensitively.
    pub fn matches_advertised_uuid(&self, uuid: &str) -> bool {
        let hex: String = uuid
            .chars()
            .filter(|c| *c != '-')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        if hex.len() < 14 {
            return false;
        }
        hex[hex.len() - 14..] == self.digits()
    }
}

impl fmt::Display for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
