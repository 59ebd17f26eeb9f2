//! ALERT frame parsing and disposition.
//!
//! The lock raises alerts out of band, mostly during the handshake. Each code
//! maps to exactly one disposition: refresh the signed time and retry, resend
//! the hello, or give up without retrying.

use crate::error::HandshakeError;

/// Alert code carried in the first byte of an ALERT frame body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertCode {
    InvalidCertificate,
    NoTrustedTime,
    SessionTimeout,
    NotRegistered,
    Unknown(u8),
}

impl AlertCode {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x01 => Self::InvalidCertificate,
            0x02 => Self::NoTrustedTime,
            0x03 => Self::SessionTimeout,
            0x04 => Self::NotRegistered,
            other => Self::Unknown(other),
        }
    }

    /// Parse an ALERT frame body.
    pub fn parse(body: &[u8]) -> Result<Self, HandshakeError> {
        body.first()
            .copied()
            .map(Self::from_u8)
            .ok_or(HandshakeError::EmptyAlert)
    }

    /// What the supervisor does in response to this alert.
    pub fn disposition(self) -> AlertDisposition {
        match self {
            Self::NoTrustedTime => AlertDisposition::RefreshSignedTime,
            Self::SessionTimeout => AlertDisposition::RestartHandshake,
            Self::InvalidCertificate => AlertDisposition::Fatal(FatalAlert::InvalidCertificate),
            Self::NotRegistered => AlertDisposition::Fatal(FatalAlert::NotRegistered),
            Self::Unknown(code) => AlertDisposition::Fatal(FatalAlert::Unknown(code)),
        }
    }
}

/// Supervisor action for an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertDisposition {
    /// Run the signed-time refresh flow, then restart the handshake.
    RefreshSignedTime,
    /// Tear the handshake down and resend the hello.
    RestartHandshake,
    /// Report and close; no retry.
    Fatal(FatalAlert),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalAlert {
    InvalidCertificate,
    NotRegistered,
    Unknown(u8),
}
