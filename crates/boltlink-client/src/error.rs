//! The public error surface.
//!
//! Every layer below converts into [`LockError`] at the API boundary; callers
//! see one enum regardless of whether a failure came from the radio, the
//! handshake, or a result byte.

use boltlink_core::error::{SerialError, WireError};
use boltlink_crypto::CryptoError;
use boltlink_protocol::error::{HandshakeError, SessionError};
use boltlink_protocol::result::CommandFailure;

use crate::transport::TransportError;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LockError {
    #[error("bluetooth is disabled")]
    BluetoothDisabled,

    #[error("missing permissions: {0:?}")]
    NoPermissions(Vec<String>),

    #[error("invalid serial number: {0:?}")]
    InvalidSerial(String),

    #[error("device not found")]
    DeviceNotFound,

    #[error("connection dead: {0}")]
    ConnectionDead(String),

    #[error("invalid certificate")]
    InvalidCertificate,

    #[error("no signed time available")]
    NoSignedTime,

    #[error("device not initialized")]
    DeviceNotInitialized,

    #[error("device needs reset (from old firmware: {from_old_version})")]
    DeviceNeedsReset { from_old_version: bool },

    #[error("lock is busy")]
    LockBusy,

    #[error("invalid parameter")]
    InvalidParam,

    #[error("lock is not calibrated")]
    NotCalibrated,

    #[error("lock is not configured")]
    NotConfigured,

    #[error("lock is dismounted")]
    Dismounted,

    #[error("unlock already performed by auto-unlock")]
    AutoUnlockAlreadyCalled,

    #[error("unlock already performed by another device")]
    UnlockAlreadyCalled,

    #[error("lock reported error code {0:#04x}")]
    GeneralLockError(u8),

    #[error("lock jammed")]
    LockJammed,

    #[error("lock not responding")]
    LockNotResponding,

    #[error("set signed time rejected by the lock")]
    SetSignedTimeError,

    #[error("signature request rejected by the lock")]
    RequestSignatureError,

    #[error("device registration rejected by the lock")]
    RegisterDeviceError,

    #[error("no connection listener attached")]
    NoWrapperListener,

    #[error("signed time provider returned nothing")]
    NotProvidedSignedTime,

    #[error("timed out waiting for {0:#04x}")]
    Timeout(u8),
}

impl From<SerialError> for LockError {
    fn from(e: SerialError) -> Self {
        let SerialError::Malformed(serial) = e;
        Self::InvalidSerial(serial)
    }
}

impl From<TransportError> for LockError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::BluetoothDisabled => Self::BluetoothDisabled,
            TransportError::PermissionDenied(perms) => Self::NoPermissions(perms),
            TransportError::DeviceNotFound => Self::DeviceNotFound,
            other => Self::ConnectionDead(other.to_string()),
        }
    }
}

impl From<CryptoError> for LockError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::InvalidCertificate(_) => Self::InvalidCertificate,
            other => Self::ConnectionDead(other.to_string()),
        }
    }
}

impl From<HandshakeError> for LockError {
    fn from(e: HandshakeError) -> Self {
        match e {
            HandshakeError::CertificateRejected => Self::InvalidCertificate,
            HandshakeError::Crypto(inner) => inner.into(),
            other => Self::ConnectionDead(other.to_string()),
        }
    }
}

impl From<SessionError> for LockError {
    fn from(e: SessionError) -> Self {
        Self::ConnectionDead(e.to_string())
    }
}

impl From<WireError> for LockError {
    fn from(e: WireError) -> Self {
        Self::ConnectionDead(format!("malformed response: {e}"))
    }
}

impl From<CommandFailure> for LockError {
    fn from(f: CommandFailure) -> Self {
        match f {
            CommandFailure::InvalidParam => Self::InvalidParam,
            CommandFailure::Busy => Self::LockBusy,
            CommandFailure::NotCalibrated => Self::NotCalibrated,
            CommandFailure::AutoUnlockAlreadyCalled => Self::AutoUnlockAlreadyCalled,
            CommandFailure::DeviceNeedsReset { from_old_version } => {
                Self::DeviceNeedsReset { from_old_version }
            }
            CommandFailure::NotConfigured => Self::NotConfigured,
            CommandFailure::Dismounted => Self::Dismounted,
            CommandFailure::UnlockAlreadyCalled => Self::UnlockAlreadyCalled,
            CommandFailure::RequestSignature => Self::RequestSignatureError,
            CommandFailure::SetSignedTime => Self::SetSignedTimeError,
            CommandFailure::RegisterDevice => Self::RegisterDeviceError,
            CommandFailure::General(code) => Self::GeneralLockError(code),
        }
    }
}
