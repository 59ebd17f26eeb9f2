//! Result-code semantics for command responses.
//!
//! Byte 1 of every indication body is the result code. Most codes map to one
//! error regardless of the command; `ERROR` (0x02) maps per command kind, and
//! `NO_PERMISSION` (0x07) is the old-firmware reset marker.

use boltlink_core::command::ResultCode;
use boltlink_core::error::WireError;

/// Which per-operation meaning the generic `ERROR` code takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandKind {
    #[default]
    Generic,
    RequestSignature,
    SetSignedTime,
    RegisterDevice,
}

/// A non-success outcome of a command, before conversion into the public
/// error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandFailure {
    InvalidParam,
    Busy,
    NotCalibrated,
    AutoUnlockAlreadyCalled,
    DeviceNeedsReset { from_old_version: bool },
    NotConfigured,
    Dismounted,
    UnlockAlreadyCalled,
    RequestSignature,
    SetSignedTime,
    RegisterDevice,
    General(u8),
}

impl CommandFailure {
    /// Whether the failure is transient and worth retrying in place.
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Busy)
    }
}

/// Extract the result code from an indication body (`cmd || result || …`).
pub fn response_result(body: &[u8]) -> Result<ResultCode, WireError> {
    body.get(1)
        .copied()
        .map(ResultCode::from_u8)
        .ok_or(WireError::TooShort {
            expected: 2,
            actual: body.len(),
        })
}

/// Map a result code to an outcome for the given command kind.
pub fn check_result(kind: CommandKind, code: ResultCode) -> Result<(), CommandFailure> {
    match code {
        ResultCode::Success => Ok(()),
        ResultCode::InvalidParam => Err(CommandFailure::InvalidParam),
        ResultCode::Busy => Err(CommandFailure::Busy),
        ResultCode::NotCalibrated => Err(CommandFailure::NotCalibrated),
        ResultCode::UnlockCalledByAutoUnlock => Err(CommandFailure::AutoUnlockAlreadyCalled),
        ResultCode::NoPermission => Err(CommandFailure::DeviceNeedsReset {
            from_old_version: true,
        }),
        ResultCode::NotConfigured => Err(CommandFailure::NotConfigured),
        ResultCode::Dismounted => Err(CommandFailure::Dismounted),
        ResultCode::UnlockCalledByOther => Err(CommandFailure::UnlockAlreadyCalled),
        ResultCode::Error => Err(match kind {
            CommandKind::RequestSignature => CommandFailure::RequestSignature,
            CommandKind::SetSignedTime => CommandFailure::SetSignedTime,
            CommandKind::RegisterDevice => CommandFailure::RegisterDevice,
            CommandKind::Generic => CommandFailure::General(0x02),
        }),
        ResultCode::Unknown(code) => Err(CommandFailure::General(code)),
    }
}
