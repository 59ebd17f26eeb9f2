//! Command bytes, notification types, result codes, and lock state values.

// Command bytes. The command byte doubles as the correlation key for
// indication responses.
pub const GET_VERSION: u8 = 0x11;
pub const GET_SETTINGS: u8 = 0x20;
pub const CLOSE_LOCK: u8 = 0x50;
pub const OPEN_LOCK: u8 = 0x51;
pub const PULL_SPRING: u8 = 0x52;
pub const GET_STATE: u8 = 0x5A;
pub const REGISTER_DEVICE: u8 = 0x70;
pub const SET_SIGNED_TIME: u8 = 0x71;
pub const REQUEST_SIGNED_SERIAL: u8 = 0x74;

/// Notification types, carried in the first byte of a notification body.
pub mod notification {
    pub const SIGNED_SERIAL: u8 = 0x7A;
    pub const SIGNED_DATETIME: u8 = 0x7B;
    pub const NEED_DATE_TIME: u8 = 0xB9;
    pub const LOCK_STATUS_CHANGE: u8 = 0xBA;
}

/// Human-readable name for a command byte, for DEBUG logs.
pub fn command_name(cmd: u8) -> &'static str {
    match cmd {
        GET_VERSION => "GET_VERSION",
        GET_SETTINGS => "GET_SETTINGS",
        CLOSE_LOCK => "CLOSE_LOCK",
        OPEN_LOCK => "OPEN_LOCK",
        PULL_SPRING => "PULL_SPRING",
        GET_STATE => "GET_STATE",
        REGISTER_DEVICE => "REGISTER_DEVICE",
        SET_SIGNED_TIME => "SET_SIGNED_TIME",
        REQUEST_SIGNED_SERIAL => "REQUEST_SIGNED_SERIAL",
        _ => "UNKNOWN",
    }
}

/// Operation parameter byte for open/close/pull commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum CommandParam {
    #[default]
    None = 0x00,
    Auto = 0x01,
    Force = 0x02,
    WithoutPull = 0x03,
}

/// Result code carried in byte 1 of every indication body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCode {
    Success,
    InvalidParam,
    Error,
    Busy,
    NotCalibrated,
    UnlockCalledByAutoUnlock,
    NoPermission,
    NotConfigured,
    Dismounted,
    UnlockCalledByOther,
    Unknown(u8),
}

impl ResultCode {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x00 => Self::Success,
            0x01 => Self::InvalidParam,
            0x02 => Self::Error,
            0x03 => Self::Busy,
            0x05 => Self::NotCalibrated,
            0x06 => Self::UnlockCalledByAutoUnlock,
            0x07 => Self::NoPermission,
            0x08 => Self::NotConfigured,
            0x09 => Self::Dismounted,
            0x0A => Self::UnlockCalledByOther,
            other => Self::Unknown(other),
        }
    }
}

/// Mechanical state reported by the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Uncalibrated,
    Calibrating,
    Open,
    PartiallyOpen,
    Opening,
    Closing,
    Closed,
    SpringPull,
    OpeningWithPull,
    Unknown(u8),
}

impl LockState {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x00 => Self::Uncalibrated,
            0x01 => Self::Calibrating,
            0x02 => Self::Open,
            0x03 => Self::PartiallyOpen,
            0x04 => Self::Opening,
            0x05 => Self::Closing,
            0x06 => Self::Closed,
            0x07 => Self::SpringPull,
            0x08 => Self::OpeningWithPull,
            other => Self::Unknown(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::Uncalibrated => 0x00,
            Self::Calibrating => 0x01,
            Self::Open => 0x02,
            Self::PartiallyOpen => 0x03,
            Self::Opening => 0x04,
            Self::Closing => 0x05,
            Self::Closed => 0x06,
            Self::SpringPull => 0x07,
            Self::OpeningWithPull => 0x08,
            Self::Unknown(v) => v,
        }
    }
}

/// Status byte accompanying a lock state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStatus {
    Ok,
    Jammed,
    Timeout,
    Unknown(u8),
}

impl LockStatus {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x00 => Self::Ok,
            0x01 => Self::Jammed,
            0x02 => Self::Timeout,
            other => Self::Unknown(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_code_table() {
        assert_eq!(ResultCode::from_u8(0x00), ResultCode::Success);
        assert_eq!(ResultCode::from_u8(0x03), ResultCode::Busy);
        assert_eq!(ResultCode::from_u8(0x0A), ResultCode::UnlockCalledByOther);
        // 0x04 is unassigned on the wire.
        assert_eq!(ResultCode::from_u8(0x04), ResultCode::Unknown(0x04));
        assert_eq!(ResultCode::from_u8(0xFF), ResultCode::Unknown(0xFF));
    }

    #[test]
    fn lock_state_roundtrip() {
        for v in 0x00..=0x08u8 {
            assert_eq!(LockState::from_u8(v).as_u8(), v);
        }
        assert_eq!(LockState::from_u8(0x42), LockState::Unknown(0x42));
    }

    #[test]
    fn every_command_has_a_name() {
        for cmd in [
            GET_VERSION,
            GET_SETTINGS,
            CLOSE_LOCK,
            OPEN_LOCK,
            PULL_SPRING,
            GET_STATE,
            REGISTER_DEVICE,
            SET_SIGNED_TIME,
            REQUEST_SIGNED_SERIAL,
        ] {
            assert_ne!(command_name(cmd), "UNKNOWN", "command {cmd:#04x}");
        }
        assert_eq!(command_name(0x99), "UNKNOWN");
    }

    #[test]
    fn param_bytes() {
        assert_eq!(CommandParam::None as u8, 0x00);
        assert_eq!(CommandParam::Auto as u8, 0x01);
        assert_eq!(CommandParam::Force as u8, 0x02);
        assert_eq!(CommandParam::WithoutPull as u8, 0x03);
    }
}
