//! Device settings response parsing.
//!
//! `GET_SETTINGS` returns a 13-byte body: command byte, result byte, then 11
//! payload bytes laid out as
//! `flags(1) || autoLockDelay(2) || pullSpringDuration(2) ||
//! postponedLockDelay(2) || autoLockImplicitDelay(2) || revision(2)`,
//! all multi-byte values big-endian. This is the capture-verified order; the
//! flag byte comes first, the settings revision last.

use crate::error::WireError;

const SETTINGS_PAYLOAD_LEN: usize = 11;

// Flag bits, MSB first.
const FLAG_AUTO_LOCK: u8 = 1 << 7;
const FLAG_AUTO_LOCK_IMPLICIT: u8 = 1 << 6;
const FLAG_PULL_SPRING: u8 = 1 << 5;
const FLAG_AUTO_PULL_SPRING: u8 = 1 << 4;
const FLAG_POSTPONED_LOCK: u8 = 1 << 3;
const FLAG_BUTTON_LOCK: u8 = 1 << 2;
const FLAG_BUTTON_UNLOCK: u8 = 1 << 1;

/// Parsed lock settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceSettings {
    pub auto_lock_enabled: bool,
    pub auto_lock_implicit_enabled: bool,
    pub pull_spring_enabled: bool,
    pub auto_pull_spring_enabled: bool,
    pub postponed_lock_enabled: bool,
    pub button_lock_enabled: bool,
    pub button_unlock_enabled: bool,
    /// Auto-lock delay in seconds.
    pub auto_lock_delay: u16,
    /// Spring pull duration in tenths of a second.
    pub pull_spring_duration: u16,
    pub postponed_lock_delay: u16,
    pub auto_lock_implicit_delay: u16,
    /// Settings revision counter maintained by the lock.
    pub revision: u16,
}

impl DeviceSettings {
    /// Parse the 11 payload bytes following the command and result bytes.
    pub fn from_wire(payload: &[u8]) -> Result<Self, WireError> {
        if payload.len() < SETTINGS_PAYLOAD_LEN {
            return Err(WireError::TooShort {
                expected: SETTINGS_PAYLOAD_LEN,
                actual: payload.len(),
            });
        }

        let flags = payload[0];
        let be16 = |i: usize| u16::from_be_bytes([payload[i], payload[i + 1]]);

        Ok(Self {
            auto_lock_enabled: flags & FLAG_AUTO_LOCK != 0,
            auto_lock_implicit_enabled: flags & FLAG_AUTO_LOCK_IMPLICIT != 0,
            pull_spring_enabled: flags & FLAG_PULL_SPRING != 0,
            auto_pull_spring_enabled: flags & FLAG_AUTO_PULL_SPRING != 0,
            postponed_lock_enabled: flags & FLAG_POSTPONED_LOCK != 0,
            button_lock_enabled: flags & FLAG_BUTTON_LOCK != 0,
            button_unlock_enabled: flags & FLAG_BUTTON_UNLOCK != 0,
            auto_lock_delay: be16(1),
            pull_spring_duration: be16(3),
            postponed_lock_delay: be16(5),
            auto_lock_implicit_delay: be16(7),
            revision: be16(9),
        })
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn parse_never_panics(payload in proptest::collection::vec(any::<u8>(), 0..32)) {
            let _ = DeviceSettings::from_wire(&payload);
        }

        #[test]
        fn delays_decode_big_endian(
            auto_lock in any::<u16>(),
            pull in any::<u16>(),
            postponed in any::<u16>(),
            implicit in any::<u16>(),
            revision in any::<u16>(),
        ) {
            let mut payload = vec![0u8];
            payload.extend_from_slice(&auto_lock.to_be_bytes());
            payload.extend_from_slice(&pull.to_be_bytes());
            payload.extend_from_slice(&postponed.to_be_bytes());
            payload.extend_from_slice(&implicit.to_be_bytes());
            payload.extend_from_slice(&revision.to_be_bytes());
            let settings = DeviceSettings::from_wire(&payload).unwrap();
            prop_assert_eq!(settings.auto_lock_delay, auto_lock);
            prop_assert_eq!(settings.pull_spring_duration, pull);
            prop_assert_eq!(settings.postponed_lock_delay, postponed);
            prop_assert_eq!(settings.auto_lock_implicit_delay, implicit);
            prop_assert_eq!(settings.revision, revision);
        }
    }
}
