//! First-class retry policies.
//!
//! Three distinct budgets exist and must not be conflated: busy responses are
//! retried inside the command layer, signed-time writes inside the refresh
//! flow, and connection setup inside the supervisor. Each policy is a plain
//! value with a decision method so the budgets are testable without timers.

use std::time::Duration;

/// Fixed-budget, fixed-spacing retry (busy and signed-time flows).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Spacing between consecutive attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    /// BUSY responses: 3 attempts, 1-second spacing.
    pub const fn busy() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(1),
        }
    }

    /// Signed-time writes: 4 attempts, 5-second spacing.
    pub const fn signed_time() -> Self {
        Self {
            max_attempts: 4,
            delay: Duration::from_secs(5),
        }
    }

    /// Delay before the next attempt after `failed_attempts` failures, or
    /// `None` when the budget is spent.
    pub fn next_delay(&self, failed_attempts: u32) -> Option<Duration> {
        (failed_attempts < self.max_attempts).then_some(self.delay)
    }
}

/// Classification of a connection-setup failure, from the transport error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectErrorClass {
    /// Platform throttled the scan; back off long.
    ScanThrottled,
    /// Device connected but a required characteristic is missing.
    CharacteristicNotFound,
    /// Permission denied by the platform. Never retried.
    PermissionDenied,
    /// Radio is off. Never retried.
    BluetoothDisabled,
    /// Certificate rejected. Never retried.
    InvalidCertificate,
    /// No trusted time and the refresh flow already gave up. Never retried.
    NoSignedTime,
    /// The lock has not been initialized. Never retried.
    DeviceNotInitialized,
    /// Any other transient failure.
    Other,
}

impl ConnectErrorClass {
    fn retry_delay(self) -> Option<Duration> {
        match self {
            Self::ScanThrottled | Self::CharacteristicNotFound => Some(Duration::from_secs(15)),
            Self::Other => Some(Duration::from_secs(1)),
            Self::PermissionDenied
            | Self::BluetoothDisabled
            | Self::InvalidCertificate
            | Self::NoSignedTime
            | Self::DeviceNotInitialized => None,
        }
    }
}

/// Outcome of a connection-retry decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    GiveUp,
}

/// Connection-setup retry: budget of 3 attempts, or unbounded when
/// `keep_connection` is set.
#[derive(Debug, Clone, Copy)]
pub struct ConnectRetry {
    keep_connection: bool,
}

impl ConnectRetry {
    pub const ATTEMPT_BUDGET: u32 = 3;

    pub fn new(keep_connection: bool) -> Self {
        Self { keep_connection }
    }

    /// Decide what to do after `failed_attempts` setup failures, the latest
    /// classified as `class`.
    pub fn decision(&self, class: ConnectErrorClass, failed_attempts: u32) -> RetryDecision {
        let Some(delay) = class.retry_delay() else {
            return RetryDecision::GiveUp;
        };
        if !self.keep_connection && failed_attempts >= Self::ATTEMPT_BUDGET {
            return RetryDecision::GiveUp;
        }
        RetryDecision::RetryAfter(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_policy_budget() {
        let policy = RetryPolicy::busy();
        assert_eq!(policy.next_delay(0), Some(Duration::from_secs(1)));
        assert_eq!(policy.next_delay(1), Some(Duration::from_secs(1)));
        assert_eq!(policy.next_delay(2), Some(Duration::from_secs(1)));
        assert_eq!(policy.next_delay(3), None);
    }

    #[test]
    fn signed_time_policy_budget() {
        let policy = RetryPolicy::signed_time();
        assert_eq!(policy.next_delay(3), Some(Duration::from_secs(5)));
        assert_eq!(policy.next_delay(4), None);
    }

    #[test]
    fn transient_errors_use_short_delay() {
        let retry = ConnectRetry::new(false);
        assert_eq!(
            retry.decision(ConnectErrorClass::Other, 1),
            RetryDecision::RetryAfter(Duration::from_secs(1))
        );
    }

    #[test]
    fn throttle_and_missing_char_back_off_long() {
        let retry = ConnectRetry::new(false);
        for class in [
            ConnectErrorClass::ScanThrottled,
            ConnectErrorClass::CharacteristicNotFound,
        ] {
            assert_eq!(
                retry.decision(class, 1),
                RetryDecision::RetryAfter(Duration::from_secs(15))
            );
        }
    }

    #[test]
    fn budget_exhausts_without_keep_connection() {
        let retry = ConnectRetry::new(false);
        assert_eq!(
            retry.decision(ConnectErrorClass::Other, 2),
            RetryDecision::RetryAfter(Duration::from_secs(1))
        );
        assert_eq!(
            retry.decision(ConnectErrorClass::Other, 3),
            RetryDecision::GiveUp
        );
    }

    #[test]
    fn keep_connection_retries_unbounded() {
        let retry = ConnectRetry::new(true);
        assert_eq!(
            retry.decision(ConnectErrorClass::Other, 10_000),
            RetryDecision::RetryAfter(Duration::from_secs(1))
        );
    }

    #[test]
    fn fatal_classes_never_retry() {
        let retry = ConnectRetry::new(true);
        for class in [
            ConnectErrorClass::PermissionDenied,
            ConnectErrorClass::BluetoothDisabled,
            ConnectErrorClass::InvalidCertificate,
            ConnectErrorClass::NoSignedTime,
            ConnectErrorClass::DeviceNotInitialized,
        ] {
            assert_eq!(retry.decision(class, 0), RetryDecision::GiveUp);
        }
    }
}
