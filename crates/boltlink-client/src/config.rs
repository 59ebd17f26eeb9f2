//! Client configuration.

use std::time::Duration;

use boltlink_protocol::constants::{NOTIFICATION_TIMEOUT, REQUEST_TIMEOUT, SCAN_TIMEOUT};

use crate::transport::ScanMode;

/// GATT identifiers for the lock service and its four characteristics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattProfile {
    pub service: String,
    pub send: String,
    pub secure_notify: String,
    pub lock_indicate: String,
    pub lock_notify: String,
}

impl Default for GattProfile {
    fn default() -> Self {
        Self {
            service: "00000002-4899-489f-a301-fbee544b1db0".into(),
            send: "00000401-4899-489f-a301-fbee544b1db0".into(),
            secure_notify: "00000402-4899-489f-a301-fbee544b1db0".into(),
            lock_indicate: "00000403-4899-489f-a301-fbee544b1db0".into(),
            lock_notify: "00000404-4899-489f-a301-fbee544b1db0".into(),
        }
    }
}

/// Tunables for one lock connection.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub gatt: GattProfile,
    /// Keep scanning and reconnecting without a budget.
    pub keep_connection: bool,
    pub scan_mode: ScanMode,
    /// Scan window when `keep_connection` is off.
    pub scan_timeout: Duration,
    pub request_timeout: Duration,
    pub notification_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            gatt: GattProfile::default(),
            keep_connection: false,
            scan_mode: ScanMode::default(),
            scan_timeout: SCAN_TIMEOUT,
            request_timeout: REQUEST_TIMEOUT,
            notification_timeout: NOTIFICATION_TIMEOUT,
        }
    }
}

impl ClientConfig {
    pub fn keep_connection(mut self, keep: bool) -> Self {
        self.keep_connection = keep;
        self
    }

    pub fn scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn notification_timeout(mut self, timeout: Duration) -> Self {
        self.notification_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_timeouts() {
        let config = ClientConfig::default();
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.notification_timeout, Duration::from_secs(30));
        assert_eq!(config.scan_timeout, Duration::from_secs(30));
        assert!(!config.keep_connection);
    }

    #[test]
    fn builder_overrides() {
        let config = ClientConfig::default()
            .keep_connection(true)
            .request_timeout(Duration::from_secs(5));
        assert!(config.keep_connection);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }
}
