//! Shared fixtures for the integration tests.
#![allow(dead_code)] // not every test binary uses every fixture

use std::sync::{Arc, Mutex};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use boltlink_client::testing::FakeLock;
use boltlink_client::{
    ClientConfig, LockError, LockHandle, SecureConnectionListener, SessionSupervisor, SignedTime,
    SignedTimeProvider, UnsecureConnectionListener,
};
use boltlink_core::command::{LockState, LockStatus};
use boltlink_crypto::SoftwareKeystore;

pub const SERIAL: &str = "12345678-123456";

/// Listener that records every callback for later assertions.
#[derive(Default)]
pub struct RecordingListener {
    pub connection_events: Mutex<Vec<(bool, bool)>>,
    pub status_events: Mutex<Vec<(LockState, LockStatus)>>,
    pub notifications: Mutex<Vec<Vec<u8>>>,
    pub errors: Mutex<Vec<LockError>>,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn connection_events(&self) -> Vec<(bool, bool)> {
        self.connection_events.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<LockError> {
        self.errors.lock().unwrap().clone()
    }

    pub fn event_count(&self) -> usize {
        self.connection_events.lock().unwrap().len()
            + self.status_events.lock().unwrap().len()
            + self.notifications.lock().unwrap().len()
            + self.errors.lock().unwrap().len()
    }
}

impl SecureConnectionListener for RecordingListener {
    fn on_connection_changed(&self, connecting: bool, connected: bool) {
        self.connection_events
            .lock()
            .unwrap()
            .push((connecting, connected));
    }
    fn on_lock_status_changed(&self, state: LockState, status: LockStatus) {
        self.status_events.lock().unwrap().push((state, status));
    }
    fn on_notification(&self, payload: &[u8]) {
        self.notifications.lock().unwrap().push(payload.to_vec());
    }
    fn on_error(&self, error: &LockError) {
        self.errors.lock().unwrap().push(error.clone());
    }
}

impl UnsecureConnectionListener for RecordingListener {
    fn on_unsecure_connection_changed(&self, connecting: bool, connected: bool) {
        self.connection_events
            .lock()
            .unwrap()
            .push((connecting, connected));
    }
    fn on_notification(&self, payload: &[u8]) {
        self.notifications.lock().unwrap().push(payload.to_vec());
    }
    fn on_error(&self, error: &LockError) {
        self.errors.lock().unwrap().push(error.clone());
    }
}

/// Provider that always has a signed time available.
pub struct StaticTimeProvider;

impl SignedTimeProvider for StaticTimeProvider {
    async fn signed_time(&self) -> Option<SignedTime> {
        Some(SignedTime {
            datetime: BASE64.encode(b"2026-08-02T00:00:00Z"),
            signature: BASE64.encode([0x5A; 64]),
        })
    }
}

/// Connect in secure mode with default config and the given listener.
pub async fn connect_secure(
    lock: &FakeLock,
    listener: Arc<RecordingListener>,
    config: ClientConfig,
) -> Result<LockHandle, LockError> {
    SessionSupervisor::connect_secure(
        lock.clone(),
        SERIAL,
        &lock.certificate(),
        Arc::new(SoftwareKeystore::new()),
        StaticTimeProvider,
        listener,
        config,
    )
    .await
}
