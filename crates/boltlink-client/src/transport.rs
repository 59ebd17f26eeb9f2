//! Radio transport abstraction.
//!
//! The protocol engine produces frames and consumes byte streams; concrete
//! transports bridge that to a platform BLE stack. A [`LockTransport`] finds
//! and connects devices; a [`LockLink`] is one live connection exposing the
//! three inbound characteristic streams and an outbound write path.

use tokio::sync::{mpsc, watch};

use boltlink_core::serial::SerialNumber;

/// The four GATT characteristics the protocol uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Characteristic {
    /// Writes: handshake frames.
    Send,
    /// Notifications: handshake frames from the lock.
    SecureNotify,
    /// Indications: command responses.
    LockIndicate,
    /// Notifications: asynchronous events. Also the write target for commands.
    LockNotify,
}

/// Scan duty cycle requested from the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanMode {
    /// Aggressive scanning while the user is actively connecting.
    #[default]
    LowLatency,
    Balanced,
    LowPower,
}

/// A discovered lock, ready to connect.
#[derive(Debug, Clone)]
pub struct DeviceHandle {
    /// Platform address or identifier of the peripheral.
    pub address: String,
    pub serial: SerialNumber,
}

/// Transport-level failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("bluetooth is disabled")]
    BluetoothDisabled,

    #[error("missing permissions: {0:?}")]
    PermissionDenied(Vec<String>),

    #[error("scan throttled by the platform")]
    ScanThrottled,

    #[error("device not found")]
    DeviceNotFound,

    #[error("characteristic {0:?} not found")]
    CharacteristicNotFound(Characteristic),

    #[error("link is not connected")]
    NotConnected,

    #[error("write failed: {0}")]
    WriteFailed(String),

    #[error("link setup failed: {0}")]
    SetupFailed(String),
}

/// The three inbound byte streams of a connection, one per characteristic.
///
/// Frames on each stream arrive in characteristic order; the streams close
/// when the link goes down.
pub struct InboundStreams {
    pub secure: mpsc::Receiver<Vec<u8>>,
    pub indications: mpsc::Receiver<Vec<u8>>,
    pub notifications: mpsc::Receiver<Vec<u8>>,
}

/// Discovery and connection establishment.
pub trait LockTransport: Send + Sync + 'static {
    type Link: LockLink;

    /// Scan for a lock advertising the given serial. Resolves when found;
    /// callers bound the wait externally.
    fn scan_for(
        &self,
        serial: &SerialNumber,
        mode: ScanMode,
    ) -> impl Future<Output = Result<DeviceHandle, TransportError>> + Send;

    /// Open a link and set up the characteristics.
    fn connect(
        &self,
        device: &DeviceHandle,
    ) -> impl Future<Output = Result<Self::Link, TransportError>> + Send;
}

/// One live connection to a lock.
pub trait LockLink: Send + Sync + 'static {
    /// Negotiated ATT MTU for this link.
    fn mtu(&self) -> usize;

    /// Take the inbound streams. Yields `Some` exactly once.
    fn take_streams(&mut self) -> Option<InboundStreams>;

    /// Link liveness; flips to `false` when the connection drops.
    fn connected(&self) -> watch::Receiver<bool>;

    /// Write a frame to a characteristic. The caller serializes writes.
    fn write(
        &self,
        characteristic: Characteristic,
        frame: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Ask the platform for a high-priority connection interval.
    fn request_high_priority(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Close the link.
    fn disconnect(&self) -> impl Future<Output = ()> + Send;
}
