//! Smart-lock client engine.
//!
//! The secure-session protocol engine and its command pipeline: a supervisor
//! state machine that discovers a lock by serial number, establishes a
//! mutually-authenticated encrypted session, multiplexes request/response
//! commands and asynchronous notifications over it, and recovers from alerts
//! by re-establishing the session.
//!
//! # Quick tour
//!
//! ```no_run
//! # async fn demo() -> Result<(), boltlink_client::LockError> {
//! use std::sync::Arc;
//! use boltlink_client::{ClientConfig, SessionSupervisor};
//! use boltlink_crypto::SoftwareKeystore;
//! # use boltlink_client::testing::FakeLock;
//! # use boltlink_client::{SecureConnectionListener, SignedTime, SignedTimeProvider};
//! # struct Quiet;
//! # impl SecureConnectionListener for Quiet {}
//! # struct Backend;
//! # impl SignedTimeProvider for Backend {
//! #     async fn signed_time(&self) -> Option<SignedTime> { None }
//! # }
//! # let transport = FakeLock::builder("12345678-123456").build();
//! # let certificate = transport.certificate();
//!
//! let handle = SessionSupervisor::connect_secure(
//!     transport,
//!     "12345678-123456",
//!     &certificate,
//!     Arc::new(SoftwareKeystore::new()),
//!     Backend,
//!     Arc::new(Quiet),
//!     ClientConfig::default(),
//! )
//! .await?;
//!
//! handle.api().open_lock(Default::default()).await?;
//! handle.disconnect().await;
//! # Ok(()) }
//! ```

pub mod api;
pub mod config;
pub mod error;
mod framer;
pub mod listener;
pub mod logging;
pub mod mux;
pub mod providers;
pub mod supervisor;
pub mod testing;
pub mod transport;

pub use api::LockApi;
pub use config::{ClientConfig, GattProfile};
pub use error::LockError;
pub use listener::{SecureConnectionListener, UnsecureConnectionListener};
pub use mux::{CommandMux, NotificationStream};
pub use providers::{NoSignedTimeProvider, SignedTime, SignedTimeProvider};
pub use supervisor::{LockHandle, Phase, SessionSupervisor};
pub use transport::{
    Characteristic, DeviceHandle, InboundStreams, LockLink, LockTransport, ScanMode,
    TransportError,
};
