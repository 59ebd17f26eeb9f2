//! Secure-session protocol engine for the boltlink smart-lock client.
//!
//! The pieces here are pure: the handshake is a typed state machine that
//! consumes inbound frame bodies and returns outbound frames for a driver to
//! write; the session channel is an encrypt/decrypt oracle; alerts, result
//! codes, and retry budgets are plain data with decision functions. All I/O
//! and timing lives in the client crate.

pub mod alert;
pub mod chunk;
pub mod constants;
pub mod error;
pub mod handshake;
pub mod result;
pub mod retry;
pub mod session;

pub use alert::{AlertCode, AlertDisposition, FatalAlert};
pub use error::{HandshakeError, SessionError};
pub use handshake::{AwaitingServerHello, AwaitingServerVerify, AwaitingSessionInit};
pub use result::{CommandFailure, CommandKind, check_result, response_result};
pub use retry::{ConnectErrorClass, ConnectRetry, RetryDecision, RetryPolicy};
pub use session::SecureChannel;
