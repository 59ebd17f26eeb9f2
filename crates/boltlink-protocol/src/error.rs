//! Protocol error types.

use boltlink_crypto::CryptoError;

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum HandshakeError {
    #[error("server hello too short: {actual} bytes (need 32)")]
    ShortServerHello { actual: usize },

    #[error("server verify record too short: {actual} bytes (need 64)")]
    ShortServerVerify { actual: usize },

    #[error("server verification record rejected")]
    CertificateRejected,

    #[error("empty alert frame")]
    EmptyAlert,

    #[error("crypto failure: {0}")]
    Crypto(#[from] CryptoError),
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("session is not ready")]
    NotReady,

    #[error("empty data message")]
    EmptyMessage,

    #[error("unexpected frame kind {0:#04x} on data path")]
    UnexpectedKind(u8),

    #[error("crypto failure: {0}")]
    Crypto(#[from] CryptoError),
}
