//! Crypto error types.

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    #[error("token too short: {actual} bytes (minimum {min})")]
    TokenTooShort { min: usize, actual: usize },

    #[error("authentication tag mismatch")]
    InvalidTag,

    #[error("decryption failed")]
    DecryptionFailed,

    #[error("signature verification failed")]
    InvalidSignature,

    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),

    #[error("keystore unavailable")]
    KeystoreUnavailable,
}
