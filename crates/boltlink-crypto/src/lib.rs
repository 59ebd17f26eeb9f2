//! Cryptographic building blocks for the boltlink secure session.
//!
//! This crate implements the primitives the session protocol consumes: X25519
//! key agreement, HKDF-SHA256 session-key derivation, the authenticated
//! session cipher (AES-256-CBC + HMAC-SHA256 token), access-certificate
//! decoding, and the mobile keystore capability. Nothing here touches the
//! radio or the protocol state machine.

pub mod certificate;
pub mod cipher;
pub mod ecdh;
pub mod error;
pub mod hash;
pub mod hkdf;
pub mod keystore;

pub use certificate::{AccessCredentials, DeviceCertificate, DevicePublicKey};
pub use cipher::SessionCipher;
pub use ecdh::EphemeralKeypair;
pub use error::CryptoError;
pub use hkdf::derive_session_key;
pub use keystore::{MobileKeystore, SoftwareKeystore};
