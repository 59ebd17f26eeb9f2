//! Mobile keystore capability.
//!
//! The private half of the mobile keypair never crosses this boundary: the
//! trait exposes the public key and delegated signing only. Hosts with a
//! hardware-backed store implement [`MobileKeystore`] themselves;
//! [`SoftwareKeystore`] is the in-memory fallback, generating its keypair on
//! first use.

use std::sync::Mutex;

use ed25519_dalek::{Signer, SigningKey};
use zeroize::Zeroizing;

use crate::error::CryptoError;

/// Delegated access to the mobile signing keypair.
pub trait MobileKeystore: Send + Sync {
    /// The mobile's Ed25519 public key, generating the keypair if absent.
    fn public_key(&self) -> Result<[u8; 32], CryptoError>;

    /// Sign `message` with the mobile private key.
    fn sign(&self, message: &[u8]) -> Result<[u8; 64], CryptoError>;
}

/// In-memory keystore: one Ed25519 keypair, generated on first use.
#[derive(Default)]
pub struct SoftwareKeystore {
    key: Mutex<Option<SigningKey>>,
}

impl SoftwareKeystore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A keystore with a fixed seed. Deterministic signatures for tests.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let seed = Zeroizing::new(seed);
        Self {
            key: Mutex::new(Some(SigningKey::from_bytes(&seed))),
        }
    }

    fn with_key<R>(&self, f: impl FnOnce(&SigningKey) -> R) -> Result<R, CryptoError> {
        let mut slot = self.key.lock().map_err(|_| CryptoError::KeystoreUnavailable)?;
        let key = slot.get_or_insert_with(|| SigningKey::generate(&mut rand::rngs::OsRng));
        Ok(f(key))
    }
}

impl MobileKeystore for SoftwareKeystore {
    fn public_key(&self) -> Result<[u8; 32], CryptoError> {
        self.with_key(|key| key.verifying_key().to_bytes())
    }

    fn sign(&self, message: &[u8]) -> Result<[u8; 64], CryptoError> {
        self.with_key(|key| key.sign(message).to_bytes())
    }
}
