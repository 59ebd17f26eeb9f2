//! Access certificate decoding.
//!
//! The caller obtains a [`DeviceCertificate`] from the access backend: the
//! certificate bytes and the lock's public key, both base64-encoded. Decoding
//! happens once, at construction of [`AccessCredentials`]; everything past
//! that point works with raw bytes and a parsed verifying key.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};

use crate::error::CryptoError;

/// The base64-encoded certificate material handed in by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCertificate {
    /// Certificate bytes authenticating the mobile to the lock.
    pub certificate: String,
    /// The lock's Ed25519 public key.
    pub device_public_key: String,
}

/// The lock's Ed25519 verifying key.
#[derive(Debug, Clone)]
pub struct DevicePublicKey(VerifyingKey);

impl DevicePublicKey {
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, CryptoError> {
        VerifyingKey::from_bytes(bytes)
            .map(Self)
            .map_err(|_| CryptoError::InvalidCertificate("device key is not a curve point".into()))
    }

    /// Verify a 64-byte signature over `message`.
    pub fn verify(&self, message: &[u8], signature: &[u8; 64]) -> Result<(), CryptoError> {
        self.0
            .verify(message, &Signature::from_bytes(signature))
            .map_err(|_| CryptoError::InvalidSignature)
    }
}

/// Decoded certificate material, ready for the handshake.
#[derive(Debug, Clone)]
pub struct AccessCredentials {
    certificate: Vec<u8>,
    device_key: DevicePublicKey,
}

impl AccessCredentials {
    /// Decode both base64 fields. Fails with `InvalidCertificate` on malformed
    /// base64, a wrong-length key, or key bytes off the curve.
    pub fn decode(cert: &DeviceCertificate) -> Result<Self, CryptoError> {
        let certificate = BASE64
            .decode(&cert.certificate)
            .map_err(|e| CryptoError::InvalidCertificate(format!("certificate base64: {e}")))?;
        if certificate.is_empty() {
            return Err(CryptoError::InvalidCertificate("certificate is empty".into()));
        }

        let key_bytes = BASE64
            .decode(&cert.device_public_key)
            .map_err(|e| CryptoError::InvalidCertificate(format!("device key base64: {e}")))?;
        let key_bytes: [u8; 32] = key_bytes.as_slice().try_into().map_err(|_| {
            CryptoError::InvalidCertificate(format!(
                "device key must be 32 bytes, got {}",
                key_bytes.len()
            ))
        })?;

        Ok(Self {
            certificate,
            device_key: DevicePublicKey::from_bytes(&key_bytes)?,
        })
    }

    /// The raw certificate bytes carried in the client-verify blob.
    pub fn certificate(&self) -> &[u8] {
        &self.certificate
    }

    /// The lock's verifying key, used against the server-verify record.
    pub fn device_key(&self) -> &DevicePublicKey {
        &self.device_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;

    fn valid_cert() -> DeviceCertificate {
        let key = SigningKey::from_bytes(&[7; 32]);
        DeviceCertificate {
            certificate: BASE64.encode(b"certificate-bytes"),
            device_public_key: BASE64.encode(key.verifying_key().to_bytes()),
        }
    }

    #[test]
    fn decode_valid() {
        let creds = AccessCredentials::decode(&valid_cert()).unwrap();
        assert_eq!(creds.certificate(), b"certificate-bytes");
    }

    #[test]
    fn decode_bad_base64() {
        let mut cert = valid_cert();
        cert.certificate = "!!not base64!!".into();
        assert!(matches!(
            AccessCredentials::decode(&cert),
            Err(CryptoError::InvalidCertificate(_))
        ));
    }

    #[test]
    fn decode_empty_certificate() {
        let mut cert = valid_cert();
        cert.certificate = String::new();
        assert!(matches!(
            AccessCredentials::decode(&cert),
            Err(CryptoError::InvalidCertificate(_))
        ));
    }

    #[test]
    fn decode_wrong_key_length() {
        let mut cert = valid_cert();
        cert.device_public_key = BASE64.encode([0u8; 31]);
        assert!(matches!(
            AccessCredentials::decode(&cert),
            Err(CryptoError::InvalidCertificate(_))
        ));
    }

    #[test]
    fn verify_signature_against_device_key() {
        use ed25519_dalek::Signer;

        let key = SigningKey::from_bytes(&[7; 32]);
        let creds = AccessCredentials::decode(&valid_cert()).unwrap();

        let message = b"handshake transcript";
        let signature = key.sign(message).to_bytes();
        assert!(creds.device_key().verify(message, &signature).is_ok());
        assert_eq!(
            creds.device_key().verify(b"different transcript", &signature),
            Err(CryptoError::InvalidSignature)
        );
    }
}
