//! Client side of the secure-session handshake.
//!
//! Typed state machine: `AwaitingServerHello` → `AwaitingServerVerify` →
//! `AwaitingSessionInit` → [`SecureChannel`]. Each state consumes one inbound
//! frame body and returns the next state plus the frames to write. The states
//! hold no I/O and no clocks; the driver supplies wall-clock time and writes
//! the returned frames to the send characteristic.
//!
//! # Protocol
//!
//! ```text
//! CLIENT                                          LOCK
//!   |-- HELLO [client_eph_pub(32)] ----------------->|
//!   |<-- HELLO [lock_eph_pub(32)] -------------------|
//!   |        Both: ECDH → HKDF(64) → session key     |
//!   |-- SERVER_VERIFY [time_ms(8)] ----------------->|
//!   |<-- SERVER_VERIFY [signature(64)] --------------|
//!   |        Client checks against the device key    |
//!   |-- CLIENT_VERIFY × N, CLIENT_VERIFY_END ------->|
//!   |<-- SESSION_INITIALIZED [params] ---------------|
//!   |            === SESSION READY ===               |
//! ```

use boltlink_core::frame::{FrameKind, encode_frame};
use boltlink_crypto::{AccessCredentials, EphemeralKeypair, MobileKeystore, derive_session_key};
use zeroize::Zeroizing;

use crate::chunk::chunk_client_verify;
use crate::error::HandshakeError;
use crate::session::SecureChannel;

const PUBLIC_KEY_LEN: usize = 32;
const SIGNATURE_LEN: usize = 64;

/// Build the message the lock signs in its SERVER_VERIFY record.
///
/// Layout: `client_pub(32) || lock_pub(32) || time_ms(8 BE)`.
pub fn server_verify_message(client_pub: &[u8; 32], lock_pub: &[u8; 32], time_ms: u64) -> Vec<u8> {
    let mut message = Vec::with_capacity(72);
    message.extend_from_slice(client_pub);
    message.extend_from_slice(lock_pub);
    message.extend_from_slice(&time_ms.to_be_bytes());
    message
}

/// Build the message the mobile keystore signs for the client-verify blob.
///
/// Layout: `lock_pub(32) || client_pub(32) || time_ms(8 BE)`, the mirror of
/// the server-verify message, so neither side can replay the other's record.
pub fn client_verify_message(client_pub: &[u8; 32], lock_pub: &[u8; 32], time_ms: u64) -> Vec<u8> {
    let mut message = Vec::with_capacity(72);
    message.extend_from_slice(lock_pub);
    message.extend_from_slice(client_pub);
    message.extend_from_slice(&time_ms.to_be_bytes());
    message
}

/// Assemble the client-verify blob: `cert_len(2 BE) || certificate || signature(64)`.
pub fn build_client_verify_blob(certificate: &[u8], signature: &[u8; 64]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(2 + certificate.len() + SIGNATURE_LEN);
    blob.extend_from_slice(&(certificate.len() as u16).to_be_bytes());
    blob.extend_from_slice(certificate);
    blob.extend_from_slice(signature);
    blob
}

// ---------------------------------------------------------------------------
// AwaitingServerHello
// ---------------------------------------------------------------------------

/// Hello sent; waiting for the lock's hello.
#[must_use]
pub struct AwaitingServerHello {
    credentials: AccessCredentials,
    eph: EphemeralKeypair,
    mtu: usize,
}

impl AwaitingServerHello {
    /// Start a handshake attempt with fresh ephemeral keys.
    ///
    /// Returns the state and the HELLO frame to write. The driver arms the
    /// hello timer when the frame goes out.
    pub fn initiate(credentials: AccessCredentials, mtu: usize) -> (Self, Vec<u8>) {
        Self::initiate_with_keys(credentials, mtu, EphemeralKeypair::generate())
    }

    /// Deterministic variant for tests.
    pub fn initiate_with_keys(
        credentials: AccessCredentials,
        mtu: usize,
        eph: EphemeralKeypair,
    ) -> (Self, Vec<u8>) {
        let hello = encode_frame(FrameKind::Hello, &eph.public_bytes());
        tracing::debug!(mtu, "handshake initiated");
        (
            Self {
                credentials,
                eph,
                mtu,
            },
            hello,
        )
    }

    /// Process the lock's HELLO body and produce the SERVER_VERIFY frame
    /// carrying the current wall-clock time in milliseconds.
    pub fn on_server_hello(
        self,
        body: &[u8],
        now_ms: u64,
    ) -> Result<(AwaitingServerVerify, Vec<u8>), HandshakeError> {
        if body.len() < PUBLIC_KEY_LEN {
            return Err(HandshakeError::ShortServerHello { actual: body.len() });
        }
        let mut lock_pub = [0u8; PUBLIC_KEY_LEN];
        lock_pub.copy_from_slice(&body[..PUBLIC_KEY_LEN]);

        let client_pub = self.eph.public_bytes();
        let shared = self.eph.agree(&lock_pub);
        let session_key = Zeroizing::new(derive_session_key(&shared, &client_pub, &lock_pub));

        tracing::debug!("server hello accepted, session key derived");

        let verify = encode_frame(FrameKind::ServerVerify, &now_ms.to_be_bytes());
        Ok((
            AwaitingServerVerify {
                credentials: self.credentials,
                session_key,
                client_pub,
                lock_pub,
                time_ms: now_ms,
                mtu: self.mtu,
            },
            verify,
        ))
    }
}

// ---------------------------------------------------------------------------
// AwaitingServerVerify
// ---------------------------------------------------------------------------

/// Keys derived; waiting for the lock's signed verification record.
#[derive(Debug)]
#[must_use]
pub struct AwaitingServerVerify {
    credentials: AccessCredentials,
    session_key: Zeroizing<[u8; 64]>,
    client_pub: [u8; 32],
    lock_pub: [u8; 32],
    time_ms: u64,
    mtu: usize,
}

impl AwaitingServerVerify {
    /// Verify the lock's record against the device public key, then produce
    /// the client-verify chunk frames (all but the last `CLIENT_VERIFY`, the
    /// last `CLIENT_VERIFY_END`), signed through the keystore.
    pub fn on_server_verify(
        self,
        body: &[u8],
        keystore: &dyn MobileKeystore,
    ) -> Result<(AwaitingSessionInit, Vec<Vec<u8>>), HandshakeError> {
        if body.len() < SIGNATURE_LEN {
            return Err(HandshakeError::ShortServerVerify { actual: body.len() });
        }
        let signature: [u8; 64] = body[..SIGNATURE_LEN]
            .try_into()
            .expect("length checked above");

        let message = server_verify_message(&self.client_pub, &self.lock_pub, self.time_ms);
        self.credentials
            .device_key()
            .verify(&message, &signature)
            .map_err(|_| HandshakeError::CertificateRejected)?;

        tracing::info!("lock verification record accepted");

        let to_sign = client_verify_message(&self.client_pub, &self.lock_pub, self.time_ms);
        let mobile_signature = keystore.sign(&to_sign)?;
        let blob = build_client_verify_blob(self.credentials.certificate(), &mobile_signature);
        let chunks = chunk_client_verify(&blob, self.mtu);

        tracing::debug!(
            blob_len = blob.len(),
            chunks = chunks.len(),
            "client verify prepared"
        );

        Ok((
            AwaitingSessionInit {
                session_key: self.session_key,
            },
            chunks,
        ))
    }
}

// ---------------------------------------------------------------------------
// AwaitingSessionInit
// ---------------------------------------------------------------------------

/// Client verify sent; waiting for SESSION_INITIALIZED.
#[derive(Debug)]
#[must_use]
pub struct AwaitingSessionInit {
    session_key: Zeroizing<[u8; 64]>,
}

impl AwaitingSessionInit {
    /// Complete the handshake. The body carries opaque post-handshake
    /// parameters retained on the channel.
    pub fn on_session_initialized(self, body: &[u8]) -> SecureChannel {
        tracing::info!(params_len = body.len(), "session initialized");
        SecureChannel::new(&self.session_key, body.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use boltlink_crypto::{DeviceCertificate, SessionCipher, SoftwareKeystore};
    use ed25519_dalek::{Signer, SigningKey};

    struct TestLock {
        signing: SigningKey,
        credentials: AccessCredentials,
    }

    fn test_lock() -> TestLock {
        let signing = SigningKey::from_bytes(&[0x42; 32]);
        let cert = DeviceCertificate {
            certificate: BASE64.encode(b"issued-certificate"),
            device_public_key: BASE64.encode(signing.verifying_key().to_bytes()),
        };
        TestLock {
            signing,
            credentials: AccessCredentials::decode(&cert).unwrap(),
        }
    }

    /// Drive the full client handshake against an inline lock.
    fn run_handshake(mtu: usize) -> (SecureChannel, SessionCipher, Vec<Vec<u8>>) {
        let lock = test_lock();
        let keystore = SoftwareKeystore::from_seed([9; 32]);

        let client_eph = EphemeralKeypair::from_seed([1; 32]);
        let lock_eph = EphemeralKeypair::from_seed([2; 32]);

        let (state, hello) = AwaitingServerHello::initiate_with_keys(
            lock.credentials.clone(),
            mtu,
            client_eph,
        );
        assert_eq!(hello[0], FrameKind::Hello as u8);
        let client_pub: [u8; 32] = hello[1..33].try_into().unwrap();

        // Lock side: derive the same session key.
        let shared = lock_eph.agree(&client_pub);
        let lock_pub = lock_eph.public_bytes();
        let lock_key = derive_session_key(&shared, &client_pub, &lock_pub);

        let (state, verify) = state.on_server_hello(&lock_pub, 1_700_000_000_000).unwrap();
        assert_eq!(verify[0], FrameKind::ServerVerify as u8);
        let time_ms = u64::from_be_bytes(verify[1..9].try_into().unwrap());
        assert_eq!(time_ms, 1_700_000_000_000);

        // Lock side: sign the verification record.
        let record = server_verify_message(&client_pub, &lock_pub, time_ms);
        let signature = lock.signing.sign(&record).to_bytes();

        let (state, chunks) = state.on_server_verify(&signature, &keystore).unwrap();
        let channel = state.on_session_initialized(&[0x01]);

        (channel, SessionCipher::new(&lock_key), chunks)
    }

    #[test]
    fn full_handshake_agrees_on_keys() {
        let (channel, lock_cipher, _) = run_handshake(128);

        // A command encrypted by the client decrypts on the lock side.
        let frame = channel.encrypt_command(0x51, &[0x00]);
        assert_eq!(frame[0], FrameKind::DataEncrypted as u8);
        assert_eq!(lock_cipher.decrypt(&frame[1..]).unwrap(), vec![0x51, 0x00]);

        // And the other direction.
        let token = lock_cipher.encrypt(&[0x51, 0x00]);
        assert_eq!(channel.decrypt_body(&token).unwrap(), vec![0x51, 0x00]);

        assert_eq!(channel.params(), &[0x01]);
    }

    #[test]
    fn client_verify_blob_reassembles_with_certificate() {
        let (_, _, chunks) = run_handshake(32);
        assert!(chunks.len() > 1, "small MTU must force chunking");

        let blob: Vec<u8> = chunks.iter().flat_map(|f| f[1..].to_vec()).collect();
        let cert_len = u16::from_be_bytes([blob[0], blob[1]]) as usize;
        assert_eq!(&blob[2..2 + cert_len], b"issued-certificate");
        assert_eq!(blob.len(), 2 + cert_len + 64);
    }

    #[test]
    fn short_server_hello_rejected() {
        let lock = test_lock();
        let (state, _) = AwaitingServerHello::initiate(lock.credentials, 128);
        assert_eq!(
            state.on_server_hello(&[0u8; 31], 0).unwrap_err(),
            HandshakeError::ShortServerHello { actual: 31 }
        );
    }

    #[test]
    fn bad_server_signature_rejected() {
        let lock = test_lock();
        let keystore = SoftwareKeystore::new();
        let lock_eph = EphemeralKeypair::from_seed([2; 32]);

        let (state, _) = AwaitingServerHello::initiate(lock.credentials, 128);
        let (state, _) = state
            .on_server_hello(&lock_eph.public_bytes(), 1_000)
            .unwrap();

        // A signature over the wrong transcript must not pass.
        let bogus = lock.signing.sign(b"wrong transcript").to_bytes();
        assert_eq!(
            state.on_server_verify(&bogus, &keystore).unwrap_err(),
            HandshakeError::CertificateRejected
        );
    }

    #[test]
    fn short_server_verify_rejected() {
        let lock = test_lock();
        let keystore = SoftwareKeystore::new();
        let lock_eph = EphemeralKeypair::from_seed([2; 32]);

        let (state, _) = AwaitingServerHello::initiate(lock.credentials, 128);
        let (state, _) = state.on_server_hello(&lock_eph.public_bytes(), 1_000).unwrap();
        assert_eq!(
            state.on_server_verify(&[0u8; 63], &keystore).unwrap_err(),
            HandshakeError::ShortServerVerify { actual: 63 }
        );
    }

    #[test]
    fn verify_messages_are_direction_bound() {
        let msg_a = server_verify_message(&[1; 32], &[2; 32], 99);
        let msg_b = client_verify_message(&[1; 32], &[2; 32], 99);
        assert_ne!(msg_a, msg_b);
        assert_eq!(msg_a.len(), 72);
        assert_eq!(msg_b.len(), 72);
    }
}
