//! The ready session: an encrypt/decrypt oracle over data frames.

use boltlink_core::frame::{FrameKind, InboundFrame, encode_frame};
use boltlink_crypto::SessionCipher;

use crate::error::SessionError;

/// An established secure session.
///
/// Owns the session cipher (whose keys are zeroed on drop) and the opaque
/// post-handshake parameters from `SESSION_INITIALIZED`.
pub struct SecureChannel {
    cipher: SessionCipher,
    params: Vec<u8>,
}

impl SecureChannel {
    pub fn new(session_key: &[u8; 64], params: Vec<u8>) -> Self {
        Self {
            cipher: SessionCipher::new(session_key),
            params,
        }
    }

    /// Post-handshake parameters the lock sent with `SESSION_INITIALIZED`.
    pub fn params(&self) -> &[u8] {
        &self.params
    }

    /// Wrap a command in a `DATA_ENCRYPTED` frame.
    pub fn encrypt_command(&self, command: u8, payload: &[u8]) -> Vec<u8> {
        let mut message = Vec::with_capacity(1 + payload.len());
        message.push(command);
        message.extend_from_slice(payload);
        encode_frame(FrameKind::DataEncrypted, &self.cipher.encrypt(&message))
    }

    /// Decrypt the body of a `DATA_ENCRYPTED` frame into `cmd || payload`.
    pub fn decrypt_body(&self, token: &[u8]) -> Result<Vec<u8>, SessionError> {
        let message = self.cipher.decrypt(token)?;
        if message.is_empty() {
            return Err(SessionError::EmptyMessage);
        }
        Ok(message)
    }
}

impl std::fmt::Debug for SecureChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureChannel")
            .field("params_len", &self.params.len())
            .finish_non_exhaustive()
    }
}

/// Wrap a command in a `DATA_NOT_ENCRYPTED` frame (pre-session and add-lock
/// mode traffic).
pub fn plaintext_command(command: u8, payload: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(1 + payload.len());
    body.push(command);
    body.extend_from_slice(payload);
    encode_frame(FrameKind::DataNotEncrypted, &body)
}

/// Decode a data frame from either inbound stream into its plaintext message.
///
/// `DATA_ENCRYPTED` bodies go through the channel exactly once; plaintext
/// bodies pass through. Any other frame kind on a data path is a protocol
/// violation.
pub fn decode_data_frame(
    channel: Option<&SecureChannel>,
    frame: &InboundFrame,
) -> Result<Vec<u8>, SessionError> {
    match frame.kind {
        FrameKind::DataEncrypted => {
            let channel = channel.ok_or(SessionError::NotReady)?;
            channel.decrypt_body(&frame.body)
        }
        FrameKind::DataNotEncrypted => {
            if frame.body.is_empty() {
                return Err(SessionError::EmptyMessage);
            }
            Ok(frame.body.clone())
        }
        other => Err(SessionError::UnexpectedKind(other as u8)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> SecureChannel {
        SecureChannel::new(&[0x5A; 64], vec![])
    }

    #[test]
    fn encrypt_command_roundtrip() {
        let channel = channel();
        let frame_bytes = channel.encrypt_command(0x51, &[0x00]);
        let frame = InboundFrame::decode(&frame_bytes).unwrap();
        assert_eq!(frame.kind, FrameKind::DataEncrypted);

        let message = decode_data_frame(Some(&channel), &frame).unwrap();
        assert_eq!(message, vec![0x51, 0x00]);
    }

    #[test]
    fn plaintext_command_passthrough() {
        let frame_bytes = plaintext_command(0x71, &[0x01, 0x02]);
        assert_eq!(frame_bytes[0], FrameKind::DataNotEncrypted as u8);
        let frame = InboundFrame::decode(&frame_bytes).unwrap();
        let message = decode_data_frame(None, &frame).unwrap();
        assert_eq!(message, vec![0x71, 0x01, 0x02]);
    }

    #[test]
    fn encrypted_frame_without_session_fails() {
        let channel = channel();
        let frame_bytes = channel.encrypt_command(0x51, &[]);
        let frame = InboundFrame::decode(&frame_bytes).unwrap();
        assert_eq!(
            decode_data_frame(None, &frame),
            Err(SessionError::NotReady)
        );
    }

    #[test]
    fn tampered_token_fails_auth() {
        let channel = channel();
        let mut frame_bytes = channel.encrypt_command(0x51, &[0x00]);
        let mid = frame_bytes.len() / 2;
        frame_bytes[mid] ^= 0x01;
        let frame = InboundFrame::decode(&frame_bytes).unwrap();
        assert!(matches!(
            decode_data_frame(Some(&channel), &frame),
            Err(SessionError::Crypto(_))
        ));
    }

    #[test]
    fn non_data_kind_rejected() {
        let frame = InboundFrame::decode(&[FrameKind::Alert as u8, 0x02]).unwrap();
        assert_eq!(
            decode_data_frame(None, &frame),
            Err(SessionError::UnexpectedKind(FrameKind::Alert as u8))
        );
    }

    #[test]
    fn empty_plaintext_rejected() {
        let frame = InboundFrame::decode(&[FrameKind::DataNotEncrypted as u8]).unwrap();
        assert_eq!(
            decode_data_frame(None, &frame),
            Err(SessionError::EmptyMessage)
        );
    }
}
