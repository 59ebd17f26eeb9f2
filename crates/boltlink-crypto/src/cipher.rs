//! Authenticated session cipher.
//!
//! Once the handshake completes, all command traffic is wrapped in a token:
//!
//! ```text
//! [IV: 16] || [AES-256-CBC ciphertext] || [HMAC-SHA256: 32]
//! ```
//!
//! The 64-byte session key splits into `signing_key = key[0..32]` (HMAC) and
//! `encryption_key = key[32..64]` (AES). The HMAC covers `IV || ciphertext`
//! and is checked before any decryption is attempted. Key material is zeroed
//! when the cipher is dropped.

use aes::Aes256;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;
use crate::hash::{hmac_sha256, hmac_sha256_verify};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

const IV_LEN: usize = 16;
const TAG_LEN: usize = 32;
/// IV plus tag: the smallest token that can even be split.
const MIN_TOKEN_LEN: usize = IV_LEN + TAG_LEN;

/// Authenticated encryption oracle for a ready session.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SessionCipher {
    signing_key: [u8; 32],
    encryption_key: [u8; 32],
}

impl SessionCipher {
    /// Split a 64-byte session key into signing and encryption halves.
    pub fn new(session_key: &[u8; 64]) -> Self {
        let mut signing_key = [0u8; 32];
        let mut encryption_key = [0u8; 32];
        signing_key.copy_from_slice(&session_key[..32]);
        encryption_key.copy_from_slice(&session_key[32..]);
        Self {
            signing_key,
            encryption_key,
        }
    }

    /// Encrypt `plaintext` into a token with a random IV.
    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        let mut iv = [0u8; IV_LEN];
        rand::rngs::OsRng.fill_bytes(&mut iv);
        self.encrypt_with_iv(plaintext, &iv)
    }

    /// Encrypt with a caller-supplied IV. Deterministic tokens for tests.
    pub fn encrypt_with_iv(&self, plaintext: &[u8], iv: &[u8; IV_LEN]) -> Vec<u8> {
        let ciphertext = Aes256CbcEnc::new(&self.encryption_key.into(), iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        let mut token = Vec::with_capacity(IV_LEN + ciphertext.len() + TAG_LEN);
        token.extend_from_slice(iv);
        token.extend_from_slice(&ciphertext);
        let tag = hmac_sha256(&self.signing_key, &token);
        token.extend_from_slice(&tag);
        token
    }

    /// Verify and decrypt a token.
    ///
    /// # Errors
    ///
    /// [`CryptoError::TokenTooShort`] if the token cannot hold an IV and tag,
    /// [`CryptoError::InvalidTag`] on HMAC mismatch, and
    /// [`CryptoError::DecryptionFailed`] on malformed ciphertext or padding.
    pub fn decrypt(&self, token: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if token.len() < MIN_TOKEN_LEN {
            return Err(CryptoError::TokenTooShort {
                min: MIN_TOKEN_LEN,
                actual: token.len(),
            });
        }

        let (signed, tag) = token.split_at(token.len() - TAG_LEN);
        hmac_sha256_verify(&self.signing_key, signed, tag)?;

        let (iv, ciphertext) = signed.split_at(IV_LEN);
        if ciphertext.is_empty() || ciphertext.len() % 16 != 0 {
            return Err(CryptoError::DecryptionFailed);
        }

        let iv: [u8; IV_LEN] = iv.try_into().expect("split_at yields exactly IV_LEN bytes");
        Aes256CbcDec::new(&self.encryption_key.into(), &iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> SessionCipher {
        let mut key = [0u8; 64];
        for (i, b) in key.iter_mut().enumerate() {
            *b = i as u8;
        }
        SessionCipher::new(&key)
    }

    #[test]
    fn roundtrip_various_sizes() {
        let cipher = cipher();
        for size in [0usize, 1, 15, 16, 17, 64, 255] {
            let data: Vec<u8> = (0..size).map(|i| i as u8).collect();
            let token = cipher.encrypt(&data);
            assert_eq!(cipher.decrypt(&token).unwrap(), data, "size {size}");
        }
    }

    #[test]
    fn deterministic_with_fixed_iv() {
        let cipher = cipher();
        let iv = [0x11; 16];
        let a = cipher.encrypt_with_iv(b"payload", &iv);
        let b = cipher.encrypt_with_iv(b"payload", &iv);
        assert_eq!(a, b);
        assert_eq!(&a[..16], &iv);
    }

    #[test]
    fn corrupted_ciphertext_fails_tag_check() {
        let cipher = cipher();
        let mut token = cipher.encrypt(b"tamper me");
        let mid = token.len() / 2;
        token[mid] ^= 0x80;
        assert_eq!(cipher.decrypt(&token), Err(CryptoError::InvalidTag));
    }

    #[test]
    fn corrupted_tag_fails() {
        let cipher = cipher();
        let mut token = cipher.encrypt(b"tamper me");
        let last = token.len() - 1;
        token[last] ^= 0x01;
        assert_eq!(cipher.decrypt(&token), Err(CryptoError::InvalidTag));
    }

    #[test]
    fn short_token_rejected() {
        let cipher = cipher();
        assert_eq!(
            cipher.decrypt(&[0u8; 47]),
            Err(CryptoError::TokenTooShort { min: 48, actual: 47 })
        );
    }

    #[test]
    fn wrong_key_fails() {
        let a = cipher();
        let b = SessionCipher::new(&[0xAB; 64]);
        let token = a.encrypt(b"secret");
        assert_eq!(b.decrypt(&token), Err(CryptoError::InvalidTag));
    }

    #[test]
    fn valid_tag_but_unaligned_ciphertext_fails() {
        // Hand-build a token whose HMAC is valid but whose ciphertext length
        // is not a block multiple.
        let cipher = cipher();
        let mut signed = vec![0u8; 16 + 5];
        signed[..16].copy_from_slice(&[0x22; 16]);
        let tag = hmac_sha256(&cipher.signing_key, &signed);
        signed.extend_from_slice(&tag);
        assert_eq!(cipher.decrypt(&signed), Err(CryptoError::DecryptionFailed));
    }
}
