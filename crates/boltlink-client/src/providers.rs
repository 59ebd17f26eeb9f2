//! External capability providers: signed time.
//!
//! The lock only trusts wall-clock time that arrives with a server signature.
//! The host supplies a [`SignedTimeProvider`]; the engine invokes it during
//! the refresh flow and writes the blob with `SET_SIGNED_TIME`.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::error::LockError;

/// A signed trusted-time blob from the access backend, both fields base64.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTime {
    pub datetime: String,
    pub signature: String,
}

/// Source of signed time. Invoked once per refresh attempt; `None` means the
/// host could not obtain one.
pub trait SignedTimeProvider: Send + Sync + 'static {
    fn signed_time(&self) -> impl Future<Output = Option<SignedTime>> + Send;
}

/// Provider for contexts without signed time (add-lock mode).
pub struct NoSignedTimeProvider;

impl SignedTimeProvider for NoSignedTimeProvider {
    async fn signed_time(&self) -> Option<SignedTime> {
        None
    }
}

/// Build the `SET_SIGNED_TIME` payload:
/// `datetime_len(2 BE) || datetime || signature`, both parts base64-decoded.
pub fn encode_signed_time_payload(signed_time: &SignedTime) -> Result<Vec<u8>, LockError> {
    let datetime = BASE64
        .decode(&signed_time.datetime)
        .map_err(|_| LockError::NotProvidedSignedTime)?;
    let signature = BASE64
        .decode(&signed_time.signature)
        .map_err(|_| LockError::NotProvidedSignedTime)?;
    if datetime.is_empty() || datetime.len() > u16::MAX as usize {
        return Err(LockError::NotProvidedSignedTime);
    }

    let mut payload = Vec::with_capacity(2 + datetime.len() + signature.len());
    payload.extend_from_slice(&(datetime.len() as u16).to_be_bytes());
    payload.extend_from_slice(&datetime);
    payload.extend_from_slice(&signature);
    Ok(payload)
}
