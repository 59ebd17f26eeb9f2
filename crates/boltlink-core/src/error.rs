//! Core error types.

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("empty frame")]
    Empty,

    #[error("unknown frame kind: {0:#04x}")]
    UnknownKind(u8),
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum SerialError {
    #[error("serial must be 8 digits, a dash, and 6 digits; got {0:?}")]
    Malformed(String),
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("response body too short: {actual} bytes (need {expected})")]
    TooShort { expected: usize, actual: usize },
}
