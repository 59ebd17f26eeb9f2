//! Frame header handling.
//!
//! Every transport frame starts with a single header byte. The low nibble is
//! the frame kind; the high nibble is a message counter the lock echoes back.
//! The counter is informational only: inbound it is recorded for logs and the
//! header is rewritten to the bare kind before anything above the framer sees
//! the frame. Outbound frames are written with a zero counter nibble.

use crate::error::FrameError;

/// Protocol message class, carried in the low nibble of the frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameKind {
    Hello = 0x01,
    ServerVerify = 0x02,
    ClientVerify = 0x03,
    ClientVerifyEnd = 0x04,
    Alert = 0x05,
    SessionInitialized = 0x06,
    DataEncrypted = 0x07,
    DataNotEncrypted = 0x08,
}

impl FrameKind {
    /// Decode a frame kind from a (nibble-masked) header byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Hello),
            0x02 => Some(Self::ServerVerify),
            0x03 => Some(Self::ClientVerify),
            0x04 => Some(Self::ClientVerifyEnd),
            0x05 => Some(Self::Alert),
            0x06 => Some(Self::SessionInitialized),
            0x07 => Some(Self::DataEncrypted),
            0x08 => Some(Self::DataNotEncrypted),
            _ => None,
        }
    }
}

/// A decoded inbound frame: counter stripped, kind resolved, body borrowed out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFrame {
    /// Peer message counter from the high nibble. Logging only.
    pub counter: u8,
    pub kind: FrameKind,
    pub body: Vec<u8>,
}

impl InboundFrame {
    /// Decode a raw frame as received from a characteristic.
    ///
    /// Splits the header byte into `(counter, kind)` and hands back the body.
    /// Frames with an unknown kind nibble are rejected so that a corrupted
    /// header cannot be misrouted upstream.
    pub fn decode(raw: &[u8]) -> Result<Self, FrameError> {
        let header = *raw.first().ok_or(FrameError::Empty)?;
        let kind =
            FrameKind::from_u8(header & 0x0F).ok_or(FrameError::UnknownKind(header & 0x0F))?;
        Ok(Self {
            counter: header >> 4,
            kind,
            body: raw[1..].to_vec(),
        })
    }
}

/// Build an outbound frame: kind header (zero counter nibble) followed by the body.
pub fn encode_frame(kind: FrameKind, body: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(1 + body.len());
    frame.push(kind as u8);
    frame.extend_from_slice(body);
    frame
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn decode_never_panics(raw in proptest::collection::vec(any::<u8>(), 0..64)) {
            let _ = InboundFrame::decode(&raw);
        }

        #[test]
        fn counter_and_kind_recombine_to_header(
            counter in 0u8..16,
            body in proptest::collection::vec(any::<u8>(), 0..32),
        ) {
            // Any valid kind with any counter decodes back to the same pair.
            let header = (counter << 4) | FrameKind::Alert as u8;
            let mut raw = vec![header];
            raw.extend_from_slice(&body);
            let frame = InboundFrame::decode(&raw).unwrap();
            prop_assert_eq!(frame.counter, counter);
            prop_assert_eq!(frame.kind, FrameKind::Alert);
            prop_assert_eq!(frame.body, body);
        }
    }
}
