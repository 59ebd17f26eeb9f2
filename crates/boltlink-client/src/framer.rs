//! Inbound frame decoding with counter logging.
//!
//! The lock stamps a 4-bit message counter into the high nibble of every
//! frame header. The counter carries no protocol meaning on the client side;
//! it is recorded at TRACE and stripped so everything above sees a clean
//! `(kind, body)` pair. Undecodable frames are dropped with a warning rather
//! than poisoning the stream.

use boltlink_core::frame::InboundFrame;

/// Decode a raw inbound frame from the named characteristic stream.
pub(crate) fn decode(source: &'static str, raw: &[u8]) -> Option<InboundFrame> {
    match InboundFrame::decode(raw) {
        Ok(frame) => {
            tracing::trace!(
                source,
                counter = frame.counter,
                kind = ?frame.kind,
                len = frame.body.len(),
                "frame received"
            );
            Some(frame)
        }
        Err(e) => {
            tracing::warn!(source, raw = %hex::encode(raw), "dropping undecodable frame: {e}");
            None
        }
    }
}
