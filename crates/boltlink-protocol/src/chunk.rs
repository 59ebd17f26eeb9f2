//! Client-verify chunking.
//!
//! The client-verify blob (certificate plus mobile signature) usually exceeds
//! one ATT payload, so it is split into back-to-back frames: every chunk but
//! the last carries the `CLIENT_VERIFY` kind, the final chunk
//! `CLIENT_VERIFY_END`. The lock reassembles on the END marker; there is no
//! per-chunk acknowledgment.

use boltlink_core::frame::{FrameKind, encode_frame};

use crate::constants::ATT_HEADER_LEN;

/// Usable chunk payload for a link MTU: the ATT header and the frame header
/// byte are both unavailable. Clamped to at least 1 so a pathological MTU
/// still makes progress.
pub fn chunk_capacity(mtu: usize) -> usize {
    mtu.saturating_sub(ATT_HEADER_LEN + 1).max(1)
}

/// Split the client-verify blob into ready-to-write frames.
pub fn chunk_client_verify(blob: &[u8], mtu: usize) -> Vec<Vec<u8>> {
    let capacity = chunk_capacity(mtu);
    let mut chunks: Vec<&[u8]> = blob.chunks(capacity).collect();
    if chunks.is_empty() {
        chunks.push(&[]);
    }

    let last = chunks.len() - 1;
    chunks
        .iter()
        .enumerate()
        .map(|(i, part)| {
            let kind = if i == last {
                FrameKind::ClientVerifyEnd
            } else {
                FrameKind::ClientVerify
            };
            encode_frame(kind, part)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_chunk_when_blob_fits() {
        let frames = chunk_client_verify(&[0xAA; 10], 100);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0][0], FrameKind::ClientVerifyEnd as u8);
        assert_eq!(&frames[0][1..], &[0xAA; 10]);
    }

    #[test]
    fn multi_chunk_kinds_and_reassembly() {
        let blob: Vec<u8> = (0..200u16).map(|i| i as u8).collect();
        let mtu = 64; // capacity 60
        let frames = chunk_client_verify(&blob, mtu);
        assert_eq!(frames.len(), 4);

        for frame in &frames[..frames.len() - 1] {
            assert_eq!(frame[0], FrameKind::ClientVerify as u8);
            assert_eq!(frame.len() - 1, chunk_capacity(mtu));
        }
        assert_eq!(
            frames.last().unwrap()[0],
            FrameKind::ClientVerifyEnd as u8
        );

        let reassembled: Vec<u8> = frames.iter().flat_map(|f| f[1..].to_vec()).collect();
        assert_eq!(reassembled, blob);
    }

    #[test]
    fn exact_multiple_still_ends_with_end_kind() {
        let mtu = 20; // capacity 16
        let frames = chunk_client_verify(&[0x55; 32], mtu);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0][0], FrameKind::ClientVerify as u8);
        assert_eq!(frames[1][0], FrameKind::ClientVerifyEnd as u8);
        assert_eq!(frames[1].len() - 1, 16);
    }

    #[test]
    fn tiny_mtu_clamps_to_one_byte_chunks() {
        assert_eq!(chunk_capacity(0), 1);
        let frames = chunk_client_verify(&[1, 2, 3], 0);
        assert_eq!(frames.len(), 3);
        assert_eq!(&frames[2][..], &[FrameKind::ClientVerifyEnd as u8, 3]);
    }

    #[test]
    fn empty_blob_sends_bare_end_frame() {
        let frames = chunk_client_verify(&[], 64);
        assert_eq!(frames, vec![vec![FrameKind::ClientVerifyEnd as u8]]);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn chunks_always_reassemble(
            blob in proptest::collection::vec(any::<u8>(), 0..512),
            mtu in 0usize..256,
        ) {
            let frames = chunk_client_verify(&blob, mtu);
            // Exactly one END frame, and it comes last.
            let end_count = frames
                .iter()
                .filter(|f| f[0] == FrameKind::ClientVerifyEnd as u8)
                .count();
            prop_assert_eq!(end_count, 1);
            prop_assert_eq!(frames.last().unwrap()[0], FrameKind::ClientVerifyEnd as u8);

            let reassembled: Vec<u8> = frames.iter().flat_map(|f| f[1..].to_vec()).collect();
            prop_assert_eq!(reassembled, blob);
        }
    }
}
