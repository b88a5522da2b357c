//! Length-prefixed frame codec.
//!
//! ```text
//! ┌──────────────────────┬──────────────────────────────┐
//! │ length: u32 (LE)     │ payload: `length` bytes      │
//! └──────────────────────┴──────────────────────────────┘
//! ```
//!
//! Decoding works on a growing `BytesMut` accumulator: each call either
//! consumes exactly one complete frame, reports that more bytes are needed,
//! or fails because the declared length is over the configured maximum.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::FramingError;

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Default upper bound on a single payload (matches the orchestrator's
/// default maximum request size).
pub const DEFAULT_MAX_FRAME_LEN: usize = 6_553_500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCodec {
    max_frame_len: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LEN)
    }
}

impl FrameCodec {
    pub fn new(max_frame_len: usize) -> Self {
        Self { max_frame_len }
    }

    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }

    /// Take the next complete frame off the front of `src`.
    ///
    /// Returns `Ok(None)` when `src` holds only part of a frame; nothing is
    /// consumed in that case. The length check fires as soon as the prefix
    /// is readable, before any payload bytes arrive.
    pub fn decode(&self, src: &mut BytesMut) -> Result<Option<Bytes>, FramingError> {
        if src.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }

        let declared = u32::from_le_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if declared > self.max_frame_len {
            return Err(FramingError::FrameTooLarge {
                declared,
                max: self.max_frame_len,
            });
        }

        let total = LENGTH_PREFIX_SIZE + declared;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX_SIZE);
        Ok(Some(src.split_to(declared).freeze()))
    }

    /// Append the framed form of `payload` to `dst`.
    pub fn encode(&self, payload: &[u8], dst: &mut BytesMut) -> Result<(), FramingError> {
        if payload.len() > self.max_frame_len {
            return Err(FramingError::FrameTooLarge {
                declared: payload.len(),
                max: self.max_frame_len,
            });
        }

        dst.reserve(LENGTH_PREFIX_SIZE + payload.len());
        dst.put_u32_le(payload.len() as u32);
        dst.put_slice(payload);
        Ok(())
    }

    /// Check the accumulator once the peer has closed its side.
    ///
    /// Leftover bytes mean the stream ended inside a frame.
    pub fn finish(&self, src: &BytesMut) -> Result<(), FramingError> {
        if src.is_empty() {
            Ok(())
        } else {
            Err(FramingError::Truncated { buffered: src.len() })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn framed(payload: &[u8]) -> BytesMut {
        let mut buf = BytesMut::new();
        FrameCodec::default().encode(payload, &mut buf).unwrap();
        buf
    }

    #[test]
    fn test_decode_complete_frame() {
        let codec = FrameCodec::default();
        let mut buf = framed(b"hello");
        assert_eq!(buf.len(), LENGTH_PREFIX_SIZE + 5);

        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&frame[..], b"hello");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_partial_frame_needs_more_bytes() {
        let codec = FrameCodec::default();
        let full = framed(b"partial payload");

        // Feed the frame one byte at a time; only the last byte completes it.
        let mut buf = BytesMut::new();
        for (i, byte) in full.iter().enumerate() {
            buf.put_u8(*byte);
            let decoded = codec.decode(&mut buf).unwrap();
            if i + 1 < full.len() {
                assert!(decoded.is_none());
                assert_eq!(buf.len(), i + 1);
            } else {
                assert_eq!(&decoded.unwrap()[..], b"partial payload");
            }
        }
    }

    #[test]
    fn test_multiple_frames_in_one_buffer() {
        let codec = FrameCodec::default();
        let mut buf = framed(b"one");
        buf.extend_from_slice(&framed(b""));
        buf.extend_from_slice(&framed(b"three"));
        buf.extend_from_slice(&framed(b"four")[..3]);

        let mut frames = Vec::new();
        while let Some(frame) = codec.decode(&mut buf).unwrap() {
            frames.push(frame);
        }

        assert_eq!(frames.len(), 3);
        assert_eq!(&frames[0][..], b"one");
        assert!(frames[1].is_empty());
        assert_eq!(&frames[2][..], b"three");
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn test_oversized_prefix_rejected_before_payload() {
        let codec = FrameCodec::new(1024);
        let mut buf = BytesMut::new();
        buf.put_u32_le(0xFFFF_FFFF);

        let err = codec.decode(&mut buf).unwrap_err();
        assert_eq!(
            err,
            FramingError::FrameTooLarge {
                declared: 0xFFFF_FFFF,
                max: 1024
            }
        );
    }

    #[test]
    fn test_frame_at_limit_accepted() {
        let codec = FrameCodec::new(8);
        let mut buf = BytesMut::new();
        codec.encode(&[7u8; 8], &mut buf).unwrap();
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().len(), 8);

        assert!(codec.encode(&[7u8; 9], &mut buf).is_err());
    }

    #[test]
    fn test_finish_reports_truncation() {
        let codec = FrameCodec::default();
        assert!(codec.finish(&BytesMut::new()).is_ok());

        let mut buf = framed(b"cut short");
        buf.truncate(6);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(
            codec.finish(&buf).unwrap_err(),
            FramingError::Truncated { buffered: 6 }
        );
    }
}
