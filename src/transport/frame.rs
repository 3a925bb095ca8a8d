//! Polling frame types and payload decoding.
//!
//! Wire format of a polling payload:
//! ```text
//! text frame:    <payload bytes, never 0x1e> 0x1e
//! binary frame:  'b' <standard base64 of payload> 0x1e
//! ```
//! Frames are concatenated in the order they were opened.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use super::error::FrameError;
use crate::core::constants::{BINARY_FRAME_PREFIX, FRAME_SEPARATOR};

/// Frame payload kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    /// UTF-8 or other separator-free bytes, written verbatim.
    Text,
    /// Arbitrary bytes, transcoded to base64 behind a marker byte.
    Binary,
}

/// A decoded polling frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Payload kind.
    pub frame_type: FrameType,
    /// Raw payload (base64 already removed for binary frames).
    pub payload: Vec<u8>,
}

impl Frame {
    /// Create a text frame.
    pub fn text(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            frame_type: FrameType::Text,
            payload: payload.into(),
        }
    }

    /// Create a binary frame.
    pub fn binary(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            frame_type: FrameType::Binary,
            payload: payload.into(),
        }
    }
}

/// Split a drained polling payload into its frames.
///
/// Any frame opening with the binary marker is decoded as base64. The
/// encoder writes text frames verbatim, so this only inverts it for text
/// payloads that never start with `b`, such as packet-codec output, which
/// opens with a packet-type digit. Other text frames starting with `b` come
/// back as binary or fail to decode.
pub fn decode_payload(payload: &[u8]) -> Result<Vec<Frame>, FrameError> {
    let Some((&last, body)) = payload.split_last() else {
        return Ok(Vec::new());
    };
    if last != FRAME_SEPARATOR {
        return Err(FrameError::InvalidFrame("unterminated frame".into()));
    }

    body.split(|byte| *byte == FRAME_SEPARATOR)
        .map(|chunk| match chunk.split_first() {
            Some((&BINARY_FRAME_PREFIX, encoded)) => STANDARD
                .decode(encoded)
                .map(Frame::binary)
                .map_err(|e| FrameError::InvalidFrame(format!("bad base64: {e}"))),
            _ => Ok(Frame::text(chunk)),
        })
        .collect()
}
