//! Length-prefixed stream framing.
//!
//! Frames are laid out as:
//! - 4 bytes: big-endian payload length
//! - N bytes: payload
//!
//! A zero length is a keepalive and carries no payload.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::config::MAX_FRAME_SIZE;
use crate::error::{ProtocolError, Result};

/// Length field size.
pub const HEADER_SIZE: usize = 4;

/// Wire bytes of a keepalive frame.
pub const KEEPALIVE: [u8; HEADER_SIZE] = [0, 0, 0, 0];

/// One unit read from or written to a peer stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Keepalive,
    Data(Bytes),
}

impl Frame {
    pub fn is_keepalive(&self) -> bool {
        matches!(self, Frame::Keepalive)
    }
}

/// Codec for `[u32 length][payload]` frames.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(MAX_FRAME_SIZE)
    }
}

impl FrameCodec {
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        let mut header = [0u8; HEADER_SIZE];
        header.copy_from_slice(&src[..HEADER_SIZE]);
        let length = u32::from_be_bytes(header) as usize;

        if length > self.max_frame_size {
            return Err(ProtocolError::OversizedFrame(length));
        }

        if src.len() < HEADER_SIZE + length {
            src.reserve(HEADER_SIZE + length - src.len());
            return Ok(None);
        }

        src.advance(HEADER_SIZE);
        if length == 0 {
            return Ok(Some(Frame::Keepalive));
        }
        Ok(Some(Frame::Data(src.split_to(length).freeze())))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<()> {
        match frame {
            Frame::Keepalive => dst.put_slice(&KEEPALIVE),
            Frame::Data(payload) => {
                if payload.is_empty() {
                    return Err(ProtocolError::EmptyPayload);
                }
                if payload.len() > self.max_frame_size || payload.len() > u32::MAX as usize {
                    return Err(ProtocolError::OversizedFrame(payload.len()));
                }
                dst.reserve(HEADER_SIZE + payload.len());
                dst.put_u32(payload.len() as u32);
                dst.put_slice(&payload);
            }
        }
        Ok(())
    }
}
