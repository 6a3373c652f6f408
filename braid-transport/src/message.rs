//! gRPC length-prefixed message framing.
//!
//! Each message rides inside DATA frames as: 1 byte compression flag
//! (bit 0 = compressed), 4 byte big-endian length, then the message
//! bytes. Messages may span DATA frame boundaries and a single frame may
//! carry several messages.

use braid_core::{Code, Status};
use bytes::{Bytes, BytesMut};

/// Length of the compression flag plus length prefix.
pub const PREFIX_LEN: usize = 5;

const COMPRESSED_FLAG: u8 = 0x01;

/// Frame a message for the wire (uncompressed).
pub fn encode(message: &[u8], out: &mut Vec<u8>) {
    out.push(0);
    out.extend_from_slice(&(message.len() as u32).to_be_bytes());
    out.extend_from_slice(message);
}

/// Reassembles length-prefixed messages from DATA frame chunks.
#[derive(Debug, Default)]
pub struct MessageBuffer {
    buf: BytesMut,
}

impl MessageBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the payload of a DATA frame.
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Drain the next complete message, if one is buffered.
    ///
    /// A set compression flag is rejected: no compressor is negotiated
    /// by this transport.
    pub fn try_next(&mut self) -> Result<Option<Bytes>, Status> {
        if self.buf.len() < PREFIX_LEN {
            return Ok(None);
        }
        if self.buf[0] & COMPRESSED_FLAG != 0 {
            return Err(Status::new(Code::Internal)
                .with_description("compressed message but no compressor negotiated"));
        }
        let length = u32::from_be_bytes([self.buf[1], self.buf[2], self.buf[3], self.buf[4]]);
        let total = PREFIX_LEN + length as usize;
        if self.buf.len() < total {
            return Ok(None);
        }
        let mut frame = self.buf.split_to(total);
        let message = frame.split_off(PREFIX_LEN);
        Ok(Some(message.freeze()))
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}
