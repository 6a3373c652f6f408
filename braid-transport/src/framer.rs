//! The framer collaborator contract.
//!
//! The multiplexer never touches HTTP/2 bytes itself. Outbound frames go
//! through a [`FrameSink`]; inbound wire activity arrives as
//! [`FrameEvent`] values (plus the dedicated connection-error,
//! stream-error, and connection-inactive entry points on the multiplexer).

use bytes::Bytes;

use crate::error::{ErrorCode, TransportError};

/// Outbound half of the framer: frame writes and receive-side flow
/// control. Writes either land in the framer or fail immediately.
pub trait FrameSink {
    /// Write a HEADERS frame carrying the given wire header pairs.
    fn write_headers(
        &mut self,
        stream_id: u32,
        headers: &[(Vec<u8>, Vec<u8>)],
        end_stream: bool,
    ) -> Result<(), TransportError>;

    /// Write a DATA frame. Flushing is the outbound flow controller's
    /// responsibility.
    fn write_data(
        &mut self,
        stream_id: u32,
        data: Bytes,
        end_stream: bool,
    ) -> Result<(), TransportError>;

    /// Write a RST_STREAM frame. RST_STREAM writes are flushed by the
    /// caller.
    fn write_rst_stream(
        &mut self,
        stream_id: u32,
        error_code: ErrorCode,
    ) -> Result<(), TransportError>;

    /// Flush buffered frames to the wire.
    fn flush(&mut self);

    /// Return `bytes` of processed DATA to receive-side flow control.
    fn return_processed_bytes(
        &mut self,
        stream_id: u32,
        bytes: usize,
    ) -> Result<(), TransportError>;
}

/// Inbound wire events decoded by the framer.
#[derive(Debug)]
pub enum FrameEvent {
    /// HEADERS (initial response metadata or trailers).
    Headers {
        stream_id: u32,
        headers: Vec<(Vec<u8>, Vec<u8>)>,
        end_stream: bool,
    },
    /// DATA carrying length-prefixed gRPC messages.
    Data {
        stream_id: u32,
        data: Bytes,
        end_of_stream: bool,
    },
    /// The peer reset a stream.
    RstStream {
        stream_id: u32,
        error_code: ErrorCode,
    },
    /// GOAWAY was sent or received; no stream above `last_stream_id`
    /// will be processed by the peer.
    GoAway {
        last_stream_id: u32,
        error_code: ErrorCode,
        debug_data: Bytes,
    },
}
