//! Transport-layer errors and HTTP/2 error codes.

use braid_core::StatusError;
use thiserror::Error;

/// HTTP/2 error codes (RFC 7540 Section 7) as carried on RST_STREAM and
/// GOAWAY frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    NoError = 0x0,
    ProtocolError = 0x1,
    InternalError = 0x2,
    FlowControlError = 0x3,
    SettingsTimeout = 0x4,
    StreamClosed = 0x5,
    FrameSizeError = 0x6,
    RefusedStream = 0x7,
    Cancel = 0x8,
    CompressionError = 0x9,
    ConnectError = 0xa,
    EnhanceYourCalm = 0xb,
    InadequateSecurity = 0xc,
    Http11Required = 0xd,
}

impl ErrorCode {
    pub fn from_u32(v: u32) -> Self {
        match v {
            0x0 => Self::NoError,
            0x1 => Self::ProtocolError,
            0x2 => Self::InternalError,
            0x3 => Self::FlowControlError,
            0x4 => Self::SettingsTimeout,
            0x5 => Self::StreamClosed,
            0x6 => Self::FrameSizeError,
            0x7 => Self::RefusedStream,
            0x8 => Self::Cancel,
            0x9 => Self::CompressionError,
            0xa => Self::ConnectError,
            0xb => Self::EnhanceYourCalm,
            0xc => Self::InadequateSecurity,
            0xd => Self::Http11Required,
            _ => Self::InternalError,
        }
    }
}

/// Errors surfaced by the framer collaborator or the multiplexer.
///
/// [`braid_core::Status::from_error`] extracts an embedded status from the
/// `Status` variant; everything else maps to INTERNAL.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The peer violated the protocol at the connection level.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// Connection-level error with an HTTP/2 error code.
    #[error("connection error: {0:?}")]
    Connection(ErrorCode),
    /// Stream-level error with an HTTP/2 error code.
    #[error("stream {0} error: {1:?}")]
    Stream(u32, ErrorCode),
    /// The framer rejected a frame write.
    #[error("frame write rejected: {0}")]
    WriteRejected(String),
    /// A failure that already carries a status.
    #[error("{0}")]
    Status(#[source] StatusError),
}

impl From<braid_core::Status> for TransportError {
    fn from(status: braid_core::Status) -> Self {
        Self::Status(status.into_error())
    }
}
