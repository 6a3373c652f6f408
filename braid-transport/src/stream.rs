//! Per-RPC client stream lifecycle.
//!
//! A [`ClientStream`] tracks one RPC from PENDING (queued for admission)
//! through HEADERS_SENT and OPEN to CLOSED, delivering inbound events to
//! its [`StreamListener`]. CLOSED is terminal: at most one final status is
//! ever reported, and later inbound frames are ignored.

use std::sync::atomic::{AtomicU64, Ordering};

use braid_core::{Code, GRPC_MESSAGE_KEY, GRPC_STATUS_KEY, Metadata, Status, wire};
use bytes::Bytes;

use crate::message::MessageBuffer;
use crate::metrics;

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Opaque handle identifying a client stream before it has a stream id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamToken(u64);

/// Lifecycle phase of a client stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    /// Queued, no stream id assigned yet.
    Pending,
    /// Admitted; HEADERS frame written.
    HeadersSent,
    /// Response headers received.
    Open,
    /// Peer finished sending; awaiting trailers or connection close.
    HalfClosedRemote,
    /// Final status reported. Terminal.
    Closed,
}

/// Receives the events of one RPC, in order, on the I/O context.
pub trait StreamListener {
    /// Initial response metadata.
    fn on_headers(&mut self, metadata: Metadata);

    /// One complete gRPC message.
    fn on_message(&mut self, message: Bytes);

    /// The single final status with trailing metadata.
    fn on_close(&mut self, status: Status, trailers: Metadata);
}

/// Client-side state of one RPC stream.
pub struct ClientStream {
    token: StreamToken,
    id: Option<u32>,
    phase: StreamPhase,
    listener: Box<dyn StreamListener>,
    buffer: MessageBuffer,
}

impl ClientStream {
    pub fn new(listener: Box<dyn StreamListener>) -> Self {
        Self {
            token: StreamToken(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed)),
            id: None,
            phase: StreamPhase::Pending,
            listener,
            buffer: MessageBuffer::new(),
        }
    }

    pub fn token(&self) -> StreamToken {
        self.token
    }

    pub fn id(&self) -> Option<u32> {
        self.id
    }

    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    /// Admission succeeded: the stream owns `id` and its HEADERS frame is
    /// on the wire.
    pub(crate) fn created(&mut self, id: u32) {
        self.id = Some(id);
        if self.phase == StreamPhase::Pending {
            self.phase = StreamPhase::HeadersSent;
        }
    }

    /// Inbound HEADERS: initial response metadata, trailers, or a
    /// trailers-only response when `end_stream` is set.
    pub(crate) fn transport_headers_received(
        &mut self,
        headers: Vec<(Vec<u8>, Vec<u8>)>,
        end_stream: bool,
    ) -> Result<(), Status> {
        if self.phase == StreamPhase::Closed {
            return Ok(());
        }
        let metadata = wire::from_wire(headers)?;
        if end_stream {
            let (status, trailers) = split_trailers(metadata);
            self.transport_report_status(status, trailers);
        } else if self.phase == StreamPhase::HeadersSent {
            self.phase = StreamPhase::Open;
            self.listener.on_headers(metadata);
        }
        Ok(())
    }

    /// Inbound DATA: reassemble and deliver complete messages.
    pub(crate) fn transport_data_received(
        &mut self,
        data: Bytes,
        end_of_stream: bool,
    ) -> Result<(), Status> {
        if self.phase == StreamPhase::Closed {
            return Ok(());
        }
        self.buffer.push(&data);
        while let Some(message) = self.buffer.try_next()? {
            metrics::MESSAGES_RECEIVED.increment();
            self.listener.on_message(message);
        }
        if end_of_stream {
            self.phase = StreamPhase::HalfClosedRemote;
        }
        Ok(())
    }

    /// Report the final status. Returns false if the stream was already
    /// closed (reporting twice is a no-op).
    pub(crate) fn transport_report_status(&mut self, status: Status, trailers: Metadata) -> bool {
        if self.phase == StreamPhase::Closed {
            return false;
        }
        self.phase = StreamPhase::Closed;
        if !status.is_ok() {
            metrics::STREAMS_FAILED.increment();
        }
        self.listener.on_close(status, trailers);
        true
    }
}

/// Split the final status out of trailing metadata.
///
/// A missing `grpc-status` reads as OK (the server closed cleanly without
/// an explicit code).
fn split_trailers(mut metadata: Metadata) -> (Status, Metadata) {
    let code = metadata
        .get(GRPC_STATUS_KEY)
        .map(Code::from_ascii)
        .unwrap_or(Code::Ok);
    let message = metadata
        .get(GRPC_MESSAGE_KEY)
        .map(|v| String::from_utf8_lossy(v).into_owned());

    metadata.remove(GRPC_STATUS_KEY);
    metadata.remove(GRPC_MESSAGE_KEY);

    let mut status = Status::new(code);
    if let Some(message) = message
        && !message.is_empty()
    {
        status = status.with_description(message);
    }
    (status, metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::message;

    #[derive(Debug, PartialEq)]
    enum Event {
        Headers(Metadata),
        Message(Bytes),
        Close(Status, Metadata),
    }

    #[derive(Clone, Default)]
    struct Recorder(Rc<RefCell<Vec<Event>>>);

    impl StreamListener for Recorder {
        fn on_headers(&mut self, metadata: Metadata) {
            self.0.borrow_mut().push(Event::Headers(metadata));
        }
        fn on_message(&mut self, message: Bytes) {
            self.0.borrow_mut().push(Event::Message(message));
        }
        fn on_close(&mut self, status: Status, trailers: Metadata) {
            self.0.borrow_mut().push(Event::Close(status, trailers));
        }
    }

    fn stream() -> (ClientStream, Rc<RefCell<Vec<Event>>>) {
        let recorder = Recorder::default();
        let events = Rc::clone(&recorder.0);
        (ClientStream::new(Box::new(recorder)), events)
    }

    fn response_headers() -> Vec<(Vec<u8>, Vec<u8>)> {
        vec![(b":status".to_vec(), b"200".to_vec())]
    }

    #[test]
    fn headers_then_message_then_trailers() {
        let (mut stream, events) = stream();
        stream.created(1);
        assert_eq!(stream.phase(), StreamPhase::HeadersSent);

        stream
            .transport_headers_received(response_headers(), false)
            .unwrap();
        assert_eq!(stream.phase(), StreamPhase::Open);

        let mut wire = Vec::new();
        message::encode(b"payload", &mut wire);
        stream
            .transport_data_received(Bytes::from(wire), false)
            .unwrap();

        stream
            .transport_headers_received(vec![(b"grpc-status".to_vec(), b"0".to_vec())], true)
            .unwrap();
        assert_eq!(stream.phase(), StreamPhase::Closed);

        let events = events.borrow();
        assert!(matches!(events[0], Event::Headers(_)));
        assert_eq!(events[1], Event::Message(Bytes::from_static(b"payload")));
        match &events[2] {
            Event::Close(status, trailers) => {
                assert!(status.is_ok());
                assert!(trailers.is_empty());
            }
            other => panic!("expected Close, got {other:?}"),
        }
    }

    #[test]
    fn trailers_carry_status_and_message() {
        let (mut stream, events) = stream();
        stream.created(1);
        stream
            .transport_headers_received(
                vec![
                    (b"grpc-status".to_vec(), b"5".to_vec()),
                    (b"grpc-message".to_vec(), b"no such method".to_vec()),
                    (b"retry-info-bin".to_vec(), b"AAE=".to_vec()),
                ],
                true,
            )
            .unwrap();

        match &events.borrow()[0] {
            Event::Close(status, trailers) => {
                assert_eq!(status.code(), Code::NotFound);
                assert_eq!(status.description(), Some("no such method"));
                // Status keys are consumed; the rest is surfaced.
                assert!(!trailers.contains_key("grpc-status"));
                assert!(!trailers.contains_key("grpc-message"));
                assert_eq!(trailers.get("retry-info-bin"), Some([0x00, 0x01].as_slice()));
            }
            other => panic!("expected Close, got {other:?}"),
        }
    }

    #[test]
    fn message_split_across_data_frames() {
        let (mut stream, events) = stream();
        stream.created(1);
        stream
            .transport_headers_received(response_headers(), false)
            .unwrap();

        let mut wire = Vec::new();
        message::encode(b"split message", &mut wire);
        let (a, b) = wire.split_at(4);
        stream
            .transport_data_received(Bytes::copy_from_slice(a), false)
            .unwrap();
        assert_eq!(events.borrow().len(), 1); // headers only
        stream
            .transport_data_received(Bytes::copy_from_slice(b), false)
            .unwrap();
        assert_eq!(
            events.borrow()[1],
            Event::Message(Bytes::from_static(b"split message"))
        );
    }

    #[test]
    fn data_end_of_stream_awaits_trailers() {
        let (mut stream, _events) = stream();
        stream.created(1);
        stream
            .transport_headers_received(response_headers(), false)
            .unwrap();
        stream
            .transport_data_received(Bytes::new(), true)
            .unwrap();
        assert_eq!(stream.phase(), StreamPhase::HalfClosedRemote);
    }

    #[test]
    fn at_most_one_final_status() {
        let (mut stream, events) = stream();
        stream.created(1);
        assert!(stream.transport_report_status(Status::new(Code::Cancelled), Metadata::new()));
        assert!(!stream.transport_report_status(Status::new(Code::Internal), Metadata::new()));
        assert_eq!(events.borrow().len(), 1);
    }

    #[test]
    fn closed_stream_ignores_inbound_frames() {
        let (mut stream, events) = stream();
        stream.created(1);
        stream.transport_report_status(Status::new(Code::Cancelled), Metadata::new());

        stream
            .transport_headers_received(response_headers(), false)
            .unwrap();
        stream
            .transport_data_received(Bytes::from_static(&[0, 0, 0, 0, 0]), false)
            .unwrap();
        assert_eq!(events.borrow().len(), 1);
    }

    #[test]
    fn invalid_binary_trailer_is_internal() {
        let (mut stream, _events) = stream();
        stream.created(1);
        let err = stream
            .transport_headers_received(vec![(b"bad-bin".to_vec(), b"!!".to_vec())], false)
            .unwrap_err();
        assert_eq!(err.code(), Code::Internal);
    }

    #[test]
    fn unknown_wire_status_reads_as_unknown() {
        let (mut stream, events) = stream();
        stream.created(1);
        stream
            .transport_headers_received(vec![(b"grpc-status".to_vec(), b"42".to_vec())], true)
            .unwrap();
        match &events.borrow()[0] {
            Event::Close(status, _) => assert_eq!(status.code(), Code::Unknown),
            other => panic!("expected Close, got {other:?}"),
        }
    }

    #[test]
    fn tokens_are_unique() {
        let (a, _) = stream();
        let (b, _) = stream();
        assert_ne!(a.token(), b.token());
    }
}
