//! Client HTTP/2 stream multiplexer.
//!
//! `ClientMux` serializes every mutation of the connection on one I/O
//! context: write commands enter through [`ClientMux::write`], inbound
//! framer events through [`ClientMux::handle_event`] and the dedicated
//! error/inactive entry points. It owns the pending-stream admission
//! queue and the side table mapping stream ids to their client streams.
//!
//! Stream-scoped failures close one stream; connection-scoped failures
//! close everything with the goaway-status (the first recorded
//! connection error, or UNAVAILABLE).

use std::collections::{HashMap, VecDeque};

use braid_core::{Code, Metadata, Status, wire};
use bytes::Bytes;

use crate::command::{Command, Completion};
use crate::config::TransportOptions;
use crate::conn::{Http2StreamState, Http2View};
use crate::error::{ErrorCode, TransportError};
use crate::framer::{FrameEvent, FrameSink};
use crate::metrics;
use crate::stream::{ClientStream, StreamToken};

/// A stream creation waiting for the connection to have capacity.
struct PendingStream {
    headers: Vec<(Vec<u8>, Vec<u8>)>,
    stream: ClientStream,
    completion: Completion,
}

/// The client-side stream multiplexer for one HTTP/2 connection.
pub struct ClientMux<S: FrameSink> {
    sink: S,
    conn: Http2View,
    pending: VecDeque<PendingStream>,
    /// Side table: stream id to the owning client stream.
    streams: HashMap<u32, ClientStream>,
    ids: HashMap<StreamToken, u32>,
    /// First fatal connection-level cause seen.
    connection_error: Option<TransportError>,
}

impl<S: FrameSink> ClientMux<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            conn: Http2View::new(),
            pending: VecDeque::new(),
            streams: HashMap::new(),
            ids: HashMap::new(),
            connection_error: None,
        }
    }

    /// The framer collaborator, e.g. for inspecting buffered frames.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Apply the peer's SETTINGS_MAX_CONCURRENT_STREAMS. A raised limit
    /// admits waiting streams immediately.
    pub fn set_max_concurrent_streams(&mut self, limit: u32) {
        self.conn.set_max_concurrent_streams(limit);
        self.create_pending_streams();
    }

    pub fn connection_error(&self) -> Option<&TransportError> {
        self.connection_error.as_ref()
    }

    /// The stream id assigned to a client stream, once admitted.
    pub fn stream_id(&self, token: StreamToken) -> Option<u32> {
        self.ids.get(&token).copied()
    }

    pub fn pending_streams(&self) -> usize {
        self.pending.len()
    }

    pub fn active_streams(&self) -> usize {
        self.streams.len()
    }

    /// Single write entry point for stream commands.
    pub fn write(&mut self, command: Command) {
        match command {
            Command::CreateStream {
                headers,
                stream,
                completion,
            } => self.create_stream(headers, stream, completion),
            Command::SendFrame {
                stream_id,
                payload,
                end_stream,
                completion,
            } => self.send_frame(stream_id, payload, end_stream, completion),
            Command::CancelStream { token, completion } => self.cancel_stream(token, completion),
        }
    }

    /// Route an inbound framer event to its stream.
    pub fn handle_event(&mut self, event: FrameEvent) {
        match event {
            FrameEvent::Headers {
                stream_id,
                headers,
                end_stream,
            } => self.on_headers(stream_id, headers, end_stream),
            FrameEvent::Data {
                stream_id,
                data,
                end_of_stream,
            } => self.on_data(stream_id, data, end_of_stream),
            FrameEvent::RstStream {
                stream_id,
                error_code,
            } => self.on_rst_stream(stream_id, error_code),
            FrameEvent::GoAway {
                last_stream_id,
                error_code,
                ..
            } => self.on_goaway(last_stream_id, error_code),
        }
    }

    /// Record a fatal connection-level cause. The first one seen defines
    /// the goaway-status used for teardown.
    pub fn on_connection_error(&mut self, error: TransportError) {
        tracing::debug!(error = %error, "connection error");
        if self.connection_error.is_none() {
            self.connection_error = Some(error);
        }
    }

    /// A stream-level fault: close the stream with the extracted status
    /// and reset it on the wire.
    pub fn on_stream_error(&mut self, stream_id: u32, error: TransportError) {
        let status = Status::from_error(&error);
        let code = match &error {
            TransportError::Stream(_, code) => *code,
            _ => ErrorCode::InternalError,
        };
        self.fail_stream(stream_id, status, code);
    }

    /// We sent (or decided to send) GOAWAY: stop admitting and fail
    /// whatever cannot be placed.
    pub fn local_goaway(&mut self) {
        self.conn.local_goaway();
        self.going_away();
    }

    /// The connection is gone: every pending and active stream terminates
    /// with the goaway-status.
    pub fn channel_inactive(&mut self) {
        self.conn.local_goaway();
        let status = self.goaway_status();
        self.fail_pending_streams(&status);
        for stream_id in self.conn.active_streams() {
            if let Some(stream) = self.streams.get_mut(&stream_id) {
                stream.transport_report_status(status.clone(), Metadata::new());
            }
            self.close_stream(stream_id);
        }
    }

    /// Return processed bytes to receive-side flow control.
    pub fn return_processed_bytes(&mut self, stream_id: u32, bytes: usize) -> Result<(), Status> {
        if self.conn.stream_state(stream_id).is_none() {
            return Err(Status::new(Code::Internal)
                .with_description(format!("unknown stream {stream_id}")));
        }
        self.sink
            .return_processed_bytes(stream_id, bytes)
            .map_err(|e| Status::from_error(&e))
    }

    // -- Command handlers --

    fn create_stream(
        &mut self,
        headers: Vec<(Vec<u8>, Vec<u8>)>,
        stream: ClientStream,
        completion: Completion,
    ) {
        self.pending.push_back(PendingStream {
            headers,
            stream,
            completion,
        });
        self.create_pending_streams();
    }

    fn send_frame(
        &mut self,
        stream_id: u32,
        payload: Bytes,
        end_stream: bool,
        completion: Completion,
    ) {
        if self.conn.stream_state(stream_id).is_none() {
            completion.complete(Err(Status::new(Code::Internal)
                .with_description(format!("unknown stream {stream_id}"))));
            return;
        }
        // Flushing is the outbound flow controller's responsibility.
        match self.sink.write_data(stream_id, payload, end_stream) {
            Ok(()) => {
                if end_stream
                    && self.conn.send_end_stream(stream_id) == Some(Http2StreamState::Closed)
                {
                    self.close_stream(stream_id);
                }
                completion.complete(Ok(()));
            }
            Err(e) => completion.complete(Err(Status::from_error(&e))),
        }
    }

    fn cancel_stream(&mut self, token: StreamToken, completion: Completion) {
        // Not admitted yet: drop it straight out of the queue.
        let position = self.pending.iter().position(|p| p.stream.token() == token);
        if let Some(position) = position
            && let Some(mut pending) = self.pending.remove(position)
        {
            let cancelled = Status::new(Code::Cancelled);
            pending
                .stream
                .transport_report_status(cancelled.clone(), Metadata::new());
            pending.completion.complete(Err(cancelled));
            completion.complete(Ok(()));
            return;
        }

        let Some(&stream_id) = self.ids.get(&token) else {
            // Already closed; cancelling again is a no-op.
            completion.complete(Ok(()));
            return;
        };
        if let Some(stream) = self.streams.get_mut(&stream_id) {
            stream.transport_report_status(Status::new(Code::Cancelled), Metadata::new());
        }
        if matches!(self.conn.stream_state(stream_id), Some(state) if state != Http2StreamState::Closed)
        {
            match self.sink.write_rst_stream(stream_id, ErrorCode::Cancel) {
                Ok(()) => {
                    self.sink.flush();
                    completion.complete(Ok(()));
                }
                Err(e) => completion.complete(Err(Status::from_error(&e))),
            }
        } else {
            completion.complete(Ok(()));
        }
        self.close_stream(stream_id);
    }

    // -- Inbound event handlers --

    fn on_headers(&mut self, stream_id: u32, headers: Vec<(Vec<u8>, Vec<u8>)>, end_stream: bool) {
        let result = match self.streams.get_mut(&stream_id) {
            Some(stream) => stream.transport_headers_received(headers, end_stream),
            None => {
                tracing::warn!(stream_id, "HEADERS for unknown stream, ignoring");
                return;
            }
        };
        if let Err(status) = result {
            self.fail_stream(stream_id, status, ErrorCode::ProtocolError);
            return;
        }
        if end_stream {
            self.finish_recv(stream_id);
        }
    }

    fn on_data(&mut self, stream_id: u32, data: Bytes, end_of_stream: bool) {
        let result = match self.streams.get_mut(&stream_id) {
            Some(stream) => stream.transport_data_received(data, end_of_stream),
            None => {
                tracing::warn!(stream_id, "DATA for unknown stream, ignoring");
                return;
            }
        };
        if let Err(status) = result {
            self.fail_stream(stream_id, status, ErrorCode::ProtocolError);
            return;
        }
        if end_of_stream {
            self.finish_recv(stream_id);
        }
    }

    fn on_rst_stream(&mut self, stream_id: u32, _error_code: ErrorCode) {
        // Peer resets surface as UNKNOWN with empty trailers; the error
        // code is not mapped.
        let Some(stream) = self.streams.get_mut(&stream_id) else {
            return;
        };
        stream.transport_report_status(Status::new(Code::Unknown), Metadata::new());
        self.close_stream(stream_id);
    }

    fn on_goaway(&mut self, last_stream_id: u32, error_code: ErrorCode) {
        metrics::GOAWAY_RECEIVED.increment();
        tracing::debug!(last_stream_id, ?error_code, "GOAWAY received");
        self.conn.remote_goaway(last_stream_id);
        self.going_away();
    }

    // -- Admission --

    /// Drain the pending queue while the connection can take new streams.
    ///
    /// Runs on every create command and whenever a stream goes inactive.
    /// Stops (leaving the queue intact) at the peer's concurrency limit;
    /// fails everything once the connection is going away or the stream
    /// id space is exhausted.
    fn create_pending_streams(&mut self) {
        while !self.pending.is_empty() {
            let Some(stream_id) = self.conn.next_stream_id() else {
                // Id space exhausted: nothing will ever be admitted again.
                let status = self.goaway_status();
                self.fail_pending_streams(&status);
                return;
            };
            if self.conn.is_going_away() {
                let status = self.goaway_status();
                self.fail_pending_streams(&status);
                return;
            }
            if !self.conn.accepting_new_streams() {
                // At the peer's MAX_CONCURRENT_STREAMS limit; resume when
                // an active stream closes.
                return;
            }
            let Some(mut pending) = self.pending.pop_front() else {
                return;
            };
            self.conn.create_stream(stream_id);
            match self.sink.write_headers(stream_id, &pending.headers, false) {
                Ok(()) => {
                    self.conn.mark_open(stream_id);
                    pending.stream.created(stream_id);
                    self.ids.insert(pending.stream.token(), stream_id);
                    self.streams.insert(stream_id, pending.stream);
                    pending.completion.complete(Ok(()));
                    metrics::STREAMS_CREATED.increment();
                }
                Err(e) => {
                    self.conn.close_stream(stream_id);
                    let status = Status::from_error(&e);
                    pending
                        .stream
                        .transport_report_status(status.clone(), Metadata::new());
                    pending.completion.complete(Err(status));
                }
            }
            self.sink.flush();
        }
    }

    // -- Teardown --

    /// GOAWAY was sent or received.
    fn going_away(&mut self) {
        let status = self.goaway_status();
        self.fail_pending_streams(&status);
        if self.conn.goaway_received() {
            // Streams above the peer's last processed id will never be
            // handled; everything at or below it may still complete.
            let last_known = self.conn.last_known_stream_id();
            for stream_id in self.conn.active_streams() {
                if stream_id > last_known {
                    if let Some(stream) = self.streams.get_mut(&stream_id) {
                        stream.transport_report_status(status.clone(), Metadata::new());
                    }
                    self.close_stream(stream_id);
                }
            }
        }
    }

    /// The status representing the cause of connection loss.
    fn goaway_status(&self) -> Status {
        match &self.connection_error {
            Some(error) => Status::from_error(error),
            None => Status::new(Code::Unavailable).with_description("connection going away"),
        }
    }

    fn fail_pending_streams(&mut self, status: &Status) {
        while let Some(mut pending) = self.pending.pop_front() {
            pending
                .stream
                .transport_report_status(status.clone(), Metadata::new());
            pending.completion.complete(Err(status.clone()));
        }
    }

    /// Close one stream with `status` and reset it on the wire.
    fn fail_stream(&mut self, stream_id: u32, status: Status, code: ErrorCode) {
        if let Some(stream) = self.streams.get_mut(&stream_id) {
            stream.transport_report_status(status, Metadata::new());
        }
        if matches!(self.conn.stream_state(stream_id), Some(state) if state != Http2StreamState::Closed)
        {
            if self.sink.write_rst_stream(stream_id, code).is_ok() {
                self.sink.flush();
            }
        }
        self.close_stream(stream_id);
    }

    /// Apply a received END_STREAM and tear the stream down once both
    /// directions are done.
    fn finish_recv(&mut self, stream_id: u32) {
        if self.conn.recv_end_stream(stream_id) == Some(Http2StreamState::Closed) {
            self.close_stream(stream_id);
        }
    }

    /// Remove every trace of a stream and re-run admission: a closed
    /// stream frees a concurrency slot.
    fn close_stream(&mut self, stream_id: u32) {
        self.conn.close_stream(stream_id);
        if let Some(stream) = self.streams.remove(&stream_id) {
            self.ids.remove(&stream.token());
        }
        self.create_pending_streams();
    }
}

/// Synthesize the wire headers for a gRPC request: pseudo-headers first,
/// then the fixed gRPC headers, then user metadata.
pub fn grpc_request_headers(
    options: &TransportOptions,
    path: &str,
    metadata: &Metadata,
) -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut headers: Vec<(Vec<u8>, Vec<u8>)> = vec![
        (b":method".to_vec(), b"POST".to_vec()),
        (b":scheme".to_vec(), options.scheme.clone().into_bytes()),
        (b":path".to_vec(), path.as_bytes().to_vec()),
        (
            b":authority".to_vec(),
            options.authority.clone().into_bytes(),
        ),
        (b"te".to_vec(), b"trailers".to_vec()),
        (b"content-type".to_vec(), b"application/grpc".to_vec()),
        (
            b"user-agent".to_vec(),
            options.user_agent.clone().into_bytes(),
        ),
    ];
    headers.extend(wire::to_wire(metadata));
    headers
}
