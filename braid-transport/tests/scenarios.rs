//! End-to-end multiplexer scenarios against a scripted framer.
//!
//! The sink double records every outbound frame; inbound wire activity is
//! injected as `FrameEvent`s, the way a framer would deliver it.

use std::cell::RefCell;
use std::rc::Rc;

use braid_core::{Code, Metadata, Status};
use braid_transport::{
    ClientMux, ClientStream, Command, Completion, ErrorCode, FrameEvent, FrameSink, StreamListener,
    StreamToken, TransportError, TransportOptions, grpc_request_headers, message,
};
use bytes::Bytes;

// -- Framer double --

#[derive(Debug, PartialEq)]
enum WireFrame {
    Headers {
        stream_id: u32,
        headers: Vec<(Vec<u8>, Vec<u8>)>,
        end_stream: bool,
    },
    Data {
        stream_id: u32,
        data: Bytes,
        end_stream: bool,
    },
    RstStream {
        stream_id: u32,
        error_code: ErrorCode,
    },
}

#[derive(Default)]
struct ScriptedSink {
    frames: Vec<WireFrame>,
    flushes: usize,
}

impl ScriptedSink {
    fn headers_frames(&self) -> Vec<&WireFrame> {
        self.frames
            .iter()
            .filter(|f| matches!(f, WireFrame::Headers { .. }))
            .collect()
    }
}

impl FrameSink for ScriptedSink {
    fn write_headers(
        &mut self,
        stream_id: u32,
        headers: &[(Vec<u8>, Vec<u8>)],
        end_stream: bool,
    ) -> Result<(), TransportError> {
        self.frames.push(WireFrame::Headers {
            stream_id,
            headers: headers.to_vec(),
            end_stream,
        });
        Ok(())
    }

    fn write_data(
        &mut self,
        stream_id: u32,
        data: Bytes,
        end_stream: bool,
    ) -> Result<(), TransportError> {
        self.frames.push(WireFrame::Data {
            stream_id,
            data,
            end_stream,
        });
        Ok(())
    }

    fn write_rst_stream(
        &mut self,
        stream_id: u32,
        error_code: ErrorCode,
    ) -> Result<(), TransportError> {
        self.frames.push(WireFrame::RstStream {
            stream_id,
            error_code,
        });
        Ok(())
    }

    fn flush(&mut self) {
        self.flushes += 1;
    }

    fn return_processed_bytes(
        &mut self,
        _stream_id: u32,
        _bytes: usize,
    ) -> Result<(), TransportError> {
        Ok(())
    }
}

// -- Listener double --

#[derive(Debug, PartialEq)]
enum RpcEvent {
    Headers(Metadata),
    Message(Bytes),
    Close(Status, Metadata),
}

#[derive(Clone, Default)]
struct Recorder(Rc<RefCell<Vec<RpcEvent>>>);

impl StreamListener for Recorder {
    fn on_headers(&mut self, metadata: Metadata) {
        self.0.borrow_mut().push(RpcEvent::Headers(metadata));
    }
    fn on_message(&mut self, message: Bytes) {
        self.0.borrow_mut().push(RpcEvent::Message(message));
    }
    fn on_close(&mut self, status: Status, trailers: Metadata) {
        self.0.borrow_mut().push(RpcEvent::Close(status, trailers));
    }
}

fn start_rpc(
    mux: &mut ClientMux<ScriptedSink>,
    path: &str,
    metadata: &Metadata,
) -> (StreamToken, Completion, Rc<RefCell<Vec<RpcEvent>>>) {
    let options = TransportOptions {
        authority: "svc.example.com".into(),
        ..Default::default()
    };
    let recorder = Recorder::default();
    let events = Rc::clone(&recorder.0);
    let stream = ClientStream::new(Box::new(recorder));
    let token = stream.token();
    let completion = Completion::new();
    mux.write(Command::CreateStream {
        headers: grpc_request_headers(&options, path, metadata),
        stream,
        completion: completion.clone(),
    });
    (token, completion, events)
}

fn final_status(events: &Rc<RefCell<Vec<RpcEvent>>>) -> Option<(Status, Metadata)> {
    events.borrow().iter().rev().find_map(|e| match e {
        RpcEvent::Close(status, trailers) => Some((status.clone(), trailers.clone())),
        _ => None,
    })
}

// -- Scenarios --

#[test]
fn happy_unary() {
    let mut mux = ClientMux::new(ScriptedSink::default());
    let (token, completion, events) = start_rpc(&mut mux, "/svc/M", &Metadata::new());
    assert_eq!(completion.result(), Some(Ok(())));
    let stream_id = mux.stream_id(token).unwrap();
    assert_eq!(stream_id, 1);

    // The HEADERS frame carries the gRPC request shape.
    match &mux.sink().frames[0] {
        WireFrame::Headers {
            stream_id, headers, ..
        } => {
            assert_eq!(*stream_id, 1);
            assert!(headers.contains(&(b":path".to_vec(), b"/svc/M".to_vec())));
            assert!(headers.contains(&(b"content-type".to_vec(), b"application/grpc".to_vec())));
        }
        other => panic!("expected HEADERS, got {other:?}"),
    }

    // Send the request message and half-close.
    let mut framed = Vec::new();
    message::encode(b"request", &mut framed);
    let send = Completion::new();
    mux.write(Command::SendFrame {
        stream_id,
        payload: Bytes::from(framed),
        end_stream: true,
        completion: send.clone(),
    });
    assert_eq!(send.result(), Some(Ok(())));
    // The admission flushed the HEADERS frame.
    assert!(mux.sink().flushes >= 1);

    // Response headers, one message, trailers with grpc-status 0.
    mux.handle_event(FrameEvent::Headers {
        stream_id,
        headers: vec![(b":status".to_vec(), b"200".to_vec())],
        end_stream: false,
    });
    let mut framed = Vec::new();
    message::encode(b"response", &mut framed);
    mux.handle_event(FrameEvent::Data {
        stream_id,
        data: Bytes::from(framed),
        end_of_stream: false,
    });
    mux.handle_event(FrameEvent::Headers {
        stream_id,
        headers: vec![(b"grpc-status".to_vec(), b"0".to_vec())],
        end_stream: true,
    });

    let events = events.borrow();
    assert!(matches!(&events[0], RpcEvent::Headers(_)));
    assert_eq!(events[1], RpcEvent::Message(Bytes::from_static(b"response")));
    match &events[2] {
        RpcEvent::Close(status, trailers) => {
            assert!(status.is_ok());
            assert!(trailers.is_empty());
        }
        other => panic!("expected Close, got {other:?}"),
    }
    // Fully closed: the stream is gone from the multiplexer.
    assert_eq!(mux.active_streams(), 0);
}

#[test]
fn cancel_before_admission() {
    let mut mux = ClientMux::new(ScriptedSink::default());
    // Peer sent SETTINGS MAX_CONCURRENT_STREAMS = 0.
    mux.set_max_concurrent_streams(0);

    let (token, create, events) = start_rpc(&mut mux, "/svc/M", &Metadata::new());
    assert!(!create.is_complete());
    assert_eq!(mux.pending_streams(), 1);

    let cancel = Completion::new();
    mux.write(Command::CancelStream {
        token,
        completion: cancel.clone(),
    });

    assert_eq!(mux.pending_streams(), 0);
    assert_eq!(cancel.result(), Some(Ok(())));
    let (status, _) = final_status(&events).unwrap();
    assert_eq!(status.code(), Code::Cancelled);
    // No HEADERS frame was ever emitted.
    assert!(mux.sink().headers_frames().is_empty());
}

#[test]
fn goaway_fails_pending_and_future_creates() {
    let mut mux = ClientMux::new(ScriptedSink::default());
    mux.set_max_concurrent_streams(0);

    let (_t1, c1, e1) = start_rpc(&mut mux, "/svc/A", &Metadata::new());
    let (_t2, c2, e2) = start_rpc(&mut mux, "/svc/B", &Metadata::new());
    assert_eq!(mux.pending_streams(), 2);

    mux.handle_event(FrameEvent::GoAway {
        last_stream_id: 0,
        error_code: ErrorCode::NoError,
        debug_data: Bytes::new(),
    });

    assert_eq!(mux.pending_streams(), 0);
    for (completion, events) in [(c1, e1), (c2, e2)] {
        assert_eq!(
            completion.result().unwrap().unwrap_err().code(),
            Code::Unavailable
        );
        assert_eq!(final_status(&events).unwrap().0.code(), Code::Unavailable);
    }

    // Later creates fail the same way.
    let (_t3, c3, e3) = start_rpc(&mut mux, "/svc/C", &Metadata::new());
    assert_eq!(
        c3.result().unwrap().unwrap_err().code(),
        Code::Unavailable
    );
    assert_eq!(final_status(&e3).unwrap().0.code(), Code::Unavailable);
}

#[test]
fn peer_rst_stream_mid_rpc() {
    let mut mux = ClientMux::new(ScriptedSink::default());
    let (t1, _c1, e1) = start_rpc(&mut mux, "/svc/A", &Metadata::new());
    let (t3, _c3, e3) = start_rpc(&mut mux, "/svc/B", &Metadata::new());
    let id1 = mux.stream_id(t1).unwrap();
    let id3 = mux.stream_id(t3).unwrap();
    assert_eq!((id1, id3), (1, 3));

    mux.handle_event(FrameEvent::Headers {
        stream_id: id3,
        headers: vec![(b":status".to_vec(), b"200".to_vec())],
        end_stream: false,
    });
    mux.handle_event(FrameEvent::RstStream {
        stream_id: id3,
        error_code: ErrorCode::RefusedStream,
    });

    let (status, trailers) = final_status(&e3).unwrap();
    assert_eq!(status.code(), Code::Unknown);
    assert!(trailers.is_empty());

    // The other stream is unaffected and still completes normally.
    assert!(final_status(&e1).is_none());
    mux.handle_event(FrameEvent::Headers {
        stream_id: id1,
        headers: vec![(b"grpc-status".to_vec(), b"0".to_vec())],
        end_stream: true,
    });
    assert!(final_status(&e1).unwrap().0.is_ok());
}

#[test]
fn binary_header_round_trip() {
    let mut mux = ClientMux::new(ScriptedSink::default());
    let mut metadata = Metadata::new();
    metadata.insert("custom-bin", vec![0, 1, 2, 253, 254, 255]);

    let (token, _c, events) = start_rpc(&mut mux, "/svc/M", &metadata);
    let stream_id = mux.stream_id(token).unwrap();

    // The outbound pair is base64 on the wire.
    let wire_pair = match &mux.sink().frames[0] {
        WireFrame::Headers { headers, .. } => headers
            .iter()
            .find(|(k, _)| k == b"custom-bin")
            .cloned()
            .unwrap(),
        other => panic!("expected HEADERS, got {other:?}"),
    };
    assert_eq!(wire_pair.1, b"AAEC/f7/");

    // Feeding the same pair back recovers the original bytes.
    mux.handle_event(FrameEvent::Headers {
        stream_id,
        headers: vec![(b":status".to_vec(), b"200".to_vec()), wire_pair],
        end_stream: false,
    });
    match &events.borrow()[0] {
        RpcEvent::Headers(received) => {
            assert_eq!(
                received.get("custom-bin"),
                Some([0, 1, 2, 253, 254, 255].as_slice())
            );
        }
        other => panic!("expected Headers, got {other:?}"),
    }
}

#[test]
fn channel_inactive_closes_everything() {
    let mut mux = ClientMux::new(ScriptedSink::default());
    mux.set_max_concurrent_streams(1);
    let (_t1, _c1, active) = start_rpc(&mut mux, "/svc/A", &Metadata::new());
    let (_t2, pending_completion, pending) = start_rpc(&mut mux, "/svc/B", &Metadata::new());
    assert_eq!(mux.pending_streams(), 1);

    mux.channel_inactive();

    assert_eq!(final_status(&active).unwrap().0.code(), Code::Unavailable);
    assert_eq!(final_status(&pending).unwrap().0.code(), Code::Unavailable);
    assert_eq!(
        pending_completion.result().unwrap().unwrap_err().code(),
        Code::Unavailable
    );
    assert_eq!(mux.active_streams(), 0);
    assert_eq!(mux.pending_streams(), 0);
}

#[test]
fn goaway_past_last_known_id_closes_newer_streams_only() {
    let mut mux = ClientMux::new(ScriptedSink::default());
    let (_t1, _c1, e1) = start_rpc(&mut mux, "/svc/A", &Metadata::new());
    let (_t3, _c3, e3) = start_rpc(&mut mux, "/svc/B", &Metadata::new());

    // The peer processed stream 1 but will never handle stream 3.
    mux.handle_event(FrameEvent::GoAway {
        last_stream_id: 1,
        error_code: ErrorCode::NoError,
        debug_data: Bytes::new(),
    });

    assert_eq!(final_status(&e3).unwrap().0.code(), Code::Unavailable);
    assert!(final_status(&e1).is_none());
    assert_eq!(mux.active_streams(), 1);
}

#[test]
fn cancel_active_stream_sends_rst() {
    let mut mux = ClientMux::new(ScriptedSink::default());
    let (token, _c, events) = start_rpc(&mut mux, "/svc/M", &Metadata::new());
    let stream_id = mux.stream_id(token).unwrap();

    let cancel = Completion::new();
    mux.write(Command::CancelStream {
        token,
        completion: cancel.clone(),
    });

    assert_eq!(cancel.result(), Some(Ok(())));
    assert_eq!(final_status(&events).unwrap().0.code(), Code::Cancelled);
    assert!(mux.sink().frames.contains(&WireFrame::RstStream {
        stream_id,
        error_code: ErrorCode::Cancel,
    }));

    // Inbound frames for the cancelled stream are discarded.
    mux.handle_event(FrameEvent::Headers {
        stream_id,
        headers: vec![(b":status".to_vec(), b"200".to_vec())],
        end_stream: false,
    });
    assert_eq!(events.borrow().len(), 1);
}
