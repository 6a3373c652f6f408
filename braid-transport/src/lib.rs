//! Client HTTP/2 stream multiplexer for gRPC.
//!
//! This crate multiplexes logical RPC streams over a single HTTP/2
//! connection. It does not frame HTTP/2 bytes itself: a framer
//! collaborator feeds decoded events in and takes frame writes out.
//!
//! ```text
//!   RPCs (one per stream)
//!        |  Command::{CreateStream, SendFrame, CancelStream}
//!   +----v-----------+
//!   | ClientMux      |  admission queue + stream routing + teardown
//!   |  Http2View     |  ids, concurrency limit, GOAWAY flags
//!   |  ClientStream  |  per-RPC lifecycle, message reassembly
//!   +----+-----------+
//!        |  FrameSink writes / FrameEvent callbacks
//!   HTTP/2 framer (collaborator)
//! ```
//!
//! All multiplexer state is mutated through `&mut ClientMux` on one I/O
//! context; commands posted from other threads must be delivered to that
//! context by the embedder.

pub mod command;
pub mod config;
pub mod conn;
pub mod error;
pub mod framer;
pub mod message;
pub mod metrics;
pub mod mux;
pub mod stream;

pub use command::{Command, Completion};
pub use config::TransportOptions;
pub use conn::{Http2StreamState, Http2View};
pub use error::{ErrorCode, TransportError};
pub use framer::{FrameEvent, FrameSink};
pub use message::MessageBuffer;
pub use mux::{ClientMux, grpc_request_headers};
pub use stream::{ClientStream, StreamListener, StreamPhase, StreamToken};
