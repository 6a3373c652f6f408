//! Write commands posted to the multiplexer and their completions.

use std::sync::{Arc, Mutex, PoisonError};

use braid_core::Status;
use bytes::Bytes;

use crate::stream::{ClientStream, StreamToken};

/// Completion slot for one write command.
///
/// The multiplexer completes it exactly once while processing the
/// command; later completions are ignored. Clones share the slot.
#[derive(Clone, Debug, Default)]
pub struct Completion {
    slot: Arc<Mutex<Option<Result<(), Status>>>>,
}

impl Completion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome. First writer wins.
    pub fn complete(&self, result: Result<(), Status>) {
        let mut slot = self.lock();
        if slot.is_none() {
            *slot = Some(result);
        }
    }

    /// The recorded outcome, if the command has been processed.
    pub fn result(&self) -> Option<Result<(), Status>> {
        self.lock().clone()
    }

    pub fn is_complete(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Result<(), Status>>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The three write commands accepted by the multiplexer.
pub enum Command {
    /// Queue a stream for admission; its HEADERS frame is written once
    /// the connection has capacity.
    CreateStream {
        /// Wire headers, pseudo-headers first (see
        /// [`crate::mux::grpc_request_headers`]).
        headers: Vec<(Vec<u8>, Vec<u8>)>,
        stream: ClientStream,
        completion: Completion,
    },
    /// Write a DATA frame carrying already-framed message bytes.
    SendFrame {
        stream_id: u32,
        payload: Bytes,
        end_stream: bool,
        completion: Completion,
    },
    /// Cancel a stream: dequeue it if still pending, otherwise reset it.
    CancelStream {
        token: StreamToken,
        completion: Completion,
    },
}
