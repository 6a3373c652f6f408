//! Local view of the HTTP/2 connection.
//!
//! The multiplexer keeps its own bookkeeping of the client endpoint:
//! stream id allocation, the peer's concurrency limit, GOAWAY flags, and
//! the HTTP/2 state of each live stream (RFC 7540 Section 5.1). The framer
//! owns the wire; this view owns the admission decisions.

use std::collections::HashMap;

/// Largest valid stream id (31-bit space).
const MAX_STREAM_ID: u32 = 0x7fff_ffff;

/// State of an HTTP/2 stream as seen by the local endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Http2StreamState {
    /// Allocated, HEADERS not yet written.
    Idle,
    /// HEADERS written, both directions live.
    Open,
    /// We sent END_STREAM.
    HalfClosedLocal,
    /// The peer sent END_STREAM.
    HalfClosedRemote,
    /// Both sides done, or the stream was reset.
    Closed,
}

/// Client-side HTTP/2 endpoint state.
pub struct Http2View {
    /// Next locally-initiated stream id (odd, starting at 1).
    next_stream_id: u32,
    /// Peer's SETTINGS_MAX_CONCURRENT_STREAMS; `None` means unlimited.
    max_concurrent_streams: Option<u32>,
    going_away: bool,
    goaway_received: bool,
    /// Last stream id the peer promised to process, from GOAWAY.
    last_known_stream_id: u32,
    streams: HashMap<u32, Http2StreamState>,
}

impl Default for Http2View {
    fn default() -> Self {
        Self::new()
    }
}

impl Http2View {
    pub fn new() -> Self {
        Self {
            next_stream_id: 1,
            max_concurrent_streams: None,
            going_away: false,
            goaway_received: false,
            last_known_stream_id: 0,
            streams: HashMap::new(),
        }
    }

    /// The id the next stream would get, or `None` once the pool is
    /// exhausted. Exhaustion is permanent for the connection.
    pub fn next_stream_id(&self) -> Option<u32> {
        (self.next_stream_id <= MAX_STREAM_ID).then_some(self.next_stream_id)
    }

    /// Override the next locally-initiated stream id (e.g. after an
    /// upgraded connection that already consumed stream 1).
    pub(crate) fn set_next_stream_id(&mut self, id: u32) {
        self.next_stream_id = id;
    }

    /// Allocate `id` (which must be the current next id) in IDLE state.
    pub fn create_stream(&mut self, id: u32) {
        debug_assert_eq!(id, self.next_stream_id);
        self.streams.insert(id, Http2StreamState::Idle);
        self.next_stream_id = id.saturating_add(2);
    }

    /// Transition an IDLE stream to OPEN after its HEADERS frame landed.
    pub fn mark_open(&mut self, id: u32) {
        if let Some(state) = self.streams.get_mut(&id) {
            *state = Http2StreamState::Open;
        }
    }

    /// Whether the local endpoint may start another stream under the
    /// peer's MAX_CONCURRENT_STREAMS limit.
    pub fn accepting_new_streams(&self) -> bool {
        match self.max_concurrent_streams {
            Some(limit) => (self.streams.len() as u32) < limit,
            None => true,
        }
    }

    pub fn set_max_concurrent_streams(&mut self, limit: u32) {
        self.max_concurrent_streams = Some(limit);
    }

    pub fn is_going_away(&self) -> bool {
        self.going_away
    }

    pub fn goaway_received(&self) -> bool {
        self.goaway_received
    }

    pub fn last_known_stream_id(&self) -> u32 {
        self.last_known_stream_id
    }

    /// Record a GOAWAY received from the peer.
    pub fn remote_goaway(&mut self, last_stream_id: u32) {
        self.going_away = true;
        self.goaway_received = true;
        self.last_known_stream_id = last_stream_id;
    }

    /// Record that we sent (or are about to send) GOAWAY ourselves.
    pub fn local_goaway(&mut self) {
        self.going_away = true;
    }

    /// Apply a received END_STREAM flag; returns the resulting state.
    pub fn recv_end_stream(&mut self, id: u32) -> Option<Http2StreamState> {
        let state = self.streams.get_mut(&id)?;
        *state = match *state {
            Http2StreamState::HalfClosedLocal => Http2StreamState::Closed,
            Http2StreamState::Closed => Http2StreamState::Closed,
            _ => Http2StreamState::HalfClosedRemote,
        };
        Some(*state)
    }

    /// Apply a sent END_STREAM flag; returns the resulting state.
    pub fn send_end_stream(&mut self, id: u32) -> Option<Http2StreamState> {
        let state = self.streams.get_mut(&id)?;
        *state = match *state {
            Http2StreamState::HalfClosedRemote => Http2StreamState::Closed,
            Http2StreamState::Closed => Http2StreamState::Closed,
            _ => Http2StreamState::HalfClosedLocal,
        };
        Some(*state)
    }

    pub fn stream_state(&self, id: u32) -> Option<Http2StreamState> {
        self.streams.get(&id).copied()
    }

    /// Drop all state for a stream. Ids are never reused.
    pub fn close_stream(&mut self, id: u32) {
        self.streams.remove(&id);
    }

    /// Snapshot of live stream ids, ascending.
    pub fn active_streams(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.streams.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}
