//! Pickers: the per-RPC routing decision.
//!
//! A picker is built by the balancer on its synchronization context, then
//! invoked concurrently by RPC-issuing threads. It snapshots balancer
//! state at construction and only mutates its own self-contained state
//! (such as a round-robin cursor).

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use braid_core::{Metadata, Status};

use crate::subchannel::Subchannel;

/// Per-call options consulted during picking.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Buffer instead of failing when the picker reports an error.
    pub wait_for_ready: bool,
    /// Override of the channel authority for this call.
    pub authority: Option<String>,
}

/// Arguments for one pick: the call options, outgoing headers, and the
/// full method name.
#[derive(Debug, Clone)]
pub struct PickArgs {
    pub call_options: CallOptions,
    pub headers: Metadata,
    pub method: String,
}

impl PickArgs {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            call_options: CallOptions::default(),
            headers: Metadata::new(),
            method: method.into(),
        }
    }
}

/// Observes the stream created from a pick.
pub trait StreamTracer: Send + Sync {
    fn stream_created(&self, headers: &Metadata);
    fn stream_closed(&self, status: &Status);
}

/// Creates a tracer per stream resulting from a pick.
pub trait StreamTracerFactory: Send + Sync {
    fn new_tracer(&self, method: &str) -> Arc<dyn StreamTracer>;
}

/// A balancing decision for one RPC.
#[derive(Clone)]
pub enum PickResult {
    /// Proceed on the subchannel if it is READY when the RPC starts;
    /// otherwise the RPC is re-buffered.
    Proceed {
        subchannel: Subchannel,
        tracer: Option<Arc<dyn StreamTracerFactory>>,
    },
    /// Fail the RPC unless it is wait-for-ready, in which case buffer.
    Error(Status),
    /// Fail the RPC immediately, ignoring retry and wait-for-ready
    /// policy.
    Drop(Status),
    /// No decision; the RPC stays buffered until the next picker.
    NoResult,
}

impl PickResult {
    pub fn proceed(subchannel: Subchannel) -> Self {
        Self::Proceed {
            subchannel,
            tracer: None,
        }
    }

    /// An error decision. The status must not be OK.
    pub fn error(status: Status) -> Self {
        assert!(!status.is_ok(), "error status must not be OK");
        Self::Error(status)
    }

    /// A drop decision. The status must not be OK.
    pub fn dropped(status: Status) -> Self {
        assert!(!status.is_ok(), "drop status must not be OK");
        Self::Drop(status)
    }
}

impl fmt::Debug for PickResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Proceed { subchannel, tracer } => f
                .debug_struct("Proceed")
                .field("subchannel", subchannel)
                .field("traced", &tracer.is_some())
                .finish(),
            Self::Error(status) => f.debug_tuple("Error").field(status).finish(),
            Self::Drop(status) => f.debug_tuple("Drop").field(status).finish(),
            Self::NoResult => f.write_str("NoResult"),
        }
    }
}

/// The per-RPC hot path. Thread-safe; invoked concurrently.
pub trait SubchannelPicker: Send + Sync {
    fn pick(&self, args: &PickArgs) -> PickResult;
}

/// Round-robins across a fixed list of subchannels. The cursor is the
/// picker's only mutable state.
pub struct RoundRobinPicker {
    subchannels: Vec<Subchannel>,
    cursor: AtomicUsize,
}

impl RoundRobinPicker {
    pub fn new(subchannels: Vec<Subchannel>) -> Self {
        Self {
            subchannels,
            cursor: AtomicUsize::new(0),
        }
    }
}

impl SubchannelPicker for RoundRobinPicker {
    fn pick(&self, _args: &PickArgs) -> PickResult {
        if self.subchannels.is_empty() {
            return PickResult::NoResult;
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.subchannels.len();
        PickResult::proceed(self.subchannels[index].clone())
    }
}
