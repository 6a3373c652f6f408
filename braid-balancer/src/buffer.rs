//! Buffering for RPCs that cannot be placed yet.
//!
//! When a pick returns no usable subchannel the RPC parks here. Every
//! time the balancer publishes a new picker the channel calls
//! [`PickBuffer::reprocess`] and each buffered RPC goes through the
//! picking process again. Buffered RPCs are individually cancellable.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use braid_core::{Code, Status};

use crate::picker::{PickArgs, PickResult, StreamTracerFactory, SubchannelPicker};
use crate::state::ConnectivityState;
use crate::subchannel::Subchannel;

/// How a buffered RPC finally left the buffer.
pub enum PickOutcome {
    /// Start the RPC on this subchannel.
    Proceed {
        subchannel: Subchannel,
        tracer: Option<Arc<dyn StreamTracerFactory>>,
    },
    /// The RPC fails with this status.
    Failed(Status),
}

type Waiter = Box<dyn FnOnce(PickOutcome) + Send>;

struct Entry {
    id: u64,
    args: PickArgs,
    waiter: Waiter,
}

/// Holds buffered RPC picks between picker updates.
pub struct PickBuffer {
    entries: Mutex<Vec<Entry>>,
    next_id: AtomicU64,
    self_ref: Weak<PickBuffer>,
}

/// Handle to one buffered RPC.
pub struct BufferedCall {
    id: u64,
    buffer: Weak<PickBuffer>,
}

impl PickBuffer {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            entries: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
            self_ref: self_ref.clone(),
        })
    }

    /// Park an RPC. The waiter fires exactly once: on a successful
    /// re-pick, a terminal pick failure, or cancellation.
    pub fn buffer(
        &self,
        args: PickArgs,
        waiter: impl FnOnce(PickOutcome) + Send + 'static,
    ) -> BufferedCall {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().push(Entry {
            id,
            args,
            waiter: Box::new(waiter),
        });
        BufferedCall {
            id,
            buffer: self.self_ref.clone(),
        }
    }

    /// Re-pick every buffered RPC through `picker`.
    ///
    /// An RPC leaves the buffer on `Proceed` with a READY subchannel, on
    /// `Drop`, or on `Error` without wait-for-ready; everything else
    /// stays parked for the next picker.
    pub fn reprocess(&self, picker: &dyn SubchannelPicker) {
        let entries = std::mem::take(&mut *self.lock());
        let mut kept = Vec::new();
        for entry in entries {
            match picker.pick(&entry.args) {
                PickResult::Proceed { subchannel, tracer } => {
                    if subchannel.state() == ConnectivityState::Ready {
                        (entry.waiter)(PickOutcome::Proceed { subchannel, tracer });
                    } else {
                        kept.push(entry);
                    }
                }
                PickResult::Error(status) => {
                    if entry.args.call_options.wait_for_ready {
                        kept.push(entry);
                    } else {
                        (entry.waiter)(PickOutcome::Failed(status));
                    }
                }
                PickResult::Drop(status) => (entry.waiter)(PickOutcome::Failed(status)),
                PickResult::NoResult => kept.push(entry),
            }
        }
        // RPCs buffered by waiters during reprocessing land behind the
        // survivors.
        let mut entries = self.lock();
        kept.append(&mut *entries);
        *entries = kept;
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl BufferedCall {
    /// Complete the buffered RPC with CANCELLED. No-op if it already
    /// left the buffer.
    pub fn cancel(&self) {
        let Some(buffer) = self.buffer.upgrade() else {
            return;
        };
        let entry = {
            let mut entries = buffer.lock();
            entries
                .iter()
                .position(|e| e.id == self.id)
                .map(|i| entries.remove(i))
        };
        if let Some(entry) = entry {
            (entry.waiter)(PickOutcome::Failed(Status::new(Code::Cancelled)));
        }
    }

    /// Whether the RPC is still parked.
    pub fn is_buffered(&self) -> bool {
        self.buffer
            .upgrade()
            .is_some_and(|b| b.lock().iter().any(|e| e.id == self.id))
    }
}
