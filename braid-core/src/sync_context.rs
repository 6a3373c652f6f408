//! A serial task queue that linearizes state mutations.
//!
//! Tasks run in submission order, one at a time, on whichever thread
//! submits while no drain is in progress. A task submitted from inside a
//! running task is deferred until the current one completes, so execution
//! never recurses. Panics inside a task are reported out-of-band and do
//! not corrupt the queue.

use std::any::Any;
use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

type Task = Box<dyn FnOnce() + Send>;
type PanicHandler = Box<dyn Fn(Box<dyn Any + Send>) + Send + Sync>;

/// External timer source used by [`SyncContext::schedule`].
pub trait ScheduledExecutor: Send + Sync {
    /// Run `task` after `delay` has elapsed.
    fn schedule(&self, delay: Duration, task: Task);
}

/// Handle to a task scheduled through [`SyncContext::schedule`].
#[derive(Clone)]
pub struct ScheduledHandle {
    cancelled: Arc<AtomicBool>,
}

impl ScheduledHandle {
    /// Prevent the task from running if it has not started yet.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// The serial executor shared by the balancer and the channel helper.
pub struct SyncContext {
    queue: Mutex<VecDeque<Task>>,
    draining: AtomicBool,
    panic_handler: PanicHandler,
}

impl Default for SyncContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncContext {
    /// A context that reports task panics through `tracing::error`.
    pub fn new() -> Self {
        Self::with_panic_handler(Box::new(|payload| {
            let message = payload
                .downcast_ref::<&str>()
                .copied()
                .map(str::to_owned)
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_owned());
            tracing::error!(message, "task panicked in synchronization context");
        }))
    }

    pub fn with_panic_handler(panic_handler: PanicHandler) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            draining: AtomicBool::new(false),
            panic_handler,
        }
    }

    /// Enqueue a task and drain the queue unless a drain is already
    /// running (here or on another thread).
    pub fn execute(&self, task: impl FnOnce() + Send + 'static) {
        self.execute_later(task);
        self.drain();
    }

    /// Enqueue a task without draining. Pair with [`SyncContext::drain`].
    pub fn execute_later(&self, task: impl FnOnce() + Send + 'static) {
        self.lock_queue().push_back(Box::new(task));
    }

    /// Run queued tasks until the queue is empty. Returns immediately if
    /// another drain is in progress; that drain will pick up the work.
    pub fn drain(&self) {
        loop {
            if self.draining.swap(true, Ordering::Acquire) {
                return;
            }
            while let Some(task) = self.lock_queue().pop_front() {
                if let Err(payload) = catch_unwind(AssertUnwindSafe(task)) {
                    (self.panic_handler)(payload);
                }
            }
            self.draining.store(false, Ordering::Release);
            // A task enqueued between the final pop and the flag reset
            // would otherwise be stranded.
            if self.lock_queue().is_empty() {
                return;
            }
        }
    }

    /// Run `task` in this context after `delay`, using the external timer.
    ///
    /// Cancellation through the returned handle is effective until the
    /// task starts running.
    pub fn schedule(
        self: Arc<Self>,
        delay: Duration,
        timer: &dyn ScheduledExecutor,
        task: impl FnOnce() + Send + 'static,
    ) -> ScheduledHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let handle = ScheduledHandle {
            cancelled: Arc::clone(&cancelled),
        };
        let context = self;
        timer.schedule(
            delay,
            Box::new(move || {
                context.execute(move || {
                    if !cancelled.load(Ordering::Acquire) {
                        task();
                    }
                });
            }),
        );
        handle
    }

    fn lock_queue(&self) -> std::sync::MutexGuard<'_, VecDeque<Task>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
