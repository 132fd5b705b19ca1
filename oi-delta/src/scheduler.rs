//! Delayed, cancellable callback execution shared by every rolling window.
//!
//! A single dispatcher task owns a min-heap of pending `(deadline, callback)`
//! entries and sleeps until the earliest deadline, waking early whenever a new
//! entry lands in front of the current head. Cancellation is best-effort
//! before fire: an entry whose callback has already started executing runs to
//! completion, and callers must not assume cancel-or-nothing semantics across
//! that boundary.

use parking_lot::Mutex;
use std::{
    cmp::{Ordering, Reverse},
    collections::BinaryHeap,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering as MemoryOrdering},
    },
    time::Duration,
};
use tokio::{sync::Notify, time::Instant};

type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Handle to one scheduled callback, used to void it before it fires.
#[derive(Debug, Clone)]
pub struct ExpiryHandle {
    cancelled: Arc<AtomicBool>,
}

impl ExpiryHandle {
    /// Void the associated callback if it has not started executing yet.
    /// Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, MemoryOrdering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(MemoryOrdering::SeqCst)
    }
}

struct Entry {
    deadline: Instant,
    seq: u64,
    cancelled: Arc<AtomicBool>,
    callback: Callback,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.deadline
            .cmp(&other.deadline)
            .then(self.seq.cmp(&other.seq))
    }
}

struct Shared {
    queue: Mutex<BinaryHeap<Reverse<Entry>>>,
    notify: Notify,
    seq: AtomicU64,
}

/// Cheaply cloneable handle to the shared dispatcher. The dispatcher task is
/// aborted once the last handle is dropped.
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<Shared>,
    _dispatcher: Arc<Dispatcher>,
}

struct Dispatcher {
    task: tokio::task::JoinHandle<()>,
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl Scheduler {
    /// Create the scheduler and spawn its dispatcher task onto the current
    /// tokio runtime.
    pub fn spawn() -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(BinaryHeap::new()),
            notify: Notify::new(),
            seq: AtomicU64::new(0),
        });
        let task = tokio::spawn(run_dispatcher(Arc::clone(&shared)));
        Self {
            shared,
            _dispatcher: Arc::new(Dispatcher { task }),
        }
    }

    /// Schedule `callback` to run once `delay` has elapsed. The returned
    /// handle cancels the callback unless it has already started executing.
    pub fn schedule(
        &self,
        delay: Duration,
        callback: impl FnOnce() + Send + 'static,
    ) -> ExpiryHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let entry = Entry {
            deadline: Instant::now() + delay,
            seq: self.shared.seq.fetch_add(1, MemoryOrdering::Relaxed),
            cancelled: Arc::clone(&cancelled),
            callback: Box::new(callback),
        };

        let wake_dispatcher = {
            let mut queue = self.shared.queue.lock();
            let is_new_head = queue
                .peek()
                .is_none_or(|Reverse(head)| entry.deadline < head.deadline);
            queue.push(Reverse(entry));
            is_new_head
        };
        if wake_dispatcher {
            self.shared.notify.notify_one();
        }

        ExpiryHandle { cancelled }
    }

    /// Number of entries still queued, cancelled ones included until they
    /// reach their deadline and are discarded.
    pub fn pending(&self) -> usize {
        self.shared.queue.lock().len()
    }
}

async fn run_dispatcher(shared: Arc<Shared>) {
    loop {
        let next_deadline = shared
            .queue
            .lock()
            .peek()
            .map(|Reverse(entry)| entry.deadline);

        match next_deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => fire_due(&shared),
                    // An earlier entry was inserted; recompute the deadline.
                    _ = shared.notify.notified() => {}
                }
            }
            None => shared.notify.notified().await,
        }
    }
}

/// Pop and execute every entry whose deadline has passed. Callbacks run
/// outside the queue lock so they may schedule further entries freely.
fn fire_due(shared: &Shared) {
    loop {
        let due = {
            let mut queue = shared.queue.lock();
            match queue.peek() {
                Some(Reverse(head)) if head.deadline <= Instant::now() => {
                    queue.pop().map(|Reverse(entry)| entry)
                }
                _ => None,
            }
        };
        let Some(entry) = due else { break };

        if entry.cancelled.load(MemoryOrdering::SeqCst) {
            continue;
        }

        // A panicking callback must not take the dispatcher down with it.
        // The subtraction it was meant to apply becomes a no-op.
        let callback = entry.callback;
        if catch_unwind(AssertUnwindSafe(callback)).is_err() {
            tracing::error!("scheduled expiration callback panicked; treating as no-op");
        }
    }
}
