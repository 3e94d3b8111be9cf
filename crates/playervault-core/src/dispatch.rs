//! Cross-thread handoff between workers and the tick thread.
//!
//! Two execution contexts exist: the tick thread (sole owner of live
//! entity mutation, never blocks on I/O) and worker tasks (store I/O and
//! CPU-bound batch work). Crossing from worker to tick context is only
//! ever a queued handoff through a [`Dispatcher`], never a direct call;
//! crossing the other way is a plain task spawn.
//!
//! [`TickQueue`] is the concrete dispatcher: workers push owner tasks,
//! the tick loop drains everything due at the top of each tick.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::host::Host;

/// A unit of work that must run on the owner (tick) thread.
pub type OwnerTask = Box<dyn FnOnce(&mut dyn Host) + Send>;

/// A unit of background work handed to a worker.
pub type WorkerTask = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Scheduling seam between workers and the tick thread.
///
/// Injected wherever Playervault needs to reach live entity state, so the
/// concrete engine-threading model stays a single adapter implementation.
pub trait Dispatcher: Send + Sync {
    /// Queue a task for the next tick-loop drain.
    fn run_on_owner(&self, task: OwnerTask);

    /// Queue a task to run `delay_ticks` ticks from now.
    fn run_on_owner_after(&self, delay_ticks: u64, task: OwnerTask);

    /// Hand blocking or I/O-bound work to a worker.
    fn spawn_worker(&self, work: WorkerTask);
}

/// Run a closure on the owner thread and wait for its result.
///
/// This is the worker-side half of the "marshal to owning thread and
/// block" pattern: the calling worker suspends until the tick loop drains
/// the queued task. Returns `None` if the dispatcher was dropped before
/// the task ran. Must never be awaited from the tick thread itself.
pub async fn owner_call<T, F>(dispatcher: &dyn Dispatcher, f: F) -> Option<T>
where
    T: Send + 'static,
    F: FnOnce(&mut dyn Host) -> T + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    dispatcher.run_on_owner(Box::new(move |host| {
        let _ = tx.send(f(host));
    }));
    rx.await.ok()
}

/// One queued owner task with its due tick.
struct Scheduled {
    due: u64,
    task: OwnerTask,
}

/// Tick-drained owner-task queue.
///
/// Workers enqueue from any thread; the tick loop calls [`TickQueue::drain`]
/// once per tick with the live host. Tasks queued with a delay wait until
/// their due tick; same-tick tasks run in enqueue order.
#[derive(Default)]
pub struct TickQueue {
    pending: Mutex<Vec<Scheduled>>,
    now: AtomicU64,
}

impl TickQueue {
    /// Create an empty queue at tick 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks waiting (due or not).
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Whether no tasks are waiting.
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Run every task due at `now_tick`, in enqueue order.
    ///
    /// Called from the tick loop only. Tasks queued while draining run on
    /// the next drain, which keeps per-tick work bounded by what was
    /// already scheduled.
    pub fn drain(&self, host: &mut dyn Host, now_tick: u64) {
        self.now.store(now_tick, Ordering::Release);

        let due: Vec<OwnerTask> = {
            let mut pending = self.pending.lock();
            let mut rest = Vec::with_capacity(pending.len());
            let mut due = Vec::new();
            for item in pending.drain(..) {
                if item.due <= now_tick {
                    due.push(item.task);
                } else {
                    rest.push(item);
                }
            }
            *pending = rest;
            due
        };

        for task in due {
            task(host);
        }
    }
}

impl Dispatcher for TickQueue {
    fn run_on_owner(&self, task: OwnerTask) {
        let due = self.now.load(Ordering::Acquire);
        self.pending.lock().push(Scheduled { due, task });
    }

    fn run_on_owner_after(&self, delay_ticks: u64, task: OwnerTask) {
        let due = self
            .now
            .load(Ordering::Acquire)
            .saturating_add(delay_ticks);
        self.pending.lock().push(Scheduled { due, task });
    }

    fn spawn_worker(&self, work: WorkerTask) {
        drop(tokio::spawn(work));
    }
}
