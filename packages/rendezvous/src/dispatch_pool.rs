//! Reusable workers that run event listeners.

use std::any::type_name;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use futures::StreamExt;
use futures::channel::mpsc;
use futures::future::LocalBoxFuture;
use tracing::trace;

use crate::runtime;

const DEFAULT_MAX_IDLE_WORKERS: usize = 1;

/// One unit of listener work handed to a worker.
pub(crate) type Job = LocalBoxFuture<'static, ()>;

type WorkerSender = mpsc::UnboundedSender<Assignment>;
type WorkerReceiver = mpsc::UnboundedReceiver<Assignment>;

/// A job together with the channel that reaches the worker running it. The worker hands the
/// channel back to the pool once the job is done, which is what makes it available for reuse.
struct Assignment {
    job: Job,
    worker: WorkerSender,
}

struct PoolInner {
    /// Channels of workers that are parked, waiting for their next job.
    idle: RefCell<Vec<WorkerSender>>,
    max_idle_workers: usize,
    spawned_workers: Cell<usize>,
}

impl PoolInner {
    /// Parks a worker for reuse. Returns `false` if the pool is full, in which case the channel
    /// is dropped and the worker winds down.
    fn release(&self, worker: WorkerSender) -> bool {
        let mut idle = self.idle.borrow_mut();

        if idle.len() >= self.max_idle_workers {
            return false;
        }

        idle.push(worker);
        true
    }
}

/// A pool of resumable workers that run event listener callbacks.
///
/// Every listener invocation runs as its own unit of work, independent of the code that fired
/// the event. Rather than spawning a fresh task for each invocation, the pool keeps finished
/// workers parked and hands them the next job. A worker runs one job at a time; when all parked
/// workers are busy, the pool spawns another one. The pool never shrinks below what is in use
/// and keeps up to [`max_idle_workers`][DispatchPoolBuilder::max_idle_workers] parked workers.
///
/// Cloning the pool is cheap and all clones share the same workers.
///
/// # Panics
///
/// Dispatching work panics if called outside the context of a [`tokio::task::LocalSet`].
///
/// # Example
///
/// ```rust
/// use rendezvous::{DispatchPool, Event};
/// # use tokio::task::LocalSet;
///
/// # let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
/// # LocalSet::new().block_on(&runtime, async {
/// let pool = DispatchPool::builder().max_idle_workers(4).build();
///
/// let clicked = Event::<u32>::with_pool(pool.clone());
/// let closed = Event::<()>::with_pool(pool.clone());
///
/// clicked.connect(|button| println!("clicked {button}"));
/// closed.connect(|()| println!("closed"));
///
/// clicked.fire(1);
/// closed.fire(());
/// # });
/// ```
#[derive(Clone)]
pub struct DispatchPool {
    inner: Rc<PoolInner>,
}

impl DispatchPool {
    /// Creates a new pool with default settings.
    ///
    /// Use [`DispatchPool::builder()`] for custom configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates a builder for configuring the pool.
    #[must_use]
    pub fn builder() -> DispatchPoolBuilder {
        DispatchPoolBuilder::new()
    }

    /// Number of workers this pool has ever spawned.
    #[must_use]
    pub fn spawned_workers(&self) -> usize {
        self.inner.spawned_workers.get()
    }

    /// Number of workers currently parked and available for reuse.
    #[must_use]
    pub fn idle_workers(&self) -> usize {
        self.inner.idle.borrow().len()
    }

    /// Runs `job` on a parked worker, or on a newly spawned one if none is parked.
    pub(crate) fn dispatch(&self, job: Job) {
        let parked = self.inner.idle.borrow_mut().pop();

        let job = match parked {
            Some(worker) => {
                let assignment = Assignment {
                    job,
                    worker: worker.clone(),
                };

                match worker.unbounded_send(assignment) {
                    Ok(()) => {
                        trace!("reusing parked dispatch worker");
                        return;
                    }
                    // The worker task is gone (its local task set was torn down),
                    // so we fall back to a fresh one.
                    Err(e) => e.into_inner().job,
                }
            }
            None => job,
        };

        self.spawn_worker(job);
    }

    fn spawn_worker(&self, job: Job) {
        let (worker, assignments) = mpsc::unbounded();

        let worker_index = self.inner.spawned_workers.get();
        self.inner
            .spawned_workers
            .set(worker_index.wrapping_add(1));

        runtime::spawn(worker_loop(
            assignments,
            Rc::downgrade(&self.inner),
            worker_index,
        ));

        worker
            .clone()
            .unbounded_send(Assignment { job, worker })
            .expect("receiver of a freshly spawned worker cannot be gone yet");
    }
}

impl Default for DispatchPool {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DispatchPool {
    #[cfg_attr(test, mutants::skip)] // Diagnostic output only.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("max_idle_workers", &self.inner.max_idle_workers)
            .field("spawned_workers", &self.spawned_workers())
            .field("idle_workers", &self.idle_workers())
            .finish()
    }
}

async fn worker_loop(mut assignments: WorkerReceiver, pool: Weak<PoolInner>, worker_index: usize) {
    trace!(worker_index, "dispatch worker started");

    while let Some(Assignment { job, worker }) = assignments.next().await {
        runtime::run_isolated(job, "event listener").await;

        let Some(pool) = pool.upgrade() else {
            break;
        };

        if !pool.release(worker) {
            break;
        }
    }

    trace!(worker_index, "dispatch worker exiting");
}

/// Builder for configuring a [`DispatchPool`].
#[derive(Debug)]
pub struct DispatchPoolBuilder {
    max_idle_workers: usize,
}

impl DispatchPoolBuilder {
    fn new() -> Self {
        Self {
            max_idle_workers: DEFAULT_MAX_IDLE_WORKERS,
        }
    }

    /// Sets how many finished workers the pool keeps parked for reuse.
    ///
    /// Default is 1. Zero disables reuse, giving every listener invocation a fresh task.
    #[must_use]
    pub fn max_idle_workers(mut self, count: usize) -> Self {
        self.max_idle_workers = count;
        self
    }

    /// Builds the pool with the configured settings.
    #[must_use]
    pub fn build(self) -> DispatchPool {
        DispatchPool {
            inner: Rc::new(PoolInner {
                idle: RefCell::new(Vec::new()),
                max_idle_workers: self.max_idle_workers,
                spawned_workers: Cell::new(0),
            }),
        }
    }
}
