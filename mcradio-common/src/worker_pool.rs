//! Elastic worker pool
//!
//! Bounded FIFO task queue drained by a set of worker threads whose size is
//! adjusted by a manager thread:
//!
//! - Workers block on `not_empty`, submitters block on `not_full` with a
//!   timeout, the manager sleeps on its own condvar between samples.
//! - Scale-up: queued tasks outnumber live workers -> start up to
//!   `scale_batch` more workers (never above `max_threads`).
//! - Scale-down: fewer than half the live workers are busy -> ask up to
//!   `scale_batch` idle workers to exit (never below `min_threads`).
//!
//! Tasks are owned closures. A task that is never run (rejected, or still
//! queued at shutdown) is handed back or dropped; a task that runs is dropped
//! by the worker once it returns or panics.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{Error, Result};

/// Default number of workers kept alive
pub const DEFAULT_MIN_THREADS: usize = 5;

/// Default upper bound on workers
pub const DEFAULT_MAX_THREADS: usize = 10;

/// Default number of queued tasks
pub const DEFAULT_QUEUE_CAPACITY: usize = 20;

/// Default time `submit` waits for a free queue slot
pub const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_secs(2);

/// Default manager sampling period
pub const DEFAULT_MANAGER_INTERVAL: Duration = Duration::from_secs(3);

/// Default number of workers started or retired per manager cycle
pub const DEFAULT_SCALE_BATCH: usize = 2;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Worker pool sizing and timing
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub min_threads: usize,
    pub max_threads: usize,
    pub queue_capacity: usize,
    pub submit_timeout: Duration,
    pub manager_interval: Duration,
    pub scale_batch: usize,
    /// Prefix for worker thread names
    pub thread_name: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_threads: DEFAULT_MIN_THREADS,
            max_threads: DEFAULT_MAX_THREADS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            submit_timeout: DEFAULT_SUBMIT_TIMEOUT,
            manager_interval: DEFAULT_MANAGER_INTERVAL,
            scale_batch: DEFAULT_SCALE_BATCH,
            thread_name: "pool".to_string(),
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_threads == 0 {
            return Err(Error::InvalidInput("min_threads must be at least 1".to_string()));
        }
        if self.max_threads < self.min_threads {
            return Err(Error::InvalidInput(format!(
                "max_threads ({}) must not be below min_threads ({})",
                self.max_threads, self.min_threads
            )));
        }
        if self.queue_capacity == 0 {
            return Err(Error::InvalidInput("queue_capacity must be at least 1".to_string()));
        }
        if self.scale_batch == 0 {
            return Err(Error::InvalidInput("scale_batch must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Rejected submission; the task is handed back untouched
#[derive(Error)]
pub enum SubmitError<F> {
    /// Queue stayed full for the whole submit timeout
    #[error("task queue full, submit timed out")]
    Timeout(F),

    /// Pool has been shut down
    #[error("worker pool is shut down")]
    ShutDown(F),
}

impl<F> SubmitError<F> {
    /// Recover the rejected task
    pub fn into_inner(self) -> F {
        match self {
            SubmitError::Timeout(task) | SubmitError::ShutDown(task) => task,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, SubmitError::Timeout(_))
    }
}

impl<F> std::fmt::Debug for SubmitError<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubmitError::Timeout(_) => f.write_str("Timeout(..)"),
            SubmitError::ShutDown(_) => f.write_str("ShutDown(..)"),
        }
    }
}

/// Fixed-capacity circular task queue
struct TaskQueue {
    slots: Vec<Option<Job>>,
    front: usize,
    rear: usize,
    size: usize,
}

impl TaskQueue {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            front: 0,
            rear: 0,
            size: 0,
        }
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn len(&self) -> usize {
        self.size
    }

    fn is_empty(&self) -> bool {
        self.size == 0
    }

    fn is_full(&self) -> bool {
        self.size == self.capacity()
    }

    /// Caller must check `is_full()` first
    fn push(&mut self, job: Job) {
        debug_assert!(!self.is_full());
        self.slots[self.rear] = Some(job);
        self.rear = (self.rear + 1) % self.capacity();
        self.size += 1;
    }

    fn pop(&mut self) -> Option<Job> {
        if self.is_empty() {
            return None;
        }
        let job = self.slots[self.front].take();
        self.front = (self.front + 1) % self.capacity();
        self.size -= 1;
        job
    }

    fn drain(&mut self) -> Vec<Job> {
        let mut jobs = Vec::with_capacity(self.size);
        while let Some(job) = self.pop() {
            jobs.push(job);
        }
        jobs
    }
}

/// Everything guarded by the pool lock
struct PoolState {
    queue: TaskQueue,
    /// One slot per potential worker; `None` = free
    roster: Vec<Option<JoinHandle<()>>>,
    live: usize,
    pending_exits: usize,
    shutdown: bool,
}

struct Shared {
    config: PoolConfig,
    state: Mutex<PoolState>,
    /// Separate lock so task start/finish does not contend with the queue
    busy: Mutex<usize>,
    not_empty: Condvar,
    not_full: Condvar,
    manager_wake: Condvar,
}

/// Bounded task queue executed by an elastic set of worker threads
pub struct WorkerPool {
    shared: Arc<Shared>,
    manager: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Start `min_threads` workers plus the manager
    ///
    /// If any thread fails to start, the threads already running are stopped
    /// and joined before the error is returned.
    pub fn new(config: PoolConfig) -> Result<Self> {
        config.validate()?;

        let shared = Arc::new(Shared {
            state: Mutex::new(PoolState {
                queue: TaskQueue::with_capacity(config.queue_capacity),
                roster: (0..config.max_threads).map(|_| None).collect(),
                live: 0,
                pending_exits: 0,
                shutdown: false,
            }),
            busy: Mutex::new(0),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            manager_wake: Condvar::new(),
            config,
        });

        {
            let mut state = shared.state.lock();
            for slot in 0..shared.config.min_threads {
                match spawn_worker(&shared, slot) {
                    Ok(handle) => {
                        state.roster[slot] = Some(handle);
                        state.live += 1;
                    }
                    Err(e) => {
                        error!("Failed to start worker {}: {}", slot, e);
                        drop(state);
                        stop_and_join_workers(&shared);
                        return Err(Error::Io(e));
                    }
                }
            }
        }

        let manager = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name(format!("{}-manager", shared.config.thread_name))
                .spawn(move || manager_loop(shared))
        };
        let manager = match manager {
            Ok(handle) => handle,
            Err(e) => {
                error!("Failed to start pool manager: {}", e);
                stop_and_join_workers(&shared);
                return Err(Error::Io(e));
            }
        };

        info!(
            "Worker pool started: {} worker(s) (min {}, max {}), queue capacity {}",
            shared.config.min_threads,
            shared.config.min_threads,
            shared.config.max_threads,
            shared.config.queue_capacity
        );

        Ok(Self {
            shared,
            manager: Mutex::new(Some(manager)),
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Queue a task, waiting up to `submit_timeout` for a free slot
    ///
    /// On failure the task is returned inside the error.
    pub fn submit<F>(&self, task: F) -> std::result::Result<(), SubmitError<F>>
    where
        F: FnOnce() + Send + 'static,
    {
        let shared = &self.shared;
        let deadline = Instant::now() + shared.config.submit_timeout;
        let mut state = shared.state.lock();

        while state.queue.is_full() && !state.shutdown {
            let timed_out = shared.not_full.wait_until(&mut state, deadline).timed_out();
            if timed_out && state.queue.is_full() && !state.shutdown {
                warn!(
                    "Task queue still full after {:?}, rejecting task",
                    shared.config.submit_timeout
                );
                return Err(SubmitError::Timeout(task));
            }
        }

        if state.shutdown {
            return Err(SubmitError::ShutDown(task));
        }

        state.queue.push(Box::new(task));
        debug!("Task queued ({}/{})", state.queue.len(), state.queue.capacity());
        drop(state);

        shared.not_empty.notify_one();
        Ok(())
    }

    /// Workers currently running a task
    pub fn busy_count(&self) -> usize {
        *self.shared.busy.lock()
    }

    /// Workers currently alive
    pub fn live_count(&self) -> usize {
        self.shared.state.lock().live
    }

    /// Tasks waiting in the queue
    pub fn queued_count(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.state.lock().shutdown
    }

    /// Stop accepting tasks and join every thread
    ///
    /// Tasks still queued are dropped without running. Running tasks are not
    /// interrupted; the call waits for them to return. Later calls are no-ops.
    pub fn shutdown(&self) {
        let manager = match self.manager.lock().take() {
            Some(handle) => handle,
            None => return,
        };

        info!("Shutting down worker pool");

        let dropped = {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
            state.queue.drain()
        };
        if !dropped.is_empty() {
            warn!("Dropping {} queued task(s) that never ran", dropped.len());
        }
        drop(dropped);

        self.shared.manager_wake.notify_all();
        if manager.join().is_err() {
            error!("Pool manager panicked");
        }

        stop_and_join_workers(&self.shared);
        info!("Worker pool shut down");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_worker(shared: &Arc<Shared>, slot: usize) -> std::io::Result<JoinHandle<()>> {
    let worker_shared = Arc::clone(shared);
    thread::Builder::new()
        .name(format!("{}-worker-{}", shared.config.thread_name, slot))
        .spawn(move || worker_loop(worker_shared, slot))
}

/// Flag shutdown, wake everyone, join every registered worker
fn stop_and_join_workers(shared: &Shared) {
    let handles: Vec<(usize, JoinHandle<()>)> = {
        let mut state = shared.state.lock();
        state.shutdown = true;
        state
            .roster
            .iter_mut()
            .enumerate()
            .filter_map(|(slot, handle)| handle.take().map(|h| (slot, h)))
            .collect()
    };

    shared.not_empty.notify_all();
    shared.not_full.notify_all();

    for (slot, handle) in handles {
        match handle.join() {
            Ok(()) => debug!("Worker {} joined", slot),
            Err(_) => error!("Worker {} panicked outside a task", slot),
        }
    }
}

fn worker_loop(shared: Arc<Shared>, slot: usize) {
    debug!("Worker {} started", slot);

    loop {
        let job = {
            let mut state = shared.state.lock();
            loop {
                if state.shutdown {
                    debug!("Worker {} received shutdown signal", slot);
                    return;
                }

                if let Some(job) = state.queue.pop() {
                    break job;
                }

                shared.not_empty.wait(&mut state);

                // Voluntary exit requested by the manager
                if state.pending_exits > 0 && state.queue.is_empty() && !state.shutdown {
                    state.pending_exits -= 1;
                    if state.live > shared.config.min_threads {
                        state.live -= 1;
                        // Detach ourselves; nobody needs to join an idle worker
                        state.roster[slot] = None;
                        debug!("Worker {} exiting ({} live)", slot, state.live);
                        return;
                    }
                }
            }
        };

        shared.not_full.notify_one();

        *shared.busy.lock() += 1;
        debug!("Worker {} starting task", slot);

        if catch_unwind(AssertUnwindSafe(move || job())).is_err() {
            error!("Worker {} task panicked", slot);
        }

        *shared.busy.lock() -= 1;
        debug!("Worker {} finished task", slot);
    }
}

fn manager_loop(shared: Arc<Shared>) {
    let config = &shared.config;
    debug!("Pool manager started (interval {:?})", config.manager_interval);

    loop {
        {
            let deadline = Instant::now() + config.manager_interval;
            let mut state = shared.state.lock();
            while !state.shutdown {
                if shared.manager_wake.wait_until(&mut state, deadline).timed_out() {
                    break;
                }
            }
            if state.shutdown {
                break;
            }
        }

        let (queued, live) = {
            let state = shared.state.lock();
            (state.queue.len(), state.live)
        };
        let busy = *shared.busy.lock();

        debug!("Pool status: {}/{} busy, {} queued", busy, live, queued);

        if queued > live && live < config.max_threads {
            grow(&shared);
        }

        if busy * 2 < live && live > config.min_threads {
            shrink(&shared);
        }
    }

    debug!("Pool manager exiting");
}

fn grow(shared: &Arc<Shared>) {
    let config = &shared.config;
    let mut state = shared.state.lock();
    if state.shutdown {
        return;
    }

    let wanted = config.scale_batch.min(config.max_threads - state.live);
    let mut added = 0;

    for slot in 0..config.max_threads {
        if added >= wanted {
            break;
        }
        if state.roster[slot].is_some() {
            continue;
        }

        match spawn_worker(shared, slot) {
            Ok(handle) => {
                state.roster[slot] = Some(handle);
                state.live += 1;
                added += 1;
            }
            Err(e) => {
                warn!("Failed to start extra worker: {}", e);
                break;
            }
        }
    }

    if added > 0 {
        info!("Pool grew by {} worker(s) to {}", added, state.live);
    }
}

fn shrink(shared: &Shared) {
    let config = &shared.config;
    let exits = {
        let mut state = shared.state.lock();
        if state.shutdown || state.live <= config.min_threads {
            return;
        }
        let exits = config.scale_batch.min(state.live - config.min_threads);
        state.pending_exits = exits;
        exits
    };

    info!("Pool retiring up to {} idle worker(s)", exits);
    for _ in 0..exits {
        shared.not_empty.notify_one();
    }
}
