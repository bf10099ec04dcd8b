// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

//! The pool coordinator.
//!
//! The pool owns a bounded set of long-lived worker threads. A submitted
//! task is handed to an idle worker when one is parked, to a freshly
//! spawned worker while the capacity allows it, and otherwise the
//! submitter blocks on the pool's condition variable until a worker comes
//! back (unless a non-blocking policy says to fail fast). A background
//! reaper retires workers that stay idle for too long.

mod builder;
pub(crate) mod worker;

pub use self::builder::{Builder, Options, PanicHandler, DEFAULT_EXPIRY_DURATION};

use self::worker::{Worker, WorkerCache, WORKER_CHAN_CAP};
use crate::errors::Error;
use crate::metrics;
use crate::queue::{self, WorkerQueue};
use crate::time::CoarseInstant;
use crossbeam_channel::{select, tick, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use prometheus::{IntCounter, IntGauge};
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// How often `release_with_timeout` re-checks for quiescence.
const RELEASE_TIMEOUT_INTERVAL: Duration = Duration::from_millis(10);

/// A worker pool that recycles its threads.
///
/// Tasks are fire-and-forget closures; concurrency is bounded by the
/// number of workers, not by a task queue. Dropping the pool releases it.
pub struct Pool {
    core: Arc<PoolCore>,
}

impl Pool {
    /// Schedules the task onto some worker.
    ///
    /// Fails with [`Error::PoolClosed`] after [`Pool::release`], and with
    /// [`Error::PoolOverload`] when every worker is busy and the
    /// configured policy forbids waiting for one.
    pub fn schedule(&self, task: impl FnOnce() + Send + 'static) -> Result<(), Error> {
        if self.core.is_closed() {
            return Err(Error::PoolClosed);
        }
        match self.core.get_worker() {
            Some(w) => {
                w.input(Box::new(task));
                Ok(())
            }
            None => Err(Error::PoolOverload),
        }
    }

    /// The worker ceiling, or `None` when unbounded.
    pub fn capacity(&self) -> Option<usize> {
        self.core.capacity
    }

    /// Workers that could still be spawned right now, or `None` when
    /// unbounded.
    pub fn free(&self) -> Option<usize> {
        self.core
            .capacity
            .map(|cap| cap.saturating_sub(self.core.running()))
    }

    /// Workers currently alive, the idle ones included.
    pub fn running(&self) -> usize {
        self.core.running()
    }

    /// Submitters currently blocked waiting for a worker.
    pub fn waiting(&self) -> usize {
        self.core.waiting.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.core.is_closed()
    }

    /// Closes the pool: stops the reaper, terminates every parked worker
    /// and wakes all blocked submitters. Idempotent. Workers busy with a
    /// task exit once the task finishes.
    pub fn release(&self) {
        if self
            .core
            .closed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        // Dropping the stop handle cancels the reaper.
        drop(self.core.reaper_stop.lock().take());
        self.core.idle.lock().reset();
        self.core.cond.notify_all();
    }

    /// Closes the pool and waits until every worker has exited and the
    /// reaper has wound down, or until `timeout` elapses.
    ///
    /// On [`Error::Timeout`] the pool is closed but not quiesced: tasks
    /// still running are not interrupted.
    pub fn release_with_timeout(&self, timeout: Duration) -> Result<(), Error> {
        self.release();
        let deadline = Instant::now() + timeout;
        loop {
            if self.core.running() == 0
                && (self.core.options.disable_purge
                    || self.core.reaper_done.load(Ordering::SeqCst))
            {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Error::Timeout);
            }
            thread::sleep(RELEASE_TIMEOUT_INTERVAL);
        }
    }

    /// Reopens a released pool with a fresh idle container and a fresh
    /// reaper. A no-op when the pool is open. Must not race `release`.
    pub fn reboot(&self) {
        if self
            .core
            .closed
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            *self.core.idle.lock() =
                queue::build(self.core.options.pre_alloc, self.core.capacity);
            self.core.reaper_done.store(false, Ordering::SeqCst);
            self.core.start_reaper();
        }
    }
}

impl Drop for Pool {
    /// Will release the pool if it has not been.
    fn drop(&mut self) {
        self.release();
    }
}

pub(crate) struct PoolCore {
    pub(crate) capacity: Option<usize>,
    running: AtomicUsize,
    waiting: AtomicUsize,
    closed: AtomicBool,
    /// The idle container; its mutex doubles as the monitor for `cond`.
    idle: Mutex<Box<dyn WorkerQueue + Send>>,
    cond: Condvar,
    reaper_stop: Mutex<Option<Sender<()>>>,
    reaper_done: AtomicBool,
    pub(crate) cache: WorkerCache,
    pub(crate) options: Options,
    name: String,
    stack_size: Option<usize>,
    worker_seq: AtomicUsize,
    metrics: PoolMetrics,
}

struct PoolMetrics {
    running: IntGauge,
    spawned: IntCounter,
    reaped: IntCounter,
}

impl PoolMetrics {
    fn new(name: &str) -> PoolMetrics {
        PoolMetrics {
            running: metrics::POOL_RUNNING_WORKERS.with_label_values(&[name]),
            spawned: metrics::POOL_SPAWNED_WORKERS.with_label_values(&[name]),
            reaped: metrics::POOL_REAPED_WORKERS.with_label_values(&[name]),
        }
    }
}

impl PoolCore {
    fn new(
        name: String,
        capacity: Option<usize>,
        stack_size: Option<usize>,
        idle: Box<dyn WorkerQueue + Send>,
        options: Options,
    ) -> PoolCore {
        let metrics = PoolMetrics::new(&name);
        PoolCore {
            capacity,
            running: AtomicUsize::new(0),
            waiting: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            idle: Mutex::new(idle),
            cond: Condvar::new(),
            reaper_stop: Mutex::new(None),
            reaper_done: AtomicBool::new(false),
            cache: WorkerCache::new(),
            options,
            name,
            stack_size,
            worker_seq: AtomicUsize::new(0),
            metrics,
        }
    }

    pub(crate) fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn add_running(&self, delta: isize) {
        let prev = if delta < 0 {
            self.running.fetch_sub(-delta as usize, Ordering::SeqCst)
        } else {
            self.running.fetch_add(delta as usize, Ordering::SeqCst)
        };
        self.metrics.running.set(prev as i64 + delta as i64);
    }

    /// Acquires a worker for one task: a parked one when available, a
    /// fresh one while under capacity, otherwise per the blocking policy.
    fn get_worker(self: &Arc<Self>) -> Option<Worker> {
        let mut idle = self.idle.lock();
        loop {
            if let Some(w) = idle.detach() {
                drop(idle);
                return Some(w);
            }
            if self.capacity.map_or(true, |cap| self.running() < cap) {
                drop(idle);
                return Some(self.spawn_worker());
            }
            if self.options.nonblocking {
                return None;
            }
            let max_blocking = self.options.max_blocking_tasks;
            if max_blocking > 0 && self.waiting.load(Ordering::SeqCst) >= max_blocking {
                return None;
            }
            self.waiting.fetch_add(1, Ordering::SeqCst);
            self.cond.wait(&mut idle);
            self.waiting.fetch_sub(1, Ordering::SeqCst);
            if self.is_closed() {
                return None;
            }
        }
    }

    /// Spawns a worker thread and returns its handle. The running count
    /// is raised before the thread starts.
    fn spawn_worker(self: &Arc<Self>) -> Worker {
        let (task_tx, task_rx) = self
            .cache
            .take()
            .unwrap_or_else(|| crossbeam_channel::bounded(*WORKER_CHAN_CAP));
        let w = Worker::new(task_tx.clone());
        self.add_running(1);
        self.metrics.spawned.inc();
        let name = format!(
            "{}-{}",
            self.name,
            self.worker_seq.fetch_add(1, Ordering::Relaxed)
        );
        let mut thread_builder = thread::Builder::new().name(name);
        if let Some(size) = self.stack_size {
            thread_builder = thread_builder.stack_size(size);
        }
        let core = self.clone();
        thread_builder
            .spawn(move || worker::run(core, task_tx, task_rx))
            .unwrap();
        w
    }

    /// Parks a worker that finished its task. Returns false when the
    /// worker must terminate instead: the pool closed, the capacity has
    /// been overshot, or the container refused it.
    pub(crate) fn return_worker(&self, mut w: Worker) -> bool {
        if self.is_closed() || self.capacity.map_or(false, |cap| self.running() > cap) {
            self.cond.notify_all();
            return false;
        }
        let mut idle = self.idle.lock();
        if self.is_closed() {
            return false;
        }
        // Stamped under the lock so insertion order matches stamp order.
        w.last_active = CoarseInstant::now();
        if idle.insert(w).is_err() {
            return false;
        }
        // An idle worker is also a running one.
        debug_assert!(idle.len() <= self.running());
        self.cond.notify_one();
        true
    }

    /// Called by a worker thread on its way out.
    pub(crate) fn on_worker_exit(&self) {
        self.add_running(-1);
        // The empty lock section fences a submitter that has checked the
        // running count but not parked on the condvar yet.
        drop(self.idle.lock());
        self.cond.notify_one();
    }

    pub(crate) fn handle_task_panic(&self, cause: Box<dyn Any + Send>) {
        if let Some(handler) = &self.options.panic_handler {
            handler(cause);
        } else {
            log::error!("worker exits from task panic: {}", panic_payload(&*cause));
        }
    }

    fn start_reaper(self: &Arc<Self>) {
        if self.options.disable_purge {
            return;
        }
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(0);
        *self.reaper_stop.lock() = Some(stop_tx);
        let core = self.clone();
        thread::Builder::new()
            .name(format!("{}-reaper", self.name))
            .spawn(move || core.reap_stale_workers(stop_rx))
            .unwrap();
    }

    /// Ticks every expiry period, pulling stale workers out of the idle
    /// container and terminating them.
    fn reap_stale_workers(&self, stop: Receiver<()>) {
        let ticker = tick(self.options.expiry_duration);
        loop {
            select! {
                recv(stop) -> _ => break,
                recv(ticker) -> _ => {
                    if self.is_closed() {
                        break;
                    }
                    let stale = self.idle.lock().refresh(self.options.expiry_duration);
                    if stale.is_empty() {
                        continue;
                    }
                    self.metrics.reaped.inc_by(stale.len() as u64);
                    // The sentinel send can block on a busy rendezvous, so
                    // the idle lock must already be released here.
                    for w in stale {
                        w.finish();
                    }
                }
            }
        }
        self.reaper_done.store(true, Ordering::SeqCst);
    }
}

fn panic_payload(cause: &(dyn Any + Send)) -> &str {
    cause
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| cause.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("opaque panic payload")
}
