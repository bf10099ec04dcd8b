// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

use crate::pool::PoolCore;
use crate::sync::SpinLock;
use crate::time::CoarseInstant;
use crossbeam_channel::{Receiver, Sender};
use lazy_static::lazy_static;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// A unit of work handed to a worker.
pub(crate) type Task = Box<dyn FnOnce() + Send + 'static>;

/// Both halves of a worker's task rendezvous.
pub(crate) type TaskChannel = (Sender<Option<Task>>, Receiver<Option<Task>>);

lazy_static! {
    /// Capacity of the task rendezvous, decided once per process. A
    /// single-CPU host gets a true rendezvous, which switches straight
    /// from the sender to the receiver; other hosts get a one-slot buffer
    /// so the sender does not stall on a descheduled worker.
    pub(crate) static ref WORKER_CHAN_CAP: usize = if num_cpus::get() == 1 { 0 } else { 1 };
}

/// The pool-side handle of a worker.
///
/// The handle is what the idle containers store. The thread behind it is
/// reachable only through the rendezvous: a `Some` carries a task, a
/// `None` tells the thread to exit.
pub(crate) struct Worker {
    task_tx: Sender<Option<Task>>,
    /// When this worker was last parked. Written by the pool while it
    /// holds the idle lock, immediately before insertion.
    pub(crate) last_active: CoarseInstant,
}

impl Worker {
    pub(crate) fn new(task_tx: Sender<Option<Task>>) -> Worker {
        Worker {
            task_tx,
            last_active: CoarseInstant::now(),
        }
    }

    /// Hands a task to the worker.
    ///
    /// Must only be called on a worker that was just detached from the
    /// idle container or freshly spawned; such a worker is guaranteed to
    /// still be consuming its rendezvous.
    pub(crate) fn input(&self, task: Task) {
        let sent = self.task_tx.send(Some(task));
        debug_assert!(sent.is_ok(), "task handed to a terminated worker");
    }

    /// Sends the termination sentinel. A worker must receive at most one.
    pub(crate) fn finish(&self) {
        let _ = self.task_tx.send(None);
    }
}

/// A free list of task channels left behind by exited workers, so a spawn
/// can skip re-allocating the rendezvous.
pub(crate) struct WorkerCache {
    channels: SpinLock<Vec<TaskChannel>>,
}

impl WorkerCache {
    pub(crate) fn new() -> WorkerCache {
        WorkerCache {
            channels: SpinLock::new(Vec::new()),
        }
    }

    pub(crate) fn take(&self) -> Option<TaskChannel> {
        self.channels.lock().pop()
    }

    pub(crate) fn put(&self, channel: TaskChannel) {
        self.channels.lock().push(channel);
    }
}

/// The worker thread body.
///
/// Consumes tasks from the rendezvous until the sentinel arrives, a task
/// panics, or the pool refuses to take the worker back. On exit the
/// channel pair is donated to the cache and the pool is told a capacity
/// slot has been freed.
pub(crate) fn run(
    core: Arc<PoolCore>,
    task_tx: Sender<Option<Task>>,
    task_rx: Receiver<Option<Task>>,
) {
    while let Ok(Some(task)) = task_rx.recv() {
        if let Err(cause) = panic::catch_unwind(AssertUnwindSafe(task)) {
            core.handle_task_panic(cause);
            break;
        }
        if !core.return_worker(Worker::new(task_tx.clone())) {
            break;
        }
    }
    core.cache.put((task_tx, task_rx));
    core.on_worker_exit();
}
