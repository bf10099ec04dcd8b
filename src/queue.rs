// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

//! The idle-worker containers.
//!
//! A container parks workers in last-activity order, so the staleness
//! sweep can locate the expired prefix with a binary search. Two
//! structures are available: a growable LIFO stack and a circular buffer
//! pre-sized to the pool capacity.

pub(crate) mod loop_queue;
pub(crate) mod stack;

pub(crate) use self::loop_queue::LoopQueue;
pub(crate) use self::stack::Stack;

use crate::pool::worker::Worker;
use std::time::Duration;
use thiserror::Error;

/// Why a worker could not be parked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub(crate) enum QueueError {
    #[error("the queue is full")]
    Full,
    #[error("the queue has been released")]
    Released,
}

/// A container of idle workers ordered by the time they were parked.
pub(crate) trait WorkerQueue {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool;

    /// Parks `w`. The caller must have stamped `last_active` no earlier
    /// than that of any worker already parked.
    fn insert(&mut self, w: Worker) -> Result<(), QueueError>;

    /// Removes and returns one idle worker, or `None` when empty.
    fn detach(&mut self) -> Option<Worker>;

    /// Removes and returns every worker that has been parked for longer
    /// than `duration`, in insertion order.
    fn refresh(&mut self, duration: Duration) -> Vec<Worker>;

    /// Empties the container, terminating any workers still parked.
    /// Subsequent inserts report [`QueueError::Released`].
    fn reset(&mut self);
}

/// Builds the container matching the pool mode: a pre-sized circular
/// buffer when `pre_alloc` is set and the capacity is bounded, a stack
/// otherwise.
pub(crate) fn build(pre_alloc: bool, capacity: Option<usize>) -> Box<dyn WorkerQueue + Send> {
    match (pre_alloc, capacity) {
        (true, Some(size)) => Box::new(LoopQueue::new(size)),
        _ => Box::new(Stack::new()),
    }
}
