// Copyright 2020 TiKV Project Authors. Licensed under Apache-2.0.

//! Errors reported by the pool.

use thiserror::Error;

/// The exhaustive set of failures a pool operation can report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum Error {
    /// A pre-bound task pool was built without a task function.
    ///
    /// Reserved for func-pool front ends; the plain pool never reports it.
    #[error("must provide a task function for the pool")]
    LackPoolFunc,

    /// Reserved. Non-positive capacities normalize to unbounded instead.
    #[error("invalid pool capacity")]
    InvalidPoolSize,

    /// Reserved. Expiry durations are unsigned; a zero duration selects
    /// the default instead.
    #[error("invalid pool expiry")]
    InvalidPoolExpiry,

    /// `pre_alloc` requires a bounded capacity to size the ring.
    #[error("can not pre-allocate an unbounded pool")]
    InvalidPreAllocSize,

    /// The operation was attempted against a closed pool.
    #[error("the pool has been closed")]
    PoolClosed,

    /// No worker is available and the configured policy forbids waiting
    /// for one.
    #[error("too many submitters blocked, or nonblocking is set")]
    PoolOverload,

    /// `release_with_timeout` gave up before the pool quiesced.
    #[error("operation timed out")]
    Timeout,
}
