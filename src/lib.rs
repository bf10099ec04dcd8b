// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

//! Repool is a worker pool that recycles a bounded set of threads across
//! many short-lived tasks.
//!
//! Submitting a task hands it to an idle worker when one is parked, or to
//! a freshly spawned worker while the pool is under its capacity.
//! Once the ceiling is reached, submitters either wait for a worker to
//! come back or fail fast, depending on the configured policy. Workers
//! that stay idle past an expiry duration are retired by a background
//! reaper, so a burst of work does not pin its thread count forever.
//!
//! Tasks are fire-and-forget closures: there is no return value, no
//! cancellation after dispatch and no queue beyond the one-slot
//! rendezvous each worker consumes.
//!
//! ```
//! use repool::Builder;
//! use std::sync::mpsc;
//!
//! let pool = Builder::new("demo").capacity(4).build().unwrap();
//! let (tx, rx) = mpsc::channel();
//! for i in 0..16 {
//!     let tx = tx.clone();
//!     pool.schedule(move || tx.send(i).unwrap()).unwrap();
//! }
//! let sum: i32 = (0..16).map(|_| rx.recv().unwrap()).sum();
//! assert_eq!(sum, (0..16).sum());
//! ```

pub mod errors;
pub mod metrics;
pub mod pool;
pub mod sync;
pub mod time;

mod queue;

pub use crate::errors::Error;
pub use crate::pool::{Builder, Options, PanicHandler, Pool, DEFAULT_EXPIRY_DURATION};
