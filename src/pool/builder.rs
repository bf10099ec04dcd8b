// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

use crate::errors::Error;
use crate::pool::{Pool, PoolCore};
use crate::queue;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

/// Idle workers older than this are reaped when no expiry is configured.
pub const DEFAULT_EXPIRY_DURATION: Duration = Duration::from_secs(1);

/// Invoked with the panic payload when a task aborts unexpectedly.
pub type PanicHandler = Arc<dyn Fn(Box<dyn Any + Send>) + Send + Sync>;

/// Tunable policies of a pool.
///
/// Every field is optional in the sense that its default keeps the
/// original behavior: a blocking pool with an unlimited submitter queue
/// whose idle workers are reaped after one second.
#[derive(Clone)]
pub struct Options {
    /// Idle workers parked longer than this are retired by the reaper. A
    /// zero duration selects [`DEFAULT_EXPIRY_DURATION`].
    pub expiry_duration: Duration,
    /// Park idle workers in a circular buffer pre-sized to the capacity
    /// instead of a growable stack. Requires a bounded capacity.
    pub pre_alloc: bool,
    /// Cap on concurrently blocked submitters; once reached, further
    /// submitters receive [`Error::PoolOverload`]. Zero means unlimited.
    pub max_blocking_tasks: usize,
    /// Never block a submitter; over-capacity submissions fail with
    /// [`Error::PoolOverload`] right away.
    pub nonblocking: bool,
    /// Receives the payload of a panicking task. When unset, panics are
    /// reported through the `log` facade instead.
    pub panic_handler: Option<PanicHandler>,
    /// Do not run the reaper; idle workers live until the pool is
    /// released.
    pub disable_purge: bool,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            expiry_duration: DEFAULT_EXPIRY_DURATION,
            pre_alloc: false,
            max_blocking_tasks: 0,
            nonblocking: false,
            panic_handler: None,
            disable_purge: false,
        }
    }
}

/// A builder for the worker pool.
#[derive(Clone)]
pub struct Builder {
    name_prefix: String,
    capacity: usize,
    stack_size: Option<usize>,
    options: Options,
}

impl Builder {
    /// Create a builder using the given name prefix.
    ///
    /// Worker threads are named after it in the format "prefix-index",
    /// and it labels the pool's metrics.
    pub fn new(name_prefix: impl Into<String>) -> Builder {
        Builder {
            name_prefix: name_prefix.into(),
            capacity: 0,
            stack_size: None,
            options: Options::default(),
        }
    }

    /// Sets the maximum number of workers alive at the same time.
    ///
    /// Zero lifts the ceiling entirely, which is also the default.
    pub fn capacity(&mut self, cap: usize) -> &mut Builder {
        self.capacity = cap;
        self
    }

    /// Sets how long a worker may sit idle before the reaper retires it.
    pub fn expiry_duration(&mut self, d: Duration) -> &mut Builder {
        self.options.expiry_duration = d;
        self
    }

    /// Parks idle workers in a circular buffer pre-sized to the capacity.
    pub fn pre_alloc(&mut self, pre_alloc: bool) -> &mut Builder {
        self.options.pre_alloc = pre_alloc;
        self
    }

    /// Caps the number of submitters allowed to block waiting for a
    /// worker.
    pub fn max_blocking_tasks(&mut self, count: usize) -> &mut Builder {
        self.options.max_blocking_tasks = count;
        self
    }

    /// Makes `schedule` fail fast instead of waiting for a free worker.
    pub fn nonblocking(&mut self, nonblocking: bool) -> &mut Builder {
        self.options.nonblocking = nonblocking;
        self
    }

    /// Routes panicking tasks to `handler` instead of the `log` facade.
    pub fn panic_handler(
        &mut self,
        handler: impl Fn(Box<dyn Any + Send>) + Send + Sync + 'static,
    ) -> &mut Builder {
        self.options.panic_handler = Some(Arc::new(handler));
        self
    }

    /// Disables the staleness reaper.
    pub fn disable_purge(&mut self, disable: bool) -> &mut Builder {
        self.options.disable_purge = disable;
        self
    }

    /// Sets the stack size of the spawned worker threads.
    pub fn stack_size(&mut self, size: usize) -> &mut Builder {
        if size > 0 {
            self.stack_size = Some(size);
        }
        self
    }

    /// Replaces the whole options struct at once.
    ///
    /// Mixing this with the per-field setters is order dependent: the
    /// last writer wins.
    pub fn with_options(&mut self, options: Options) -> &mut Builder {
        self.options = options;
        self
    }

    /// Validates the configuration and spawns the pool.
    ///
    /// The pool starts open with no workers; the first `schedule` calls
    /// spawn them on demand. The reaper starts here unless purging is
    /// disabled.
    pub fn build(&self) -> Result<Pool, Error> {
        let mut options = self.options.clone();
        if !options.disable_purge && options.expiry_duration == Duration::from_secs(0) {
            options.expiry_duration = DEFAULT_EXPIRY_DURATION;
        }
        let capacity = if self.capacity == 0 {
            if options.pre_alloc {
                return Err(Error::InvalidPreAllocSize);
            }
            None
        } else {
            Some(self.capacity)
        };

        let core = Arc::new(PoolCore::new(
            self.name_prefix.clone(),
            capacity,
            self.stack_size,
            queue::build(options.pre_alloc, capacity),
            options,
        ));
        core.start_reaper();
        Ok(Pool { core })
    }
}
