// Copyright 2020 TiKV Project Authors. Licensed under Apache-2.0.

//! Metrics of the worker pool.

use lazy_static::lazy_static;
use prometheus::*;
use std::sync::Mutex;

lazy_static! {
    /// Number of workers currently owned by each pool, idle ones included.
    pub static ref POOL_RUNNING_WORKERS: IntGaugeVec = IntGaugeVec::new(
        new_opts("pool_running_workers", "number of workers owned by the pool"),
        &["name"]
    )
    .unwrap();

    /// Total worker threads spawned by each pool.
    pub static ref POOL_SPAWNED_WORKERS: IntCounterVec = IntCounterVec::new(
        new_opts("pool_spawned_workers", "total worker threads spawned"),
        &["name"]
    )
    .unwrap();

    /// Total idle workers retired by the staleness reaper.
    pub static ref POOL_REAPED_WORKERS: IntCounterVec = IntCounterVec::new(
        new_opts("pool_reaped_workers", "total stale workers reaped"),
        &["name"]
    )
    .unwrap();

    static ref NAMESPACE: Mutex<Option<String>> = Mutex::new(None);
}

/// Sets the namespace used in the metrics. This function should be called before
/// the metrics are used or any pool is created.
///
/// The namespace is missing by default.
pub fn set_namespace(s: Option<impl Into<String>>) {
    *NAMESPACE.lock().unwrap() = s.map(Into::into)
}

fn new_opts(name: &str, help: &str) -> Opts {
    let mut opts = Opts::new(name, help);
    if let Some(ref namespace) = *NAMESPACE.lock().unwrap() {
        opts = opts.namespace(namespace);
    }
    opts
}
