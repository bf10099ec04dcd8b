// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

use super::{QueueError, WorkerQueue};
use crate::pool::worker::Worker;
use crate::time::CoarseInstant;
use std::time::Duration;

/// LIFO container backed by a growable vector.
///
/// Workers are appended in the order they are parked, which keeps the
/// vector sorted by `last_active`: the stale sweep is a binary search for
/// the end of the expired prefix.
pub(crate) struct Stack {
    items: Vec<Worker>,
    released: bool,
}

impl Stack {
    pub(crate) fn new() -> Stack {
        Stack {
            items: Vec::new(),
            released: false,
        }
    }
}

impl WorkerQueue for Stack {
    fn len(&self) -> usize {
        self.items.len()
    }

    fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn insert(&mut self, w: Worker) -> Result<(), QueueError> {
        if self.released {
            return Err(QueueError::Released);
        }
        self.items.push(w);
        Ok(())
    }

    fn detach(&mut self) -> Option<Worker> {
        self.items.pop()
    }

    fn refresh(&mut self, duration: Duration) -> Vec<Worker> {
        if self.items.is_empty() {
            return Vec::new();
        }
        let horizon = CoarseInstant::now().saturating_sub(duration);
        let stale = self.items.partition_point(|w| w.last_active <= horizon);
        self.items.drain(..stale).collect()
    }

    fn reset(&mut self) {
        for w in self.items.drain(..) {
            w.finish();
        }
        self.released = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::worker::Task;
    use crossbeam_channel::{bounded, Receiver};
    use std::thread;
    use std::time::Duration;

    fn parked_worker() -> (Worker, Receiver<Option<Task>>) {
        let (tx, rx) = bounded(1);
        (Worker::new(tx), rx)
    }

    #[test]
    fn test_new_stack() {
        let mut s = Stack::new();
        assert_eq!(s.len(), 0);
        assert!(s.is_empty());
        assert!(s.detach().is_none());
    }

    #[test]
    fn test_detach_is_lifo() {
        let mut s = Stack::new();
        let (first, _rx1) = parked_worker();
        thread::sleep(Duration::from_millis(30));
        let (second, _rx2) = parked_worker();
        let latest = second.last_active;

        s.insert(first).unwrap();
        s.insert(second).unwrap();
        assert_eq!(s.len(), 2);

        let w = s.detach().unwrap();
        assert_eq!(w.last_active, latest);
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn test_refresh_removes_sorted_prefix() {
        let mut s = Stack::new();
        let mut receivers = Vec::new();
        for _ in 0..3 {
            let (w, rx) = parked_worker();
            receivers.push(rx);
            s.insert(w).unwrap();
        }
        thread::sleep(Duration::from_millis(150));
        for _ in 0..2 {
            let (w, rx) = parked_worker();
            receivers.push(rx);
            s.insert(w).unwrap();
        }

        let stale = s.refresh(Duration::from_millis(100));
        assert_eq!(stale.len(), 3);
        assert_eq!(s.len(), 2);
        // The sweep returns the oldest workers in insertion order.
        for pair in stale.windows(2) {
            assert!(pair[0].last_active <= pair[1].last_active);
        }
        let newest_stale = stale.last().unwrap().last_active;
        assert!(s.detach().unwrap().last_active > newest_stale);
    }

    #[test]
    fn test_refresh_keeps_fresh_workers() {
        let mut s = Stack::new();
        let (w, _rx) = parked_worker();
        s.insert(w).unwrap();
        assert!(s.refresh(Duration::from_secs(3600)).is_empty());
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn test_reset_terminates_and_releases() {
        let mut s = Stack::new();
        let (w1, rx1) = parked_worker();
        let (w2, rx2) = parked_worker();
        s.insert(w1).unwrap();
        s.insert(w2).unwrap();

        s.reset();
        assert!(s.is_empty());
        assert!(matches!(rx1.try_recv(), Ok(None)));
        assert!(matches!(rx2.try_recv(), Ok(None)));

        let (w3, _rx3) = parked_worker();
        assert_eq!(s.insert(w3), Err(QueueError::Released));
    }
}
