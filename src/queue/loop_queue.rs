// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

use super::{QueueError, WorkerQueue};
use crate::pool::worker::Worker;
use crate::time::CoarseInstant;
use std::time::Duration;

/// Circular buffer of a fixed size, used when the pool pre-allocates its
/// idle slots.
///
/// Insertion happens at `tail` and detachment at `head`, so traversing
/// from `head` to `tail` (modulo the size) yields non-decreasing
/// `last_active` stamps even after the ring has rotated: detach always
/// removes the minimum end and insert always appends the maximum end. The
/// stale sweep exploits that with a binary search over the rotated
/// window.
pub(crate) struct LoopQueue {
    items: Vec<Option<Worker>>,
    head: usize,
    tail: usize,
    size: usize,
    full: bool,
}

impl LoopQueue {
    pub(crate) fn new(size: usize) -> LoopQueue {
        let mut items = Vec::new();
        items.resize_with(size, || None);
        LoopQueue {
            items,
            head: 0,
            tail: 0,
            size,
            full: false,
        }
    }

    /// Finds the true index of the newest worker whose stamp is not after
    /// `horizon`, or `None` when no parked worker is that old.
    fn binary_search(&self, horizon: CoarseInstant) -> Option<usize> {
        if self.is_empty() || horizon < self.items[self.head].as_ref().unwrap().last_active {
            return None;
        }

        // Map the logical window [head, tail) onto [0, n) and run a plain
        // binary search there; only the probe index is translated back.
        let n = self.size as isize;
        let basel = self.head as isize;
        let mut l = 0;
        let mut r = (self.tail as isize - 1 - basel + n) % n;
        while l <= r {
            let mid = l + ((r - l) >> 1);
            let tmid = ((mid + basel + n) % n) as usize;
            if horizon < self.items[tmid].as_ref().unwrap().last_active {
                r = mid - 1;
            } else {
                l = mid + 1;
            }
        }
        Some(((r + basel + n) % n) as usize)
    }
}

impl WorkerQueue for LoopQueue {
    fn len(&self) -> usize {
        if self.size == 0 || self.is_empty() {
            return 0;
        }
        if self.head == self.tail && self.full {
            return self.size;
        }
        if self.tail > self.head {
            self.tail - self.head
        } else {
            self.size - self.head + self.tail
        }
    }

    fn is_empty(&self) -> bool {
        self.head == self.tail && !self.full
    }

    fn insert(&mut self, w: Worker) -> Result<(), QueueError> {
        if self.size == 0 {
            return Err(QueueError::Released);
        }
        if self.full {
            return Err(QueueError::Full);
        }

        self.items[self.tail] = Some(w);
        self.tail += 1;
        if self.tail == self.size {
            self.tail = 0;
        }
        if self.tail == self.head {
            self.full = true;
        }
        Ok(())
    }

    fn detach(&mut self) -> Option<Worker> {
        if self.is_empty() {
            return None;
        }

        let w = self.items[self.head].take();
        self.head += 1;
        if self.head == self.size {
            self.head = 0;
        }
        self.full = false;
        w
    }

    fn refresh(&mut self, duration: Duration) -> Vec<Worker> {
        let horizon = CoarseInstant::now().saturating_sub(duration);
        let index = match self.binary_search(horizon) {
            Some(index) => index,
            None => return Vec::new(),
        };

        // Collect [head ..= index] in logical order; the window may wrap
        // through the end of the ring.
        let mut stale = Vec::new();
        if self.head <= index {
            for i in self.head..=index {
                stale.push(self.items[i].take().unwrap());
            }
        } else {
            for i in self.head..self.size {
                stale.push(self.items[i].take().unwrap());
            }
            for i in 0..=index {
                stale.push(self.items[i].take().unwrap());
            }
        }

        self.head = (index + 1) % self.size;
        if !stale.is_empty() {
            self.full = false;
        }
        stale
    }

    fn reset(&mut self) {
        while let Some(w) = self.detach() {
            w.finish();
        }
        self.items.clear();
        self.size = 0;
        self.head = 0;
        self.tail = 0;
        self.full = false;
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
    fn test_new_queue() {
        let mut q = LoopQueue::new(10);
        assert_eq!(q.len(), 0);
        assert!(q.is_empty());
        assert!(q.detach().is_none());
    }

    #[test]
    fn test_insert_detach_full() {
        let mut q = LoopQueue::new(10);
        let mut receivers = Vec::new();

        for _ in 0..5 {
            let (w, rx) = parked_worker();
            receivers.push(rx);
            q.insert(w).unwrap();
        }
        assert_eq!(q.len(), 5);
        let _ = q.detach();
        assert_eq!(q.len(), 4);

        for _ in 0..6 {
            let (w, rx) = parked_worker();
            receivers.push(rx);
            q.insert(w).unwrap();
        }
        assert_eq!(q.len(), 10);

        let (w, _rx) = parked_worker();
        assert_eq!(q.insert(w), Err(QueueError::Full));
    }

    #[test]
    fn test_refresh_after_wrap() {
        let mut q = LoopQueue::new(10);
        let mut receivers = Vec::new();

        // Fill 8 slots, detach 6, then add 4 more so the window wraps:
        // two old workers sit at indices 6..=7, four fresh ones at
        // 8, 9, 0, 1.
        for _ in 0..8 {
            let (w, rx) = parked_worker();
            receivers.push(rx);
            q.insert(w).unwrap();
        }
        for _ in 0..6 {
            let _ = q.detach();
        }
        thread::sleep(Duration::from_millis(150));
        let boundary = CoarseInstant::now();
        for _ in 0..4 {
            let (w, rx) = parked_worker();
            receivers.push(rx);
            q.insert(w).unwrap();
        }
        assert_eq!(q.len(), 6);

        // The newest not-after-boundary worker is the old one at true
        // index 7.
        assert_eq!(q.binary_search(boundary), Some(7));

        let stale = q.refresh(Duration::from_millis(100));
        assert_eq!(stale.len(), 2);
        for pair in stale.windows(2) {
            assert!(pair[0].last_active <= pair[1].last_active);
        }
        assert_eq!(q.len(), 4);

        // Everything left is fresher than everything removed.
        let newest_stale = stale.last().unwrap().last_active;
        while let Some(w) = q.detach() {
            assert!(w.last_active > newest_stale);
        }
    }

    #[test]
    fn test_refresh_keeps_fresh_workers() {
        let mut q = LoopQueue::new(4);
        let (w, _rx) = parked_worker();
        q.insert(w).unwrap();
        assert!(q.refresh(Duration::from_secs(3600)).is_empty());
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn test_reset_terminates_and_releases() {
        let mut q = LoopQueue::new(4);
        let (w1, rx1) = parked_worker();
        let (w2, rx2) = parked_worker();
        q.insert(w1).unwrap();
        q.insert(w2).unwrap();

        q.reset();
        assert!(q.is_empty());
        assert!(matches!(rx1.try_recv(), Ok(None)));
        assert!(matches!(rx2.try_recv(), Ok(None)));

        let (w3, _rx3) = parked_worker();
        assert_eq!(q.insert(w3), Err(QueueError::Released));
    }
}
