// Copyright 2020 TiKV Project Authors. Licensed under Apache-2.0.

//! A cheap monotonic clock for worker staleness accounting.
//!
//! Idle workers are stamped every time they are parked, so the stamp must
//! be cheap to take and totally ordered. On Linux this reads
//! `CLOCK_MONOTONIC_COARSE`; elsewhere it falls back to the elapsed time
//! since process start.

use std::ops::Sub;
use std::time::Duration;

const NANOSECONDS_PER_SECOND: u32 = 1_000_000_000;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct CoarseInstant {
    sec: u64,
    nsec: u32,
}

impl CoarseInstant {
    #[cfg(not(target_os = "linux"))]
    pub fn now() -> CoarseInstant {
        use lazy_static::lazy_static;

        lazy_static! {
            static ref PROCESS_START: std::time::Instant = std::time::Instant::now();
        }
        let dur = PROCESS_START.elapsed();
        CoarseInstant {
            sec: dur.as_secs(),
            nsec: dur.subsec_nanos(),
        }
    }

    #[cfg(target_os = "linux")]
    pub fn now() -> CoarseInstant {
        let mut t = std::mem::MaybeUninit::uninit();
        let errno = unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC_COARSE, t.as_mut_ptr()) };
        if errno == 0 {
            let t = unsafe { t.assume_init() };
            CoarseInstant {
                sec: t.tv_sec as u64,
                nsec: t.tv_nsec as u32,
            }
        } else {
            panic!("unable to get time, error code: {}", errno);
        }
    }

    pub fn elapsed(&self) -> Duration {
        let n = CoarseInstant::now();
        n.duration_since(*self)
    }

    /// Elapsed time since `i`, saturating to zero when `i` is later.
    pub fn duration_since(&self, i: CoarseInstant) -> Duration {
        if self.sec > i.sec {
            if self.nsec >= i.nsec {
                Duration::new(self.sec - i.sec, self.nsec - i.nsec)
            } else {
                Duration::new(
                    self.sec - i.sec - 1,
                    NANOSECONDS_PER_SECOND - (i.nsec - self.nsec),
                )
            }
        } else if self.sec == i.sec && self.nsec >= i.nsec {
            Duration::new(0, self.nsec - i.nsec)
        } else {
            Duration::new(0, 0)
        }
    }

    /// The instant `dur` before `self`, saturating at the clock epoch.
    ///
    /// Turns an expiry duration into the staleness horizon the idle
    /// containers search for.
    pub fn saturating_sub(&self, dur: Duration) -> CoarseInstant {
        let mut sec = self.sec;
        let mut nsec = self.nsec;
        let dur_sec = dur.as_secs();
        let dur_nsec = dur.subsec_nanos();
        if sec < dur_sec {
            return CoarseInstant { sec: 0, nsec: 0 };
        }
        sec -= dur_sec;
        if nsec < dur_nsec {
            if sec == 0 {
                return CoarseInstant { sec: 0, nsec: 0 };
            }
            sec -= 1;
            nsec += NANOSECONDS_PER_SECOND - dur_nsec;
        } else {
            nsec -= dur_nsec;
        }
        CoarseInstant { sec, nsec }
    }
}

impl Sub<CoarseInstant> for CoarseInstant {
    type Output = Duration;

    fn sub(self, rhs: CoarseInstant) -> Duration {
        self.duration_since(rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_coarse_instant_on_smp() {
        let zero = Duration::from_millis(0);
        let timer = CoarseInstant::now();
        for i in 0..100_000 {
            let now = CoarseInstant::now();
            if i % 100 == 0 {
                thread::yield_now();
            }
            assert!(now.elapsed() >= zero);
        }
        std::thread::sleep(Duration::from_millis(10));
        assert!(timer.elapsed() > zero);
        assert!(CoarseInstant::now().duration_since(timer) > zero);
    }

    #[test]
    fn test_ordering_matches_clock() {
        let earlier = CoarseInstant::now();
        thread::sleep(Duration::from_millis(20));
        let later = CoarseInstant::now();
        assert!(earlier < later);
        assert!(later - earlier >= Duration::from_millis(10));
    }

    #[test]
    fn test_saturating_sub() {
        // Give the clock some room so the horizon is not clamped to the epoch.
        thread::sleep(Duration::from_millis(20));
        let now = CoarseInstant::now();
        let horizon = now.saturating_sub(Duration::from_millis(10));
        assert!(horizon < now);
        assert!(now - horizon >= Duration::from_millis(5));

        // Subtracting more than the clock has seen pins to the epoch.
        let epoch = now.saturating_sub(Duration::from_secs(u64::MAX / 2));
        assert!(epoch <= now);
        assert_eq!(epoch, epoch.saturating_sub(Duration::from_secs(1)));
    }
}
