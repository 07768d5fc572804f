//! Fixed-capacity ring of minute counters for a single tenant.
//!
//! Slot `i` always holds the unique minute `m` in
//! `[start_minute, start_minute + capacity)` with `m mod capacity == i`.
//! Only [`CustomerWindow::record`] moves the ring; reads evaluate the
//! current contents against a caller-supplied "now".

use crate::status::StatusClass;

/// Counters for one calendar minute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MinuteCounter {
    /// Indexed by [`StatusClass::index`]
    pub status: [u64; 4],
    pub total_requests: u64,
    pub total_bytes: u64,
}

impl MinuteCounter {
    pub fn add(&mut self, class: StatusClass, bytes: u64) {
        self.status[class.index()] += 1;
        self.total_requests += 1;
        self.total_bytes = self.total_bytes.saturating_add(bytes);
    }

    pub fn merge(&mut self, other: &MinuteCounter) {
        for (acc, n) in self.status.iter_mut().zip(other.status.iter()) {
            *acc += n;
        }
        self.total_requests += other.total_requests;
        self.total_bytes = self.total_bytes.saturating_add(other.total_bytes);
    }

    pub fn count(&self, class: StatusClass) -> u64 {
        self.status[class.index()]
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Trailing ring of minute counters for one tenant.
#[derive(Debug, Clone)]
pub struct CustomerWindow {
    buckets: Box<[MinuteCounter]>,
    /// Minute epoch of the oldest slot
    start_minute: i64,
}

impl CustomerWindow {
    /// Creates a ring whose newest slot is `now_minute`.
    pub fn new(capacity: usize, now_minute: i64) -> Self {
        let capacity = capacity.max(1);
        Self {
            buckets: vec![MinuteCounter::default(); capacity].into_boxed_slice(),
            start_minute: now_minute - capacity as i64 + 1,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buckets.len()
    }

    pub fn start_minute(&self) -> i64 {
        self.start_minute
    }

    pub fn newest_minute(&self) -> i64 {
        self.start_minute + self.capacity() as i64 - 1
    }

    fn slot(&self, minute: i64) -> usize {
        minute.rem_euclid(self.capacity() as i64) as usize
    }

    /// Counts one request in `minute`.
    ///
    /// Returns `false` (and changes nothing) if the minute is older than the
    /// ring's start.
    pub fn record(&mut self, minute: i64, class: StatusClass, bytes: u64) -> bool {
        if minute < self.start_minute {
            return false;
        }

        self.advance_to(minute);
        let slot = self.slot(minute);
        self.buckets[slot].add(class, bytes);
        true
    }

    /// Slides the ring forward so `minute` is its newest slot.
    fn advance_to(&mut self, minute: i64) {
        let newest = self.newest_minute();
        if minute <= newest {
            return;
        }

        let capacity = self.capacity() as i64;
        if minute - newest >= capacity {
            self.buckets.iter_mut().for_each(MinuteCounter::reset);
        } else {
            for entered in (newest + 1)..=minute {
                let slot = self.slot(entered);
                self.buckets[slot].reset();
            }
        }

        self.start_minute = minute - capacity + 1;
    }

    /// Counter for `minute`, if the ring currently covers it.
    pub fn counter_at(&self, minute: i64) -> Option<&MinuteCounter> {
        if minute < self.start_minute || minute > self.newest_minute() {
            return None;
        }
        Some(&self.buckets[self.slot(minute)])
    }

    /// Sums the `minutes` minutes ending at `now_minute` (inclusive).
    ///
    /// Minutes the ring no longer (or not yet) covers contribute nothing.
    pub fn sum(&self, now_minute: i64, minutes: u32) -> MinuteCounter {
        let mut total = MinuteCounter::default();
        for offset in 0..i64::from(minutes) {
            if let Some(counter) = self.counter_at(now_minute - offset) {
                total.merge(counter);
            }
        }
        total
    }
}
