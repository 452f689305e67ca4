//! Trailing-edge debouncing of bursty observation input.
//!
//! Each pair owns one [`Debouncer`]. Every accepted sample (re)schedules a
//! single pending recompute `debounce` after now, so only the most recent
//! sample in a burst is ever acted upon. Handles are generation-counted: a
//! cancelled or superseded schedule can never fire, even if its deadline is
//! checked later.

use chrono::{DateTime, Duration, Utc};

/// A cancellable handle to one scheduled recompute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerHandle {
    generation: u64,
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    handle: TimerHandle,
    fire_at: DateTime<Utc>,
}

/// Per-pair trailing-edge coalescer.
#[derive(Debug, Default)]
pub struct Debouncer {
    generation: u64,
    pending: Option<Pending>,
}

impl Debouncer {
    /// Schedule (or reset) the pending recompute to fire `debounce` from
    /// `now`. Any previously pending schedule is superseded.
    pub fn schedule(&mut self, now: DateTime<Utc>, debounce: Duration) -> TimerHandle {
        self.generation += 1;
        let handle = TimerHandle {
            generation: self.generation,
        };
        self.pending = Some(Pending {
            handle,
            fire_at: now + debounce,
        });
        handle
    }

    /// Cancel the pending recompute, if any, returning its handle.
    pub fn cancel(&mut self) -> Option<TimerHandle> {
        self.pending.take().map(|p| p.handle)
    }

    /// Deadline of the pending recompute, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.pending.map(|p| p.fire_at)
    }

    /// Whether a recompute is pending.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// If the pending recompute is due at `now`, consume and return it.
    pub fn take_due(&mut self, now: DateTime<Utc>) -> Option<TimerHandle> {
        if self.pending.is_some_and(|p| p.fire_at <= now) {
            self.cancel()
        } else {
            None
        }
    }

    /// Whether `handle` is still the live schedule (not superseded or
    /// cancelled).
    #[must_use]
    pub fn is_live(&self, handle: TimerHandle) -> bool {
        self.pending.is_some_and(|p| p.handle == handle)
    }
}
