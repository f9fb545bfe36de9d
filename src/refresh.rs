//! Cooperative periodic-refresh scheduling.
//!
//! The client is single threaded: refreshes are driven by whoever owns the
//! loop calling [`RefreshTimer::try_begin`] on each pass. A tick that fires
//! while a refresh is still in flight is dropped, not queued, so a slow
//! supervisor never builds a backlog of stale refreshes.

use log::debug;
use std::time::{Duration, Instant};

/// Fixed-interval timer with in-flight suppression.
#[derive(Debug)]
pub struct RefreshTimer {
    interval: Duration,
    next_due: Option<Instant>,
    in_flight: bool,
}

impl RefreshTimer {
    /// A timer that is due immediately and then every `interval`.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_due: None,
            in_flight: false,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Claim the tick at `now`. Returns false when the interval has not
    /// elapsed or a refresh is already in flight (the tick is dropped).
    /// A true return must be paired with [`complete`](Self::complete).
    pub fn try_begin(&mut self, now: Instant) -> bool {
        if self.in_flight {
            debug!("refresh tick dropped: previous refresh still in flight");
            return false;
        }
        if let Some(due) = self.next_due {
            if now < due {
                return false;
            }
        }
        self.in_flight = true;
        true
    }

    /// Mark the running refresh finished and schedule the next interval
    /// from `now` (not from the nominal due time, so a slow refresh does
    /// not cause an immediate re-fire).
    pub fn complete(&mut self, now: Instant) {
        self.in_flight = false;
        self.next_due = Some(now + self.interval);
    }
}
