use std::time::{Duration, Instant};

/// A fixed-period schedule. Ticks are due at `start + n * period`; if the
/// caller falls behind, the next tick is moved to one full period after the
/// late one instead of firing repeatedly to catch up. A tick that would fall
/// beyond the range of `Instant` never fires.
pub struct Interval {
    prev: Instant,
    next: Option<Instant>,
    period: Duration,
}

impl Interval {
    /// Create an interval whose first tick is one period after `start`.
    pub fn new(start: Instant, period: Duration) -> Self {
        Self {
            prev: start,
            next: start.checked_add(period),
            period,
        }
    }

    /// How long until the next tick is due, zero if it already is and
    /// `Duration::MAX` if it never will be.
    pub fn remaining(&self, now: Instant) -> Duration {
        match self.next {
            Some(next) => next.saturating_duration_since(now),
            None => Duration::MAX,
        }
    }

    /// Try to tick the interval forward to the provided instant. Returns the
    /// time since the previous tick if the interval has fired and an error
    /// otherwise.
    pub fn try_wait(&mut self, now: Instant) -> Result<Duration, ()> {
        let Some(due) = self.next else {
            return Err(());
        };

        if now < due {
            return Err(());
        }

        self.next = match due.checked_add(self.period) {
            // check if we have fallen behind
            Some(next) if next > now => Some(next),
            // if we fell behind, don't tick again until the interval has
            // elapsed
            _ => now.checked_add(self.period),
        };

        let elapsed = now - self.prev;

        self.prev = now;

        Ok(elapsed)
    }
}
