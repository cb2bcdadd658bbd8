//! Rate limiting for repeated diagnostic messages

use std::time::Duration;

use tokio::time::Instant;

/// Interval between diagnostic messages while waiting on a pod
pub const DEFAULT_THROTTLE_INTERVAL: Duration = Duration::from_secs(5);

/// Lets at most one message through per interval
///
/// The first message is held back for one full interval so short waits
/// stay quiet.
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    next_allowed: Instant,
}

impl Throttle {
    /// Create a throttle whose first window opens one interval from now
    pub fn new(interval: Duration) -> Self {
        Self::starting_at(Instant::now(), interval)
    }

    /// Create a throttle anchored at an explicit instant
    pub fn starting_at(now: Instant, interval: Duration) -> Self {
        Self {
            interval,
            next_allowed: now + interval,
        }
    }

    /// Returns true (and closes the window) if a message may be emitted now
    pub fn allow(&mut self) -> bool {
        self.allow_at(Instant::now())
    }

    /// Same as [`Throttle::allow`] with an explicit clock reading
    pub fn allow_at(&mut self, now: Instant) -> bool {
        if now > self.next_allowed {
            self.next_allowed = now + self.interval;
            true
        } else {
            false
        }
    }
}

impl Default for Throttle {
    fn default() -> Self {
        Self::new(DEFAULT_THROTTLE_INTERVAL)
    }
}
