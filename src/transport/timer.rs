// Grounded on the teacher's poller timeout handling, reworked as a plain
// wall-clock deadline since this runtime's poller has no self-pipe to
// fold a timer tick into.

use std::cell::Cell;
use std::time::{Duration, Instant};

/// A pollable wall-clock timer, single-shot or periodic.
///
/// `start`/`stop` (re)arm or cancel it; [`Poller::wait`](super::Poller::wait)
/// consults [`Timer::deadline`] to decide how long it may block, and
/// [`Timer::poll_expired`] both reports and consumes a fired tick.
pub struct Timer {
    interval: Duration,
    periodic: bool,
    deadline: Cell<Option<Instant>>,
}

impl Timer {
    pub fn new(interval: Duration, periodic: bool) -> Timer {
        Timer { interval, periodic, deadline: Cell::new(None) }
    }

    pub fn is_active(&self) -> bool {
        self.deadline.get().is_some()
    }

    pub fn start(&self) {
        self.deadline.set(Some(Instant::now() + self.interval));
    }

    /// Restarts the timer only if it isn't already counting down, mirroring
    /// the original's `if (!timer->isActive()) timer->start();` guard used
    /// to avoid resetting an in-flight keepalive window.
    pub fn start_if_not_active(&self) {
        if !self.is_active() {
            self.start();
        }
    }

    pub fn stop(&self) {
        self.deadline.set(None);
    }

    pub(super) fn deadline(&self) -> Option<Instant> {
        self.deadline.get()
    }

    /// Returns `true` exactly once per expiry: if the deadline has passed,
    /// consumes it (rearming for periodic timers) and reports expired.
    pub(super) fn poll_expired(&self) -> bool {
        match self.deadline.get() {
            Some(d) if d <= Instant::now() => {
                if self.periodic {
                    self.deadline.set(Some(Instant::now() + self.interval));
                } else {
                    self.deadline.set(None);
                }
                true
            }
            _ => false,
        }
    }
}

/// A pollable one-shot: once triggered it stays signalled forever. An
/// optional deadline auto-triggers it without an explicit `cancel()` call.
pub struct Cancellation {
    cancelled: Cell<bool>,
    deadline: Cell<Option<Instant>>,
}

impl Cancellation {
    pub fn new() -> Cancellation {
        Cancellation { cancelled: Cell::new(false), deadline: Cell::new(None) }
    }

    pub fn with_deadline(timeout: Duration) -> Cancellation {
        Cancellation { cancelled: Cell::new(false), deadline: Cell::new(Some(Instant::now() + timeout)) }
    }

    pub fn cancel(&self) {
        self.cancelled.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.cancelled.get() {
            return true;
        }
        if let Some(d) = self.deadline.get() {
            if d <= Instant::now() {
                self.cancelled.set(true);
                return true;
            }
        }
        false
    }

    pub(super) fn deadline(&self) -> Option<Instant> {
        if self.cancelled.get() {
            None
        } else {
            self.deadline.get()
        }
    }
}

impl Default for Cancellation {
    fn default() -> Cancellation {
        Cancellation::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_shot_timer_fires_once() {
        let t = Timer::new(Duration::from_millis(1), false);
        t.start();
        std::thread::sleep(Duration::from_millis(5));
        assert!(t.poll_expired());
        assert!(!t.is_active());
    }

    #[test]
    fn periodic_timer_rearms_after_firing() {
        let t = Timer::new(Duration::from_millis(1), true);
        t.start();
        std::thread::sleep(Duration::from_millis(5));
        assert!(t.poll_expired());
        assert!(t.is_active());
    }

    #[test]
    fn start_if_not_active_does_not_reset_a_running_timer() {
        let t = Timer::new(Duration::from_secs(10), false);
        t.start();
        let first = t.deadline();
        t.start_if_not_active();
        assert_eq!(first, t.deadline());
    }

    #[test]
    fn cancellation_with_deadline_self_triggers() {
        let c = Cancellation::with_deadline(Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(5));
        assert!(c.is_cancelled());
    }
}
