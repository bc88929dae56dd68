// Grounded on fuurin's ConnMachine (src/connmachine.cpp): tracks liveness of
// a peer reachable only through periodic keepalives, with a retry timer
// while unconfirmed and a timeout timer once confirmed.
//
// The distilled spec documents a two-state model (Trying/Stable); the
// original header additionally sketches a Halted state for clean shutdown.
// This implementation keeps the two-state model and folds "halted" into
// simply never starting the timers (see DESIGN.md).

use std::time::Duration;

use crate::error::{Error, Result};
use crate::transport::Timer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Trying,
    Stable,
}

/// Callbacks a `ConnMachine` user supplies to react to reopen/re-ping and
/// state-change requests, mirroring `sessionworker.cpp`'s `connClose`/
/// `connOpen`/`sendAnnounce`/`onConnChanged` split.
pub trait ConnObserver {
    fn do_reset(&mut self);
    fn do_pong(&mut self);
    fn on_change(&mut self, state: State);
}

pub struct ConnMachine {
    state: State,
    retry: Timer,
    timeout: Timer,
}

impl ConnMachine {
    pub fn new(retry_interval: Duration, timeout_interval: Duration) -> ConnMachine {
        ConnMachine {
            state: State::Trying,
            retry: Timer::new(retry_interval, true),
            timeout: Timer::new(timeout_interval, false),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn retry_timer(&self) -> &Timer {
        &self.retry
    }

    pub fn timeout_timer(&self) -> &Timer {
        &self.timeout
    }

    /// Arms the machine: always starts in `Trying`.
    pub fn on_start(&mut self, obs: &mut dyn ConnObserver) {
        self.state = State::Trying;
        self.retry.start();
        self.timeout.start();
        obs.do_reset();
        obs.do_pong();
        obs.on_change(self.state);
    }

    pub fn on_stop(&mut self) {
        self.retry.stop();
        self.timeout.stop();
    }

    /// A keepalive was received from the peer.
    pub fn on_ping(&mut self, obs: &mut dyn ConnObserver) {
        self.retry.stop();
        self.timeout.start();
        if self.state != State::Stable {
            self.state = State::Stable;
            obs.on_change(self.state);
        }
        obs.do_pong();
    }

    pub fn on_timer_retry_fired(&mut self, obs: &mut dyn ConnObserver) -> Result<()> {
        if self.state != State::Trying {
            return Err(Error::Protocol(
                "retry timer fired while connection was stable".into(),
            ));
        }
        obs.do_pong();
        Ok(())
    }

    pub fn on_timer_timeout_fired(&mut self, obs: &mut dyn ConnObserver) {
        self.retry.start();
        self.timeout.start();
        if self.state != State::Trying {
            self.state = State::Trying;
            obs.on_change(self.state);
        }
        obs.do_reset();
        obs.do_pong();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        resets: u32,
        pongs: u32,
        changes: Vec<State>,
    }

    impl ConnObserver for Recorder {
        fn do_reset(&mut self) {
            self.resets += 1;
        }
        fn do_pong(&mut self) {
            self.pongs += 1;
        }
        fn on_change(&mut self, state: State) {
            self.changes.push(state);
        }
    }

    #[test]
    fn starts_in_trying_and_pings_immediately() {
        let mut m = ConnMachine::new(Duration::from_millis(500), Duration::from_secs(3));
        let mut r = Recorder::default();
        m.on_start(&mut r);
        assert_eq!(State::Trying, m.state());
        assert_eq!(1, r.resets);
        assert_eq!(1, r.pongs);
    }

    #[test]
    fn ping_moves_trying_to_stable_once() {
        let mut m = ConnMachine::new(Duration::from_millis(500), Duration::from_secs(3));
        let mut r = Recorder::default();
        m.on_start(&mut r);
        m.on_ping(&mut r);
        assert_eq!(State::Stable, m.state());
        assert_eq!(vec![State::Trying, State::Stable], r.changes);

        m.on_ping(&mut r);
        assert_eq!(vec![State::Trying, State::Stable], r.changes, "no duplicate Stable transition");
    }

    #[test]
    fn timeout_while_stable_falls_back_to_trying() {
        let mut m = ConnMachine::new(Duration::from_millis(500), Duration::from_secs(3));
        let mut r = Recorder::default();
        m.on_start(&mut r);
        m.on_ping(&mut r);
        m.on_timer_timeout_fired(&mut r);
        assert_eq!(State::Trying, m.state());
        assert_eq!(vec![State::Trying, State::Stable, State::Trying], r.changes);
    }

    #[test]
    fn retry_timer_firing_while_stable_is_a_protocol_error() {
        let mut m = ConnMachine::new(Duration::from_millis(500), Duration::from_secs(3));
        let mut r = Recorder::default();
        m.on_start(&mut r);
        m.on_ping(&mut r);
        assert!(m.on_timer_retry_fired(&mut r).is_err());
    }
}
