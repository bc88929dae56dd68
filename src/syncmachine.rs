// Grounded on fuurin's SyncMachine (src/syncmachine.cpp): drives a
// snapshot download with failover across `max_index + 1` redundant
// snapshot endpoints and up to `max_retry` retries per cycle.

use std::time::Duration;

use crate::transport::Timer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Halted,
    Download,
    Synced,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyType {
    Snapshot,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyResult {
    Accepted,
    Discarded,
    Unexpected,
}

/// Callbacks a `SyncMachine` user supplies to open/close snapshot endpoints
/// and issue requests, mirroring `sessionworker.cpp`'s `snapClose`/
/// `snapOpen`/`sendSync`/`onSyncChanged` split. `index == -1` means "no
/// endpoint" (used when there's nothing to close/open yet).
pub trait SyncObserver {
    fn close(&mut self, index: i32);
    fn open(&mut self, index: i32);
    fn sync(&mut self, index: i32, seq_num: u64);
    fn on_change(&mut self, state: State);
}

pub struct SyncMachine {
    state: State,
    max_index: i32,
    max_retry: u32,
    current_index: i32,
    next_index: i32,
    retry_count: u32,
    seq_num: u64,
    timeout: Timer,
}

impl SyncMachine {
    pub fn new(max_index: i32, max_retry: u32, timeout_interval: Duration) -> SyncMachine {
        SyncMachine {
            state: State::Halted,
            max_index,
            max_retry,
            current_index: 0,
            next_index: Self::advance(0, max_index),
            retry_count: 0,
            seq_num: 0,
            timeout: Timer::new(timeout_interval, false),
        }
    }

    fn advance(index: i32, max_index: i32) -> i32 {
        (index + 1) % (max_index + 1)
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn current_index(&self) -> i32 {
        self.current_index
    }

    pub fn seq_num(&self) -> u64 {
        self.seq_num
    }

    pub fn timeout_timer(&self) -> &Timer {
        &self.timeout
    }

    fn change(&mut self, state: State, obs: &mut dyn SyncObserver) {
        if self.state != state {
            self.state = state;
            obs.on_change(state);
        }
    }

    pub fn on_sync(&mut self, obs: &mut dyn SyncObserver) {
        match self.state {
            State::Halted => {
                self.retry_count = 0;
                self.timeout.start();
                obs.open(self.current_index);
                self.seq_num += 1;
                obs.sync(self.current_index, self.seq_num);
                self.change(State::Download, obs);
            }
            State::Failed => {
                self.retry_count = 0;
                self.current_index = self.next_index;
                self.next_index = Self::advance(self.current_index, self.max_index);
                self.timeout.start();
                obs.open(self.current_index);
                self.seq_num += 1;
                obs.sync(self.current_index, self.seq_num);
                self.change(State::Download, obs);
            }
            State::Synced => {
                // Re-syncing from an already-synced state reuses the live
                // connection rather than tearing it down: -1 tells the
                // observer there's nothing to close/open.
                obs.close(-1);
                obs.open(-1);
                self.seq_num += 1;
                obs.sync(self.current_index, self.seq_num);
                self.change(State::Download, obs);
            }
            State::Download => {}
        }
    }

    pub fn on_halt(&mut self, obs: &mut dyn SyncObserver) {
        self.timeout.stop();
        match self.state {
            State::Download | State::Synced => obs.close(self.current_index),
            State::Failed | State::Halted => {}
        }
        self.current_index = 0;
        self.next_index = Self::advance(0, self.max_index);
        self.retry_count = 0;
        self.change(State::Halted, obs);
    }

    pub fn on_timer_timeout_fired(&mut self, obs: &mut dyn SyncObserver) {
        if self.state != State::Download {
            return;
        }
        if self.retry_count + 1 <= self.max_retry {
            self.retry_count += 1;
            let prev = self.current_index;
            self.current_index = self.next_index;
            self.next_index = Self::advance(self.current_index, self.max_index);
            obs.close(prev);
            obs.open(self.current_index);
            self.seq_num += 1;
            obs.sync(self.current_index, self.seq_num);
        } else {
            self.timeout.stop();
            obs.close(self.current_index);
            self.change(State::Failed, obs);
        }
    }

    pub fn on_reply(&mut self, index: i32, seq_num: u64, reply: ReplyType) -> ReplyResult {
        if self.state != State::Download {
            return ReplyResult::Unexpected;
        }
        if index != self.current_index || seq_num != self.seq_num {
            return ReplyResult::Discarded;
        }
        match reply {
            ReplyType::Snapshot => self.timeout.start(),
            ReplyType::Complete => self.timeout.stop(),
        }
        ReplyResult::Accepted
    }

    /// Call after `on_reply` returns `Accepted` for a `Complete` reply to
    /// move the state machine into `Synced`; kept separate from `on_reply`
    /// so the caller can still act on the raw `ReplyResult` first (e.g. to
    /// emit an event) before the state transition fires its own callback.
    pub fn on_reply_complete(&mut self, obs: &mut dyn SyncObserver) {
        self.change(State::Synced, obs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        opened: Vec<i32>,
        closed: Vec<i32>,
        syncs: Vec<(i32, u64)>,
        changes: Vec<State>,
    }

    impl SyncObserver for Recorder {
        fn close(&mut self, index: i32) {
            self.closed.push(index);
        }
        fn open(&mut self, index: i32) {
            self.opened.push(index);
        }
        fn sync(&mut self, index: i32, seq_num: u64) {
            self.syncs.push((index, seq_num));
        }
        fn on_change(&mut self, state: State) {
            self.changes.push(state);
        }
    }

    #[test]
    fn on_sync_from_halted_opens_current_and_downloads() {
        let mut m = SyncMachine::new(1, 1, Duration::from_secs(3));
        let mut r = Recorder::default();
        m.on_sync(&mut r);
        assert_eq!(State::Download, m.state());
        assert_eq!(vec![0], r.opened);
        assert_eq!(vec![(0, 1)], r.syncs);
    }

    #[test]
    fn timeout_failover_advances_to_next_index_until_retry_budget_exhausted() {
        let mut m = SyncMachine::new(1, 1, Duration::from_secs(3));
        let mut r = Recorder::default();
        m.on_sync(&mut r);
        m.on_timer_timeout_fired(&mut r);
        assert_eq!(State::Download, m.state());
        assert_eq!(1, m.current_index());

        m.on_timer_timeout_fired(&mut r);
        assert_eq!(State::Failed, m.state());
    }

    #[test]
    fn reply_with_stale_syncseq_is_discarded() {
        let mut m = SyncMachine::new(0, 0, Duration::from_secs(3));
        let mut r = Recorder::default();
        m.on_sync(&mut r);
        assert_eq!(ReplyResult::Discarded, m.on_reply(0, 999, ReplyType::Snapshot));
        assert_eq!(ReplyResult::Accepted, m.on_reply(0, 1, ReplyType::Snapshot));
    }

    #[test]
    fn complete_reply_moves_to_synced() {
        let mut m = SyncMachine::new(0, 0, Duration::from_secs(3));
        let mut r = Recorder::default();
        m.on_sync(&mut r);
        assert_eq!(ReplyResult::Accepted, m.on_reply(0, 1, ReplyType::Complete));
        m.on_reply_complete(&mut r);
        assert_eq!(State::Synced, m.state());
    }

    #[test]
    fn resync_from_synced_reuses_connection() {
        let mut m = SyncMachine::new(0, 0, Duration::from_secs(3));
        let mut r = Recorder::default();
        m.on_sync(&mut r);
        assert_eq!(ReplyResult::Accepted, m.on_reply(0, 1, ReplyType::Complete));
        m.on_reply_complete(&mut r);
        assert_eq!(State::Synced, m.state());

        m.on_sync(&mut r);
        assert_eq!(State::Download, m.state());
        assert_eq!(vec![-1], r.closed);
        assert_eq!(vec![0, -1], r.opened);
        assert_eq!(vec![(0, 1), (0, 2)], r.syncs);
    }

    #[test]
    fn halt_resets_indices_and_retry_count() {
        let mut m = SyncMachine::new(1, 1, Duration::from_secs(3));
        let mut r = Recorder::default();
        m.on_sync(&mut r);
        m.on_timer_timeout_fired(&mut r);
        m.on_halt(&mut r);
        assert_eq!(State::Halted, m.state());
        assert_eq!(0, m.current_index());
    }
}
