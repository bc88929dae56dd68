// Grounded on fuurin's Runner (include/fuurin/runner.h) and scaproust's
// SocketFacade (src/socket_facade.rs): the owner-thread half of the
// facade/backend split. Holds the running flag, the token generation
// counter, and the command/event channels into the session thread.
//
// Unlike the protocol sockets (which must speak real ZeroMQ so several
// processes can take part), the owner<->session seam is in-process only,
// so it is built on `std::sync::mpsc` exactly as scaproust's
// `SocketFacade` talks to its `SocketImpl` backend.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::event::{Event, Notification as EvtNotification};
use crate::id::TokenSource;
use crate::operation::{self, Operation};

pub type OpSender = mpsc::Sender<(u8, Operation)>;
pub type OpReceiver = mpsc::Receiver<(u8, Operation)>;
pub type EvtSender = mpsc::Sender<(u8, Event)>;
pub type EvtReceiver = mpsc::Receiver<(u8, Event)>;

/// Owner-side handle shared by `Broker` and `Worker`. Neither type exposes
/// this directly; they embed it and forward `start`/`stop`/`wait_for_event`
/// after applying their own config validation.
pub struct Runner {
    token_source: TokenSource,
    current_token: u8,
    running: Arc<AtomicBool>,
    op_tx: Option<OpSender>,
    // `mpsc::Receiver` is `!Sync`; the mutex is what lets multiple
    // owner-side threads call `wait_for_event`/`wait_for_event_matching`
    // concurrently against the same runner. Events are still handed out
    // one at a time (whoever holds the lock during `recv_timeout` gets
    // the next one), matching the single-consumer-per-event guarantee.
    evt_rx: Mutex<Option<EvtReceiver>>,
    finish_rx: Option<mpsc::Receiver<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Runner {
    pub fn new() -> Runner {
        Runner {
            token_source: TokenSource::new(),
            current_token: 0,
            running: Arc::new(AtomicBool::new(false)),
            op_tx: None,
            evt_rx: Mutex::new(None),
            finish_rx: None,
            handle: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Bumps the token, spawns `body` on a new thread, and wires up the
    /// command/event/finish channels it receives as arguments. `body` is
    /// expected to construct a session and drive it to completion with
    /// [`crate::session::SessionRunner::run`].
    pub fn start<F>(&mut self, body: F) -> Result<()>
    where
        F: FnOnce(OpReceiver, EvtSender, mpsc::Sender<()>, u8) + Send + 'static,
    {
        if self.is_running() {
            return Err(Error::Protocol("runner is already running".into()));
        }

        let token = self.token_source.next();
        self.current_token = token;

        let (op_tx, op_rx) = mpsc::channel();
        let (evt_tx, evt_rx) = mpsc::channel();
        let (finish_tx, finish_rx) = mpsc::channel();

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);

        let handle = thread::spawn(move || {
            body(op_rx, evt_tx, finish_tx, token);
            running.store(false, Ordering::SeqCst);
        });

        self.op_tx = Some(op_tx);
        *self.evt_rx.lock().unwrap() = Some(evt_rx);
        self.finish_rx = Some(finish_rx);
        self.handle = Some(handle);
        Ok(())
    }

    pub fn send_operation(&self, kind: operation::Type, payload: operation::Payload) -> Result<()> {
        let tx = self
            .op_tx
            .as_ref()
            .ok_or_else(|| Error::Protocol("runner is not running".into()))?;
        tx.send((self.current_token, Operation::new(kind, payload)))
            .map_err(|_| Error::Protocol("session has already exited".into()))
    }

    /// Posts `Stop` and blocks until the session thread acknowledges
    /// completion. Idempotent: returns `false` if nothing was running.
    pub fn stop(&mut self) -> bool {
        if !self.is_running() {
            return false;
        }
        let _ = self.send_operation(operation::Type::Stop, operation::Payload::None);
        if let Some(rx) = self.finish_rx.take() {
            let _ = rx.recv();
        }
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
        self.op_tx = None;
        *self.evt_rx.lock().unwrap() = None;
        true
    }

    /// Blocks for at most `timeout` waiting for the next event. Events
    /// tagged with a stale token (from a previous generation) are
    /// surfaced as `Discard` rather than dropped, so callers can tell the
    /// difference between "nothing happened" and "something happened, but
    /// it doesn't apply anymore". Safe to call from multiple owner-side
    /// threads at once: the lock serialises access to the receiver, so
    /// each event still goes to exactly one caller.
    pub fn wait_for_event(&self, timeout: Duration) -> Event {
        let guard = self.evt_rx.lock().unwrap();
        match &*guard {
            Some(rx) => match rx.recv_timeout(timeout) {
                Ok((token, event)) if token == self.current_token => event,
                Ok(_) => Event::invalid(EvtNotification::Discard),
                Err(_) => Event::invalid(EvtNotification::Timeout),
            },
            None => Event::invalid(EvtNotification::Timeout),
        }
    }

    /// Like [`Runner::wait_for_event`], but keeps discarding events until
    /// one matching `pred` arrives or `timeout` elapses.
    pub fn wait_for_event_matching<P>(&self, timeout: Duration, pred: P) -> Event
    where
        P: Fn(&Event) -> bool,
    {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining.is_zero() {
                return Event::invalid(EvtNotification::Timeout);
            }
            let event = self.wait_for_event(remaining);
            if event.notification() == EvtNotification::Timeout || pred(&event) {
                return event;
            }
        }
    }
}

impl Default for Runner {
    fn default() -> Runner {
        Runner::new()
    }
}

impl Drop for Runner {
    fn drop(&mut self) {
        self.stop();
    }
}
