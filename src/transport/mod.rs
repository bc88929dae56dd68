//! Transport substrate: typed sockets, a poller that folds in timers and
//! cancellations, and the draft ZeroMQ socket kinds (`CLIENT`/`SERVER`,
//! `RADIO`/`DISH`) the protocol layer is built on.

pub mod socket;
pub mod timer;

pub use socket::{Socket, SocketKind};
pub use timer::{Cancellation, Timer};

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Shared libzmq context. One per `Runner`/`Session` pair, handed to every
/// socket they open.
#[derive(Clone)]
pub struct Context {
    inner: Arc<zmq::Context>,
}

impl Context {
    pub fn new() -> Context {
        Context { inner: Arc::new(zmq::Context::new()) }
    }

    pub fn raw(&self) -> &zmq::Context {
        &self.inner
    }
}

impl Default for Context {
    fn default() -> Context {
        Context::new()
    }
}

/// Identifies one entry registered with a [`Poller`], so `wait` can report
/// back which of the caller's sockets/timers/cancellations became ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token(pub usize);

enum Entry<'a> {
    Socket(Token, &'a Socket),
    Timer(Token, &'a Timer),
    Cancellation(Token, &'a Cancellation),
}

/// Waits across a mix of real sockets and wall-clock timers/cancellations
/// in one call, the way the draft ZeroMQ poller waits across a mix of
/// socket kinds.
///
/// Real sockets are waited on with `zmq::poll`; timers and cancellations
/// are plain deadlines, so the poller clamps the requested timeout to
/// whichever deadline is soonest and checks them again after `zmq::poll`
/// returns.
pub struct Poller<'a> {
    entries: Vec<Entry<'a>>,
}

impl<'a> Poller<'a> {
    pub fn new() -> Poller<'a> {
        Poller { entries: Vec::new() }
    }

    pub fn add_socket(&mut self, token: Token, socket: &'a Socket) -> &mut Self {
        self.entries.push(Entry::Socket(token, socket));
        self
    }

    pub fn add_timer(&mut self, token: Token, timer: &'a Timer) -> &mut Self {
        self.entries.push(Entry::Timer(token, timer));
        self
    }

    pub fn add_cancellation(&mut self, token: Token, cancellation: &'a Cancellation) -> &mut Self {
        self.entries.push(Entry::Cancellation(token, cancellation));
        self
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.entries
            .iter()
            .filter_map(|e| match e {
                Entry::Timer(_, t) => t.deadline(),
                Entry::Cancellation(_, c) => c.deadline(),
                Entry::Socket(..) => None,
            })
            .min()
    }

    /// Blocks up to `timeout`, returning the tokens that became ready.
    /// An empty result means the wait timed out with nothing ready.
    pub fn wait(&self, timeout: Duration) -> Result<Vec<Token>> {
        let now = Instant::now();
        let clamped = match self.next_deadline() {
            Some(d) if d <= now => Duration::from_millis(0),
            Some(d) => std::cmp::min(timeout, d - now),
            None => timeout,
        };

        let mut items: Vec<zmq::PollItem> = Vec::new();
        let mut item_tokens: Vec<Token> = Vec::new();
        for entry in &self.entries {
            if let Entry::Socket(token, socket) = entry {
                items.push(socket.raw().as_poll_item(zmq::POLLIN));
                item_tokens.push(*token);
            }
        }

        let millis = clamped.as_millis().min(i64::MAX as u128) as i64;
        let n = zmq::poll(&mut items, millis).map_err(Error::Poller)?;

        let mut ready = Vec::new();
        if n > 0 {
            for (item, token) in items.iter().zip(item_tokens.iter()) {
                if item.is_readable() {
                    ready.push(*token);
                }
            }
        }

        for entry in &self.entries {
            match entry {
                Entry::Timer(token, timer) => {
                    if timer.poll_expired() {
                        ready.push(*token);
                    }
                }
                Entry::Cancellation(token, cancellation) => {
                    if cancellation.is_cancelled() {
                        ready.push(*token);
                    }
                }
                Entry::Socket(..) => {}
            }
        }

        Ok(ready)
    }
}

impl<'a> Default for Poller<'a> {
    fn default() -> Self {
        Poller::new()
    }
}
