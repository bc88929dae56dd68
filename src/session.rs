// Grounded on scaproust's SocketImpl (src/socket_impl.rs) ready-dispatch
// loop, generalised from mio tokens to the transport substrate's
// `transport::Token`. A `SessionHandler` implementation supplies the
// protocol-specific sockets/timers and reacts to operations and readiness;
// `SessionRunner` owns the generic receive-dispatch-poll loop around it.

use std::sync::mpsc;
use std::time::Duration;

use crate::error::Result;
use crate::event::Event;
use crate::operation::Operation;
use crate::runner::{EvtSender, OpReceiver};
use crate::transport::{Poller, Token};

/// What a [`SessionHandler`] wants to happen after processing one
/// operation or one ready pollable: keep looping or tear down, plus any
/// events that should be emitted to the owner as a result.
pub struct Outcome {
    pub events: Vec<Event>,
    pub keep_running: bool,
}

impl Outcome {
    pub fn cont() -> Outcome {
        Outcome { events: Vec::new(), keep_running: true }
    }

    pub fn stop() -> Outcome {
        Outcome { events: Vec::new(), keep_running: false }
    }

    pub fn with_event(mut self, event: Event) -> Outcome {
        self.events.push(event);
        self
    }
}

/// Implemented by `BrokerSessionHandler` and `WorkerSessionHandler`.
pub trait SessionHandler {
    /// Applies one operation already confirmed to belong to the current
    /// generation.
    fn operation_ready(&mut self, op: Operation) -> Result<Outcome>;

    /// Registers this handler's sockets/timers/cancellations with `poller`
    /// for this iteration of the loop.
    fn register<'a>(&'a self, poller: &mut Poller<'a>);

    /// Reacts to one pollable (identified by the token it was registered
    /// under) becoming ready.
    fn socket_ready(&mut self, token: Token) -> Result<Outcome>;
}

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Drives a `SessionHandler` to completion on the session thread: drains
/// pending operations (applying the token filter described by
/// [`crate::runner::Runner`]), then polls for protocol activity, in a loop
/// until a `Stop` operation is handled.
pub struct SessionRunner<H: SessionHandler> {
    op_rx: OpReceiver,
    evt_tx: EvtSender,
    finish_tx: mpsc::Sender<()>,
    token: u8,
    handler: H,
}

impl<H: SessionHandler> SessionRunner<H> {
    pub fn new(op_rx: OpReceiver, evt_tx: EvtSender, finish_tx: mpsc::Sender<()>, token: u8, handler: H) -> Self {
        SessionRunner { op_rx, evt_tx, finish_tx, token, handler }
    }

    fn emit(&self, event: Event) {
        if self.evt_tx.send((self.token, event)).is_err() {
            log::error!("owner is gone, could not deliver event");
        }
    }

    fn apply(&self, outcome: Outcome) -> bool {
        for event in outcome.events {
            self.emit(event);
        }
        outcome.keep_running
    }

    pub fn run(mut self) {
        let mut stop = false;
        while !stop {
            loop {
                match self.op_rx.try_recv() {
                    Ok((token, op)) if token == self.token => match self.handler.operation_ready(op) {
                        Ok(outcome) => stop = !self.apply(outcome),
                        Err(e) => log::warn!("operation failed: {e}"),
                    },
                    Ok(_) => {
                        log::debug!("discarding operation from a stale generation");
                    }
                    Err(mpsc::TryRecvError::Empty) => break,
                    Err(mpsc::TryRecvError::Disconnected) => {
                        stop = true;
                        break;
                    }
                }
                if stop {
                    break;
                }
            }
            if stop {
                break;
            }

            let mut poller = Poller::new();
            self.handler.register(&mut poller);
            match poller.wait(POLL_INTERVAL) {
                Ok(ready) => {
                    for token in ready {
                        match self.handler.socket_ready(token) {
                            Ok(outcome) => stop = !self.apply(outcome) || stop,
                            Err(e) => log::warn!("socket ready handling failed: {e}"),
                        }
                    }
                }
                Err(e) => log::error!("poll failed: {e}"),
            }
        }

        if self.finish_tx.send(()).is_err() {
            log::error!("owner is gone, could not send finish ack");
        }
    }
}
