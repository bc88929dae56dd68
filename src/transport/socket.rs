// Grounded on the teacher's socket abstraction, retargeted from mio to the
// draft zmq socket kinds (CLIENT/SERVER/RADIO/DISH) this runtime needs.

use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::part::Part;
use crate::transport::Context;

/// The draft ZeroMQ socket kinds this runtime is built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketKind {
    /// Routing-id addressed request side of the snapshot protocol.
    Client,
    /// Routing-id addressed reply side of the snapshot protocol.
    Server,
    /// Group-addressed fan-out (hugz/updates broker or worker side).
    Radio,
    /// Group-filtered fan-in, the `Radio` peer.
    Dish,
    /// Conflated, capacity-1 out-of-band publish (owner-facing sequence number).
    Push,
    Pull,
}

impl SocketKind {
    fn to_zmq(self) -> zmq::SocketType {
        match self {
            SocketKind::Client => zmq::CLIENT,
            SocketKind::Server => zmq::SERVER,
            SocketKind::Radio => zmq::RADIO,
            SocketKind::Dish => zmq::DISH,
            SocketKind::Push => zmq::PUSH,
            SocketKind::Pull => zmq::PULL,
        }
    }

    fn name(self) -> &'static str {
        match self {
            SocketKind::Client => "CLIENT",
            SocketKind::Server => "SERVER",
            SocketKind::Radio => "RADIO",
            SocketKind::Dish => "DISH",
            SocketKind::Push => "PUSH",
            SocketKind::Pull => "PULL",
        }
    }
}

/// A typed endpoint over the shared context, with the bind-with-retry,
/// group-join, and multi-part send/receive helpers the session layer needs.
pub struct Socket {
    kind: SocketKind,
    inner: zmq::Socket,
}

impl Socket {
    pub fn new(ctx: &Context, kind: SocketKind) -> Result<Socket> {
        let inner = ctx
            .raw()
            .socket(kind.to_zmq())
            .map_err(|source| Error::Socket { kind: kind.name(), source })?;
        Ok(Socket { kind, inner })
    }

    pub fn kind(&self) -> SocketKind {
        self.kind
    }

    pub fn raw(&self) -> &zmq::Socket {
        &self.inner
    }

    pub fn set_conflate(&self, conflate: bool) -> Result<()> {
        self.inner
            .set_conflate(conflate)
            .map_err(|source| Error::SocketOption { option: "conflate", source })
    }

    pub fn set_rcvtimeo(&self, timeout: Duration) -> Result<()> {
        self.inner
            .set_rcvtimeo(timeout.as_millis() as i32)
            .map_err(|source| Error::SocketOption { option: "rcvtimeo", source })
    }

    pub fn set_linger(&self, linger: Duration) -> Result<()> {
        self.inner
            .set_linger(linger.as_millis() as i32)
            .map_err(|source| Error::SocketOption { option: "linger", source })
    }

    /// Binds, retrying on `EADDRINUSE` until `deadline` (useful for tests
    /// that spin up broker/worker pairs back to back on the same port).
    pub fn bind(&self, endpoint: &str, deadline: Duration) -> Result<()> {
        let start = Instant::now();
        loop {
            match self.inner.bind(endpoint) {
                Ok(()) => return Ok(()),
                Err(zmq::Error::EADDRINUSE) if start.elapsed() < deadline => {
                    std::thread::sleep(Duration::from_millis(50));
                }
                Err(source) => {
                    return Err(Error::Bind { endpoint: endpoint.to_string(), source });
                }
            }
        }
    }

    pub fn connect(&self, endpoint: &str) -> Result<()> {
        self.inner
            .connect(endpoint)
            .map_err(|source| Error::Connect { endpoint: endpoint.to_string(), source })
    }

    pub fn last_endpoint(&self) -> Result<String> {
        self.inner
            .get_last_endpoint()
            .map_err(|source| Error::SocketOption { option: "last_endpoint", source })?
            .map_err(|_| Error::Part("last endpoint is not valid utf8".into()))
    }

    pub fn join(&self, group: &str) -> Result<()> {
        self.inner.join(group).map_err(Error::Group)
    }

    pub fn leave(&self, group: &str) -> Result<()> {
        self.inner.leave(group).map_err(Error::Group)
    }

    /// Sends `part` as a group-addressed datagram (RADIO side).
    pub fn send_group(&self, group: &str, part: &Part) -> Result<()> {
        let mut msg = part.to_zmq_message();
        msg.set_group(group).map_err(Error::Group)?;
        self.inner.send(msg, 0).map_err(Error::Send)
    }

    /// Sends `part` to a specific peer (SERVER side reply).
    pub fn send_to(&self, routing_id: u32, part: &Part) -> Result<()> {
        let mut msg = part.to_zmq_message();
        msg.set_routing_id(routing_id).map_err(Error::Send)?;
        self.inner.send(msg, 0).map_err(Error::Send)
    }

    /// Sends `part` to a specific peer without blocking; would-block and
    /// host-unreachable are reported as ordinary errors so callers can
    /// decide whether to abort just this reply or propagate.
    pub fn send_to_nowait(&self, routing_id: u32, part: &Part) -> Result<()> {
        let mut msg = part.to_zmq_message();
        msg.set_routing_id(routing_id).map_err(Error::Send)?;
        self.inner.send(msg, zmq::DONTWAIT).map_err(Error::Send)
    }

    /// Sends on a CLIENT/PUSH socket with no addressing metadata.
    pub fn send(&self, part: &Part) -> Result<()> {
        self.inner.send(part.as_bytes(), 0).map_err(Error::Send)
    }

    pub fn send_nowait(&self, part: &Part) -> Result<()> {
        self.inner.send(part.as_bytes(), zmq::DONTWAIT).map_err(Error::Send)
    }

    /// Receives one frame, returning its payload, originating group (DISH)
    /// and routing id (SERVER), when present.
    pub fn recv(&self) -> Result<(Part, Option<String>, Option<u32>)> {
        let msg = self.inner.recv_msg(0).map_err(Error::Recv)?;
        self.decode(msg)
    }

    pub fn recv_nowait(&self) -> Result<Option<(Part, Option<String>, Option<u32>)>> {
        match self.inner.recv_msg(zmq::DONTWAIT) {
            Ok(msg) => Ok(Some(self.decode(msg)?)),
            Err(zmq::Error::EAGAIN) => Ok(None),
            Err(e) => Err(Error::Recv(e)),
        }
    }

    fn decode(&self, msg: zmq::Message) -> Result<(Part, Option<String>, Option<u32>)> {
        let group = msg.group().map(|s| s.to_string());
        let routing_id = msg.routing_id();
        Ok((Part::from_zmq_message(&msg), group, routing_id))
    }
}
