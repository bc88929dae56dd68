use std::io;

use thiserror::Error;

/// Errors produced by the runtime's transport substrate and session machinery.
///
/// Every variant that originates from an OS or libzmq call carries the
/// errno-style code reported by the failing call, so callers that need to
/// branch on it (e.g. retrying on `EAGAIN`) don't have to parse the message.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to create zmq context: {0}")]
    Context(#[source] zmq::Error),

    #[error("failed to create {kind} socket: {source}")]
    Socket {
        kind: &'static str,
        #[source]
        source: zmq::Error,
    },

    #[error("failed to set socket option {option}: {source}")]
    SocketOption {
        option: &'static str,
        #[source]
        source: zmq::Error,
    },

    #[error("failed to bind to '{endpoint}': {source}")]
    Bind {
        endpoint: String,
        #[source]
        source: zmq::Error,
    },

    #[error("failed to connect to '{endpoint}': {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: zmq::Error,
    },

    #[error("send failed: {0}")]
    Send(#[source] zmq::Error),

    #[error("receive failed: {0}")]
    Recv(#[source] zmq::Error),

    #[error("group operation failed: {0}")]
    Group(#[source] zmq::Error),

    #[error("poller error: {0}")]
    Poller(#[source] zmq::Error),

    #[error("malformed message part: {0}")]
    Part(String),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// `true` for errors that represent "would have blocked" rather than a
    /// real failure, so callers on the hot path can treat them as retryable.
    pub fn would_block(&self) -> bool {
        matches!(
            self,
            Error::Send(e) | Error::Recv(e) if *e == zmq::Error::EAGAIN
        )
    }

    pub fn host_unreachable(&self) -> bool {
        matches!(
            self,
            Error::Send(e) if *e == zmq::Error::EHOSTUNREACH
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
