//! Error types for the game client. Every variant ends the session.

use shared::{FramerError, ProtocolError};
use std::io;
use std::net::SocketAddr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("cannot resolve {host}:{port}: {source}")]
    Resolve {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },
    #[error("no address of the requested family for {host}:{port}")]
    NoAddress { host: String, port: u16 },
    #[error("cannot connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("invalid message from {peer}: `{line}`: {source}")]
    Protocol {
        peer: SocketAddr,
        line: String,
        #[source]
        source: ProtocolError,
    },
    #[error("bad input from {peer}: {source}")]
    Framer {
        peer: SocketAddr,
        #[source]
        source: FramerError,
    },
    #[error("{peer} closed the connection before SCORING")]
    UnexpectedDisconnect { peer: SocketAddr },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
