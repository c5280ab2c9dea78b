//! Error types for the game server

use crate::coefficients::CoefficientError;
use shared::{FramerError, ProtocolError};
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Conditions that stop the whole server
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to listen on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Coefficients(#[from] CoefficientError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A message the session state machine refused
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("HELLO from a session that already said HELLO")]
    DuplicateHello,
    #[error("PUT before HELLO")]
    PutBeforeHello,
    #[error("message for a terminated session")]
    Terminated,
    #[error(transparent)]
    Coefficients(#[from] CoefficientError),
}

/// Why a single connection was dropped
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("peer closed the connection")]
    Closed,
    #[error("no HELLO within {0:?}")]
    HelloTimeout(Duration),
    #[error("invalid message `{line}`: {source}")]
    Protocol {
        line: String,
        #[source]
        source: ProtocolError,
    },
    #[error(transparent)]
    Session(SessionError),
    #[error(transparent)]
    Framer(#[from] FramerError),
    #[error("write failed: {0}")]
    Write(io::Error),
    #[error("more than {limit} bytes of unsent output")]
    OutboundFull { limit: usize },
}
