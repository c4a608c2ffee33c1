//! Lifecycle and transport error types.
//!
//! Per-request failures are expressed as [`Fault`](crate::Fault) responses,
//! not as `Error`s. This type surfaces failures of the worker itself:
//! starting twice, a transport that never becomes ready, a lost inbound
//! channel that cannot be re-established.

use std::time::Duration;

use crate::fault::Fault;

/// The error type returned by the server's lifecycle operations.
///
/// `Clone` so one loop outcome can be handed to every caller waiting on it.
#[derive(Clone, Debug, thiserror::Error)]
pub enum Error {
    #[error("server is already running")]
    AlreadyRunning,
    #[error("timed out after {0:?} waiting for transport readiness")]
    ConnectTimeout(Duration),
    #[error("server was stopped before it finished starting")]
    Stopped,
    #[error("transport: {0}")]
    Transport(#[from] TransportError),
    #[error("could not reconnect after inbound channel closed: {0}")]
    Reconnect(#[source] Box<Error>),
}

/// Failures reported by a [`Transport`](crate::Transport).
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,
    #[error("no listener for service {0:?}")]
    NoListener(String),
    #[error("no caller waiting for response {0:?}")]
    NoPendingCall(String),
    #[error("{0}")]
    Other(String),
}

/// Lifecycle errors seen by a client are server faults with an empty detail
/// code, so implementation details do not leak.
impl From<Error> for Fault {
    fn from(err: Error) -> Fault {
        Fault::internal("", err.to_string())
    }
}
