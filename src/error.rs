use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use thiserror::Error;

/// Failure to establish or use a transport connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("failed to connect to {addr}: {source}")]
    Connect { addr: String, source: io::Error },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// The peer sent something that is not a valid single-message exchange.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("peer closed the connection before sending a message")]
    Closed,

    #[error("malformed frame: {0}")]
    Frame(io::Error),

    #[error("undecodable payload: {0}")]
    Payload(#[from] bincode::Error),

    #[error("action code {0:?} is not a number")]
    NotANumber(String),

    #[error("invalid action code {0}, expected 1-7")]
    InvalidAction(u8),
}

/// The command executor could not produce output for an action.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("failed to start `{program}`: {source}")]
    Spawn { program: String, source: io::Error },

    #[error("failed waiting for `{program}`: {source}")]
    Wait { program: String, source: io::Error },

    #[error("`{program}` exited abnormally ({status})")]
    Exited { program: String, status: ExitStatus },

    #[error("{0}")]
    Other(String),
}

/// Everything that can abort a single connection task.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),
}
