//! Errors internal to the Unix-socket transport. Deliberately separate from
//! `rialto_core::RialtoError` — the session layer adapts these into its own behaviour.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("not connected")]
    NotConnected,
}

pub type TransportResult<T> = Result<T, TransportError>;
