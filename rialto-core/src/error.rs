//! Error types for the control plane core.

use thiserror::Error;

/// Errors produced by the control plane core.
#[derive(Error, Debug)]
pub enum RialtoError {
    /// The transport channel is not connected and reconnection failed.
    #[error("channel is disconnected")]
    Disconnected,

    /// The server rejected the client's schema version, or vice versa.
    #[error("schema version incompatible: {0}")]
    VersionIncompatible(String),

    /// The server reported a failed RPC, or the completion was never resolved.
    #[error("rpc failed: {0}")]
    RpcFailure(String),

    /// The shared-memory descriptor or size handed back by the server is unusable.
    #[error("invalid shared memory resource: fd={fd} size={size}")]
    InvalidResource { fd: i32, size: u32 },

    /// The OS-level mapping call rejected the request.
    #[error("failed to map shared memory: {0}")]
    MappingFailure(String),

    /// A mandatory event subscription could not be established.
    #[error("failed to establish event subscription: {0}")]
    SubscriptionFailure(String),
}

/// Result type alias using [`RialtoError`].
pub type RialtoResult<T> = Result<T, RialtoError>;
