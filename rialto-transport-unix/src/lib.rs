//! Concrete Unix-domain-socket `TransportChannel` for `rialto-core`.

pub mod client;
pub mod error;
pub mod protocol;
mod shm_name;

pub use client::UnixTransportChannel;
pub use error::{TransportError, TransportResult};
