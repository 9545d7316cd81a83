//! Client-side control plane for a split-process media pipeline.
//!
//! Binds a client process to its server: handshake, application-state machine, shared-memory
//! lifecycle, liveness (ping/ack) and schema-version negotiation. Everything else a client needs
//! (media playback, key sessions, capability queries) is a straightforward RPC veneer over the
//! types in this crate and is out of scope here.
//!
//! The public API is synchronous by design (see [`transport::CallWaiter`]); a concrete transport
//! such as `rialto-transport-unix` supplies whatever async or thread-based machinery it needs to
//! present that contract.

pub mod controller;
pub mod dispatcher;
pub mod error;
pub mod facade;
pub mod session;
pub mod shm;
pub mod state;
pub mod transport;
pub mod version;

pub use controller::{ClientController, ClientListener};
pub use dispatcher::EventDispatcher;
pub use error::{RialtoError, RialtoResult};
pub use facade::ControlFacade;
pub use session::{ControlIpcSession, SessionListener};
pub use shm::SharedMemoryHandle;
pub use state::ApplicationState;
pub use transport::{call_completion, CallCompletion, CallWaiter, EventHandler, TransportChannel};
pub use version::SchemaVersion;
