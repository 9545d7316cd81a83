//! Control Facade: the thin per-client handle user code actually constructs.
//!
//! Holds a strong reference to the listener for as long as the facade lives, so the weak
//! reference the controller stores stays valid; on drop it unregisters.

use std::sync::{Arc, OnceLock, Weak};

use crate::controller::{ClientController, ClientListener};
use crate::dispatcher::EventDispatcher;
use crate::error::RialtoResult;
use crate::session::{ControlIpcSession, SessionListener};
use crate::shm::SharedMemoryHandle;
use crate::state::ApplicationState;
use crate::transport::TransportChannel;
use crate::version::SchemaVersion;

static CONTROLLER: OnceLock<Arc<ClientController>> = OnceLock::new();

/// Returns the process-wide controller, constructing it (and its session, over `channel`) on
/// first use. Subsequent calls ignore `channel`/`client_version` and return the existing
/// instance — matching the "lazily constructed, process-lifetime" singleton described in
/// SPEC_FULL §3/§9.
fn shared_controller(
    channel: Arc<dyn TransportChannel>,
    client_version: SchemaVersion,
) -> RialtoResult<Arc<ClientController>> {
    if let Some(existing) = CONTROLLER.get() {
        return Ok(existing.clone());
    }

    let controller = ClientController::new();
    let dispatcher = Arc::new(EventDispatcher::new("rialto-control-events"));
    let session_listener: Weak<dyn SessionListener> = Arc::downgrade(&controller) as Weak<dyn SessionListener>;
    let session = ControlIpcSession::new(channel, dispatcher, session_listener, client_version)?;
    controller.bind_session(session);

    match CONTROLLER.set(controller.clone()) {
        Ok(()) => Ok(controller),
        // Another thread constructed and installed one first; use that one instead and let ours
        // (and its session) drop.
        Err(_) => Ok(CONTROLLER.get().expect("set failed so a value must be present").clone()),
    }
}

/// Per-client handle to the control plane. Construction registers `listener` with the shared
/// [`ClientController`]; dropping the facade unregisters it.
pub struct ControlFacade {
    controller: Arc<ClientController>,
    listener: Arc<dyn ClientListener>,
}

impl ControlFacade {
    pub fn new(
        channel: Arc<dyn TransportChannel>,
        client_version: SchemaVersion,
        listener: Arc<dyn ClientListener>,
    ) -> RialtoResult<Self> {
        let controller = shared_controller(channel, client_version)?;
        let weak: Weak<dyn ClientListener> = Arc::downgrade(&listener);
        controller.register_client(weak)?;
        Ok(Self { controller, listener })
    }

    pub fn current_state(&self) -> ApplicationState {
        self.controller.current_state()
    }

    pub fn shared_memory(&self) -> Option<Arc<SharedMemoryHandle>> {
        self.controller.shared_memory_handle()
    }
}

impl Drop for ControlFacade {
    fn drop(&mut self) {
        let weak: Weak<dyn ClientListener> = Arc::downgrade(&self.listener);
        self.controller.unregister_client(&weak);
    }
}
