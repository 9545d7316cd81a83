//! Client Controller: the process-wide state machine owning the shared-memory lifecycle and the
//! subscriber set. Grounded on the source's `ClientController`.

use std::sync::{Arc, Mutex, Weak};

use crate::error::{RialtoError, RialtoResult};
use crate::session::{ControlIpcSession, SessionListener};
use crate::shm::SharedMemoryHandle;
use crate::state::ApplicationState;

/// Receives lifecycle notifications. Registered with a [`ClientController`] through a
/// [`crate::facade::ControlFacade`]; held as a weak reference so the controller never keeps a
/// dropped listener alive.
pub trait ClientListener: Send + Sync {
    fn notify_application_state(&self, state: ApplicationState);

    /// Optional liveness hook; must return quickly. Default no-op.
    fn ping(&self, _id: u32) {}
}

struct Inner {
    current_state: ApplicationState,
    registration_required: bool,
    shm_handle: Option<Arc<SharedMemoryHandle>>,
    subscribers: Vec<Weak<dyn ClientListener>>,
}

impl Inner {
    fn new() -> Self {
        Self {
            current_state: ApplicationState::Unknown,
            registration_required: true,
            shm_handle: None,
            subscribers: Vec::new(),
        }
    }

    /// Upgrades every live subscriber and drops expired ones from the set, in one pass.
    fn snapshot_subscribers(&mut self) -> Vec<Arc<dyn ClientListener>> {
        let mut live = Vec::with_capacity(self.subscribers.len());
        self.subscribers.retain(|weak| match weak.upgrade() {
            Some(strong) => {
                live.push(strong);
                true
            }
            None => false,
        });
        live
    }
}

/// The process-wide singleton. One instance is shared by every [`crate::facade::ControlFacade`]
/// in a process; see [`crate::facade`] for how it is constructed and reused.
pub struct ClientController {
    session: Mutex<Option<Arc<ControlIpcSession>>>,
    inner: Mutex<Inner>,
    /// Serializes the check-RPC-clear registration sequence so concurrent callers can't both
    /// observe `registration_required == true` and both issue a `registerClient` RPC.
    registration_gate: Mutex<()>,
}

impl ClientController {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            session: Mutex::new(None),
            inner: Mutex::new(Inner::new()),
            registration_gate: Mutex::new(()),
        })
    }

    pub(crate) fn bind_session(&self, session: Arc<ControlIpcSession>) {
        *self.session.lock().unwrap() = Some(session);
    }

    /// Adds `listener` to the subscriber set, performing the one-time `registerClient` RPC if it
    /// has not yet succeeded. Returns the current application state; the listener is not added
    /// when registration fails.
    pub fn register_client(self: &Arc<Self>, listener: Weak<dyn ClientListener>) -> RialtoResult<ApplicationState> {
        // Held across the whole decide-RPC-clear sequence: whichever caller gets here first does
        // the RPC, everyone else then finds `registration_required` already false.
        let _registration_guard = self.registration_gate.lock().unwrap();
        let needs_registration = self.inner.lock().unwrap().registration_required;

        if needs_registration {
            let session = self.session.lock().unwrap().clone().ok_or(RialtoError::Disconnected)?;
            let accepted = session.register_client()?;
            if !accepted {
                return Err(RialtoError::VersionIncompatible(
                    "server rejected the client's schema version".to_string(),
                ));
            }
            self.inner.lock().unwrap().registration_required = false;
        }

        let mut inner = self.inner.lock().unwrap();
        inner.subscribers.push(listener);
        Ok(inner.current_state)
    }

    /// Returns `false` if `listener` was not present.
    pub fn unregister_client(&self, listener: &Weak<dyn ClientListener>) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.subscribers.len();
        inner.subscribers.retain(|existing| !Weak::ptr_eq(existing, listener));
        inner.subscribers.len() != before
    }

    /// `None` outside `Running`.
    pub fn shared_memory_handle(&self) -> Option<Arc<SharedMemoryHandle>> {
        self.inner.lock().unwrap().shm_handle.clone()
    }

    pub fn current_state(&self) -> ApplicationState {
        self.inner.lock().unwrap().current_state
    }

    fn apply_state_transition(&self, new_state: ApplicationState) {
        let mut inner = self.inner.lock().unwrap();
        if inner.current_state == new_state {
            tracing::debug!(?new_state, "application state unchanged, ignoring");
            return;
        }

        match new_state {
            ApplicationState::Running => {
                let session = match self.session.lock().unwrap().clone() {
                    Some(session) => session,
                    None => {
                        tracing::error!("cannot enter RUNNING without a bound session");
                        return;
                    }
                };
                // Release the lock before the blocking RPC; invariant 4 forbids holding it
                // across anything that can call back into user code or the transport.
                drop(inner);

                let (fd, size) = match session.get_shared_memory() {
                    Ok(pair) => pair,
                    Err(err) => {
                        tracing::error!(error = %err, "failed to fetch shared memory, remaining in prior state");
                        return;
                    }
                };
                let handle = match SharedMemoryHandle::map(fd, size) {
                    Ok(handle) => Arc::new(handle),
                    Err(err) => {
                        tracing::error!(error = %err, "failed to map shared memory, remaining in prior state");
                        return;
                    }
                };

                // Map before notify (invariant 3).
                let mut inner = self.inner.lock().unwrap();
                inner.shm_handle = Some(handle);
                inner.current_state = ApplicationState::Running;
                let listeners = inner.snapshot_subscribers();
                drop(inner);
                for listener in listeners {
                    listener.notify_application_state(ApplicationState::Running);
                }
            }
            ApplicationState::Inactive | ApplicationState::Unknown => {
                inner.current_state = new_state;
                let listeners = inner.snapshot_subscribers();
                drop(inner);
                // Notify before unmap (invariant 2).
                for listener in &listeners {
                    listener.notify_application_state(new_state);
                }
                let mut inner = self.inner.lock().unwrap();
                inner.shm_handle = None;
                if new_state == ApplicationState::Unknown {
                    inner.registration_required = true;
                }
            }
        }
    }

    fn fan_out_ping(&self, id: u32) {
        let listeners = self.inner.lock().unwrap().snapshot_subscribers();
        for listener in listeners {
            listener.ping(id);
        }
    }
}

impl SessionListener for ClientController {
    fn notify_application_state(&self, state: ApplicationState) {
        self.apply_state_transition(state)
    }

    fn ping(&self, id: u32) {
        self.fan_out_ping(id)
    }
}
