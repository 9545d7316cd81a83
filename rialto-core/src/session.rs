//! Control-IPC Session: the per-client RPC stub owning the control handle and event
//! subscriptions. Grounded on the source's `ControlIpc`.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, Weak};

use serde::{Deserialize, Serialize};

use crate::dispatcher::EventDispatcher;
use crate::error::{RialtoError, RialtoResult};
use crate::state::ApplicationState;
use crate::transport::{call_completion, EventHandler, TransportChannel};
use crate::version::SchemaVersion;

const EVENT_APPLICATION_STATE_CHANGED: &str = "applicationStateChangeEvent";
const EVENT_PING: &str = "pingEvent";
const NO_CONTROL_HANDLE: i32 = -1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterClientRequest {
    pub client_schema_version: SchemaVersion,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterClientResponse {
    pub control_handle: i32,
    #[serde(default)]
    pub server_schema_version: Option<SchemaVersion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetSharedMemoryResponse {
    pub fd: i32,
    pub size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckRequest {
    pub control_handle: i32,
    pub id: u32,
}

/// The wire spelling of [`ApplicationState`]; kept separate so the server's vocabulary (which may
/// grow) doesn't leak into the state machine's own type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WireApplicationState {
    Running,
    Inactive,
    Unknown,
}

impl From<WireApplicationState> for ApplicationState {
    fn from(value: WireApplicationState) -> Self {
        match value {
            WireApplicationState::Running => ApplicationState::Running,
            WireApplicationState::Inactive => ApplicationState::Inactive,
            WireApplicationState::Unknown => ApplicationState::Unknown,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationStateChangeEvent {
    pub application_state: WireApplicationState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingEvent {
    pub control_handle: i32,
    pub id: u32,
}

/// Receives the session's translated notifications. Implemented by [`crate::controller::ClientController`].
pub trait SessionListener: Send + Sync {
    fn notify_application_state(&self, state: ApplicationState);

    /// Optional liveness hook, fired alongside the automatic ack. Default no-op.
    fn ping(&self, _id: u32) {}
}

pub struct ControlIpcSession {
    channel: Arc<dyn TransportChannel>,
    dispatcher: Arc<EventDispatcher>,
    listener: Weak<dyn SessionListener>,
    client_version: SchemaVersion,
    control_handle: AtomicI32,
    state_sub: Mutex<Option<i64>>,
    ping_sub: Mutex<Option<i64>>,
}

impl ControlIpcSession {
    /// Subscribes to both mandatory events as part of construction; if either subscription
    /// fails, whatever was already acquired is released and construction fails.
    pub fn new(
        channel: Arc<dyn TransportChannel>,
        dispatcher: Arc<EventDispatcher>,
        listener: Weak<dyn SessionListener>,
        client_version: SchemaVersion,
    ) -> RialtoResult<Arc<Self>> {
        let session = Arc::new(Self {
            channel,
            dispatcher,
            listener,
            client_version,
            control_handle: AtomicI32::new(NO_CONTROL_HANDLE),
            state_sub: Mutex::new(None),
            ping_sub: Mutex::new(None),
        });
        session.clone().subscribe_events()?;
        Ok(session)
    }

    fn subscribe_events(self: Arc<Self>) -> RialtoResult<()> {
        let state_handler: EventHandler = {
            let this = self.clone();
            Box::new(move |payload| this.clone().on_application_state_event(payload))
        };
        let state_id = self.channel.subscribe(EVENT_APPLICATION_STATE_CHANGED, state_handler);
        if state_id < 0 {
            return Err(RialtoError::SubscriptionFailure(EVENT_APPLICATION_STATE_CHANGED.into()));
        }

        let ping_handler: EventHandler = {
            let this = self.clone();
            Box::new(move |payload| this.clone().on_ping_event(payload))
        };
        let ping_id = self.channel.subscribe(EVENT_PING, ping_handler);
        if ping_id < 0 {
            self.channel.unsubscribe(state_id);
            return Err(RialtoError::SubscriptionFailure(EVENT_PING.into()));
        }

        *self.state_sub.lock().unwrap() = Some(state_id);
        *self.ping_sub.lock().unwrap() = Some(ping_id);
        Ok(())
    }

    fn resubscribe(self: &Arc<Self>) -> RialtoResult<()> {
        if let Some(id) = self.state_sub.lock().unwrap().take() {
            self.channel.unsubscribe(id);
        }
        if let Some(id) = self.ping_sub.lock().unwrap().take() {
            self.channel.unsubscribe(id);
        }
        self.clone().subscribe_events()
    }

    fn ensure_connected(self: &Arc<Self>) -> RialtoResult<()> {
        if self.channel.is_connected() {
            return Ok(());
        }
        if !self.channel.reconnect() {
            return Err(RialtoError::Disconnected);
        }
        self.resubscribe()
    }

    /// Sends the client's schema version, records the server's control handle, and returns
    /// whether the server considered the versions compatible.
    pub fn register_client(self: &Arc<Self>) -> RialtoResult<bool> {
        self.ensure_connected()?;

        let request = RegisterClientRequest { client_schema_version: self.client_version };
        let payload = serde_json::to_value(&request).map_err(|e| RialtoError::RpcFailure(e.to_string()))?;
        let (completion, waiter) = call_completion();
        self.channel.call_method("registerClient", payload, completion);
        let raw = waiter.wait().map_err(RialtoError::RpcFailure)?;
        let response: RegisterClientResponse =
            serde_json::from_value(raw).map_err(|e| RialtoError::RpcFailure(e.to_string()))?;

        match response.server_schema_version {
            Some(server_version) if !self.client_version.is_compatible(&server_version) => {
                tracing::error!(
                    client = %self.client_version,
                    server = %server_version,
                    "schema version incompatible"
                );
                return Ok(false);
            }
            Some(server_version) if server_version != self.client_version => {
                tracing::warn!(
                    client = %self.client_version,
                    server = %server_version,
                    "schema version differs but is compatible"
                );
            }
            Some(_) => {}
            None => tracing::warn!("server did not report a schema version; assuming compatible"),
        }

        self.control_handle.store(response.control_handle, Ordering::SeqCst);
        Ok(true)
    }

    pub fn get_shared_memory(self: &Arc<Self>) -> RialtoResult<(i32, u32)> {
        self.ensure_connected()?;
        let (completion, waiter) = call_completion();
        self.channel.call_method("getSharedMemory", serde_json::Value::Null, completion);
        let raw = waiter.wait().map_err(RialtoError::RpcFailure)?;
        let response: GetSharedMemoryResponse =
            serde_json::from_value(raw).map_err(|e| RialtoError::RpcFailure(e.to_string()))?;
        Ok((response.fd, response.size))
    }

    pub fn ack(self: &Arc<Self>, id: u32) -> RialtoResult<()> {
        self.ensure_connected()?;
        let control_handle = self.control_handle.load(Ordering::SeqCst);
        let request = AckRequest { control_handle, id };
        let payload = serde_json::to_value(&request).map_err(|e| RialtoError::RpcFailure(e.to_string()))?;
        let (completion, waiter) = call_completion();
        self.channel.call_method("ack", payload, completion);
        waiter.wait().map_err(RialtoError::RpcFailure)?;
        Ok(())
    }

    fn on_application_state_event(self: Arc<Self>, payload: Arc<serde_json::Value>) {
        let event: ApplicationStateChangeEvent = match serde_json::from_value((*payload).clone()) {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(error = %err, "malformed application state change event");
                return;
            }
        };
        // This can arrive before registerClient's response, so the control handle is
        // intentionally not checked here.
        let state: ApplicationState = event.application_state.into();
        let listener = self.listener.clone();
        self.dispatcher.add(move || {
            if let Some(listener) = listener.upgrade() {
                listener.notify_application_state(state);
            }
        });
    }

    fn on_ping_event(self: Arc<Self>, payload: Arc<serde_json::Value>) {
        let event: PingEvent = match serde_json::from_value((*payload).clone()) {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(error = %err, "malformed ping event");
                return;
            }
        };
        let stored = self.control_handle.load(Ordering::SeqCst);
        if event.control_handle != stored {
            tracing::warn!(expected = stored, got = event.control_handle, "dropping ping for stale control handle");
            return;
        }
        let listener = self.listener.clone();
        let this = self.clone();
        self.dispatcher.add(move || {
            if let Some(listener) = listener.upgrade() {
                listener.ping(event.id);
            }
            if let Err(err) = this.ack(event.id) {
                tracing::error!(error = %err, "failed to ack ping");
            }
        });
    }
}

impl Drop for ControlIpcSession {
    fn drop(&mut self) {
        if let Some(id) = self.state_sub.lock().unwrap().take() {
            self.channel.unsubscribe(id);
        }
        if let Some(id) = self.ping_sub.lock().unwrap().take() {
            self.channel.unsubscribe(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct RecordingListener {
        states: StdMutex<Vec<ApplicationState>>,
        pings: StdMutex<Vec<u32>>,
    }

    impl RecordingListener {
        fn new() -> Arc<Self> {
            Arc::new(Self { states: StdMutex::new(Vec::new()), pings: StdMutex::new(Vec::new()) })
        }
    }

    impl SessionListener for RecordingListener {
        fn notify_application_state(&self, state: ApplicationState) {
            self.states.lock().unwrap().push(state);
        }
        fn ping(&self, id: u32) {
            self.pings.lock().unwrap().push(id);
        }
    }

    /// A transport double good enough to drive session-level scenarios without any sockets.
    struct MockChannel {
        connected: std::sync::atomic::AtomicBool,
        reconnect_succeeds: std::sync::atomic::AtomicBool,
        state_handler: Mutex<Option<EventHandler>>,
        ping_handler: Mutex<Option<EventHandler>>,
        register_response: Mutex<Option<serde_json::Value>>,
        shm_response: Mutex<Option<serde_json::Value>>,
        acked: StdMutex<Vec<u32>>,
        next_sub_id: std::sync::atomic::AtomicI64,
    }

    impl MockChannel {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                connected: std::sync::atomic::AtomicBool::new(true),
                reconnect_succeeds: std::sync::atomic::AtomicBool::new(true),
                state_handler: Mutex::new(None),
                ping_handler: Mutex::new(None),
                register_response: Mutex::new(None),
                shm_response: Mutex::new(None),
                acked: StdMutex::new(Vec::new()),
                next_sub_id: std::sync::atomic::AtomicI64::new(1),
            })
        }

        fn fire_state_change(&self, state: WireApplicationState) {
            let handler = self.state_handler.lock().unwrap();
            let handler = handler.as_ref().expect("no state subscriber registered");
            let event = ApplicationStateChangeEvent { application_state: state };
            handler(Arc::new(serde_json::to_value(event).unwrap()));
        }

        fn fire_ping(&self, control_handle: i32, id: u32) {
            let handler = self.ping_handler.lock().unwrap();
            let handler = handler.as_ref().expect("no ping subscriber registered");
            let event = PingEvent { control_handle, id };
            handler(Arc::new(serde_json::to_value(event).unwrap()));
        }
    }

    impl TransportChannel for MockChannel {
        fn call_method(&self, method: &str, request: serde_json::Value, completion: crate::transport::CallCompletion) {
            match method {
                "registerClient" => {
                    let response = self
                        .register_response
                        .lock()
                        .unwrap()
                        .clone()
                        .unwrap_or_else(|| serde_json::json!({"control_handle": 1}));
                    completion.resolve(response);
                }
                "getSharedMemory" => {
                    let response = self
                        .shm_response
                        .lock()
                        .unwrap()
                        .clone()
                        .unwrap_or_else(|| serde_json::json!({"fd": 42, "size": 456}));
                    completion.resolve(response);
                }
                "ack" => {
                    let request: AckRequest = serde_json::from_value(request).unwrap();
                    self.acked.lock().unwrap().push(request.id);
                    completion.resolve(serde_json::Value::Null);
                }
                other => completion.reject(format!("unknown method {other}")),
            }
        }

        fn subscribe(&self, event_name: &str, handler: EventHandler) -> i64 {
            match event_name {
                EVENT_APPLICATION_STATE_CHANGED => *self.state_handler.lock().unwrap() = Some(handler),
                EVENT_PING => *self.ping_handler.lock().unwrap() = Some(handler),
                _ => return -1,
            }
            self.next_sub_id.fetch_add(1, Ordering::SeqCst)
        }

        fn unsubscribe(&self, _subscription_id: i64) -> bool {
            true
        }

        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        fn reconnect(&self) -> bool {
            let ok = self.reconnect_succeeds.load(Ordering::SeqCst);
            if ok {
                self.connected.store(true, Ordering::SeqCst);
            }
            ok
        }
    }

    fn new_session(channel: Arc<MockChannel>, listener: Arc<RecordingListener>) -> Arc<ControlIpcSession> {
        let dispatcher = Arc::new(EventDispatcher::new("test-session-dispatcher"));
        ControlIpcSession::new(channel, dispatcher, Arc::downgrade(&listener) as Weak<dyn SessionListener>, SchemaVersion::CURRENT)
            .unwrap()
    }

    #[test]
    fn register_client_stores_control_handle_and_accepts_equal_version() {
        let channel = MockChannel::new();
        let listener = RecordingListener::new();
        let session = new_session(channel.clone(), listener);
        assert!(session.register_client().unwrap());
        assert_eq!(session.control_handle.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn register_client_accepts_compatible_minor_version() {
        let channel = MockChannel::new();
        *channel.register_response.lock().unwrap() =
            Some(serde_json::json!({"control_handle": 7, "server_schema_version": {"major":1,"minor":5,"patch":7}}));
        let listener = RecordingListener::new();
        let session = new_session(channel, listener);
        assert!(session.register_client().unwrap());
    }

    #[test]
    fn register_client_rejects_incompatible_major_version() {
        let channel = MockChannel::new();
        *channel.register_response.lock().unwrap() =
            Some(serde_json::json!({"control_handle": 7, "server_schema_version": {"major":2,"minor":0,"patch":0}}));
        let listener = RecordingListener::new();
        let session = new_session(channel, listener);
        assert!(!session.register_client().unwrap());
    }

    #[test]
    fn register_client_accepts_missing_version_with_warning() {
        let channel = MockChannel::new();
        *channel.register_response.lock().unwrap() = Some(serde_json::json!({"control_handle": 3}));
        let listener = RecordingListener::new();
        let session = new_session(channel, listener);
        assert!(session.register_client().unwrap());
    }

    #[test]
    fn ping_with_matching_handle_triggers_ack() {
        let channel = MockChannel::new();
        let listener = RecordingListener::new();
        let session = new_session(channel.clone(), listener.clone());
        session.register_client().unwrap();

        channel.fire_ping(1, 8);
        // give the dispatcher thread a moment to drain
        std::thread::sleep(std::time::Duration::from_millis(50));

        assert_eq!(*channel.acked.lock().unwrap(), vec![8]);
        assert_eq!(*listener.pings.lock().unwrap(), vec![8]);
    }

    #[test]
    fn ping_with_stale_handle_is_dropped() {
        let channel = MockChannel::new();
        let listener = RecordingListener::new();
        let session = new_session(channel.clone(), listener.clone());
        session.register_client().unwrap();

        channel.fire_ping(999, 8);
        std::thread::sleep(std::time::Duration::from_millis(50));

        assert!(channel.acked.lock().unwrap().is_empty());
        assert!(listener.pings.lock().unwrap().is_empty());
    }

    #[test]
    fn state_change_reaches_listener_regardless_of_control_handle() {
        let channel = MockChannel::new();
        let listener = RecordingListener::new();
        let session = new_session(channel.clone(), listener.clone());
        // No registration yet; event still reaches the listener since state-change
        // notifications are not gated on a valid control handle.
        channel.fire_state_change(WireApplicationState::Running);
        std::thread::sleep(std::time::Duration::from_millis(50));

        assert_eq!(*listener.states.lock().unwrap(), vec![ApplicationState::Running]);
    }
}
