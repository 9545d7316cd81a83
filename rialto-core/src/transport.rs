//! The duplex channel contract the control plane runs over.
//!
//! Kept deliberately synchronous (see SPEC_FULL §9 "Blocking completion"): the core never awaits
//! anything, it parks the calling thread on a [`CallWaiter`] and lets a channel-owned thread
//! resolve it. A concrete transport (e.g. `rialto-transport-unix`) owns whatever async or
//! thread-based machinery it needs internally; the core only ever sees this trait.

use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError, SyncSender};
use std::sync::Arc;
use std::time::Duration;

/// A duplex connection: issues RPCs, delivers server events, reports connectivity.
pub trait TransportChannel: Send + Sync {
    /// Begin an RPC. `completion` is resolved exactly once, either with the server's response
    /// payload or with a diagnostic string describing the failure.
    fn call_method(&self, method: &str, request: serde_json::Value, completion: CallCompletion);

    /// Subscribe to a named server event. Returns a non-negative subscription id on success, or
    /// a negative value on failure (e.g. the channel is disconnected).
    fn subscribe(&self, event_name: &str, handler: EventHandler) -> i64;

    /// Idempotent: unsubscribing an unknown or already-removed id returns `false`.
    fn unsubscribe(&self, subscription_id: i64) -> bool;

    fn is_connected(&self) -> bool;

    /// Attempt to re-establish the connection. On success, all previous subscription ids are
    /// invalid; callers must resubscribe.
    fn reconnect(&self) -> bool;
}

/// Callback invoked once per inbound event of the subscribed type, in FIFO order relative to
/// other events of that same type.
pub type EventHandler = Box<dyn Fn(Arc<serde_json::Value>) + Send + Sync>;

/// The write side of a blocking RPC completion. Exactly one of `resolve`/`reject` must be called
/// (or the paired [`CallWaiter`] observes a "completion dropped" failure).
pub struct CallCompletion {
    sender: SyncSender<Result<serde_json::Value, String>>,
}

impl CallCompletion {
    pub fn resolve(self, value: serde_json::Value) {
        let _ = self.sender.send(Ok(value));
    }

    pub fn reject(self, reason: impl Into<String>) {
        let _ = self.sender.send(Err(reason.into()));
    }
}

/// The read side of a blocking RPC completion.
pub struct CallWaiter {
    receiver: Receiver<Result<serde_json::Value, String>>,
}

impl CallWaiter {
    /// Block the calling thread until the paired completion resolves.
    pub fn wait(self) -> Result<serde_json::Value, String> {
        self.receiver
            .recv()
            .unwrap_or_else(|_| Err("completion dropped without resolving".to_string()))
    }

    pub fn wait_timeout(self, timeout: Duration) -> Result<serde_json::Value, String> {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err("call timed out".to_string()),
            Err(RecvTimeoutError::Disconnected) => {
                Err("completion dropped without resolving".to_string())
            }
        }
    }
}

/// Construct a linked completion/waiter pair for one in-flight RPC.
pub fn call_completion() -> (CallCompletion, CallWaiter) {
    let (sender, receiver) = sync_channel(1);
    (CallCompletion { sender }, CallWaiter { receiver })
}
