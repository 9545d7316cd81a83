//! A [`TransportChannel`] over a Unix-domain socket: one background thread per connection reads
//! and dispatches; `call_method`/`subscribe` are plain synchronous bookkeeping from the caller's
//! point of view.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread;

use rialto_core::transport::{CallCompletion, EventHandler, TransportChannel};

use crate::error::TransportError;
use crate::protocol::{WireMessage, WireRequest};
use crate::shm_name::open_named_shm;

/// A pending call's completion, tagged so the reader thread knows whether the raw JSON result
/// needs the shared-memory name→fd translation before it reaches the core.
enum Pending {
    Plain(CallCompletion),
    SharedMemory(CallCompletion),
}

type PendingMap = Arc<Mutex<HashMap<String, Pending>>>;
type SubscriptionMap = Arc<Mutex<HashMap<i64, (String, EventHandler)>>>;

struct Connection {
    writer: UnixStream,
    reader_thread: thread::JoinHandle<()>,
}

/// Concrete [`TransportChannel`] speaking the line-delimited JSON protocol of
/// [`crate::protocol`] over a Unix-domain socket.
pub struct UnixTransportChannel {
    self_weak: Mutex<Weak<Self>>,
    socket_path: PathBuf,
    connection: Mutex<Option<Connection>>,
    pending: PendingMap,
    subscriptions: SubscriptionMap,
    next_sub_id: AtomicI64,
    connected: Arc<AtomicBool>,
}

impl UnixTransportChannel {
    /// Connects to `socket_path` immediately; fails if the initial connection cannot be made.
    pub fn connect(socket_path: impl Into<PathBuf>) -> Result<Arc<Self>, TransportError> {
        let channel = Arc::new(Self {
            self_weak: Mutex::new(Weak::new()),
            socket_path: socket_path.into(),
            connection: Mutex::new(None),
            pending: Arc::new(Mutex::new(HashMap::new())),
            subscriptions: Arc::new(Mutex::new(HashMap::new())),
            next_sub_id: AtomicI64::new(1),
            connected: Arc::new(AtomicBool::new(false)),
        });
        *channel.self_weak.lock().unwrap() = Arc::downgrade(&channel);
        channel.establish()?;
        Ok(channel)
    }

    fn establish(&self) -> Result<(), TransportError> {
        let this = self
            .self_weak
            .lock()
            .unwrap()
            .upgrade()
            .expect("establish() called after the channel was dropped");

        let stream = UnixStream::connect(&self.socket_path)?;
        let writer = stream.try_clone()?;

        let pending = self.pending.clone();
        let connected = self.connected.clone();

        let reader_thread = thread::Builder::new()
            .name("rialto-transport-reader".into())
            .spawn(move || {
                let reader = BufReader::new(stream);
                for line in reader.lines() {
                    let line = match line {
                        Ok(line) => line,
                        Err(err) => {
                            tracing::warn!(error = %err, "transport read failed");
                            break;
                        }
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<WireMessage>(&line) {
                        Ok(WireMessage::Response(response)) => {
                            let Some(slot) = pending.lock().unwrap().remove(&response.id) else {
                                continue;
                            };
                            match (slot, response.error) {
                                (Pending::Plain(completion), Some(err)) => completion.reject(err),
                                (Pending::Plain(completion), None) => {
                                    completion.resolve(response.result.unwrap_or(serde_json::Value::Null))
                                }
                                (Pending::SharedMemory(completion), Some(err)) => completion.reject(err),
                                (Pending::SharedMemory(completion), None) => {
                                    match resolve_shared_memory(response.result.unwrap_or(serde_json::Value::Null)) {
                                        Ok(value) => completion.resolve(value),
                                        Err(err) => completion.reject(err),
                                    }
                                }
                            }
                        }
                        Ok(WireMessage::Event(event)) => this.dispatch_event(&event.event, event.payload),
                        Err(err) => tracing::warn!(error = %err, line, "failed to decode transport message"),
                    }
                }
                connected.store(false, Ordering::SeqCst);
                // Whatever was still in flight loses its completion here; CallWaiter::wait
                // reports that as "completion dropped without resolving".
                pending.lock().unwrap().clear();
            })
            .expect("failed to spawn transport reader thread");

        *self.connection.lock().unwrap() = Some(Connection { writer, reader_thread });
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn dispatch_event(&self, event_name: &str, payload: serde_json::Value) {
        let payload = Arc::new(payload);
        for (name, handler) in self.subscriptions.lock().unwrap().values() {
            if name == event_name {
                handler(payload.clone());
            }
        }
    }
}

fn resolve_shared_memory(result: serde_json::Value) -> Result<serde_json::Value, String> {
    #[derive(serde::Deserialize)]
    struct Raw {
        shm_name: String,
        size: u32,
    }
    let raw: Raw = serde_json::from_value(result).map_err(|e| e.to_string())?;
    let fd = open_named_shm(&raw.shm_name)?;
    Ok(serde_json::json!({ "fd": fd, "size": raw.size }))
}

impl TransportChannel for UnixTransportChannel {
    fn call_method(&self, method: &str, request: serde_json::Value, completion: CallCompletion) {
        let request = WireRequest::new(method, request);
        let line = match request.to_line() {
            Ok(line) => line,
            Err(err) => {
                completion.reject(err.to_string());
                return;
            }
        };

        let mut writer = {
            let guard = self.connection.lock().unwrap();
            match guard.as_ref() {
                Some(connection) => match connection.writer.try_clone() {
                    Ok(writer) => writer,
                    Err(err) => {
                        completion.reject(err.to_string());
                        return;
                    }
                },
                None => {
                    completion.reject("not connected");
                    return;
                }
            }
        };

        let slot = if method == "getSharedMemory" {
            Pending::SharedMemory(completion)
        } else {
            Pending::Plain(completion)
        };
        self.pending.lock().unwrap().insert(request.id.clone(), slot);

        if let Err(err) = writeln!(writer, "{line}") {
            if let Some(slot) = self.pending.lock().unwrap().remove(&request.id) {
                let completion = match slot {
                    Pending::Plain(c) | Pending::SharedMemory(c) => c,
                };
                completion.reject(err.to_string());
            }
        }
    }

    fn subscribe(&self, event_name: &str, handler: EventHandler) -> i64 {
        let id = self.next_sub_id.fetch_add(1, Ordering::SeqCst);
        self.subscriptions.lock().unwrap().insert(id, (event_name.to_string(), handler));
        id
    }

    fn unsubscribe(&self, subscription_id: i64) -> bool {
        self.subscriptions.lock().unwrap().remove(&subscription_id).is_some()
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn reconnect(&self) -> bool {
        if let Some(connection) = self.connection.lock().unwrap().take() {
            // The reader thread is blocked in `reader.lines()` on its own fd, a separate
            // duplicate of the same socket description; dropping `writer` alone never wakes it.
            // Shutting the socket down forces that read to return before we join it.
            connection.writer.shutdown(std::net::Shutdown::Both).ok();
            drop(connection.writer);
            let _ = connection.reader_thread.join();
        }
        match self.establish() {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(error = %err, "reconnect failed");
                false
            }
        }
    }
}
