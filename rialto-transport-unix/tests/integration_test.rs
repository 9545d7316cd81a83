//! End-to-end round trip over a real Unix-domain socket: a hand-rolled server speaking the wire
//! protocol in `rialto_transport_unix::protocol`, driving a real `rialto_core` facade through the
//! lifecycle scenarios named in SPEC_FULL §8.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rialto_core::{ApplicationState, ClientListener, ControlFacade, SchemaVersion};
use rialto_transport_unix::protocol::{WireEvent, WireRequest};
use rialto_transport_unix::UnixTransportChannel;

struct TestServer {
    stream: Mutex<UnixStream>,
    shm_name: String,
}

impl TestServer {
    fn spawn(listener: UnixListener, shm_name: String) -> Arc<Self> {
        let (stream, _) = listener.accept().unwrap();
        Arc::new(Self { stream: Mutex::new(stream), shm_name })
    }

    fn run_request_loop(self: &Arc<Self>) {
        let reader_stream = self.stream.lock().unwrap().try_clone().unwrap();
        let this = self.clone();
        std::thread::spawn(move || {
            let reader = BufReader::new(reader_stream);
            for line in reader.lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                let request: WireRequest = serde_json::from_str(&line).unwrap();
                let result = match request.method.as_str() {
                    "registerClient" => serde_json::json!({"control_handle": 77}),
                    "getSharedMemory" => serde_json::json!({"shm_name": this.shm_name, "size": 128}),
                    "ack" => serde_json::Value::Null,
                    other => panic!("unexpected method {other}"),
                };
                this.send_line(&serde_json::json!({"id": request.id, "result": result}).to_string());
            }
        });
    }

    fn send_line(&self, line: &str) {
        let mut stream = self.stream.lock().unwrap();
        writeln!(stream, "{line}").unwrap();
    }

    fn send_event(&self, event: WireEvent) {
        self.send_line(&event.to_line().unwrap());
    }
}

struct RecordingListener {
    states: Mutex<Vec<ApplicationState>>,
    pings: AtomicUsize,
}

impl RecordingListener {
    fn new() -> Arc<Self> {
        Arc::new(Self { states: Mutex::new(Vec::new()), pings: AtomicUsize::new(0) })
    }
}

impl ClientListener for RecordingListener {
    fn notify_application_state(&self, state: ApplicationState) {
        self.states.lock().unwrap().push(state);
    }

    fn ping(&self, _id: u32) {
        self.pings.fetch_add(1, Ordering::SeqCst);
    }
}

fn create_named_shm(name: &str, size: usize) {
    use std::ffi::CString;
    let c_name = CString::new(name).unwrap();
    unsafe {
        let fd = libc::shm_open(c_name.as_ptr(), libc::O_CREAT | libc::O_RDWR, 0o600);
        assert!(fd >= 0);
        libc::ftruncate(fd, size as libc::off_t);
        libc::close(fd);
    }
}

fn unlink_named_shm(name: &str) {
    use std::ffi::CString;
    let c_name = CString::new(name).unwrap();
    unsafe {
        libc::shm_unlink(c_name.as_ptr());
    }
}

#[test]
fn lifecycle_happy_path_over_a_real_socket() {
    let dir = tempfile::tempdir().unwrap();
    let socket_path = dir.path().join("rialto.sock");
    let shm_name = format!("/rialto-it-{}", std::process::id());
    create_named_shm(&shm_name, 128);

    let listener = UnixListener::bind(&socket_path).unwrap();
    let (server_tx, server_rx) = std::sync::mpsc::channel();
    let accept_shm_name = shm_name.clone();
    std::thread::spawn(move || {
        let server = TestServer::spawn(listener, accept_shm_name);
        server.run_request_loop();
        let _ = server_tx.send(server);
    });

    let channel = UnixTransportChannel::connect(&socket_path).unwrap();
    let server = server_rx.recv().unwrap();
    let listener = RecordingListener::new();
    let facade = ControlFacade::new(channel, SchemaVersion::CURRENT, listener.clone()).unwrap();

    assert_eq!(facade.current_state(), ApplicationState::Unknown);

    server.send_event(WireEvent {
        event: "applicationStateChangeEvent".into(),
        payload: serde_json::json!({"application_state": "INACTIVE"}),
    });
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(listener.states.lock().unwrap().last(), Some(&ApplicationState::Inactive));

    server.send_event(WireEvent {
        event: "applicationStateChangeEvent".into(),
        payload: serde_json::json!({"application_state": "RUNNING"}),
    });
    std::thread::sleep(Duration::from_millis(150));
    assert_eq!(facade.current_state(), ApplicationState::Running);
    let shm = facade.shared_memory().expect("shared memory should be mapped while RUNNING");
    assert_eq!(shm.len(), 128);

    server.send_event(WireEvent {
        event: "pingEvent".into(),
        payload: serde_json::json!({"control_handle": 77, "id": 42}),
    });
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(listener.pings.load(Ordering::SeqCst), 1);

    server.send_event(WireEvent {
        event: "applicationStateChangeEvent".into(),
        payload: serde_json::json!({"application_state": "INACTIVE"}),
    });
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(facade.current_state(), ApplicationState::Inactive);
    assert!(facade.shared_memory().is_none());

    drop(facade);
    unlink_named_shm(&shm_name);
}
