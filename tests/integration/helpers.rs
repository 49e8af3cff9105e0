//! Test helpers and utilities

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tungstenite::{Message, WebSocket};

use wspoll::protocol::Frame;
use wspoll::router::Router;
use wspoll::{Error, EventHandler, ListenConfig, PoolConfig, Resume, Server, Socket, WorkerPool};

/// Router wrapper that records lifecycle callbacks.
pub struct Recorder {
    router: Router,
    opened: AtomicUsize,
    disconnected: AtomicUsize,
    errors: Mutex<Vec<String>>,
    events: Mutex<Vec<&'static str>>,
}

impl Recorder {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn disconnected(&self) -> usize {
        self.disconnected.load(Ordering::SeqCst)
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }

    /// Lifecycle callbacks in the order they ran.
    pub fn events(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().clone()
    }
}

impl EventHandler for Recorder {
    fn on_open(&self, _socket: &Arc<Socket>) {
        self.events.lock().unwrap().push("open");
        self.opened.fetch_add(1, Ordering::SeqCst);
    }

    fn on_disconnect(&self, _socket: &Arc<Socket>) {
        self.events.lock().unwrap().push("disconnect");
        self.disconnected.fetch_add(1, Ordering::SeqCst);
    }

    fn on_read(&self, socket: &Arc<Socket>, frame: Frame, resume: &Resume) {
        self.router.on_read(socket, frame, resume);
    }

    fn on_error(&self, err: &Error, _socket: Option<&Arc<Socket>>) {
        self.events.lock().unwrap().push("error");
        self.errors.lock().unwrap().push(err.to_string());
    }
}

/// Methods available to every test server.
pub fn router() -> Router {
    let mut router = Router::new();
    router
        .register("echo", |req| req.write_success(req.params().clone()))
        // Holds the read window (and its worker) for `ms`.
        .register("sleep", |req| {
            let ms = req.params()["ms"].as_u64().unwrap_or(0);
            thread::sleep(Duration::from_millis(ms));
            req.write_success(json!({ "slept": ms }))
        })
        // Releases the socket first, so later messages overtake this reply.
        .register("slow", |req| {
            req.release();
            let ms = req.params()["ms"].as_u64().unwrap_or(0);
            thread::sleep(Duration::from_millis(ms));
            req.write_success(json!({ "slow": ms }))
        })
        .register("bye", |req| {
            req.release();
            req.socket().disconnect("bye")?;
            Ok(())
        });
    router
}

/// In-process server bound to a loopback port.
pub struct TestServer {
    pub server: Server,
    pub addr: SocketAddr,
    pub recorder: Arc<Recorder>,
}

impl TestServer {
    pub fn start() -> Self {
        Self::with(PoolConfig::new(16, 1, 1), ListenConfig::default())
    }

    pub fn with(pool: PoolConfig, listen: ListenConfig) -> Self {
        let pool = WorkerPool::with_name(pool, "test-worker").expect("pool");
        let server = Server::new(pool).expect("server");
        let recorder = Arc::new(Recorder {
            router: router(),
            opened: AtomicUsize::new(0),
            disconnected: AtomicUsize::new(0),
            errors: Mutex::new(Vec::new()),
            events: Mutex::new(Vec::new()),
        });

        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = server
            .listen(listener, listen, recorder.clone())
            .expect("listen");

        Self {
            server,
            addr,
            recorder,
        }
    }

    /// Open a WebSocket client connection.
    pub fn connect(&self) -> WebSocket<TcpStream> {
        let stream = TcpStream::connect(self.addr).expect("connect");
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .expect("read timeout");
        let (ws, response) =
            tungstenite::client(format!("ws://{}/chat", self.addr), stream).expect("handshake");
        assert_eq!(response.status(), 101);
        ws
    }
}

/// Send a command and wait for its JSON reply.
pub fn call(ws: &mut WebSocket<TcpStream>, method: &str, params: Value) -> Value {
    send(ws, method, params);
    recv_json(ws)
}

pub fn send(ws: &mut WebSocket<TcpStream>, method: &str, params: Value) {
    let command = json!({ "m": method, "p": params }).to_string();
    ws.send(Message::Text(command)).expect("send");
}

pub fn recv_json(ws: &mut WebSocket<TcpStream>) -> Value {
    loop {
        match ws.read().expect("read") {
            Message::Text(text) => return serde_json::from_str(&text).expect("json reply"),
            Message::Binary(bytes) => return serde_json::from_slice(&bytes).expect("json reply"),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected message: {:?}", other),
        }
    }
}

/// Poll `check` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    check()
}
