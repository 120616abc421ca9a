#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Output};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use jetbridge_protocol::{CommandRunner, ProviderEvent};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;

pub const TEST_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedPrompt {
    pub session_id: String,
    pub body: Value,
}

#[derive(Clone, Default)]
pub struct MockState {
    root_path: Arc<Mutex<Value>>,
    sessions: Arc<Mutex<Vec<Value>>>,
    prompts: Arc<Mutex<Vec<RecordedPrompt>>>,
    selected_sessions: Arc<Mutex<Vec<String>>>,
    event_senders: Arc<Mutex<Vec<mpsc::UnboundedSender<String>>>>,
    event_requests: Arc<AtomicUsize>,
    reject_prompts: Arc<AtomicBool>,
}

impl MockState {
    pub fn prompts(&self) -> Vec<RecordedPrompt> {
        self.prompts.lock().expect("prompts lock").clone()
    }

    pub fn selected_sessions(&self) -> Vec<String> {
        self.selected_sessions
            .lock()
            .expect("selected sessions lock")
            .clone()
    }

    pub fn event_requests(&self) -> usize {
        self.event_requests.load(Ordering::SeqCst)
    }

    pub fn reject_prompts(&self, reject: bool) {
        self.reject_prompts.store(reject, Ordering::SeqCst);
    }
}

async fn get_path(State(state): State<MockState>) -> Json<Value> {
    Json(state.root_path.lock().expect("root path lock").clone())
}

async fn get_sessions(State(state): State<MockState>) -> Json<Value> {
    Json(Value::Array(
        state.sessions.lock().expect("sessions lock").clone(),
    ))
}

async fn prompt_async(
    State(state): State<MockState>,
    Path(session_id): Path<String>,
    Json(body): Json<Value>,
) -> StatusCode {
    state
        .prompts
        .lock()
        .expect("prompts lock")
        .push(RecordedPrompt { session_id, body });
    if state.reject_prompts.load(Ordering::SeqCst) {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::NO_CONTENT
    }
}

async fn select_session(State(state): State<MockState>, Json(body): Json<Value>) -> StatusCode {
    if let Some(session_id) = body.get("sessionID").and_then(Value::as_str) {
        state
            .selected_sessions
            .lock()
            .expect("selected sessions lock")
            .push(session_id.to_owned());
    }
    StatusCode::OK
}

async fn events(State(state): State<MockState>) -> impl IntoResponse {
    state.event_requests.fetch_add(1, Ordering::SeqCst);
    let (sender, receiver) = mpsc::unbounded_channel::<String>();
    let _ = sender.send(sse_frame(r#"{"type":"server.connected","properties":{}}"#));
    state
        .event_senders
        .lock()
        .expect("event senders lock")
        .push(sender);

    let stream = futures_util::stream::unfold(receiver, |mut receiver| async move {
        receiver
            .recv()
            .await
            .map(|frame| (Ok::<_, io::Error>(frame), receiver))
    });
    (
        [(header::CONTENT_TYPE, "text/event-stream")],
        Body::from_stream(stream),
    )
}

pub fn sse_frame(payload: &str) -> String {
    format!("data: {payload}\n\n")
}

pub fn session_json(id: &str, title: &str, directory: &str, updated: u64) -> Value {
    json!({
        "id": id,
        "title": title,
        "directory": directory,
        "projectID": "prj",
        "version": "0.9.0",
        "time": { "created": 1, "updated": updated }
    })
}

/// An opencode lookalike serving `/path`, `/session`, prompts and `/event`.
pub struct MockServer {
    pub address: String,
    pub state: MockState,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl MockServer {
    pub async fn spawn(directory: &str, sessions: Vec<Value>) -> Self {
        let state = MockState::default();
        *state.root_path.lock().expect("root path lock") = json!({
            "home": "/home/dev",
            "state": "/home/dev/.local/state/opencode",
            "config": "/home/dev/.config/opencode",
            "worktree": directory,
            "directory": directory,
        });
        *state.sessions.lock().expect("sessions lock") = sessions;

        let app = Router::new()
            .route("/path", get(get_path))
            .route("/session", get(get_sessions))
            .route("/session/{session_id}/prompt_async", post(prompt_async))
            .route("/tui/select-session", post(select_session))
            .route("/event", get(events))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock opencode listener");
        let address: SocketAddr = listener.local_addr().expect("mock listener local addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            });
            server.await.expect("run mock opencode server");
        });

        Self {
            address: address.to_string(),
            state,
            shutdown: shutdown_tx,
            handle,
        }
    }

    /// Sends one SSE frame to every open event stream; returns how many got it.
    pub fn push_event(&self, payload: &str) -> usize {
        self.push_raw(&sse_frame(payload))
    }

    pub fn push_raw(&self, raw: &str) -> usize {
        let mut senders = self.state.event_senders.lock().expect("event senders lock");
        senders.retain(|sender| sender.send(raw.to_owned()).is_ok());
        senders.len()
    }

    /// Ends every open event stream as if the server went away.
    pub fn close_event_streams(&self) {
        self.state
            .event_senders
            .lock()
            .expect("event senders lock")
            .clear();
    }

    pub async fn shutdown(self) {
        self.close_event_streams();
        let _ = self.shutdown.send(());
        let _ = timeout(TEST_TIMEOUT, self.handle).await;
    }
}

/// Process table answering `pgrep` and `lsof` for a fixed set of listeners.
#[derive(Default)]
pub struct FakeProcessTable {
    listeners: Mutex<Vec<(u32, String)>>,
    pgrep_calls: AtomicUsize,
    pgrep_delay: Mutex<Duration>,
}

impl FakeProcessTable {
    pub fn new(listeners: Vec<(u32, String)>) -> Self {
        Self {
            listeners: Mutex::new(listeners),
            pgrep_calls: AtomicUsize::new(0),
            pgrep_delay: Mutex::new(Duration::ZERO),
        }
    }

    pub fn pgrep_calls(&self) -> usize {
        self.pgrep_calls.load(Ordering::SeqCst)
    }

    /// Makes every `pgrep` answer only after `delay`.
    pub fn set_pgrep_delay(&self, delay: Duration) {
        *self.pgrep_delay.lock().expect("pgrep delay lock") = delay;
    }

    pub fn set_listeners(&self, listeners: Vec<(u32, String)>) {
        *self.listeners.lock().expect("listeners lock") = listeners;
    }
}

fn output(code: i32, stdout: String) -> Output {
    Output {
        status: ExitStatus::from_raw(code << 8),
        stdout: stdout.into_bytes(),
        stderr: Vec::new(),
    }
}

#[async_trait]
impl CommandRunner for FakeProcessTable {
    async fn run(&self, program: &str, args: &[String]) -> io::Result<Output> {
        let listeners = self.listeners.lock().expect("listeners lock").clone();
        match program {
            "pgrep" => {
                self.pgrep_calls.fetch_add(1, Ordering::SeqCst);
                let delay = *self.pgrep_delay.lock().expect("pgrep delay lock");
                tokio::time::sleep(delay).await;
                let mut pids = listeners.iter().map(|(pid, _)| *pid).collect::<Vec<_>>();
                pids.dedup();
                if pids.is_empty() {
                    return Ok(output(1, String::new()));
                }
                let stdout = pids
                    .iter()
                    .map(|pid| format!("{pid}\n"))
                    .collect::<String>();
                Ok(output(0, stdout))
            }
            "lsof" => {
                let pid = args
                    .last()
                    .and_then(|pid| pid.parse::<u32>().ok())
                    .unwrap_or_default();
                let mut stdout =
                    "COMMAND   PID USER   FD   TYPE DEVICE SIZE/OFF NODE NAME\n".to_owned();
                for (owner, address) in listeners.iter().filter(|(owner, _)| *owner == pid) {
                    stdout.push_str(&format!(
                        "opencode {owner} dev   23u  IPv4 0x5e1d      0t0  TCP {address} (LISTEN)\n"
                    ));
                }
                Ok(output(0, stdout))
            }
            other => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{other} is not available"),
            )),
        }
    }
}

/// Receives bus events until one matches `predicate`.
pub async fn expect_event<F>(
    receiver: &mut broadcast::Receiver<ProviderEvent>,
    predicate: F,
) -> ProviderEvent
where
    F: Fn(&ProviderEvent) -> bool,
{
    timeout(TEST_TIMEOUT, async {
        loop {
            let event = receiver.recv().await.expect("provider event");
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .expect("matching provider event before timeout")
}

pub async fn wait_until<F>(condition: F)
where
    F: Fn() -> bool,
{
    timeout(TEST_TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition reached before timeout");
}
