//! Reusable connection lifecycle for chat consumers.
//!
//! Every UI surface that wants a live feed (full chat page, floating widget)
//! creates its own [`ChatSession`]. The session owns one WebSocket at a time
//! and drives it from a single spawned task; `start`, `submit`, and `stop`
//! never block the caller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use parley_types::{ChatMessage, ClientEvent, ServerEvent};

/// Bound on the handshake: transport connect plus the first snapshot frame.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Connectivity as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// Retry behavior after an unexpected drop from `Connected`.
///
/// This is layered configuration, not core behavior: without a policy the
/// session just ends `Disconnected` and the consumer decides when to call
/// `start()` again. A fresh `start()` whose handshake fails never retries
/// either way.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    /// Fixed delay before each attempt.
    pub delay: Duration,
    /// Consecutive failed attempts tolerated before giving up.
    pub max_attempts: u32,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Full WebSocket endpoint, e.g. `ws://127.0.0.1:3000/api/socket_io`.
    pub url: String,
    pub connect_timeout: Duration,
    pub reconnect: Option<ReconnectPolicy>,
}

impl SessionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            reconnect: None,
        }
    }
}

type SnapshotFn = Box<dyn Fn(&[ChatMessage]) + Send + Sync>;
type MessageFn = Box<dyn Fn(&ChatMessage) + Send + Sync>;
type StatusFn = Box<dyn Fn(SessionStatus) + Send + Sync>;

/// Hooks a consumer installs to observe the session. All default to no-ops;
/// they are invoked from the driver task.
pub struct SessionCallbacks {
    on_snapshot: SnapshotFn,
    on_message: MessageFn,
    on_status: StatusFn,
}

impl SessionCallbacks {
    pub fn new() -> Self {
        Self {
            on_snapshot: Box::new(|_| {}),
            on_message: Box::new(|_| {}),
            on_status: Box::new(|_| {}),
        }
    }

    /// Called once per connection with the history snapshot that replaced
    /// the transcript.
    pub fn on_snapshot(mut self, f: impl Fn(&[ChatMessage]) + Send + Sync + 'static) -> Self {
        self.on_snapshot = Box::new(f);
        self
    }

    /// Called for each broadcast message appended to the transcript.
    pub fn on_message(mut self, f: impl Fn(&ChatMessage) + Send + Sync + 'static) -> Self {
        self.on_message = Box::new(f);
        self
    }

    /// Called on every status change.
    pub fn on_status(mut self, f: impl Fn(SessionStatus) + Send + Sync + 'static) -> Self {
        self.on_status = Box::new(f);
        self
    }
}

impl Default for SessionCallbacks {
    fn default() -> Self {
        Self::new()
    }
}

enum Command {
    Submit { author: String, body: String },
    Stop,
}

struct SessionShared {
    status: Mutex<SessionStatus>,
    transcript: Mutex<Vec<ChatMessage>>,
    /// Bumped by each `start()`. Drivers check it before every shared
    /// write, so a superseded task finishing late (a send that sat stuck
    /// on a dead peer, say) cannot clobber its replacement's state.
    generation: AtomicU64,
}

impl SessionShared {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::Acquire) == generation
    }
}

struct Driver {
    cmd_tx: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

/// One consumer's view of the chat.
///
/// `Disconnected -> Connecting -> Connected -> Disconnected`; the handshake
/// counts as complete when the snapshot frame arrives, so a consumer that
/// sees `Connected` always has a transcript.
pub struct ChatSession {
    config: SessionConfig,
    callbacks: Arc<SessionCallbacks>,
    shared: Arc<SessionShared>,
    driver: Mutex<Option<Driver>>,
}

impl ChatSession {
    pub fn new(config: SessionConfig, callbacks: SessionCallbacks) -> Self {
        Self {
            config,
            callbacks: Arc::new(callbacks),
            shared: Arc::new(SessionShared {
                status: Mutex::new(SessionStatus::Disconnected),
                transcript: Mutex::new(Vec::new()),
                generation: AtomicU64::new(0),
            }),
            driver: Mutex::new(None),
        }
    }

    /// Begin connecting. Returns immediately; the handshake runs on the
    /// driver task and surfaces through `on_status`. Calling `start` while a
    /// driver is already running is a no-op.
    pub fn start(&self) {
        let mut driver = self.driver.lock().expect("driver lock poisoned");
        if let Some(existing) = driver.as_ref() {
            if !existing.task.is_finished() {
                return;
            }
        }

        let generation = self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_driver(
            self.config.clone(),
            self.callbacks.clone(),
            self.shared.clone(),
            generation,
            cmd_rx,
        ));
        *driver = Some(Driver { cmd_tx, task });
    }

    /// Send one message. Fire-and-forget: a no-op when either field is blank
    /// after trimming or the session is not `Connected`, and the caller gets
    /// no delivery signal. The message shows up in the transcript only when
    /// it comes back as a broadcast.
    pub fn submit(&self, author: &str, body: &str) {
        if author.trim().is_empty() || body.trim().is_empty() {
            return;
        }
        if self.status() != SessionStatus::Connected {
            return;
        }
        if let Some(driver) = self.driver.lock().expect("driver lock poisoned").as_ref() {
            let _ = driver.cmd_tx.send(Command::Submit {
                author: author.to_string(),
                body: body.to_string(),
            });
        }
    }

    /// Deliberate teardown. The driver closes the transport and exits; no
    /// further inbound events are processed and no reconnect is scheduled.
    pub fn stop(&self) {
        if let Some(driver) = self.driver.lock().expect("driver lock poisoned").take() {
            let _ = driver.cmd_tx.send(Command::Stop);
        }
    }

    pub fn status(&self) -> SessionStatus {
        *self.shared.status.lock().expect("status lock poisoned")
    }

    /// Copy of the local transcript: the last snapshot plus every broadcast
    /// appended since.
    pub fn transcript(&self) -> Vec<ChatMessage> {
        self.shared
            .transcript
            .lock()
            .expect("transcript lock poisoned")
            .clone()
    }
}

fn update_status(
    shared: &SessionShared,
    callbacks: &SessionCallbacks,
    generation: u64,
    status: SessionStatus,
) {
    let changed = {
        let mut current = shared.status.lock().expect("status lock poisoned");
        if !shared.is_current(generation) || *current == status {
            false
        } else {
            *current = status;
            true
        }
    };
    if changed {
        (callbacks.on_status)(status);
    }
}

/// How one connection attempt ended, as seen by the retry loop.
enum ConnectionEnd {
    /// `stop()` was called or the handle was dropped.
    Stopped,
    /// Connect or first-snapshot wait failed or timed out.
    HandshakeFailed,
    /// The transport dropped after the session was `Connected`.
    Dropped,
}

async fn run_driver(
    config: SessionConfig,
    callbacks: Arc<SessionCallbacks>,
    shared: Arc<SessionShared>,
    generation: u64,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
) {
    // Set once the session has been Connected and dropped; only then does
    // the reconnect policy apply.
    let mut reconnecting = false;
    let mut attempts: u32 = 0;

    loop {
        update_status(&shared, &callbacks, generation, SessionStatus::Connecting);

        match run_connection(&config, &callbacks, &shared, generation, &mut cmd_rx).await {
            ConnectionEnd::Stopped => {
                update_status(&shared, &callbacks, generation, SessionStatus::Disconnected);
                return;
            }
            ConnectionEnd::HandshakeFailed => {
                update_status(&shared, &callbacks, generation, SessionStatus::Disconnected);
                if !reconnecting {
                    return;
                }
                let Some(policy) = config.reconnect else {
                    return;
                };
                attempts += 1;
                if attempts > policy.max_attempts {
                    warn!(
                        "giving up after {} failed reconnect attempts",
                        policy.max_attempts
                    );
                    return;
                }
                debug!(
                    "reconnect attempt {} of {} in {:?}",
                    attempts, policy.max_attempts, policy.delay
                );
                if !wait_or_stop(policy.delay, &mut cmd_rx).await {
                    return;
                }
            }
            ConnectionEnd::Dropped => {
                update_status(&shared, &callbacks, generation, SessionStatus::Disconnected);
                let Some(policy) = config.reconnect else {
                    return;
                };
                reconnecting = true;
                attempts = 1;
                if attempts > policy.max_attempts {
                    return;
                }
                info!("connection lost, retrying in {:?}", policy.delay);
                if !wait_or_stop(policy.delay, &mut cmd_rx).await {
                    return;
                }
            }
        }
    }
}

/// Sleep out a retry delay while still honoring `stop()`. Returns false if
/// the session should end instead of retrying.
async fn wait_or_stop(delay: Duration, cmd_rx: &mut mpsc::UnboundedReceiver<Command>) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            cmd = cmd_rx.recv() => match cmd {
                // Submissions while down are silently dropped.
                Some(Command::Submit { .. }) => continue,
                Some(Command::Stop) | None => return false,
            },
        }
    }
}

async fn run_connection(
    config: &SessionConfig,
    callbacks: &SessionCallbacks,
    shared: &SessionShared,
    generation: u64,
    cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
) -> ConnectionEnd {
    // The handshake spans the WebSocket upgrade and the first snapshot
    // frame; the server sends the snapshot immediately after registering.
    let handshake = tokio::time::timeout(config.connect_timeout, async {
        let (mut ws, _) = connect_async(config.url.as_str()).await.ok()?;
        while let Some(frame) = ws.next().await {
            match frame.ok()? {
                Message::Text(text) => match serde_json::from_str::<ServerEvent>(&text) {
                    Ok(ServerEvent::Snapshot { messages }) => return Some((ws, messages)),
                    Ok(_) => continue,
                    Err(e) => {
                        debug!("dropping unparseable frame during handshake: {}", e);
                        continue;
                    }
                },
                Message::Close(_) => return None,
                _ => continue,
            }
        }
        None
    })
    .await;

    let (mut ws, snapshot) = match handshake {
        Ok(Some(pair)) => pair,
        Ok(None) => {
            debug!("handshake failed: connection refused or closed early");
            return ConnectionEnd::HandshakeFailed;
        }
        Err(_) => {
            debug!("handshake timed out after {:?}", config.connect_timeout);
            return ConnectionEnd::HandshakeFailed;
        }
    };

    // The snapshot replaces the transcript; broadcasts below append to it.
    {
        let mut transcript = shared.transcript.lock().expect("transcript lock poisoned");
        if !shared.is_current(generation) {
            return ConnectionEnd::Stopped;
        }
        *transcript = snapshot.clone();
    }
    update_status(shared, callbacks, generation, SessionStatus::Connected);
    (callbacks.on_snapshot)(&snapshot);
    info!("session connected, snapshot of {} messages", snapshot.len());

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(Command::Submit { author, body }) => {
                    let event = ClientEvent::Submit { author, body };
                    let text = serde_json::to_string(&event).unwrap();
                    if ws.send(Message::Text(text.into())).await.is_err() {
                        return ConnectionEnd::Dropped;
                    }
                }
                Some(Command::Stop) | None => {
                    let _ = ws.close(None).await;
                    return ConnectionEnd::Stopped;
                }
            },
            frame = ws.next() => {
                let Some(Ok(frame)) = frame else {
                    return ConnectionEnd::Dropped;
                };
                match frame {
                    Message::Text(text) => match serde_json::from_str::<ServerEvent>(&text) {
                        Ok(ServerEvent::Broadcast { message }) => {
                            {
                                let mut transcript = shared
                                    .transcript
                                    .lock()
                                    .expect("transcript lock poisoned");
                                if !shared.is_current(generation) {
                                    return ConnectionEnd::Stopped;
                                }
                                transcript.push(message.clone());
                            }
                            (callbacks.on_message)(&message);
                        }
                        Ok(ServerEvent::Snapshot { messages }) => {
                            // The server sends one snapshot per connection;
                            // if one ever reappears it replaces, not appends.
                            {
                                let mut transcript = shared
                                    .transcript
                                    .lock()
                                    .expect("transcript lock poisoned");
                                if !shared.is_current(generation) {
                                    return ConnectionEnd::Stopped;
                                }
                                *transcript = messages.clone();
                            }
                            (callbacks.on_snapshot)(&messages);
                        }
                        Err(e) => debug!("dropping unparseable frame: {}", e),
                    },
                    Message::Close(_) => return ConnectionEnd::Dropped,
                    _ => {}
                }
            }
        }
    }
}
