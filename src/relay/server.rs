//! # Relay Server
//!
//! Websocket fan-out hub running on its own thread.
//!
//! The server owns a dedicated OS thread with a single-threaded tokio
//! runtime. Every text frame received from any subscriber is broadcast to
//! all connected subscribers, the sender included. The latest frame is kept
//! and replayed to each new subscriber before live traffic.
//!
//! ## Lifecycle
//!
//! [`RelayServer::start`] binds synchronously, so a bind failure is returned
//! to the caller. [`RelayHandle::stop`] asks the loop to halt and waits for
//! its acknowledgement within the configured grace period.
//!
//! ## Slow subscribers
//!
//! The broadcast queue is bounded by `channel_capacity`. A subscriber that
//! falls behind skips the messages it missed; the skip is logged.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::StreamExt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use crate::config::RelayConfig;
use crate::error::{GroundLinkError, Result};

#[derive(Clone)]
struct RelayState {
    tx: broadcast::Sender<String>,
    latest: Arc<Mutex<Option<String>>>,
    shutdown: watch::Receiver<bool>,
    next_id: Arc<AtomicU64>,
}

impl RelayState {
    /// Records `text` as latest and fans it out.
    fn broadcast(&self, text: String) {
        // Lock spans the send so a joining subscriber sees each message
        // exactly once: either as replay or live
        let mut latest = match self.latest.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *latest = Some(text.clone());
        let receivers = self.tx.send(text).unwrap_or(0);
        debug!("Broadcast to {} subscribers", receivers);
    }

    /// Subscribes and returns the message to replay first.
    fn subscribe(&self) -> (broadcast::Receiver<String>, Option<String>) {
        let latest = match self.latest.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        (self.tx.subscribe(), latest.clone())
    }
}

/// Websocket relay, not yet started.
#[derive(Debug, Clone)]
pub struct RelayServer {
    config: RelayConfig,
}

impl RelayServer {
    #[must_use]
    pub fn new(config: RelayConfig) -> Self {
        Self { config }
    }

    /// Bind the listening socket and start serving on a dedicated thread.
    ///
    /// # Errors
    ///
    /// - `RelayBind`: the address is in use or not permitted
    /// - `Relay`: the runtime or thread could not be created
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use ground_link::config::RelayConfig;
    /// use ground_link::relay::RelayServer;
    ///
    /// let handle = RelayServer::new(RelayConfig::default()).start()?;
    /// println!("Relay listening on {}", handle.url());
    /// handle.stop()?;
    /// # Ok::<(), ground_link::error::GroundLinkError>(())
    /// ```
    pub fn start(self) -> Result<RelayHandle> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = std::net::TcpListener::bind(&addr).map_err(|source| {
            GroundLinkError::RelayBind {
                addr: addr.clone(),
                source,
            }
        })?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| GroundLinkError::Relay(format!("Failed to build runtime: {}", e)))?;

        let (tx, _) = broadcast::channel(self.config.channel_capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (done_tx, done_rx) = mpsc::channel();

        let state = RelayState {
            tx,
            latest: Arc::new(Mutex::new(None)),
            shutdown: shutdown_rx,
            next_id: Arc::new(AtomicU64::new(1)),
        };
        let path = self.config.path.clone();
        let serve_path = path.clone();

        let thread = std::thread::Builder::new()
            .name("relay".to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    if let Err(e) = serve(listener, &serve_path, state).await {
                        error!("Relay loop failed: {}", e);
                    }
                });
                // Drops any subscriber tasks still winding down
                drop(runtime);
                let _ = done_tx.send(());
            })
            .map_err(|e| GroundLinkError::Relay(format!("Failed to spawn relay thread: {}", e)))?;

        info!("Relay listening on ws://{}{}", local_addr, path);

        Ok(RelayHandle {
            local_addr,
            path,
            grace: Duration::from_millis(self.config.shutdown_grace_ms),
            shutdown: Some(shutdown_tx),
            done: done_rx,
            thread: Some(thread),
        })
    }
}

/// Control handle of a running relay.
#[derive(Debug)]
pub struct RelayHandle {
    local_addr: SocketAddr,
    path: String,
    grace: Duration,
    shutdown: Option<watch::Sender<bool>>,
    done: mpsc::Receiver<()>,
    thread: Option<JoinHandle<()>>,
}

impl RelayHandle {
    /// Address the relay actually bound (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Websocket URL of the relay.
    pub fn url(&self) -> String {
        format!("ws://{}{}", self.local_addr, self.path)
    }

    /// Ask the relay loop to halt and wait for it to acknowledge.
    ///
    /// Blocks the calling thread for at most the configured grace period.
    ///
    /// # Errors
    ///
    /// Returns `Relay` if no acknowledgement arrives within the grace period
    /// or the relay thread died. The thread is never killed.
    pub fn stop(mut self) -> Result<()> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(true);
        }

        match self.done.recv_timeout(self.grace) {
            Ok(()) => {
                if let Some(thread) = self.thread.take() {
                    let _ = thread.join();
                }
                info!("Relay stopped");
                Ok(())
            }
            Err(mpsc::RecvTimeoutError::Timeout) => Err(GroundLinkError::Relay(format!(
                "relay did not stop within {}ms",
                self.grace.as_millis()
            ))),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(GroundLinkError::Relay("relay thread exited unexpectedly".to_string()))
            }
        }
    }
}

impl Drop for RelayHandle {
    fn drop(&mut self) {
        // Signal without waiting when the handle is dropped without stop()
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(true);
        }
    }
}

async fn serve(listener: std::net::TcpListener, path: &str, state: RelayState) -> Result<()> {
    let listener = tokio::net::TcpListener::from_std(listener)?;
    let mut shutdown = state.shutdown.clone();

    let app = Router::new().route(path, get(ws_handler)).with_state(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
            debug!("Relay received shutdown request");
        })
        .await?;

    Ok(())
}

async fn ws_handler(State(state): State<RelayState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: RelayState) {
    let id = state.next_id.fetch_add(1, Ordering::Relaxed);
    let mut shutdown = state.shutdown.clone();
    let (mut rx, replay) = state.subscribe();
    info!(subscriber = id, "Subscriber connected");

    if let Some(latest) = replay {
        if socket.send(Message::Text(latest)).await.is_err() {
            return;
        }
    }

    while !*shutdown.borrow() {
        tokio::select! {
            _ = shutdown.changed() => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
            outbound = rx.recv() => {
                match outbound {
                    Ok(payload) => {
                        if socket.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(subscriber = id, skipped, "Subscriber lagging, messages skipped");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            inbound = socket.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => state.broadcast(text),
                    Some(Ok(Message::Ping(payload))) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(subscriber = id, ?err, "Subscriber error");
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    info!(subscriber = id, "Subscriber disconnected");
}
