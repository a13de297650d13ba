//! # Attitude Feeds
//!
//! Where the HUD gets its attitude from. Both feeds are polled once per frame
//! and never block the render loop:
//!
//! - [`RelayFeed`] follows the websocket relay from a background task
//! - [`StoreFeed`] reads the shared telemetry store directly
//!
//! On a lost source the last known attitude is kept and `connected` drops to
//! `false`, so the HUD shows stale values instead of snapping to zero.

use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::relay::client;
use crate::relay::AttitudeMessage;
use crate::telemetry::{Attitude, TelemetryStore};

/// What the HUD knows about the aircraft at one frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FeedState {
    /// Last attitude received, `None` until the first one arrives.
    pub attitude: Option<Attitude>,
    /// Whether the source is currently reachable.
    pub connected: bool,
}

/// A non-blocking source of attitude for the render loop.
pub trait AttitudeFeed: Send {
    fn latest(&mut self) -> FeedState;

    /// Short name shown in the HUD status line.
    fn source_name(&self) -> &'static str;
}

/// Reads attitude from the shared telemetry store.
#[derive(Debug)]
pub struct StoreFeed<S> {
    store: S,
    last: Option<Attitude>,
}

impl<S: TelemetryStore> StoreFeed<S> {
    #[must_use]
    pub fn new(store: S) -> Self {
        Self { store, last: None }
    }
}

impl<S: TelemetryStore> AttitudeFeed for StoreFeed<S> {
    fn latest(&mut self) -> FeedState {
        match self.store.read() {
            Ok(snapshot) => {
                self.last = snapshot.attitude.or(self.last);
                FeedState {
                    attitude: self.last,
                    connected: true,
                }
            }
            Err(e) => {
                warn!("HUD could not read telemetry store: {}", e);
                FeedState {
                    attitude: self.last,
                    connected: false,
                }
            }
        }
    }

    fn source_name(&self) -> &'static str {
        "store"
    }
}

/// Follows attitude messages broadcast by the relay.
///
/// The background task reconnects every `retry` until shutdown. Dropping the
/// feed stops it.
pub struct RelayFeed {
    state: watch::Receiver<FeedState>,
    task: JoinHandle<()>,
}

impl std::fmt::Debug for RelayFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayFeed")
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl RelayFeed {
    /// Start following the relay at `url`. Must be called inside a tokio runtime.
    #[must_use]
    pub fn spawn(url: impl Into<String>, retry: Duration, shutdown: watch::Receiver<bool>) -> Self {
        let (tx, state) = watch::channel(FeedState::default());
        let task = tokio::spawn(follow_relay(url.into(), retry, tx, shutdown));
        Self { state, task }
    }
}

impl AttitudeFeed for RelayFeed {
    fn latest(&mut self) -> FeedState {
        *self.state.borrow()
    }

    fn source_name(&self) -> &'static str {
        "relay"
    }
}

impl Drop for RelayFeed {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn follow_relay(
    url: String,
    retry: Duration,
    tx: watch::Sender<FeedState>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            return;
        }

        match client::connect(&url).await {
            Ok(mut stream) => {
                info!("HUD following relay at {}", url);
                tx.send_modify(|state| state.connected = true);

                loop {
                    tokio::select! {
                        biased;
                        _ = shutdown.changed() => {
                            let _ = stream.close(None).await;
                            tx.send_modify(|state| state.connected = false);
                            return;
                        }
                        msg = client::next_text(&mut stream) => match msg {
                            Some(Ok(text)) => match AttitudeMessage::parse(&text) {
                                Some(attitude) => {
                                    tx.send_modify(|state| state.attitude = Some(attitude));
                                }
                                None => debug!("Ignoring non-attitude relay message"),
                            },
                            Some(Err(e)) => {
                                warn!("HUD relay feed failed: {}", e);
                                break;
                            }
                            None => {
                                warn!("Relay closed the HUD feed");
                                break;
                            }
                        },
                    }
                }

                tx.send_modify(|state| state.connected = false);
            }
            Err(e) => debug!("HUD feed waiting for relay: {}", e),
        }

        tokio::select! {
            _ = shutdown.changed() => return,
            _ = tokio::time::sleep(retry) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfig;
    use crate::error::GroundLinkError;
    use crate::relay::RelayServer;
    use crate::telemetry::store::MockTelemetryStore;
    use crate::telemetry::TelemetrySnapshot;
    use futures::SinkExt;
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message;

    async fn wait_for<F: FnMut(&FeedState) -> bool>(feed: &mut RelayFeed, mut done: F) -> FeedState {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let state = feed.latest();
                if done(&state) {
                    return state;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("feed never reached the expected state")
    }

    #[test]
    fn test_store_feed_keeps_last_attitude_on_error() {
        let attitude = Attitude::new(5.0, -3.0, 120.0);
        let mut store = MockTelemetryStore::new();
        let mut calls = 0;
        store.expect_read().times(3).returning(move || {
            calls += 1;
            match calls {
                1 => Ok(TelemetrySnapshot {
                    attitude: Some(attitude),
                    ..TelemetrySnapshot::default()
                }),
                2 => Err(GroundLinkError::Store("locked out".to_string())),
                _ => Ok(TelemetrySnapshot::default()),
            }
        });

        let mut feed = StoreFeed::new(store);
        assert_eq!(
            feed.latest(),
            FeedState {
                attitude: Some(attitude),
                connected: true
            }
        );
        assert_eq!(
            feed.latest(),
            FeedState {
                attitude: Some(attitude),
                connected: false
            }
        );
        // A snapshot without attitude does not erase what we had
        assert_eq!(feed.latest().attitude, Some(attitude));
    }

    #[test]
    fn test_store_feed_before_first_attitude() {
        let mut feed = StoreFeed::new(crate::telemetry::MemoryStore::new());
        assert_eq!(
            feed.latest(),
            FeedState {
                attitude: None,
                connected: true
            }
        );
        assert_eq!(feed.source_name(), "store");
    }

    #[tokio::test]
    async fn test_relay_feed_without_relay() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let (_tx, shutdown) = watch::channel(false);
        let mut feed = RelayFeed::spawn(
            format!("ws://127.0.0.1:{}/client", port),
            Duration::from_millis(20),
            shutdown,
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(feed.latest(), FeedState::default());
    }

    #[tokio::test]
    async fn test_relay_feed_follows_and_keeps_stale_attitude() {
        let handle = RelayServer::new(RelayConfig {
            port: 0,
            ..RelayConfig::default()
        })
        .start()
        .unwrap();

        let (_tx, shutdown) = watch::channel(false);
        let mut feed = RelayFeed::spawn(handle.url(), Duration::from_millis(20), shutdown);

        let attitude = Attitude::new(12.5, -30.0, 270.0);
        let (mut radio, _) = connect_async(handle.url()).await.unwrap();
        radio
            .send(Message::Text("not json".to_string()))
            .await
            .unwrap();
        radio
            .send(Message::Text(AttitudeMessage::new(&attitude).to_json().unwrap()))
            .await
            .unwrap();

        let state = wait_for(&mut feed, |s| s.connected && s.attitude.is_some()).await;
        assert_eq!(state.attitude, Some(attitude));

        tokio::task::spawn_blocking(move || handle.stop())
            .await
            .unwrap()
            .unwrap();

        let state = wait_for(&mut feed, |s| !s.connected).await;
        assert_eq!(state.attitude, Some(attitude));
    }

    #[tokio::test]
    async fn test_relay_feed_stops_on_shutdown() {
        let handle = RelayServer::new(RelayConfig {
            port: 0,
            ..RelayConfig::default()
        })
        .start()
        .unwrap();

        let (tx, shutdown) = watch::channel(false);
        let mut feed = RelayFeed::spawn(handle.url(), Duration::from_millis(20), shutdown);
        wait_for(&mut feed, |s| s.connected).await;

        tx.send(true).unwrap();
        wait_for(&mut feed, |s| !s.connected).await;
        assert_eq!(feed.source_name(), "relay");

        tokio::task::spawn_blocking(move || handle.stop())
            .await
            .unwrap()
            .unwrap();
    }
}
