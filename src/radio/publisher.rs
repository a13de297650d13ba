//! Forwards attitude readings from the radio bridge to the relay.
//!
//! The connection is made lazily on the first publish and remade after a
//! failure, no more often than the configured reconnect interval. Losing the
//! relay never stops the bridge; `publish` just reports `NetworkDisconnect`.

use futures::stream::SplitSink;
use futures::StreamExt;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::config::RelayConfig;
use crate::error::{GroundLinkError, Result};
use crate::relay::client::{self, RelayStream};
use crate::relay::AttitudeMessage;
use crate::telemetry::Attitude;

/// Relay connection owned by the radio bridge.
pub struct RelayPublisher {
    url: String,
    retry_interval: Duration,
    sink: Option<SplitSink<RelayStream, Message>>,
    /// Consumes the broadcast echo of our own messages.
    drain: Option<JoinHandle<()>>,
    retry_at: Option<Instant>,
    published: u64,
}

impl std::fmt::Debug for RelayPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayPublisher")
            .field("url", &self.url)
            .field("connected", &self.sink.is_some())
            .field("published", &self.published)
            .finish_non_exhaustive()
    }
}

impl RelayPublisher {
    #[must_use]
    pub fn new(config: &RelayConfig) -> Self {
        Self::with_url(config.url(), Duration::from_millis(config.reconnect_interval_ms))
    }

    #[must_use]
    pub fn with_url(url: impl Into<String>, retry_interval: Duration) -> Self {
        Self {
            url: url.into(),
            retry_interval,
            sink: None,
            drain: None,
            retry_at: None,
            published: 0,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_connected(&self) -> bool {
        self.sink.is_some()
    }

    /// Messages sent successfully so far.
    pub fn published(&self) -> u64 {
        self.published
    }

    async fn ensure_connected(&mut self) -> Result<()> {
        if self.sink.is_some() {
            return Ok(());
        }
        if let Some(retry_at) = self.retry_at {
            if Instant::now() < retry_at {
                return Err(GroundLinkError::NetworkDisconnect(format!(
                    "waiting to reconnect to {}",
                    self.url
                )));
            }
        }

        let connected = match timeout(self.retry_interval, client::connect(&self.url)).await {
            Ok(result) => result,
            Err(_) => Err(GroundLinkError::NetworkDisconnect(format!(
                "{}: connect timed out",
                self.url
            ))),
        };

        match connected {
            Ok(stream) => {
                let (sink, mut stream) = stream.split();
                self.drain = Some(tokio::spawn(async move {
                    while let Some(Ok(_)) = stream.next().await {}
                }));
                self.sink = Some(sink);
                self.retry_at = None;
                info!("Forwarding attitude to relay at {}", self.url);
                Ok(())
            }
            Err(e) => {
                self.retry_at = Some(Instant::now() + self.retry_interval);
                Err(e)
            }
        }
    }

    /// Send one attitude reading to the relay.
    ///
    /// # Errors
    ///
    /// Returns `NetworkDisconnect` if the relay is unreachable or the
    /// connection dropped; the next call after the reconnect interval tries
    /// again.
    pub async fn publish(&mut self, attitude: &Attitude) -> Result<()> {
        self.ensure_connected().await?;
        let text = AttitudeMessage::new(attitude).to_json()?;

        let Some(sink) = self.sink.as_mut() else {
            return Err(GroundLinkError::NetworkDisconnect(self.url.clone()));
        };

        match client::send_text(sink, text).await {
            Ok(()) => {
                self.published += 1;
                Ok(())
            }
            Err(e) => {
                warn!("Lost relay connection: {}", e);
                self.disconnect();
                self.retry_at = Some(Instant::now() + self.retry_interval);
                Err(e)
            }
        }
    }

    fn disconnect(&mut self) {
        self.sink = None;
        if let Some(drain) = self.drain.take() {
            drain.abort();
        }
    }

    /// Close the relay connection politely.
    pub async fn close(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            use futures::SinkExt;
            if let Err(e) = sink.close().await {
                debug!("Error closing relay connection: {}", e);
            }
        }
        self.disconnect();
    }
}

impl Drop for RelayPublisher {
    fn drop(&mut self) {
        self.disconnect();
    }
}
