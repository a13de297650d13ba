//! # Radio Bridge
//!
//! Command/response loop between the telemetry store and the transceiver.
//!
//! ## Cycle
//!
//! 1. Read the latest snapshot from the store
//! 2. Encode its controls into a command frame and send it
//! 3. Wait up to the serial timeout for a reply line, keeping only the
//!    newest one if several are queued
//! 4. Parse the attitude, write the attitude field-group
//! 5. Optionally forward the attitude to the relay
//!
//! Every failure inside a cycle is counted and the next cycle runs as usual.
//! Only opening the serial port is fatal.

use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::publisher::RelayPublisher;
use crate::config::{Config, RadioConfig};
use crate::error::{GroundLinkError, Result};
use crate::serial::{FrameCodec, SerialConnection, SerialReply};
use crate::telemetry::{Attitude, FieldGroup, TelemetryStore};

/// What happened in one cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CycleOutcome {
    /// A reply was parsed and published.
    Attitude(Attitude),
    /// No reply within the serial timeout.
    Timeout,
    /// A reply arrived but could not be parsed.
    Malformed,
    /// The command frame could not be written.
    SendFailed,
    /// Reading the reply failed.
    ReceiveFailed,
    /// The store could not be read; nothing was sent.
    StoreUnavailable,
}

/// Running counters of the bridge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    pub cycles: u64,
    pub replies: u64,
    /// Queued replies dropped in favour of a newer one.
    pub superseded: u64,
    pub timeouts: u64,
    pub malformed: u64,
    pub send_failures: u64,
    pub receive_failures: u64,
    pub store_failures: u64,
    pub forward_failures: u64,
}

impl std::fmt::Display for BridgeStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} cycles, {} replies, {} superseded, {} timeouts, {} malformed, {} send failures, \
             {} receive failures, {} store failures, {} forward failures",
            self.cycles,
            self.replies,
            self.superseded,
            self.timeouts,
            self.malformed,
            self.send_failures,
            self.receive_failures,
            self.store_failures,
            self.forward_failures
        )
    }
}

/// Drives the serial link from the store.
pub struct RadioBridge<S: TelemetryStore, T = tokio_serial::SerialStream> {
    store: S,
    serial: SerialConnection<T>,
    codec: FrameCodec,
    publisher: Option<RelayPublisher>,
    cycle_period: Duration,
    stats_interval: u64,
    stats: BridgeStats,
}

impl<S, T> RadioBridge<S, T>
where
    S: TelemetryStore,
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(
        config: &RadioConfig,
        store: S,
        serial: SerialConnection<T>,
        publisher: Option<RelayPublisher>,
    ) -> Self {
        Self {
            store,
            serial,
            codec: FrameCodec::new(config),
            publisher,
            cycle_period: Duration::from_millis(config.cycle_ms),
            stats_interval: config.stats_interval_cycles.max(1),
            stats: BridgeStats::default(),
        }
    }

    pub fn stats(&self) -> BridgeStats {
        self.stats
    }

    /// Send the power-level setup frame, if configured.
    ///
    /// # Errors
    ///
    /// Returns `Serial` if the frame cannot be written.
    pub async fn setup(&mut self, power_level: Option<u8>) -> Result<()> {
        if let Some(level) = power_level {
            self.serial.send(&self.codec.encode_power(level)).await?;
            info!("Transmitter power level set to {}", level);
        }
        Ok(())
    }

    /// Run one command/response cycle.
    pub async fn cycle(&mut self) -> CycleOutcome {
        self.stats.cycles += 1;

        let snapshot = match self.store.read() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.stats.store_failures += 1;
                warn!("Failed to read telemetry store: {}", e);
                return CycleOutcome::StoreUnavailable;
            }
        };

        let frame = self.codec.encode_controls(&snapshot.controls);
        if let Err(e) = self.serial.send(&frame).await {
            self.stats.send_failures += 1;
            warn!("{}", e);
            return CycleOutcome::SendFailed;
        }

        let line = match self.serial.receive_latest().await {
            Ok((SerialReply::Line(line), skipped)) => {
                self.stats.superseded += skipped as u64;
                line
            }
            Ok((SerialReply::Timeout, _)) => {
                self.stats.timeouts += 1;
                debug!("No reply within {}ms", self.serial.timeout().as_millis());
                return CycleOutcome::Timeout;
            }
            Err(GroundLinkError::MalformedFrame(reason)) => {
                self.stats.malformed += 1;
                debug!("Dropped malformed reply: {}", reason);
                return CycleOutcome::Malformed;
            }
            Err(e) => {
                self.stats.receive_failures += 1;
                warn!("{}", e);
                return CycleOutcome::ReceiveFailed;
            }
        };

        let attitude = match self.codec.parse_reply(&line) {
            Ok(attitude) => attitude,
            Err(e) => {
                self.stats.malformed += 1;
                debug!("{}", e);
                return CycleOutcome::Malformed;
            }
        };
        self.stats.replies += 1;

        if let Err(e) = self.store.write(FieldGroup::Attitude(attitude)) {
            self.stats.store_failures += 1;
            warn!("Failed to publish attitude: {}", e);
        }

        if let Some(publisher) = self.publisher.as_mut() {
            if let Err(e) = publisher.publish(&attitude).await {
                self.stats.forward_failures += 1;
                debug!("Attitude not forwarded: {}", e);
            }
        }

        CycleOutcome::Attitude(attitude)
    }

    /// Cycle at the configured rate until shutdown.
    pub async fn run(&mut self, shutdown: &mut watch::Receiver<bool>) -> Result<()> {
        let mut ticker = interval(self.cycle_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Radio bridge running every {}ms on {}",
            self.cycle_period.as_millis(),
            self.serial.device_path()
        );

        while !*shutdown.borrow() {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }

                _ = ticker.tick() => {
                    tokio::select! {
                        biased;
                        _ = shutdown.changed() => break,
                        outcome = self.cycle() => debug!("Cycle {}: {:?}", self.stats.cycles, outcome),
                    }

                    if self.stats.cycles % self.stats_interval == 0 {
                        info!("Radio link: {}", self.stats);
                    }
                }
            }
        }

        Ok(())
    }

    /// Release the serial port and the relay connection.
    pub async fn close(&mut self) {
        self.serial.close().await;
        if let Some(publisher) = self.publisher.as_mut() {
            publisher.close().await;
        }
    }
}

/// Runs the radio process until shutdown.
///
/// # Errors
///
/// Returns `Connection` if the serial port cannot be opened.
pub async fn run_radio_service<S: TelemetryStore>(
    config: &Config,
    store: S,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let serial = SerialConnection::open(&config.serial)?;
    let publisher = config
        .radio
        .forward_to_relay
        .then(|| RelayPublisher::new(&config.relay));

    let mut bridge = RadioBridge::new(&config.radio, store, serial, publisher);
    if let Err(e) = bridge.setup(config.serial.power_level).await {
        warn!("Power level not applied: {}", e);
    }

    let result = bridge.run(&mut shutdown).await;
    bridge.close().await;
    info!("Radio bridge stopped: {}", bridge.stats());
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfig;
    use crate::relay::{client, AttitudeMessage, RelayServer};
    use crate::telemetry::{ControlInputs, MemoryStore};
    use std::sync::Arc;
    use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

    type TestBridge = RadioBridge<Arc<MemoryStore>, DuplexStream>;

    fn bridge_with_radio(
        timeout_ms: u64,
        publisher: Option<RelayPublisher>,
    ) -> (TestBridge, Arc<MemoryStore>, DuplexStream) {
        let store = Arc::new(MemoryStore::new());
        let (ours, theirs) = duplex(4096);
        let serial = SerialConnection::from_stream(ours, "test", Duration::from_millis(timeout_ms));
        let bridge = RadioBridge::new(&RadioConfig::default(), Arc::clone(&store), serial, publisher);
        (bridge, store, theirs)
    }

    /// Transceiver stand-in: answers each command with an attitude derived
    /// from the sticks.
    fn spawn_transceiver(radio: DuplexStream) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let codec = FrameCodec::default();
            let (read, mut write) = tokio::io::split(radio);
            let mut lines = BufReader::new(read).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let line = line.trim_end_matches('\r');
                let Ok(controls) = codec.parse_command(line) else {
                    continue;
                };
                let reply = codec.encode_reply(&Attitude {
                    pitch: controls.axes[1] * 90.0,
                    roll: controls.axes[0] * 180.0,
                    yaw: 0.0,
                    throttle: controls.axes[3],
                });
                if write.write_all(format!("{}\r\n", reply).as_bytes()).await.is_err() {
                    break;
                }
            }
        })
    }

    #[tokio::test]
    async fn test_cycle_publishes_attitude() {
        let (mut bridge, store, radio) = bridge_with_radio(1000, None);
        spawn_transceiver(radio);

        let mut controls = ControlInputs::default();
        controls.axes[0] = 0.5;
        controls.axes[1] = -0.25;
        controls.axes[3] = 0.75;
        store.write(FieldGroup::Controls(controls)).unwrap();

        let expected = Attitude {
            pitch: -22.5,
            roll: 90.0,
            yaw: 0.0,
            throttle: 0.75,
        };
        assert_eq!(bridge.cycle().await, CycleOutcome::Attitude(expected));

        let snapshot = store.read().unwrap();
        assert_eq!(snapshot.attitude, Some(expected));
        assert_eq!(snapshot.controls, controls, "bridge must not touch controls");
        assert_eq!(bridge.stats().replies, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_timeout_is_counted() {
        let (mut bridge, store, _radio) = bridge_with_radio(500, None);

        assert_eq!(bridge.cycle().await, CycleOutcome::Timeout);
        assert_eq!(bridge.stats().timeouts, 1);
        assert_eq!(store.read().unwrap().attitude, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_replies_publish_newest() {
        let (mut bridge, store, mut radio) = bridge_with_radio(500, None);
        radio
            .write_all(b"ATT:1,0,0,0\r\nATT:2,0,0,0\r\n")
            .await
            .unwrap();

        let newest = Attitude {
            pitch: 2.0,
            roll: 0.0,
            yaw: 0.0,
            throttle: 0.0,
        };
        assert_eq!(bridge.cycle().await, CycleOutcome::Attitude(newest));
        assert_eq!(store.read().unwrap().attitude, Some(newest));
        assert_eq!(bridge.stats().superseded, 1);

        // nothing stale is left for the next cycle
        assert_eq!(bridge.cycle().await, CycleOutcome::Timeout);
        assert_eq!(bridge.stats().replies, 1);
    }

    #[tokio::test]
    async fn test_malformed_reply_is_dropped() {
        let (mut bridge, store, mut radio) = bridge_with_radio(1000, None);
        radio.write_all(b"NOISE 123\r\n").await.unwrap();

        assert_eq!(bridge.cycle().await, CycleOutcome::Malformed);
        assert_eq!(bridge.stats().malformed, 1);
        assert_eq!(store.read().unwrap().attitude, None);
    }

    #[tokio::test]
    async fn test_receive_failure_does_not_stop_cycles() {
        let (mut bridge, _store, radio) = bridge_with_radio(1000, None);
        drop(radio);

        let first = bridge.cycle().await;
        assert!(matches!(first, CycleOutcome::SendFailed | CycleOutcome::ReceiveFailed));
        let second = bridge.cycle().await;
        assert!(matches!(second, CycleOutcome::SendFailed | CycleOutcome::ReceiveFailed));
        assert_eq!(bridge.stats().cycles, 2);
    }

    #[tokio::test]
    async fn test_setup_sends_power_frame() {
        let mock = tokio_test::io::Builder::new().write(b"PWR:23\r\n").build();
        let serial = SerialConnection::from_stream(mock, "mock", Duration::from_secs(1));
        let mut bridge = RadioBridge::new(&RadioConfig::default(), MemoryStore::new(), serial, None);
        bridge.setup(Some(23)).await.unwrap();
    }

    #[tokio::test]
    async fn test_setup_without_power_level_sends_nothing() {
        let mock = tokio_test::io::Builder::new().build();
        let serial = SerialConnection::from_stream(mock, "mock", Duration::from_secs(1));
        let mut bridge = RadioBridge::new(&RadioConfig::default(), MemoryStore::new(), serial, None);
        bridge.setup(None).await.unwrap();
    }

    #[tokio::test]
    async fn test_attitude_forwarded_to_relay() {
        let handle = RelayServer::new(RelayConfig {
            port: 0,
            ..RelayConfig::default()
        })
        .start()
        .unwrap();
        let mut display = client::connect(&handle.url()).await.unwrap();

        let publisher = RelayPublisher::with_url(handle.url(), Duration::from_secs(1));
        let (mut bridge, store, radio) = bridge_with_radio(1000, Some(publisher));
        spawn_transceiver(radio);

        let mut controls = ControlInputs::default();
        controls.axes[1] = 1.0;
        store.write(FieldGroup::Controls(controls)).unwrap();
        assert!(matches!(bridge.cycle().await, CycleOutcome::Attitude(_)));

        let text = client::next_text(&mut display).await.unwrap().unwrap();
        let attitude = AttitudeMessage::parse(&text).unwrap();
        assert_eq!(attitude.pitch, 90.0);
        assert_eq!(bridge.stats().forward_failures, 0);

        bridge.close().await;
        tokio::task::spawn_blocking(move || handle.stop())
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_cycles_until_shutdown() {
        let (mut bridge, _store, radio) = bridge_with_radio(20, None);
        spawn_transceiver(radio);
        let (tx, mut rx) = watch::channel(false);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(260)).await;
            tx.send(true).unwrap();
        });

        bridge.run(&mut rx).await.unwrap();

        // 50ms period over 260ms, first tick immediate
        let stats = bridge.stats();
        assert!(stats.cycles >= 5 && stats.cycles <= 6, "cycles = {}", stats.cycles);
        assert_eq!(stats.replies, stats.cycles);
    }
}
