//! # Joystick Sampler
//!
//! Drains input events, filters axes and commits the controls field-group
//! to the telemetry store once per tick.
//!
//! Events only touch a local working copy; the store sees one write per tick
//! at most, so lock contention with the other processes stays flat no matter
//! how chatty the device is. A tick that lands inside a device report is
//! deferred to the report's `Sync`, so both sticks of one report are
//! published together. When the device disappears the sampler publishes
//! neutral controls, reports `DeviceUnavailable` and the service pauses
//! before reopening it.

use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::filter::AxisFilter;
use super::joystick::{EvdevJoystick, EventSource};
use super::mapper::RawInputEvent;
use crate::config::JoystickConfig;
use crate::error::Result;
use crate::telemetry::{AxisSample, ControlInputs, FieldGroup, TelemetryStore};

/// Tick-batched joystick sampler.
pub struct JoystickSampler<S: TelemetryStore> {
    filter: AxisFilter,
    working: ControlInputs,
    store: S,
    tick: Duration,
    dirty: bool,
    /// Events seen since the last `Sync`.
    mid_report: bool,
    /// A tick fired while `mid_report` was set.
    deferred: bool,
    commits: u64,
}

impl<S: TelemetryStore> JoystickSampler<S> {
    /// Creates a sampler publishing into `store`.
    pub fn new(config: &JoystickConfig, store: S) -> Self {
        Self {
            filter: AxisFilter::new(config.filter_threshold, config.filter_factor),
            working: ControlInputs::default(),
            store,
            tick: Duration::from_millis(config.tick_ms),
            // first tick always publishes
            dirty: true,
            mid_report: false,
            deferred: false,
            commits: 0,
        }
    }

    /// The working controls, including changes not yet committed.
    pub fn working(&self) -> &ControlInputs {
        &self.working
    }

    /// Number of successful commits so far.
    pub fn commits(&self) -> u64 {
        self.commits
    }

    /// Whether the last event left a device report open.
    pub fn mid_report(&self) -> bool {
        self.mid_report
    }

    /// Folds one event into the working controls.
    pub fn apply(&mut self, event: RawInputEvent) {
        if event == RawInputEvent::Sync {
            self.mid_report = false;
            return;
        }
        self.mid_report = true;

        let changed = match event {
            RawInputEvent::AxisMotion { axis_id, value } => {
                let filtered = self.filter.update(axis_id, value);
                self.working.set_axis(AxisSample { axis_id, value: filtered })
            }
            RawInputEvent::ButtonDown(id) => self.working.set_button(id, true),
            RawInputEvent::ButtonUp(id) => self.working.set_button(id, false),
            RawInputEvent::Sync => false,
        };
        self.dirty |= changed;
    }

    /// Writes the working controls if anything changed since the last commit.
    ///
    /// Returns whether a write happened. A failed write leaves the sampler
    /// dirty so the next tick retries.
    pub fn commit(&mut self) -> Result<bool> {
        if !self.dirty {
            return Ok(false);
        }
        self.store.write(FieldGroup::Controls(self.working))?;
        self.dirty = false;
        self.commits += 1;
        Ok(true)
    }

    /// Resets filter and working state and publishes neutral controls.
    pub fn publish_neutral(&mut self) {
        self.filter.reset();
        self.working = ControlInputs::default();
        self.dirty = true;
        self.mid_report = false;
        self.deferred = false;
        if let Err(e) = self.commit() {
            warn!("Failed to publish neutral controls: {}", e);
        }
    }

    fn commit_logged(&mut self) {
        match self.commit() {
            Ok(true) => debug!("Committed controls: {:?}", self.working.axes),
            Ok(false) => {}
            Err(e) => warn!("Controls commit failed, retrying next tick: {}", e),
        }
    }

    /// Samples `source` until shutdown (`Ok`) or device loss (`Err`).
    ///
    /// # Errors
    ///
    /// Returns `DeviceUnavailable` when the source disappears; neutral
    /// controls have already been published at that point.
    pub async fn run<E: EventSource + ?Sized>(
        &mut self,
        source: &mut E,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<()> {
        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                return Ok(());
            }

            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                }

                _ = ticker.tick() => {
                    if self.mid_report {
                        self.deferred = true;
                    } else {
                        self.commit_logged();
                    }
                }

                event = source.next_event() => {
                    match event {
                        Ok(event) => {
                            self.apply(event);
                            if self.deferred && !self.mid_report {
                                self.deferred = false;
                                self.commit_logged();
                            }
                        }
                        Err(e) => {
                            self.publish_neutral();
                            return Err(e);
                        }
                    }
                }
            }
        }
    }
}

/// Runs the joystick process: open, sample, pause and reopen on loss.
///
/// Only returns on shutdown; device loss is reported and retried.
pub async fn run_joystick_service<S: TelemetryStore>(
    config: JoystickConfig,
    store: S,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let mut sampler = JoystickSampler::new(&config, store);
    let pause = Duration::from_millis(config.reconnect_interval_ms);

    info!(
        "Joystick sampler starting (threshold {}, factor {}, tick {}ms)",
        config.filter_threshold, config.filter_factor, config.tick_ms
    );

    loop {
        if *shutdown.borrow() {
            break;
        }

        match EvdevJoystick::open(&config) {
            Ok(mut joystick) => {
                sampler.publish_neutral();
                match sampler.run(&mut joystick, &mut shutdown).await {
                    Ok(()) => break,
                    Err(e) => warn!("{}; pausing {}ms before reopening", e, pause.as_millis()),
                }
                // joystick dropped here, releasing the device
            }
            Err(e) => warn!("{}; retrying in {}ms", e, pause.as_millis()),
        }

        tokio::select! {
            _ = sleep(pause) => {}
            _ = shutdown.changed() => {}
        }
    }

    info!("Joystick sampler stopped after {} commits", sampler.commits());
    Ok(())
}
