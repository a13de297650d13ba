//! # Axis Filter
//!
//! Single-pole exponential low-pass filter, one state per axis.
//!
//! Removes stick-drift noise without perceptible control lag:
//!
//! - `|raw| < threshold`: output is 0.0 and the axis state is left alone.
//! - first reading above threshold: output is `raw` and seeds the state.
//! - afterwards: `filtered = factor * previous + (1 - factor) * raw`.
//!
//! ## Usage
//!
//! ```
//! use ground_link::controller::filter::AxisFilter;
//!
//! let mut filter = AxisFilter::new(0.05, 0.9);
//!
//! // Drift near center collapses to zero
//! assert_eq!(filter.update(0, 0.02), 0.0);
//!
//! // First real reading seeds the state
//! assert_eq!(filter.update(0, 1.0), 1.0);
//! ```

use std::collections::HashMap;

/// Stateful per-axis low-pass filter.
#[derive(Debug, Clone)]
pub struct AxisFilter {
    /// Magnitude below which readings are treated as drift.
    threshold: f32,
    /// Smoothing factor α in 0.0..1.0.
    factor: f32,
    state: HashMap<u8, f32>,
}

impl Default for AxisFilter {
    fn default() -> Self {
        Self::new(0.05, 0.9)
    }
}

impl AxisFilter {
    /// Creates a filter. `factor` is clamped into `0.0..1.0`.
    #[must_use]
    pub fn new(threshold: f32, factor: f32) -> Self {
        Self {
            threshold: threshold.max(0.0),
            factor: factor.clamp(0.0, 0.999),
            state: HashMap::new(),
        }
    }

    /// Returns the configured threshold.
    #[must_use]
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Returns the configured smoothing factor.
    #[must_use]
    pub fn factor(&self) -> f32 {
        self.factor
    }

    /// Filters one raw reading for `axis_id`.
    ///
    /// # Examples
    ///
    /// ```
    /// use ground_link::controller::filter::AxisFilter;
    ///
    /// let mut filter = AxisFilter::new(0.05, 0.9);
    /// filter.update(2, 1.0);
    /// let second = filter.update(2, 0.5);
    /// assert!((second - 0.95).abs() < 1e-6);
    /// ```
    pub fn update(&mut self, axis_id: u8, raw: f32) -> f32 {
        if raw.abs() < self.threshold {
            return 0.0;
        }

        let filtered = match self.state.get(&axis_id) {
            None => raw,
            Some(&previous) => self.factor * previous + (1.0 - self.factor) * raw,
        };
        self.state.insert(axis_id, filtered);
        filtered
    }

    /// Current state of an axis, `None` until seeded.
    #[must_use]
    pub fn state(&self, axis_id: u8) -> Option<f32> {
        self.state.get(&axis_id).copied()
    }

    /// Forgets all axis state (e.g. after the device reconnects).
    pub fn reset(&mut self) {
        self.state.clear();
    }
}
