//! EMG sensing capability and the intent-classification seam.
//!
//! The sensor hands back raw ADC batches with the two electrode channels
//! interleaved (`ch0, ch1, ch0, ch1, …`).  An [`IntentClassifier`] turns a
//! batch into a [`GripIntent`], or `None` for a hold / no-change reading.

use gpm_types::{GpmError, GripIntent};
use serde::{Deserialize, Serialize};

/// A biosignal sensor producing batches of raw samples.
pub trait EmgSensor: Send {
    /// Stable identifier, e.g. `"emg"`.
    fn id(&self) -> &str;

    /// `true` when a batch can be read without blocking.
    fn is_ready(&self) -> bool;

    /// Read the next batch of interleaved samples.
    ///
    /// # Errors
    ///
    /// Returns [`GpmError::HardwareFault`] when the ADC read fails.
    fn read_batch(&mut self) -> Result<Vec<u16>, GpmError>;

    /// Release any held resources.  Called once on shutdown.
    fn release(&mut self) -> Result<(), GpmError> {
        Ok(())
    }
}

/// Maps a sample batch onto the discrete grip intent set.
pub trait IntentClassifier: Send {
    /// `None` means hold: keep the current grip.
    fn classify(&mut self, samples: &[u16]) -> Option<GripIntent>;
}

/// Two-channel threshold classifier.
///
/// Averages each channel over the batch, then:
///
/// | channel 0 | channel 1 | result |
/// |---|---|---|
/// | ≥ inner | ≤ outer | [`GripIntent::Open`] |
/// | ≤ inner | ≥ outer | [`GripIntent::Power`] (close) |
/// | otherwise | | hold |
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdClassifier {
    #[serde(default = "default_threshold")]
    pub inner_threshold: f32,
    #[serde(default = "default_threshold")]
    pub outer_threshold: f32,
}

fn default_threshold() -> f32 {
    450.0
}

impl Default for ThresholdClassifier {
    fn default() -> Self {
        Self {
            inner_threshold: default_threshold(),
            outer_threshold: default_threshold(),
        }
    }
}

impl ThresholdClassifier {
    pub fn new(inner_threshold: f32, outer_threshold: f32) -> Self {
        Self {
            inner_threshold,
            outer_threshold,
        }
    }

    /// Per-channel means of an interleaved batch, or `None` if either channel
    /// has no samples.
    fn channel_means(samples: &[u16]) -> Option<(f32, f32)> {
        if samples.len() < 2 {
            return None;
        }
        let ch0 = mean(samples.iter().step_by(2));
        let ch1 = mean(samples.iter().skip(1).step_by(2));
        Some((ch0, ch1))
    }
}

fn mean<'a>(values: impl Iterator<Item = &'a u16>) -> f32 {
    let (sum, n) = values.fold((0.0_f32, 0_u32), |(s, n), v| (s + f32::from(*v), n + 1));
    if n == 0 { 0.0 } else { sum / n as f32 }
}

impl IntentClassifier for ThresholdClassifier {
    fn classify(&mut self, samples: &[u16]) -> Option<GripIntent> {
        let (ch0, ch1) = Self::channel_means(samples)?;
        if ch0 >= self.inner_threshold && ch1 <= self.outer_threshold {
            Some(GripIntent::Open)
        } else if ch0 <= self.inner_threshold && ch1 >= self.outer_threshold {
            Some(GripIntent::Power)
        } else {
            None
        }
    }
}
