//! Epoch: container for one time-windowed biosignal trial

use crate::error::{BciError, BciResult};
use crate::types::StimulusClass;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Single-channel epoch sampled at a fixed rate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Epoch {
    /// Unique identifier for this epoch
    pub id: Uuid,
    /// Sample times in milliseconds, evenly spaced
    pub timestamps_ms: Vec<f64>,
    /// Amplitude per sample
    pub amplitudes: Vec<f64>,
    /// Sampling rate in Hz
    pub sampling_rate_hz: f64,
    /// Ground truth, only known for simulated or training epochs
    pub label: Option<StimulusClass>,
}

impl Epoch {
    /// Create a new epoch from parallel timestamp/amplitude vectors
    pub fn new(
        timestamps_ms: Vec<f64>,
        amplitudes: Vec<f64>,
        sampling_rate_hz: f64,
        label: Option<StimulusClass>,
    ) -> BciResult<Self> {
        if timestamps_ms.len() != amplitudes.len() {
            return Err(BciError::invalid_input(format!(
                "Timestamp count {} doesn't match amplitude count {}",
                timestamps_ms.len(),
                amplitudes.len()
            )));
        }

        if !(sampling_rate_hz > 0.0) {
            return Err(BciError::invalid_input("Sampling rate must be positive"));
        }

        Ok(Epoch {
            id: Uuid::new_v4(),
            timestamps_ms,
            amplitudes,
            sampling_rate_hz,
            label,
        })
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.amplitudes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.amplitudes.is_empty()
    }

    /// Spacing between consecutive samples in milliseconds
    pub fn sample_interval_ms(&self) -> f64 {
        1000.0 / self.sampling_rate_hz
    }

    /// Epoch duration in milliseconds
    pub fn duration_ms(&self) -> f64 {
        self.len() as f64 * self.sample_interval_ms()
    }

    /// Iterate over (timestamp_ms, amplitude) pairs
    pub fn samples(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.timestamps_ms
            .iter()
            .copied()
            .zip(self.amplitudes.iter().copied())
    }

    /// Same epoch with the ground-truth label removed, as seen at inference
    pub fn unlabeled(&self) -> Self {
        Epoch {
            label: None,
            ..self.clone()
        }
    }
}
