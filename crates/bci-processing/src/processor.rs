//! Core signal stage trait and timing helpers

use serde::{Deserialize, Serialize};
use std::time::Instant;

/// One in-place transformation of a single-channel signal
///
/// Stages run strictly left to right over the samples; several of them feed
/// already-updated samples back into later ones, so a pass must never be
/// split or reordered.
pub trait SignalStage: Send + Sync {
    /// Transform `signal` in place
    fn apply(&self, signal: &mut [f64], sampling_rate_hz: f64);

    /// Get stage name/identifier
    fn name(&self) -> &str;
}

/// Performance metrics for processing operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingMetrics {
    /// Actual processing time in microseconds
    pub processing_time_us: u64,
    /// Number of stages applied
    pub stages_applied: usize,
}

impl ProcessingMetrics {
    /// Create new processing metrics
    pub fn new() -> Self {
        Self {
            processing_time_us: 0,
            stages_applied: 0,
        }
    }

    /// Start timing a processing operation
    pub fn start_timing() -> ProcessingTimer {
        ProcessingTimer {
            start_time: Instant::now(),
            metrics: ProcessingMetrics::new(),
        }
    }
}

impl Default for ProcessingMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Helper for timing processing operations
pub struct ProcessingTimer {
    start_time: Instant,
    metrics: ProcessingMetrics,
}

impl ProcessingTimer {
    /// Finish timing and return metrics
    pub fn finish(mut self) -> ProcessingMetrics {
        self.metrics.processing_time_us = self.start_time.elapsed().as_micros() as u64;
        self.metrics
    }

    /// Record how many stages ran
    pub fn set_stages_applied(&mut self, count: usize) {
        self.metrics.stages_applied = count;
    }
}
