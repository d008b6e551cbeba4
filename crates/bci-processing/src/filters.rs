//! Preprocessing filters for simulated EEG epochs
//!
//! The chain is a cheap stand-in for a bandpass + notch pair: two
//! edge-truncated moving averages, a recursive drift-removal pass, a
//! one-period comb blend at the powerline frequency, then DC removal.

use crate::config::PreprocessConfig;
use crate::processor::{ProcessingMetrics, SignalStage};
use bci_core::{BciError, BciResult};
use tracing::debug;

/// Centered moving average; near the edges it averages whatever samples exist
pub struct MovingAverageFilter {
    window_size: usize,
}

impl MovingAverageFilter {
    /// Create new moving average filter
    pub fn new(window_size: usize) -> Self {
        MovingAverageFilter {
            window_size: window_size.max(1),
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }
}

impl SignalStage for MovingAverageFilter {
    fn apply(&self, signal: &mut [f64], _sampling_rate_hz: f64) {
        let n = signal.len();
        if n == 0 {
            return;
        }

        let left = self.window_size / 2;
        let right = self.window_size - 1 - left;
        let input = signal.to_vec();

        for (i, out) in signal.iter_mut().enumerate() {
            let lo = i.saturating_sub(left);
            let hi = (i + right).min(n - 1);
            let window = &input[lo..=hi];
            *out = window.iter().sum::<f64>() / window.len() as f64;
        }
    }

    fn name(&self) -> &str {
        "Moving Average Filter"
    }
}

/// First-order recursive drift removal: `s[i] -= decay * s[i-1]`
///
/// `s[i-1]` is the already-updated previous output.
pub struct DriftRemovalFilter {
    decay: f64,
}

impl DriftRemovalFilter {
    pub fn new(decay: f64) -> Self {
        DriftRemovalFilter { decay }
    }
}

impl SignalStage for DriftRemovalFilter {
    fn apply(&self, signal: &mut [f64], _sampling_rate_hz: f64) {
        for i in 1..signal.len() {
            signal[i] -= self.decay * signal[i - 1];
        }
    }

    fn name(&self) -> &str {
        "Drift Removal Filter"
    }
}

/// Comb blend with the sample one powerline period earlier
pub struct NotchFilter {
    notch_freq_hz: f64,
    blend: f64,
}

impl NotchFilter {
    /// Create new notch filter
    pub fn new(notch_freq_hz: f64, blend: f64) -> Self {
        NotchFilter { notch_freq_hz, blend }
    }

    /// floor(sampling rate / notch frequency)
    pub fn period_samples(&self, sampling_rate_hz: f64) -> usize {
        (sampling_rate_hz / self.notch_freq_hz).floor() as usize
    }
}

impl SignalStage for NotchFilter {
    fn apply(&self, signal: &mut [f64], sampling_rate_hz: f64) {
        let period = self.period_samples(sampling_rate_hz);
        if period == 0 {
            return;
        }

        let keep = 1.0 - self.blend;
        for i in period..signal.len() {
            signal[i] = keep * signal[i] + self.blend * signal[i - period];
        }
    }

    fn name(&self) -> &str {
        "Notch Filter"
    }
}

/// Subtract the arithmetic mean of the whole signal
pub struct DcRemoval;

impl SignalStage for DcRemoval {
    fn apply(&self, signal: &mut [f64], _sampling_rate_hz: f64) {
        if signal.is_empty() {
            return;
        }
        let mean = signal.iter().sum::<f64>() / signal.len() as f64;
        for value in signal.iter_mut() {
            *value -= mean;
        }
    }

    fn name(&self) -> &str {
        "DC Removal"
    }
}

/// Filter bank for combining multiple stages
pub struct FilterBank {
    stages: Vec<Box<dyn SignalStage>>,
}

impl FilterBank {
    /// Create new filter bank
    pub fn new() -> Self {
        FilterBank { stages: Vec::new() }
    }

    /// Add a stage to the bank
    pub fn add_stage(&mut self, stage: Box<dyn SignalStage>) {
        self.stages.push(stage);
    }

    /// Bandpass approximation, notch approximation, DC removal
    pub fn from_config(config: &PreprocessConfig) -> Self {
        let mut bank = FilterBank::new();

        for _ in 0..config.smoothing_passes {
            bank.add_stage(Box::new(MovingAverageFilter::new(config.smoothing_window)));
        }
        bank.add_stage(Box::new(DriftRemovalFilter::new(config.drift_decay)));
        bank.add_stage(Box::new(NotchFilter::new(config.notch_freq_hz, config.notch_blend)));
        bank.add_stage(Box::new(DcRemoval));

        bank
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Apply stages sequentially
    pub fn apply(&self, signal: &mut [f64], sampling_rate_hz: f64) {
        for stage in &self.stages {
            stage.apply(signal, sampling_rate_hz);
        }
    }
}

impl Default for FilterBank {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed preprocessing chain applied to every raw epoch
pub struct Preprocessor {
    config: PreprocessConfig,
    bank: FilterBank,
}

impl Preprocessor {
    pub fn new(config: PreprocessConfig) -> BciResult<Self> {
        config.validate()?;
        let bank = FilterBank::from_config(&config);
        Ok(Preprocessor { config, bank })
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    /// Filter a raw signal; output has the same length as the input
    ///
    /// An empty input yields an empty output.
    pub fn preprocess(&self, raw_signal: &[f64], sampling_rate_hz: f64) -> Vec<f64> {
        let mut signal = raw_signal.to_vec();
        self.bank.apply(&mut signal, sampling_rate_hz);
        signal
    }

    /// Like [`Preprocessor::preprocess`], rejecting inputs the chain cannot
    /// give meaningful output for
    pub fn preprocess_checked(
        &self,
        raw_signal: &[f64],
        sampling_rate_hz: f64,
    ) -> BciResult<(Vec<f64>, ProcessingMetrics)> {
        let mut timer = ProcessingMetrics::start_timing();

        if raw_signal.is_empty() {
            return Err(BciError::invalid_input("Cannot preprocess an empty signal"));
        }
        if !(sampling_rate_hz > 0.0) {
            return Err(BciError::invalid_input("Sampling rate must be positive"));
        }
        if raw_signal.iter().any(|v| !v.is_finite()) {
            return Err(BciError::invalid_input("Signal contains non-finite samples"));
        }

        let filtered = self.preprocess(raw_signal, sampling_rate_hz);
        timer.set_stages_applied(self.bank.len());
        let metrics = timer.finish();
        debug!(
            samples = filtered.len(),
            time_us = metrics.processing_time_us,
            "Preprocessed signal"
        );

        Ok((filtered, metrics))
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Preprocessor {
            bank: FilterBank::from_config(&PreprocessConfig::default()),
            config: PreprocessConfig::default(),
        }
    }
}

/// Preprocess with the default chain
pub fn preprocess(raw_signal: &[f64], sampling_rate_hz: f64) -> Vec<f64> {
    Preprocessor::default().preprocess(raw_signal, sampling_rate_hz)
}
