//! Synthetic EEG epoch generator with an optional P300-like component

use bci_core::{BciError, BciResult, Epoch, StimulusClass};
use crate::signal_patterns::ErpPattern;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::Distribution;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Largest epoch the simulator will allocate
pub const MAX_SAMPLES: usize = 1_000_000;

/// Configuration for epoch simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Sampling rate in Hz
    pub sampling_rate_hz: f64,
    /// Epoch length in milliseconds
    pub duration_ms: f64,
    /// Standard deviation of the background noise, in [0, 1]
    pub noise_level: f64,
    /// Random seed for reproducibility
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            sampling_rate_hz: 250.0,
            duration_ms: 1000.0,
            noise_level: 0.5,
            seed: None,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> BciResult<()> {
        if !(self.sampling_rate_hz > 0.0) || !self.sampling_rate_hz.is_finite() {
            return Err(BciError::invalid_config("Sampling rate must be positive"));
        }
        if !(self.duration_ms > 0.0) || !self.duration_ms.is_finite() {
            return Err(BciError::invalid_config("Duration must be positive"));
        }
        if !(0.0..=1.0).contains(&self.noise_level) {
            return Err(BciError::invalid_config("Noise level must be between 0.0 and 1.0"));
        }
        let samples = self.sampling_rate_hz * self.duration_ms / 1000.0;
        if samples > MAX_SAMPLES as f64 {
            return Err(BciError::invalid_config(format!(
                "Epoch would hold {:.0} samples, more than the limit of {}",
                samples, MAX_SAMPLES
            )));
        }
        Ok(())
    }

    /// floor(rate * duration / 1000)
    pub fn sample_count(&self) -> usize {
        (self.sampling_rate_hz * self.duration_ms / 1000.0).floor() as usize
    }

    pub fn sample_interval_ms(&self) -> f64 {
        1000.0 / self.sampling_rate_hz
    }
}

/// Zero-mean Gaussian noise via the Box-Muller transform
#[derive(Debug, Clone, Copy)]
pub struct BoxMuller {
    std_dev: f64,
}

impl BoxMuller {
    pub fn new(std_dev: f64) -> Self {
        Self { std_dev }
    }
}

/// Uniform draw in (0, 1), redrawn on an exact zero so `ln` stays finite
fn open_uniform<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    loop {
        let u: f64 = rng.gen();
        if u > 0.0 {
            return u;
        }
    }
}

impl Distribution<f64> for BoxMuller {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let u1 = open_uniform(rng);
        let u2 = open_uniform(rng);
        self.std_dev * (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
    }
}

/// Epoch simulator
pub struct EpochSimulator {
    config: SimulationConfig,
    rng: StdRng,
    noise: BoxMuller,
}

impl EpochSimulator {
    /// Create new simulator with configuration
    pub fn new(config: SimulationConfig) -> BciResult<Self> {
        config.validate()?;

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let noise = BoxMuller::new(config.noise_level);

        Ok(EpochSimulator {
            config,
            rng,
            noise,
        })
    }

    /// Generate one labelled epoch
    pub fn simulate(&mut self, class: StimulusClass) -> BciResult<Epoch> {
        let n = self.config.sample_count();
        let dt = self.config.sample_interval_ms();
        let pattern = ErpPattern::for_class(class);

        let mut timestamps = Vec::with_capacity(n);
        let mut amplitudes = Vec::with_capacity(n);

        for i in 0..n {
            let t = i as f64 * dt;
            let value = self.noise.sample(&mut self.rng) + pattern.amplitude_at(t);

            timestamps.push(t);
            amplitudes.push(value);
        }

        Epoch::new(timestamps, amplitudes, self.config.sampling_rate_hz, Some(class))
    }

    /// Generate `n_target` target and `n_non_target` non-target epochs
    pub fn simulate_batch(&mut self, n_target: usize, n_non_target: usize) -> BciResult<Vec<Epoch>> {
        let mut epochs = Vec::with_capacity(n_target + n_non_target);
        for _ in 0..n_target {
            epochs.push(self.simulate(StimulusClass::Target)?);
        }
        for _ in 0..n_non_target {
            epochs.push(self.simulate(StimulusClass::NonTarget)?);
        }
        Ok(epochs)
    }

    /// Get current configuration
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Change the noise level for subsequent epochs
    pub fn set_noise_level(&mut self, noise_level: f64) -> BciResult<()> {
        let mut config = self.config.clone();
        config.noise_level = noise_level;
        config.validate()?;

        self.noise = BoxMuller::new(noise_level);
        self.config = config;
        Ok(())
    }

    /// Draw from the simulator's RNG, for callers that pick stimuli
    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }
}

/// One-shot simulation with an explicit configuration
pub fn simulate(class: StimulusClass, config: &SimulationConfig) -> BciResult<Epoch> {
    EpochSimulator::new(config.clone())?.simulate(class)
}
