//! Configuration management for signal processing

use bci_core::{BciError, BciResult};
use serde::{Deserialize, Serialize};

/// Fixed preprocessing chain parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Moving-average window in samples
    pub smoothing_window: usize,
    /// Number of moving-average passes
    pub smoothing_passes: usize,
    /// Feedback coefficient of the drift-removal pass
    pub drift_decay: f64,
    /// Powerline frequency targeted by the notch stage (Hz)
    pub notch_freq_hz: f64,
    /// Weight given to the sample one powerline period earlier
    pub notch_blend: f64,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            smoothing_window: 5,
            smoothing_passes: 2,
            drift_decay: 0.95,
            notch_freq_hz: 50.0,
            notch_blend: 0.2,
        }
    }
}

impl PreprocessConfig {
    pub fn validate(&self) -> BciResult<()> {
        if self.smoothing_window == 0 {
            return Err(BciError::invalid_config("Smoothing window must be at least 1 sample"));
        }
        if !(0.0..1.0).contains(&self.drift_decay) {
            return Err(BciError::invalid_config("Drift decay must be in [0, 1)"));
        }
        if !(self.notch_freq_hz > 0.0) {
            return Err(BciError::invalid_config("Notch frequency must be positive"));
        }
        if !(0.0..=1.0).contains(&self.notch_blend) {
            return Err(BciError::invalid_config("Notch blend must be in [0, 1]"));
        }
        Ok(())
    }
}

/// Analysis window used for feature extraction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub window_start_ms: f64,
    pub window_end_ms: f64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            window_start_ms: 300.0,
            window_end_ms: 600.0,
        }
    }
}

impl FeatureConfig {
    pub fn validate(&self) -> BciResult<()> {
        if !(self.window_start_ms < self.window_end_ms) {
            return Err(BciError::invalid_config("Feature window start must precede its end"));
        }
        Ok(())
    }
}

/// Precomputed discriminant parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FixedParameters {
    pub weights: [f64; 3],
    pub bias: f64,
}

/// Classifier construction settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Confidence above which the decision is YES
    pub decision_threshold: f64,
    /// Skip training and use these parameters
    pub fixed_parameters: Option<FixedParameters>,
    /// Simulated epochs per class used for startup training
    pub training_epochs_per_class: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            decision_threshold: 0.5,
            fixed_parameters: None,
            training_epochs_per_class: 40,
        }
    }
}

impl ClassifierConfig {
    pub fn validate(&self) -> BciResult<()> {
        if !(0.0..=1.0).contains(&self.decision_threshold) {
            return Err(BciError::invalid_config("Decision threshold must be in [0, 1]"));
        }
        if let Some(params) = &self.fixed_parameters {
            if !params.bias.is_finite() || params.weights.iter().any(|w| !w.is_finite()) {
                return Err(BciError::invalid_config("Fixed classifier parameters must be finite"));
            }
        } else if self.training_epochs_per_class == 0 {
            return Err(BciError::invalid_config(
                "Training needs at least one epoch per class when no fixed parameters are given",
            ));
        }
        Ok(())
    }
}

/// Multi-trial smoothing settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    pub window_size: usize,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self { window_size: 5 }
    }
}

impl SmoothingConfig {
    pub fn validate(&self) -> BciResult<()> {
        if self.window_size == 0 {
            return Err(BciError::invalid_config("Smoothing window must hold at least one trial"));
        }
        Ok(())
    }
}

/// Global processing configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    pub preprocess: PreprocessConfig,
    pub features: FeatureConfig,
    pub classifier: ClassifierConfig,
    pub smoothing: SmoothingConfig,
}

impl ProcessingConfig {
    /// Validate every section
    pub fn validate(&self) -> BciResult<()> {
        self.preprocess.validate()?;
        self.features.validate()?;
        self.classifier.validate()?;
        self.smoothing.validate()?;
        Ok(())
    }

    /// Parse and validate from JSON
    pub fn from_json(json: &str) -> BciResult<Self> {
        let config: ProcessingConfig = serde_json::from_str(json)
            .map_err(|e| BciError::invalid_config(format!("Failed to parse processing config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> BciResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| BciError::invalid_config(format!("Failed to serialize processing config: {}", e)))
    }
}
