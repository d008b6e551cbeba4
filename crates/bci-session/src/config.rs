//! Service configuration, loadable from JSON

use anyhow::{Context, Result};
use bci_core::{BciError, BciResult, CalibrationState};
use bci_processing::difficulty::{MAX_FLASH_SPEED, MAX_OBJECTS, MIN_FLASH_SPEED, MIN_OBJECTS};
use bci_processing::ProcessingConfig;
use bci_simulation::SimulationConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Starting difficulty for new sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationDefaults {
    pub flash_speed: f64,
    pub object_count: u32,
    pub confidence_threshold: f64,
    pub trial_interval_ms: u64,
}

impl Default for CalibrationDefaults {
    fn default() -> Self {
        let state = CalibrationState::default();
        Self {
            flash_speed: state.flash_speed,
            object_count: state.object_count,
            confidence_threshold: state.confidence_threshold,
            trial_interval_ms: state.trial_interval_ms,
        }
    }
}

impl CalibrationDefaults {
    pub fn validate(&self) -> BciResult<()> {
        if !(MIN_FLASH_SPEED..=MAX_FLASH_SPEED).contains(&self.flash_speed) {
            return Err(BciError::invalid_config(format!(
                "Flash speed must be in [{}, {}]",
                MIN_FLASH_SPEED, MAX_FLASH_SPEED
            )));
        }
        if !(MIN_OBJECTS..=MAX_OBJECTS).contains(&self.object_count) {
            return Err(BciError::invalid_config(format!(
                "Object count must be in [{}, {}]",
                MIN_OBJECTS, MAX_OBJECTS
            )));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(BciError::invalid_config("Confidence threshold must be in [0, 1]"));
        }
        if self.trial_interval_ms == 0 {
            return Err(BciError::invalid_config("Trial interval must be greater than 0"));
        }
        Ok(())
    }

    /// Fresh calibration state for a new session
    pub fn to_state(&self) -> CalibrationState {
        CalibrationState {
            flash_speed: self.flash_speed,
            object_count: self.object_count,
            confidence_threshold: self.confidence_threshold,
            trial_interval_ms: self.trial_interval_ms,
            ..CalibrationState::default()
        }
    }
}

/// Everything the session service needs at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub processing: ProcessingConfig,
    /// Used for startup training and the demo trial stream
    pub simulation: SimulationConfig,
    /// Trials that count toward rolling accuracy
    pub accuracy_window: usize,
    pub calibration: CalibrationDefaults,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            processing: ProcessingConfig::default(),
            simulation: SimulationConfig::default(),
            accuracy_window: 5,
            calibration: CalibrationDefaults::default(),
        }
    }
}

impl ServiceConfig {
    pub fn validate(&self) -> BciResult<()> {
        self.processing.validate()?;
        self.simulation.validate()?;
        self.calibration.validate()?;
        if self.accuracy_window == 0 {
            return Err(BciError::invalid_config("Accuracy window must hold at least one trial"));
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> BciResult<Self> {
        let config: ServiceConfig = serde_json::from_str(json)
            .map_err(|e| BciError::invalid_config(format!("Failed to parse service config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::from_json(&json)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }
}
