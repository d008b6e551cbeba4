//! Session, trial and calibration records

use crate::types::{FeatureVector, Label, Prediction, StimulusClass};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Persisted classifier output, owned by the trial that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionRecord {
    pub id: Uuid,
    pub label: Label,
    pub confidence: f64,
    /// Features the prediction was made from, when the pipeline produced them
    pub features: Option<FeatureVector>,
    pub created_at: DateTime<Utc>,
}

impl PredictionRecord {
    pub fn new(prediction: Prediction, features: Option<FeatureVector>) -> Self {
        Self {
            id: Uuid::new_v4(),
            label: prediction.label,
            confidence: prediction.confidence,
            features,
            created_at: Utc::now(),
        }
    }

    pub fn prediction(&self) -> Prediction {
        Prediction::new(self.label, self.confidence)
    }
}

/// One completed interaction within a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialRecord {
    pub id: Uuid,
    pub session_id: Uuid,
    pub trial_number: u32,
    pub stimulus_class: StimulusClass,
    pub response_time_ms: f64,
    pub correct: bool,
    pub predictions: Vec<PredictionRecord>,
    pub created_at: DateTime<Utc>,
}

impl TrialRecord {
    pub fn new(
        session_id: Uuid,
        trial_number: u32,
        stimulus_class: StimulusClass,
        response_time_ms: f64,
        correct: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            trial_number,
            stimulus_class,
            response_time_ms,
            correct,
            predictions: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_prediction(mut self, prediction: PredictionRecord) -> Self {
        self.predictions.push(prediction);
        self
    }

    /// Most recent prediction attached to this trial
    pub fn latest_prediction(&self) -> Option<&PredictionRecord> {
        self.predictions.last()
    }
}

/// Live adaptive-difficulty state, one per session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationState {
    /// Stimulus flash speed multiplier, kept within [0.6, 1.5]
    pub flash_speed: f64,
    /// Number of flashing objects, kept within [3, 4]
    pub object_count: u32,
    /// Accuracy over the most recent trials, in [0, 1]
    pub recent_accuracy: f64,
    /// Decision threshold applied to classifier confidence
    pub confidence_threshold: f64,
    /// Pause between trials in milliseconds
    pub trial_interval_ms: u64,
    pub updated_at: DateTime<Utc>,
}

impl Default for CalibrationState {
    fn default() -> Self {
        Self {
            flash_speed: 1.0,
            object_count: 3,
            recent_accuracy: 0.0,
            confidence_threshold: 0.5,
            trial_interval_ms: 2000,
            updated_at: Utc::now(),
        }
    }
}

/// One participant's run of trials
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: Uuid,
    pub participant: String,
    /// Fraction of correct trials, 0 when there are none
    pub accuracy: f64,
    pub total_trials: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(participant: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            participant: participant.into(),
            accuracy: 0.0,
            total_trials: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Recompute `accuracy` and `total_trials` from the full trial list
    pub fn recompute_aggregates(&mut self, trials: &[TrialRecord]) {
        let total = trials.len();
        let correct = trials.iter().filter(|t| t.correct).count();

        self.total_trials = total as u32;
        self.accuracy = if total == 0 {
            0.0
        } else {
            correct as f64 / total as f64
        };
        self.updated_at = Utc::now();
    }
}

/// Accuracy over the last `window` trials by trial number
pub fn rolling_accuracy(trials: &[TrialRecord], window: usize) -> f64 {
    if trials.is_empty() || window == 0 {
        return 0.0;
    }

    let mut ordered: Vec<&TrialRecord> = trials.iter().collect();
    ordered.sort_by_key(|t| t.trial_number);

    let recent = &ordered[ordered.len().saturating_sub(window)..];
    let correct = recent.iter().filter(|t| t.correct).count();
    correct as f64 / recent.len() as f64
}
