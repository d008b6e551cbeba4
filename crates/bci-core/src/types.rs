//! Stimulus, feature and prediction types shared across the pipeline

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::BciError;

/// Class of the stimulus shown during one trial
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StimulusClass {
    /// The attended object flashed; an ERP component is expected
    Target,
    /// Any other object flashed
    NonTarget,
}

impl StimulusClass {
    /// Classifier label a perfect decoder would assign to this class
    pub fn expected_label(self) -> Label {
        match self {
            StimulusClass::Target => Label::Yes,
            StimulusClass::NonTarget => Label::No,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StimulusClass::Target => "target",
            StimulusClass::NonTarget => "non-target",
        }
    }
}

impl fmt::Display for StimulusClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StimulusClass {
    type Err = BciError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "target" => Ok(StimulusClass::Target),
            "non-target" | "nontarget" | "non_target" => Ok(StimulusClass::NonTarget),
            other => Err(BciError::invalid_input(format!("unknown stimulus class '{}'", other))),
        }
    }
}

/// Binary classifier output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Label {
    Yes,
    No,
}

impl Label {
    pub fn is_yes(self) -> bool {
        self == Label::Yes
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Label::Yes => "YES",
            Label::No => "NO",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Label {
    type Err = BciError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "YES" => Ok(Label::Yes),
            "NO" => Ok(Label::No),
            other => Err(BciError::invalid_input(format!("unknown label '{}'", other))),
        }
    }
}

/// Summary of one epoch's analysis window
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureVector {
    /// Arithmetic mean of the window samples
    pub mean: f64,
    /// Largest absolute amplitude in the window
    pub peak: f64,
    /// Timestamp (ms) of the first sample reaching `peak`
    #[serde(alias = "latency")]
    pub latency_ms: f64,
}

impl FeatureVector {
    pub const DIMENSIONS: usize = 3;

    pub fn new(mean: f64, peak: f64, latency_ms: f64) -> Self {
        Self { mean, peak, latency_ms }
    }

    /// Zero vector returned for an empty analysis window
    pub fn zero() -> Self {
        Self::default()
    }

    /// Features in (mean, peak, latency) order
    pub fn as_array(&self) -> [f64; 3] {
        [self.mean, self.peak, self.latency_ms]
    }

    pub fn is_finite(&self) -> bool {
        self.as_array().iter().all(|v| v.is_finite())
    }
}

impl From<[f64; 3]> for FeatureVector {
    fn from(values: [f64; 3]) -> Self {
        Self::new(values[0], values[1], values[2])
    }
}

/// Classifier decision for one feature vector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: Label,
    /// Sigmoid of the discriminant score, in [0, 1]
    pub confidence: f64,
}

impl Prediction {
    pub fn new(label: Label, confidence: f64) -> Self {
        Self { label, confidence }
    }

    /// Output used whenever no decision can be made
    pub fn fallback() -> Self {
        Self { label: Label::No, confidence: 0.5 }
    }
}

/// Parameters of the two-class linear discriminant
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifierModel {
    pub weights: [f64; 3],
    pub bias: f64,
    pub decision_threshold: f64,
}
