//! Two-class linear discriminant over (mean, peak, latency) features
//!
//! Training estimates per-class means and a pooled within-class covariance,
//! then sets `w = Σ⁻¹(μ_yes − μ_no)` and `b = −½·wᵀ(μ_yes + μ_no)`. The score
//! `w·x + b` is squashed through a sigmoid and compared with the decision
//! threshold.

use crate::config::ClassifierConfig;
use bci_core::{BciError, BciResult, ClassifierModel, FeatureVector, Label, Prediction};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Added to each covariance diagonal entry before inversion
pub const COVARIANCE_REGULARIZATION: f64 = 1e-6;

/// Covariance matrices with |det| below this are treated as singular
pub const SINGULAR_DETERMINANT: f64 = 1e-10;

type Matrix3 = [[f64; 3]; 3];

const IDENTITY: Matrix3 = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

fn determinant(m: &Matrix3) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

/// Closed-form inverse via the adjugate; `None` when near-singular
fn invert(m: &Matrix3) -> Option<Matrix3> {
    let det = determinant(m);
    if det.abs() < SINGULAR_DETERMINANT {
        return None;
    }

    // Cofactor matrix, transposed in place to form the adjugate
    let adjugate = [
        [
            m[1][1] * m[2][2] - m[1][2] * m[2][1],
            m[0][2] * m[2][1] - m[0][1] * m[2][2],
            m[0][1] * m[1][2] - m[0][2] * m[1][1],
        ],
        [
            m[1][2] * m[2][0] - m[1][0] * m[2][2],
            m[0][0] * m[2][2] - m[0][2] * m[2][0],
            m[0][2] * m[1][0] - m[0][0] * m[1][2],
        ],
        [
            m[1][0] * m[2][1] - m[1][1] * m[2][0],
            m[0][1] * m[2][0] - m[0][0] * m[2][1],
            m[0][0] * m[1][1] - m[0][1] * m[1][0],
        ],
    ];

    let mut inverse = [[0.0; 3]; 3];
    for (row, adj_row) in inverse.iter_mut().zip(adjugate.iter()) {
        for (value, adj) in row.iter_mut().zip(adj_row.iter()) {
            *value = adj / det;
        }
    }
    Some(inverse)
}

fn mat_vec(m: &Matrix3, v: &[f64; 3]) -> [f64; 3] {
    let mut out = [0.0; 3];
    for (o, row) in out.iter_mut().zip(m.iter()) {
        *o = row.iter().zip(v.iter()).map(|(a, b)| a * b).sum();
    }
    out
}

fn dot(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn class_mean(samples: &[[f64; 3]]) -> [f64; 3] {
    let mut mean = [0.0; 3];
    for sample in samples {
        for (m, v) in mean.iter_mut().zip(sample.iter()) {
            *m += v;
        }
    }
    let n = samples.len() as f64;
    mean.map(|m| m / n)
}

/// Accumulate (x - μ)(x - μ)ᵀ into `scatter`
fn accumulate_scatter(scatter: &mut Matrix3, samples: &[[f64; 3]], mean: &[f64; 3]) {
    for sample in samples {
        let centered = [sample[0] - mean[0], sample[1] - mean[1], sample[2] - mean[2]];
        for i in 0..3 {
            for j in 0..3 {
                scatter[i][j] += centered[i] * centered[j];
            }
        }
    }
}

fn sigmoid(score: f64) -> f64 {
    1.0 / (1.0 + (-score).exp())
}

/// Learned (or supplied) discriminant parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearDiscriminant {
    pub weights: [f64; 3],
    pub bias: f64,
}

impl LinearDiscriminant {
    pub fn score(&self, features: &FeatureVector) -> f64 {
        dot(&self.weights, &features.as_array()) + self.bias
    }
}

/// Classifier lifecycle; training moves it to `Trained` and it never goes back
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifierState {
    Untrained,
    Trained(LinearDiscriminant),
}

/// What a call to [`LdaClassifier::train`] did
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub yes_samples: usize,
    pub no_samples: usize,
    /// False when a class was missing and parameters were left untouched
    pub updated: bool,
    /// True when the covariance was singular and the identity was used
    pub identity_fallback: bool,
}

/// Two-class linear discriminant classifier
#[derive(Debug, Clone)]
pub struct LdaClassifier {
    state: ClassifierState,
    decision_threshold: f64,
}

impl LdaClassifier {
    /// Untrained classifier with the default 0.5 threshold
    pub fn new() -> Self {
        LdaClassifier {
            state: ClassifierState::Untrained,
            decision_threshold: 0.5,
        }
    }

    /// Classifier that is trained from the start with fixed parameters
    pub fn with_parameters(weights: [f64; 3], bias: f64) -> Self {
        LdaClassifier {
            state: ClassifierState::Trained(LinearDiscriminant { weights, bias }),
            decision_threshold: 0.5,
        }
    }

    /// Build from configuration; untrained unless fixed parameters are given
    pub fn from_config(config: &ClassifierConfig) -> BciResult<Self> {
        config.validate()?;
        let mut classifier = match &config.fixed_parameters {
            Some(params) => {
                info!("Using fixed classifier parameters");
                LdaClassifier::with_parameters(params.weights, params.bias)
            }
            None => LdaClassifier::new(),
        };
        classifier.set_threshold(config.decision_threshold);
        Ok(classifier)
    }

    pub fn state(&self) -> &ClassifierState {
        &self.state
    }

    pub fn is_trained(&self) -> bool {
        matches!(self.state, ClassifierState::Trained(_))
    }

    pub fn threshold(&self) -> f64 {
        self.decision_threshold
    }

    /// Set the decision threshold, clamped to [0, 1]
    pub fn set_threshold(&mut self, threshold: f64) {
        if threshold.is_nan() {
            warn!("Ignoring NaN decision threshold");
            return;
        }
        self.decision_threshold = threshold.clamp(0.0, 1.0);
    }

    /// Current parameters, if trained
    pub fn model(&self) -> Option<ClassifierModel> {
        match &self.state {
            ClassifierState::Untrained => None,
            ClassifierState::Trained(lda) => Some(ClassifierModel {
                weights: lda.weights,
                bias: lda.bias,
                decision_threshold: self.decision_threshold,
            }),
        }
    }

    /// Fit the discriminant to labelled features
    ///
    /// Both classes must be present; otherwise a warning is logged and the
    /// existing parameters are kept. Mismatched lengths are rejected.
    pub fn train(&mut self, features: &[FeatureVector], labels: &[Label]) -> BciResult<TrainingReport> {
        if features.len() != labels.len() {
            return Err(BciError::invalid_input(format!(
                "Got {} feature vectors but {} labels",
                features.len(),
                labels.len()
            )));
        }

        let mut yes = Vec::new();
        let mut no = Vec::new();
        for (f, label) in features.iter().zip(labels) {
            match label {
                Label::Yes => yes.push(f.as_array()),
                Label::No => no.push(f.as_array()),
            }
        }

        let mut report = TrainingReport {
            yes_samples: yes.len(),
            no_samples: no.len(),
            updated: false,
            identity_fallback: false,
        };

        if yes.is_empty() || no.is_empty() {
            warn!(
                yes = yes.len(),
                no = no.len(),
                "Training data must contain both classes; keeping current parameters"
            );
            return Ok(report);
        }

        let mean_yes = class_mean(&yes);
        let mean_no = class_mean(&no);

        let mut covariance = [[0.0; 3]; 3];
        accumulate_scatter(&mut covariance, &yes, &mean_yes);
        accumulate_scatter(&mut covariance, &no, &mean_no);

        let dof = (yes.len() + no.len()).saturating_sub(2).max(1) as f64;
        for (i, row) in covariance.iter_mut().enumerate() {
            for value in row.iter_mut() {
                *value /= dof;
            }
            row[i] += COVARIANCE_REGULARIZATION;
        }

        let inverse = match invert(&covariance) {
            Some(inverse) => inverse,
            None => {
                warn!(
                    determinant = determinant(&covariance),
                    "Singular covariance matrix, falling back to identity"
                );
                report.identity_fallback = true;
                IDENTITY
            }
        };

        let diff = [
            mean_yes[0] - mean_no[0],
            mean_yes[1] - mean_no[1],
            mean_yes[2] - mean_no[2],
        ];
        let sum = [
            mean_yes[0] + mean_no[0],
            mean_yes[1] + mean_no[1],
            mean_yes[2] + mean_no[2],
        ];

        let weights = mat_vec(&inverse, &diff);
        let bias = -0.5 * dot(&weights, &sum);

        self.state = ClassifierState::Trained(LinearDiscriminant { weights, bias });
        report.updated = true;

        info!(
            yes = report.yes_samples,
            no = report.no_samples,
            weights = ?weights,
            bias,
            "Classifier trained"
        );
        Ok(report)
    }

    /// Classify with the classifier's own threshold
    pub fn predict(&self, features: &FeatureVector) -> Prediction {
        self.predict_with_threshold(features, self.decision_threshold)
    }

    /// Classify with an explicit threshold (clamped to [0, 1])
    pub fn predict_with_threshold(&self, features: &FeatureVector, threshold: f64) -> Prediction {
        match &self.state {
            ClassifierState::Untrained => Prediction::fallback(),
            ClassifierState::Trained(lda) => {
                let threshold = if threshold.is_nan() {
                    self.decision_threshold
                } else {
                    threshold.clamp(0.0, 1.0)
                };
                let score = lda.score(features);
                let confidence = sigmoid(score);
                let label = if confidence > threshold { Label::Yes } else { Label::No };
                debug!(score, confidence, label = %label, "Classified features");
                Prediction::new(label, confidence)
            }
        }
    }
}

impl Default for LdaClassifier {
    fn default() -> Self {
        Self::new()
    }
}
