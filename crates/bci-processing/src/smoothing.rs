//! Multi-trial smoothing of classifier outputs

use bci_core::{Label, Prediction};
use serde::{Deserialize, Serialize};

/// Stabilised decision over the most recent trials
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SmoothedDecision {
    pub decision: Label,
    pub confidence: f64,
    /// Number of predictions that went into the decision
    pub window_len: usize,
}

/// Recency-weighted smoother with a majority vote
#[derive(Debug, Clone, Copy)]
pub struct TrialSmoother {
    window_size: usize,
}

impl TrialSmoother {
    pub fn new(window_size: usize) -> Self {
        TrialSmoother {
            window_size: window_size.max(1),
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Combine the last `window_size` predictions, oldest first
    ///
    /// Confidence is the mean weighted by position (oldest 1, newest n).
    /// The decision is YES when at least ceil(n/2) predictions say YES.
    pub fn smooth(&self, recent: &[Prediction]) -> SmoothedDecision {
        if recent.is_empty() {
            let fallback = Prediction::fallback();
            return SmoothedDecision {
                decision: fallback.label,
                confidence: fallback.confidence,
                window_len: 0,
            };
        }

        let window = &recent[recent.len().saturating_sub(self.window_size)..];
        let n = window.len();

        let (weighted, total_weight) = window
            .iter()
            .enumerate()
            .fold((0.0, 0.0), |(sum, weights), (i, p)| {
                let w = (i + 1) as f64;
                (sum + w * p.confidence, weights + w)
            });

        let yes_votes = window.iter().filter(|p| p.label.is_yes()).count();
        let decision = if yes_votes >= n.div_ceil(2) { Label::Yes } else { Label::No };

        SmoothedDecision {
            decision,
            confidence: weighted / total_weight,
            window_len: n,
        }
    }
}

impl Default for TrialSmoother {
    fn default() -> Self {
        Self::new(5)
    }
}

/// Smooth with an explicit window size
pub fn smooth_predictions(recent: &[Prediction], window_size: usize) -> SmoothedDecision {
    TrialSmoother::new(window_size).smooth(recent)
}
