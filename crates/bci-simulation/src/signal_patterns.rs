//! Event-related potential shapes added on top of background noise

use bci_core::StimulusClass;
use serde::{Deserialize, Serialize};

/// Deterministic component superimposed on a simulated epoch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ErpPattern {
    /// No evoked response
    Flat,
    /// Bell-shaped deflection, only present inside `[start_ms, end_ms]`
    Gaussian {
        peak_amplitude: f64,
        center_ms: f64,
        width_ms: f64,
        start_ms: f64,
        end_ms: f64,
    },
}

impl ErpPattern {
    /// P300-like component: 5.0 peak at 450ms, sigma 75ms, active 300-600ms
    pub fn p300() -> Self {
        ErpPattern::Gaussian {
            peak_amplitude: 5.0,
            center_ms: 450.0,
            width_ms: 75.0,
            start_ms: 300.0,
            end_ms: 600.0,
        }
    }

    /// Component evoked by a stimulus of the given class
    pub fn for_class(class: StimulusClass) -> Self {
        match class {
            StimulusClass::Target => ErpPattern::p300(),
            StimulusClass::NonTarget => ErpPattern::Flat,
        }
    }

    /// Component amplitude at time `t_ms`
    pub fn amplitude_at(&self, t_ms: f64) -> f64 {
        match *self {
            ErpPattern::Flat => 0.0,
            ErpPattern::Gaussian { peak_amplitude, center_ms, width_ms, start_ms, end_ms } => {
                if t_ms < start_ms || t_ms > end_ms {
                    return 0.0;
                }
                let z = (t_ms - center_ms) / width_ms;
                peak_amplitude * (-0.5 * z * z).exp()
            }
        }
    }
}
