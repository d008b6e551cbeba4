//! Feature extraction over a fixed post-stimulus window

use crate::config::FeatureConfig;
use bci_core::{BciError, BciResult, FeatureVector};
use tracing::warn;

/// Index of the timestamp closest to `target_ms`; ties keep the first match
fn nearest_index(timestamps_ms: &[f64], target_ms: f64) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &t) in timestamps_ms.iter().enumerate() {
        let distance = (t - target_ms).abs();
        match best {
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => best = Some((i, distance)),
        }
    }
    best.map(|(i, _)| i)
}

/// Feature extractor implementation
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    config: FeatureConfig,
}

impl FeatureExtractor {
    /// Create new feature extractor
    pub fn new(config: FeatureConfig) -> BciResult<Self> {
        config.validate()?;
        Ok(FeatureExtractor { config })
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Sample index range `[start, end]` of the analysis window, if any
    pub fn window_bounds(&self, timestamps_ms: &[f64]) -> Option<(usize, usize)> {
        let start = nearest_index(timestamps_ms, self.config.window_start_ms)?;
        let end = nearest_index(timestamps_ms, self.config.window_end_ms)?;
        if start > end {
            return None;
        }
        Some((start, end))
    }

    /// Reduce one filtered epoch to (mean, peak, latency)
    ///
    /// Both slices must have the same length. An empty window yields the
    /// zero vector.
    pub fn extract(&self, filtered_signal: &[f64], timestamps_ms: &[f64]) -> FeatureVector {
        let len = filtered_signal.len().min(timestamps_ms.len());
        let signal = &filtered_signal[..len];
        let timestamps = &timestamps_ms[..len];

        let Some((start, end)) = self.window_bounds(timestamps) else {
            warn!(samples = len, "Empty analysis window, returning zero features");
            return FeatureVector::zero();
        };

        let window = &signal[start..=end];
        let mean = window.iter().sum::<f64>() / window.len() as f64;
        let peak = window.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));

        // Strict equality re-scan: the first sample whose magnitude is the peak
        let latency_ms = window
            .iter()
            .position(|v| v.abs() == peak)
            .map(|offset| timestamps[start + offset])
            .unwrap_or(0.0);

        FeatureVector::new(mean, peak, latency_ms)
    }

    /// Like [`FeatureExtractor::extract`], rejecting misaligned inputs
    pub fn extract_checked(&self, filtered_signal: &[f64], timestamps_ms: &[f64]) -> BciResult<FeatureVector> {
        if filtered_signal.len() != timestamps_ms.len() {
            return Err(BciError::invalid_input(format!(
                "Signal length {} doesn't match timestamp count {}",
                filtered_signal.len(),
                timestamps_ms.len()
            )));
        }
        Ok(self.extract(filtered_signal, timestamps_ms))
    }

    /// Map [`FeatureExtractor::extract_checked`] over parallel lists
    pub fn extract_batch(&self, signals: &[Vec<f64>], timestamps: &[Vec<f64>]) -> BciResult<Vec<FeatureVector>> {
        if signals.len() != timestamps.len() {
            return Err(BciError::invalid_input(format!(
                "Got {} signals but {} timestamp arrays",
                signals.len(),
                timestamps.len()
            )));
        }

        signals
            .iter()
            .zip(timestamps)
            .map(|(signal, ts)| self.extract_checked(signal, ts))
            .collect()
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        FeatureExtractor {
            config: FeatureConfig::default(),
        }
    }
}

/// Extract features with the default 300-600ms window
pub fn extract_features(filtered_signal: &[f64], timestamps_ms: &[f64]) -> FeatureVector {
    FeatureExtractor::default().extract(filtered_signal, timestamps_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timestamps(n: usize, rate: f64) -> Vec<f64> {
        (0..n).map(|i| i as f64 * 1000.0 / rate).collect()
    }

    #[test]
    fn test_zero_signal_features() {
        let ts = timestamps(250, 250.0);
        let features = extract_features(&vec![0.0; 250], &ts);
        assert_eq!(features.mean, 0.0);
        assert_eq!(features.peak, 0.0);
        assert_eq!(features.latency_ms, 300.0);
    }

    #[test]
    fn test_empty_signal_returns_zero_vector() {
        assert_eq!(extract_features(&[], &[]), FeatureVector::zero());
    }

    #[test]
    fn test_window_bounds_nearest_match() {
        let extractor = FeatureExtractor::default();
        let ts = timestamps(250, 250.0);
        assert_eq!(extractor.window_bounds(&ts), Some((75, 150)));

        // Both boundaries equidistant from two samples: first one wins
        let ts = vec![290.0, 310.0, 590.0, 610.0];
        assert_eq!(extractor.window_bounds(&ts), Some((0, 2)));
    }

    #[test]
    fn test_peak_and_latency() {
        let ts = timestamps(250, 250.0);
        let mut signal = vec![0.0; 250];
        signal[100] = -3.0; // 400ms, larger magnitude
        signal[110] = 2.0; // 440ms
        signal[20] = 10.0; // outside window

        let features = extract_features(&signal, &ts);
        assert_eq!(features.peak, 3.0);
        assert_eq!(features.latency_ms, 400.0);
        let expected_mean = (-3.0 + 2.0) / 76.0;
        assert!((features.mean - expected_mean).abs() < 1e-12);
    }

    #[test]
    fn test_latency_takes_first_of_equal_peaks() {
        let ts = timestamps(250, 250.0);
        let mut signal = vec![0.0; 250];
        signal[120] = 1.5;
        signal[90] = -1.5;
        let features = extract_features(&signal, &ts);
        assert_eq!(features.latency_ms, 360.0);
    }

    #[test]
    fn test_window_outside_signal_collapses_to_edges() {
        // Every timestamp is before the window; both bounds land on the last sample
        let ts = vec![0.0, 4.0, 8.0];
        let features = extract_features(&[1.0, -2.0, 0.5], &ts);
        assert_eq!(features.mean, 0.5);
        assert_eq!(features.peak, 0.5);
        assert_eq!(features.latency_ms, 8.0);
    }

    #[test]
    fn test_batch_and_shape_checks() {
        let extractor = FeatureExtractor::default();
        let ts = timestamps(250, 250.0);
        let signals = vec![vec![0.0; 250], vec![1.0; 250]];
        let features = extractor.extract_batch(&signals, &[ts.clone(), ts.clone()]).unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features[1].mean, 1.0);

        assert!(extractor.extract_batch(&signals, &[ts.clone()]).is_err());
        assert!(extractor.extract_checked(&[0.0; 3], &ts).is_err());
    }
}
