//! Request/response shapes for the six core operations
//!
//! Each handler validates its request and rejects malformed input with
//! `BciError::InvalidInput` before any core code runs.

use bci_core::{input_error, BciError, BciResult, FeatureVector, Label, Prediction, StimulusClass};
use bci_processing::{difficulty, smoothing, FeatureExtractor, LdaClassifier, Preprocessor};
use bci_simulation::{simulate as simulate_epoch, SimulationConfig};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

const DEFAULT_SAMPLING_RATE_HZ: f64 = 250.0;

/// Decode a JSON request body, mapping shape errors to `InvalidInput`
pub fn decode_request<T: DeserializeOwned>(json: &str) -> BciResult<T> {
    serde_json::from_str(json).map_err(|e| BciError::invalid_input(format!("Malformed request: {}", e)))
}

fn require_finite(name: &str, values: &[f64]) -> BciResult<()> {
    if values.iter().any(|v| !v.is_finite()) {
        return Err(input_error!("{} must contain only finite numbers", name));
    }
    Ok(())
}

fn require_same_length(signal: &[f64], timestamps: &[f64]) -> BciResult<()> {
    if signal.len() != timestamps.len() {
        return Err(input_error!(
            "Signal has {} samples but {} timestamps were given",
            signal.len(),
            timestamps.len()
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulateRequest {
    pub class: StimulusClass,
    pub sampling_rate_hz: f64,
    pub duration_ms: f64,
    pub noise_level: f64,
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulateResponse {
    pub timestamps: Vec<f64>,
    pub raw_signal: Vec<f64>,
}

pub fn simulate(request: &SimulateRequest) -> BciResult<SimulateResponse> {
    let config = SimulationConfig {
        sampling_rate_hz: request.sampling_rate_hz,
        duration_ms: request.duration_ms,
        noise_level: request.noise_level,
        seed: request.seed,
    };
    config
        .validate()
        .map_err(|e| BciError::invalid_input(e.to_string()))?;

    let epoch = simulate_epoch(request.class, &config)?;
    Ok(SimulateResponse {
        timestamps: epoch.timestamps_ms,
        raw_signal: epoch.amplitudes,
    })
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreprocessRequest {
    pub raw_signal: Vec<f64>,
    pub timestamps: Vec<f64>,
    /// Derived from the timestamp spacing when absent
    #[serde(default)]
    pub sampling_rate_hz: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreprocessResponse {
    pub raw_signal: Vec<f64>,
    pub filtered_signal: Vec<f64>,
}

fn infer_sampling_rate(timestamps: &[f64]) -> BciResult<f64> {
    match timestamps {
        [first, second, ..] => {
            let spacing = second - first;
            if spacing > 0.0 {
                Ok(1000.0 / spacing)
            } else {
                Err(BciError::invalid_input("Timestamps must be strictly increasing"))
            }
        }
        _ => Ok(DEFAULT_SAMPLING_RATE_HZ),
    }
}

pub fn preprocess(preprocessor: &Preprocessor, request: PreprocessRequest) -> BciResult<PreprocessResponse> {
    require_same_length(&request.raw_signal, &request.timestamps)?;
    require_finite("rawSignal", &request.raw_signal)?;
    require_finite("timestamps", &request.timestamps)?;

    let sampling_rate_hz = match request.sampling_rate_hz {
        Some(rate) => rate,
        None => infer_sampling_rate(&request.timestamps)?,
    };

    let (filtered_signal, _) = preprocessor.preprocess_checked(&request.raw_signal, sampling_rate_hz)?;
    Ok(PreprocessResponse {
        raw_signal: request.raw_signal,
        filtered_signal,
    })
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractFeaturesRequest {
    pub filtered_signal: Vec<f64>,
    pub timestamps: Vec<f64>,
}

/// Feature vector as exchanged with clients
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeaturePayload {
    pub mean: f64,
    pub peak: f64,
    pub latency: f64,
}

impl From<FeatureVector> for FeaturePayload {
    fn from(f: FeatureVector) -> Self {
        FeaturePayload {
            mean: f.mean,
            peak: f.peak,
            latency: f.latency_ms,
        }
    }
}

impl From<FeaturePayload> for FeatureVector {
    fn from(p: FeaturePayload) -> Self {
        FeatureVector::new(p.mean, p.peak, p.latency)
    }
}

pub fn extract_features(extractor: &FeatureExtractor, request: &ExtractFeaturesRequest) -> BciResult<FeaturePayload> {
    require_same_length(&request.filtered_signal, &request.timestamps)?;
    require_finite("filteredSignal", &request.filtered_signal)?;
    require_finite("timestamps", &request.timestamps)?;

    let features = extractor.extract_checked(&request.filtered_signal, &request.timestamps)?;
    Ok(features.into())
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassifyResponse {
    pub prediction: Label,
    pub confidence: f64,
}

pub fn classify(classifier: &LdaClassifier, request: &FeaturePayload) -> BciResult<ClassifyResponse> {
    require_finite("features", &[request.mean, request.peak, request.latency])?;

    let prediction = classifier.predict(&FeatureVector::from(*request));
    Ok(ClassifyResponse {
        prediction: prediction.label,
        confidence: prediction.confidence,
    })
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmoothRequest {
    pub predictions: Vec<Prediction>,
    #[serde(default = "default_window_size")]
    pub window_size: usize,
}

fn default_window_size() -> usize {
    5
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SmoothResponse {
    pub decision: Label,
    pub confidence: f64,
}

pub fn smooth_predictions(request: &SmoothRequest) -> BciResult<SmoothResponse> {
    if request.window_size == 0 {
        return Err(BciError::invalid_input("windowSize must be at least 1"));
    }
    if let Some(bad) = request
        .predictions
        .iter()
        .find(|p| !(0.0..=1.0).contains(&p.confidence))
    {
        return Err(input_error!("Prediction confidence {} is outside [0, 1]", bad.confidence));
    }

    let smoothed = smoothing::smooth_predictions(&request.predictions, request.window_size);
    Ok(SmoothResponse {
        decision: smoothed.decision,
        confidence: smoothed.confidence,
    })
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdaptRequest {
    pub recent_accuracy: f64,
    pub flash_speed: f64,
    pub object_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdaptResponse {
    pub new_flash_speed: f64,
    pub new_object_count: u32,
    pub notification: String,
}

pub fn adapt_difficulty(request: &AdaptRequest) -> BciResult<AdaptResponse> {
    if !(0.0..=1.0).contains(&request.recent_accuracy) {
        return Err(BciError::invalid_input("recentAccuracy must be in [0, 1]"));
    }
    require_finite("flashSpeed", &[request.flash_speed])?;

    let update = difficulty::adapt_difficulty(request.recent_accuracy, request.flash_speed, request.object_count);
    Ok(AdaptResponse {
        new_flash_speed: update.flash_speed,
        new_object_count: update.object_count,
        notification: update.notification,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bci_processing::{FeatureConfig, PreprocessConfig};

    #[test]
    fn test_simulate_request() {
        let request: SimulateRequest = decode_request(
            r#"{ "class": "target", "samplingRateHz": 250, "durationMs": 1000, "noiseLevel": 0.0 }"#,
        )
        .unwrap();
        let response = simulate(&request).unwrap();
        assert_eq!(response.timestamps.len(), 250);
        assert_eq!(response.raw_signal.len(), 250);

        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("rawSignal").is_some());
    }

    #[test]
    fn test_simulate_rejects_bad_parameters() {
        let request = SimulateRequest {
            class: StimulusClass::NonTarget,
            sampling_rate_hz: -1.0,
            duration_ms: 1000.0,
            noise_level: 0.5,
            seed: None,
        };
        assert!(matches!(simulate(&request), Err(BciError::InvalidInput { .. })));
    }

    #[test]
    fn test_simulate_rejects_oversized_epoch() {
        let request: SimulateRequest = decode_request(
            r#"{ "class": "target", "samplingRateHz": 1e9, "durationMs": 1e9, "noiseLevel": 0.5 }"#,
        )
        .unwrap();
        assert!(matches!(simulate(&request), Err(BciError::InvalidInput { .. })));
    }

    #[test]
    fn test_missing_fields_rejected_at_decode() {
        let err = decode_request::<SimulateRequest>(r#"{ "class": "target" }"#).unwrap_err();
        assert!(matches!(err, BciError::InvalidInput { .. }));
        assert!(decode_request::<AdaptRequest>(r#"{ "recentAccuracy": 0.5 }"#).is_err());
    }

    #[test]
    fn test_preprocess_infers_rate_and_keeps_raw() {
        let preprocessor = Preprocessor::new(PreprocessConfig::default()).unwrap();
        let raw: Vec<f64> = (0..100).map(|i| (i as f64 * 0.3).sin() + 2.0).collect();
        let timestamps: Vec<f64> = (0..100).map(|i| i as f64 * 4.0).collect();

        let response = preprocess(
            &preprocessor,
            PreprocessRequest {
                raw_signal: raw.clone(),
                timestamps,
                sampling_rate_hz: None,
            },
        )
        .unwrap();

        assert_eq!(response.raw_signal, raw);
        assert_eq!(response.filtered_signal.len(), raw.len());
        let mean = response.filtered_signal.iter().sum::<f64>() / raw.len() as f64;
        assert!(mean.abs() < 1e-9);
    }

    #[test]
    fn test_preprocess_rejects_mismatched_lengths() {
        let preprocessor = Preprocessor::new(PreprocessConfig::default()).unwrap();
        let request = PreprocessRequest {
            raw_signal: vec![1.0, 2.0, 3.0],
            timestamps: vec![0.0, 4.0],
            sampling_rate_hz: None,
        };
        assert!(matches!(preprocess(&preprocessor, request), Err(BciError::InvalidInput { .. })));
    }

    #[test]
    fn test_extract_features_on_zero_signal() {
        let extractor = FeatureExtractor::new(FeatureConfig::default()).unwrap();
        let timestamps: Vec<f64> = (0..250).map(|i| i as f64 * 4.0).collect();
        let request = ExtractFeaturesRequest {
            filtered_signal: vec![0.0; 250],
            timestamps,
        };
        let features = extract_features(&extractor, &request).unwrap();
        assert_eq!(features, FeaturePayload { mean: 0.0, peak: 0.0, latency: 300.0 });

        let json = serde_json::to_value(features).unwrap();
        assert!(json.get("latency").is_some());
    }

    #[test]
    fn test_classify_untrained_and_fixed() {
        let payload = FeaturePayload { mean: 1.0, peak: 5.0, latency: 450.0 };

        let untrained = classify(&LdaClassifier::new(), &payload).unwrap();
        assert_eq!(untrained.prediction, Label::No);
        assert_eq!(untrained.confidence, 0.5);

        let fixed = LdaClassifier::with_parameters([0.0, 2.0, 0.0], -5.0);
        assert_eq!(classify(&fixed, &payload).unwrap().prediction, Label::Yes);

        let bad = FeaturePayload { mean: f64::NAN, ..payload };
        assert!(classify(&fixed, &bad).is_err());
    }

    #[test]
    fn test_smooth_request() {
        let request: SmoothRequest = decode_request(
            r#"{ "predictions": [
                { "label": "YES", "confidence": 0.85 },
                { "label": "YES", "confidence": 0.72 },
                { "label": "NO", "confidence": 0.55 }
            ] }"#,
        )
        .unwrap();
        assert_eq!(request.window_size, 5);

        let response = smooth_predictions(&request).unwrap();
        assert_eq!(response.decision, Label::Yes);
        assert!((response.confidence - 0.7).abs() < 1e-3);

        let bad = SmoothRequest {
            predictions: vec![Prediction::new(Label::Yes, 1.5)],
            window_size: 5,
        };
        assert!(smooth_predictions(&bad).is_err());
    }

    #[test]
    fn test_adapt_request() {
        let request: AdaptRequest =
            decode_request(r#"{ "recentAccuracy": 0.8, "flashSpeed": 1.0, "objectCount": 3 }"#).unwrap();
        let response = adapt_difficulty(&request).unwrap();
        assert_eq!(response.new_object_count, 4);
        assert!((response.new_flash_speed - 1.1).abs() < 1e-12);

        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("newFlashSpeed").is_some());

        let bad = AdaptRequest {
            recent_accuracy: 1.4,
            flash_speed: 1.0,
            object_count: 3,
        };
        assert!(adapt_difficulty(&bad).is_err());
    }
}
