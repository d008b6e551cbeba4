//! Per-epoch pipeline: preprocess, extract features, classify

use crate::classifier::{LdaClassifier, TrainingReport};
use crate::config::{FeatureConfig, PreprocessConfig, ProcessingConfig};
use crate::features::FeatureExtractor;
use crate::filters::Preprocessor;
use crate::processor::ProcessingMetrics;
use bci_core::{BciError, BciResult, Epoch, FeatureVector, Label, Prediction};
use tracing::debug;

/// Everything one epoch produced on its way through the pipeline
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub filtered_signal: Vec<f64>,
    pub features: FeatureVector,
    pub prediction: Prediction,
    pub metrics: ProcessingMetrics,
}

/// Processing pipeline; immutable once built, so it can be shared across requests
pub struct Pipeline {
    preprocessor: Preprocessor,
    extractor: FeatureExtractor,
    classifier: LdaClassifier,
}

/// Pipeline builder for constructing processing chains
pub struct PipelineBuilder {
    preprocess: PreprocessConfig,
    features: FeatureConfig,
    classifier: LdaClassifier,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        PipelineBuilder {
            preprocess: PreprocessConfig::default(),
            features: FeatureConfig::default(),
            classifier: LdaClassifier::new(),
        }
    }

    pub fn preprocess(mut self, config: PreprocessConfig) -> Self {
        self.preprocess = config;
        self
    }

    pub fn features(mut self, config: FeatureConfig) -> Self {
        self.features = config;
        self
    }

    pub fn classifier(mut self, classifier: LdaClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn build(self) -> BciResult<Pipeline> {
        Ok(Pipeline {
            preprocessor: Preprocessor::new(self.preprocess)?,
            extractor: FeatureExtractor::new(self.features)?,
            classifier: self.classifier,
        })
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    /// Build every stage from configuration
    pub fn from_config(config: &ProcessingConfig) -> BciResult<Self> {
        config.validate()?;
        PipelineBuilder::new()
            .preprocess(config.preprocess.clone())
            .features(config.features.clone())
            .classifier(LdaClassifier::from_config(&config.classifier)?)
            .build()
    }

    pub fn preprocessor(&self) -> &Preprocessor {
        &self.preprocessor
    }

    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    pub fn classifier(&self) -> &LdaClassifier {
        &self.classifier
    }

    /// Filter and summarise one epoch
    pub fn features_for(&self, epoch: &Epoch) -> BciResult<(Vec<f64>, FeatureVector)> {
        let (filtered, _) = self
            .preprocessor
            .preprocess_checked(&epoch.amplitudes, epoch.sampling_rate_hz)?;
        let features = self.extractor.extract_checked(&filtered, &epoch.timestamps_ms)?;
        Ok((filtered, features))
    }

    /// Train the classifier on labelled epochs
    pub fn train_from_epochs(&mut self, epochs: &[Epoch]) -> BciResult<TrainingReport> {
        let mut features = Vec::with_capacity(epochs.len());
        let mut labels: Vec<Label> = Vec::with_capacity(epochs.len());

        for epoch in epochs {
            let class = epoch
                .label
                .ok_or_else(|| BciError::invalid_input("Training epochs must carry a stimulus class"))?;
            let (_, f) = self.features_for(epoch)?;
            features.push(f);
            labels.push(class.expected_label());
        }

        self.classifier.train(&features, &labels)
    }

    /// Run one epoch with the classifier's own threshold
    pub fn run(&self, epoch: &Epoch) -> BciResult<PipelineResult> {
        self.run_with_threshold(epoch, self.classifier.threshold())
    }

    /// Run one epoch with an explicit decision threshold
    pub fn run_with_threshold(&self, epoch: &Epoch, threshold: f64) -> BciResult<PipelineResult> {
        let mut timer = ProcessingMetrics::start_timing();

        let (filtered_signal, features) = self.features_for(epoch)?;
        let prediction = self.classifier.predict_with_threshold(&features, threshold);

        timer.set_stages_applied(3);
        let metrics = timer.finish();

        debug!(
            epoch = %epoch.id,
            mean = features.mean,
            peak = features.peak,
            latency_ms = features.latency_ms,
            label = %prediction.label,
            confidence = prediction.confidence,
            time_us = metrics.processing_time_us,
            "Epoch processed"
        );

        Ok(PipelineResult {
            filtered_signal,
            features,
            prediction,
            metrics,
        })
    }
}
