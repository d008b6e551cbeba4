//! BCI-Processing: preprocessing, features, classification and adaptation
//!
//! Synchronous, side-effect-free stages; the session layer owns all I/O.

pub mod pipeline;
pub mod filters;
pub mod features;
pub mod processor;
pub mod config;
pub mod classifier;
pub mod smoothing;
pub mod difficulty;

pub use pipeline::*;
pub use processor::{SignalStage, ProcessingMetrics};
pub use filters::{
    MovingAverageFilter, DriftRemovalFilter, NotchFilter, DcRemoval,
    FilterBank, Preprocessor, preprocess
};
pub use features::{FeatureExtractor, extract_features};
pub use classifier::{LdaClassifier, ClassifierState, LinearDiscriminant, TrainingReport};
pub use smoothing::{TrialSmoother, SmoothedDecision, smooth_predictions};
pub use difficulty::{DifficultyController, DifficultyChange, DifficultyUpdate, adapt_difficulty};
pub use config::{
    ProcessingConfig, PreprocessConfig, FeatureConfig, ClassifierConfig,
    FixedParameters, SmoothingConfig
};
