//! BCI-Simulation: synthetic EEG epoch generation
//!
//! Noise-plus-ERP epochs for training the classifier and driving demo sessions.

pub mod trial_stream;
pub mod signal_patterns;
pub mod epoch_simulator;

pub use epoch_simulator::*;
pub use trial_stream::*;
pub use signal_patterns::*;
