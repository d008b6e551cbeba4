//! BCI-Session: sessions, trial persistence and the adaptive game loop
//!
//! Wraps the processing pipeline with a persistence collaborator and the
//! difficulty controller. Writes for one session are serialised.

pub mod api;
pub mod config;
pub mod service;
pub mod store;

pub use config::{CalibrationDefaults, ServiceConfig};
pub use service::{build_pipeline, is_correct, SessionService, TrialOutcome, TrialSubmission};
pub use store::{InMemoryStore, SessionStore};
