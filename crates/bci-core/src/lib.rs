//! BCI-Core: Foundation types for the simulated BCI experiment pipeline
//!
//! Epochs, feature vectors, predictions and the session records the
//! adaptive loop reads and writes.

pub mod epoch;
pub mod types;
pub mod session;
pub mod error;

pub use epoch::*;
pub use types::*;
pub use session::*;
pub use error::{BciError, BciResult};
