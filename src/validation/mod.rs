//! Error taxonomy and accuracy tracking

pub mod accuracy;
pub mod error;

pub use accuracy::{AccuracyStatistics, AccuracyTracker, PositionError};
pub use error::{LocalizationError, LocalizationResult};
