//! Error classification for the localization engine
//!
//! None of these conditions abort a round. Solvers report them, the round
//! handlers log them and fall back to a best-effort position.

use thiserror::Error;

use crate::core::DeviceId;

/// Conditions that keep an estimator from producing a fresh fix
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LocalizationError {
    /// Not enough anchor records for the requested solver
    #[error("insufficient anchors: {available} available, {required} required")]
    InsufficientAnchors { available: usize, required: usize },

    /// Normal equations are (near) singular: collinear or coincident anchors
    #[error("degenerate anchor geometry: |det| = {determinant:e}")]
    DegenerateGeometry { determinant: f64 },

    /// Damped Hessian became singular during iterative refinement
    #[error("singular system after {iterations} iterations: |det| = {determinant:e}")]
    SingularSystem { determinant: f64, iterations: usize },

    /// A ratio or normalization had a zero denominator; state left unchanged
    #[error("zero denominator in {operation}")]
    ZeroDivision { operation: &'static str },

    /// Neighbor value older than the retention horizon
    #[error("stale value from device {device_id}: lag {lag} exceeds horizon {horizon}")]
    StaleData {
        device_id: DeviceId,
        lag: f64,
        horizon: f64,
    },

    /// Negative or non-finite range observation
    #[error("invalid measurement from device {device_id}: {value}")]
    InvalidMeasurement { device_id: DeviceId, value: f64 },
}

/// Result type for estimator operations
pub type LocalizationResult<T> = Result<T, LocalizationError>;

impl LocalizationError {
    /// Whether the condition stems from the input data rather than numerics
    pub fn is_data_issue(&self) -> bool {
        matches!(
            self,
            LocalizationError::InsufficientAnchors { .. }
                | LocalizationError::StaleData { .. }
                | LocalizationError::InvalidMeasurement { .. }
        )
    }
}
