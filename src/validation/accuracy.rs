use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::core::{DeviceId, Position};

/// Localization error of one device at one round
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionError {
    pub device_id: DeviceId,
    /// True position
    pub true_position: Position,
    /// Estimated position
    pub estimated_position: Position,
    /// Euclidean error (meters)
    pub error_magnitude: f64,
}

impl PositionError {
    pub fn new(device_id: DeviceId, true_position: Position, estimated_position: Position) -> Self {
        Self {
            device_id,
            true_position,
            estimated_position,
            error_magnitude: true_position.distance_to(&estimated_position),
        }
    }
}

/// Error statistics of one round
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AccuracyStatistics {
    /// Mean position error (meters)
    pub mean_error: f64,
    /// Standard deviation of position error (meters)
    pub std_dev_error: f64,
    /// Root Mean Square Error (meters)
    pub rmse: f64,
    /// Maximum observed error (meters)
    pub max_error: f64,
    /// Minimum observed error (meters)
    pub min_error: f64,
    /// Number of samples in statistics
    pub sample_count: usize,
}

impl AccuracyStatistics {
    /// Statistics over a set of errors; all zero when empty
    pub fn from_errors(errors: &[PositionError]) -> Self {
        if errors.is_empty() {
            return Self::default();
        }
        let n = errors.len() as f64;
        let magnitudes = || errors.iter().map(|e| e.error_magnitude);

        let mean_error = magnitudes().sum::<f64>() / n;
        let rmse = (magnitudes().map(|e| e * e).sum::<f64>() / n).sqrt();
        let variance = magnitudes().map(|e| (e - mean_error).powi(2)).sum::<f64>() / n;

        Self {
            mean_error,
            std_dev_error: variance.sqrt(),
            rmse,
            max_error: magnitudes().fold(0.0, f64::max),
            min_error: magnitudes().fold(f64::INFINITY, f64::min),
            sample_count: errors.len(),
        }
    }
}

/// Per-round accuracy bookkeeping over a simulated network
#[derive(Debug, Clone)]
pub struct AccuracyTracker {
    current: Vec<PositionError>,
    /// Statistics of completed rounds, oldest first
    history: VecDeque<AccuracyStatistics>,
    max_history_size: usize,
}

impl Default for AccuracyTracker {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl AccuracyTracker {
    pub fn new(max_history_size: usize) -> Self {
        Self {
            current: Vec::new(),
            history: VecDeque::new(),
            max_history_size,
        }
    }

    /// Record one device's estimate for the round in progress
    pub fn record(&mut self, device_id: DeviceId, true_position: Position, estimate: Position) -> f64 {
        let error = PositionError::new(device_id, true_position, estimate);
        self.current.push(error);
        error.error_magnitude
    }

    pub fn current_errors(&self) -> &[PositionError] {
        &self.current
    }

    /// Close the round in progress and return its statistics
    pub fn finish_round(&mut self) -> AccuracyStatistics {
        let stats = AccuracyStatistics::from_errors(&self.current);
        self.current.clear();
        self.history.push_back(stats);
        while self.history.len() > self.max_history_size {
            self.history.pop_front();
        }
        stats
    }

    pub fn rounds(&self) -> impl Iterator<Item = &AccuracyStatistics> {
        self.history.iter()
    }

    pub fn latest(&self) -> Option<&AccuracyStatistics> {
        self.history.back()
    }

    /// Whether mean error never grew by more than `tolerance` between rounds
    pub fn is_mean_error_non_increasing(&self, tolerance: f64) -> bool {
        self.history
            .iter()
            .zip(self.history.iter().skip(1))
            .all(|(before, after)| after.mean_error <= before.mean_error + tolerance)
    }

    pub fn clear(&mut self) {
        self.current.clear();
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_round_statistics() {
        let mut tracker = AccuracyTracker::default();
        assert_eq!(tracker.record(1, Position::new(0.0, 0.0), Position::new(3.0, 4.0)), 5.0);
        tracker.record(2, Position::new(1.0, 1.0), Position::new(1.0, 2.0));

        let stats = tracker.finish_round();
        assert_eq!(stats.sample_count, 2);
        assert_abs_diff_eq!(stats.mean_error, 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(stats.rmse, 13f64.sqrt(), epsilon = 1e-12);
        assert_abs_diff_eq!(stats.std_dev_error, 2.0, epsilon = 1e-12);
        assert_eq!(stats.max_error, 5.0);
        assert_eq!(stats.min_error, 1.0);
        assert!(tracker.current_errors().is_empty());
    }

    #[test]
    fn test_empty_round_is_zero() {
        let mut tracker = AccuracyTracker::default();
        assert_eq!(tracker.finish_round(), AccuracyStatistics::default());
    }

    #[test]
    fn test_history_bounded_and_trend() {
        let mut tracker = AccuracyTracker::new(3);
        for error in [9.0, 4.0, 3.0, 3.0] {
            tracker.record(1, Position::origin(), Position::new(error, 0.0));
            tracker.finish_round();
        }
        assert_eq!(tracker.rounds().count(), 3);
        assert_eq!(tracker.latest().map(|s| s.mean_error), Some(3.0));
        assert!(tracker.is_mean_error_non_increasing(0.0));

        tracker.record(1, Position::origin(), Position::new(5.0, 0.0));
        tracker.finish_round();
        assert!(!tracker.is_mean_error_non_increasing(1.0));
        assert!(tracker.is_mean_error_non_increasing(2.0));
    }
}
