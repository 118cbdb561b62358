use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::algorithms::{MultilaterationConfig, TrilaterationConfig};
use crate::localization::{CooperativeConfig, CooperativeMethod, PositionSolverKind};
use crate::propagation::{DistanceObservationModel, PropagationConfig, PropagationMode};

/// Configuration validation and I/O errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Invalid parameter value
    #[error("Invalid parameter '{parameter}' = {value}: {reason}")]
    InvalidParameter {
        parameter: String,
        value: String,
        reason: String,
    },
    /// Configuration file I/O error
    #[error("I/O error: {message}")]
    IoError { message: String },
    /// JSON serialization/deserialization error
    #[error("Serialization error: {message}")]
    SerializationError { message: String },
}

impl ConfigError {
    fn invalid(parameter: &str, value: impl ToString, reason: &str) -> Self {
        ConfigError::InvalidParameter {
            parameter: parameter.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Accepts finite values at or above zero
fn non_negative(parameter: &str, value: f64) -> Result<(), ConfigError> {
    if value >= 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::invalid(parameter, value, "must be non-negative and finite"))
    }
}

/// Every tunable of the localization stack
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalizationConfig {
    /// Anchor dissemination and calibration
    pub propagation: PropagationConfig,
    /// Solver used by distance-vector rounds
    pub solver: PositionSolverKind,
    pub trilateration: TrilaterationConfig,
    pub multilateration: MultilaterationConfig,
    /// Cooperative rounds
    pub cooperative: CooperativeConfig,
}

impl LocalizationConfig {
    /// Parse and validate a JSON document
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(content).map_err(|e| ConfigError::SerializationError {
            message: format!("Failed to parse config: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::SerializationError {
            message: format!("Failed to serialize config: {}", e),
        })
    }

    /// Load configuration from JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let content = fs::read_to_string(&path).map_err(|e| ConfigError::IoError {
            message: format!("Failed to read config file '{}': {}", path_str, e),
        })?;
        Self::from_json_str(&content)
    }

    /// Save configuration to JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let content = self.to_json_string()?;
        fs::write(&path, content).map_err(|e| ConfigError::IoError {
            message: format!("Failed to write config file '{}': {}", path_str, e),
        })
    }

    /// First parameter that would make a round misbehave, if any
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_propagation()?;

        non_negative(
            "trilateration.degeneracy_threshold",
            self.trilateration.degeneracy_threshold,
        )?;

        self.validate_multilateration()?;
        self.validate_cooperative()
    }

    fn validate_propagation(&self) -> Result<(), ConfigError> {
        let p = &self.propagation;
        if let PropagationMode::KClosest { k: 0 } = p.mode {
            return Err(ConfigError::invalid("propagation.mode.k", 0, "must be at least 1"));
        }
        if let Some(max_metric) = p.max_metric {
            if !(max_metric > 0.0) {
                return Err(ConfigError::invalid(
                    "propagation.max_metric",
                    max_metric,
                    "must be positive",
                ));
            }
        }
        if let DistanceObservationModel::HopCount { increment } = p.observation {
            if !(increment > 0.0 && increment.is_finite()) {
                return Err(ConfigError::invalid(
                    "propagation.observation.increment",
                    increment,
                    "must be positive and finite",
                ));
            }
        }
        if !(p.info_speed >= 0.0 && p.info_speed.is_finite()) {
            return Err(ConfigError::invalid(
                "propagation.info_speed",
                p.info_speed,
                "must be non-negative and finite",
            ));
        }
        if !(p.retention_horizon > 0.0) {
            return Err(ConfigError::invalid(
                "propagation.retention_horizon",
                p.retention_horizon,
                "must be positive",
            ));
        }
        if !(p.initial_calibration >= 0.0 && p.initial_calibration.is_finite()) {
            return Err(ConfigError::invalid(
                "propagation.initial_calibration",
                p.initial_calibration,
                "must be non-negative and finite",
            ));
        }
        Ok(())
    }

    fn validate_multilateration(&self) -> Result<(), ConfigError> {
        let m = &self.multilateration;
        if m.max_iterations == 0 {
            return Err(ConfigError::invalid(
                "multilateration.max_iterations",
                m.max_iterations,
                "must be at least 1",
            ));
        }
        if !(m.initial_lambda > 0.0) {
            return Err(ConfigError::invalid(
                "multilateration.initial_lambda",
                m.initial_lambda,
                "must be positive",
            ));
        }
        if !(m.lambda_decrease > 0.0 && m.lambda_decrease < 1.0) {
            return Err(ConfigError::invalid(
                "multilateration.lambda_decrease",
                m.lambda_decrease,
                "must be in (0, 1)",
            ));
        }
        if !(m.lambda_increase > 1.0) {
            return Err(ConfigError::invalid(
                "multilateration.lambda_increase",
                m.lambda_increase,
                "must be greater than 1",
            ));
        }
        if !(m.step_tolerance > 0.0) {
            return Err(ConfigError::invalid(
                "multilateration.step_tolerance",
                m.step_tolerance,
                "must be positive",
            ));
        }
        non_negative("multilateration.singular_threshold", m.singular_threshold)?;
        non_negative("multilateration.min_separation", m.min_separation)
    }

    fn validate_cooperative(&self) -> Result<(), ConfigError> {
        let c = &self.cooperative;
        if !(c.refinement.step_size > 0.0 && c.refinement.step_size <= 1.0) {
            return Err(ConfigError::invalid(
                "cooperative.refinement.step_size",
                c.refinement.step_size,
                "must be in (0, 1]",
            ));
        }
        non_negative("cooperative.refinement.min_separation", c.refinement.min_separation)?;
        if !(c.initial_area_side > 0.0 && c.initial_area_side.is_finite()) {
            return Err(ConfigError::invalid(
                "cooperative.initial_area_side",
                c.initial_area_side,
                "must be positive and finite",
            ));
        }
        if !(c.retention_horizon > 0.0) {
            return Err(ConfigError::invalid(
                "cooperative.retention_horizon",
                c.retention_horizon,
                "must be positive",
            ));
        }
        if !(c.initial_weight >= 0.0) {
            return Err(ConfigError::invalid(
                "cooperative.initial_weight",
                c.initial_weight,
                "must be non-negative",
            ));
        }
        if let CooperativeMethod::WeightedMultilateration {
            range_weight,
            anchor_weight,
        } = c.method
        {
            if !(range_weight > 0.0) {
                return Err(ConfigError::invalid(
                    "cooperative.method.range_weight",
                    range_weight,
                    "must be positive",
                ));
            }
            if !(anchor_weight > 0.0) {
                return Err(ConfigError::invalid(
                    "cooperative.method.anchor_weight",
                    anchor_weight,
                    "must be positive",
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = LocalizationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.propagation.info_speed, 80.0);
        assert_eq!(config.solver, PositionSolverKind::Multilateration);
        assert_eq!(config.cooperative.initial_weight, 0.005);
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        let mut config = LocalizationConfig::default();
        config.propagation.mode = PropagationMode::KClosest { k: 0 };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidParameter { ref parameter, .. }) if parameter == "propagation.mode.k"
        ));

        let mut config = LocalizationConfig::default();
        config.multilateration.lambda_decrease = 1.5;
        assert!(config.validate().is_err());

        let mut config = LocalizationConfig::default();
        config.cooperative.method = CooperativeMethod::WeightedMultilateration {
            range_weight: 0.0,
            anchor_weight: 1.0,
        };
        assert!(config.validate().is_err());

        let mut config = LocalizationConfig::default();
        config.propagation.retention_horizon = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{
            "propagation": {
                "mode": { "mode": "k_closest", "k": 6 },
                "observation": { "kind": "hop_count", "increment": 1.0 },
                "info_speed": 1.0,
                "retention_horizon": 5.0,
                "initial_calibration": 1.0
            },
            "solver": "trilateration"
        }"#;
        let config = LocalizationConfig::from_json_str(json).unwrap();
        assert_eq!(config.propagation, PropagationConfig::k_closest_hops(6));
        assert_eq!(config.solver, PositionSolverKind::Trilateration);
        assert_eq!(config.multilateration, MultilaterationConfig::default());
    }

    #[test]
    fn test_guard_thresholds_must_be_non_negative() {
        let mut config = LocalizationConfig::default();
        config.multilateration.singular_threshold = -1.0;
        assert!(config.validate().is_err());

        let mut config = LocalizationConfig::default();
        config.multilateration.min_separation = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = LocalizationConfig::default();
        config.cooperative.refinement.min_separation = -1e-6;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidParameter { ref parameter, .. })
                if parameter == "cooperative.refinement.min_separation"
        ));

        let mut config = LocalizationConfig::default();
        config.trilateration.degeneracy_threshold = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_metric_cap_and_area_side_validated() {
        let mut config = LocalizationConfig::default();
        config.propagation.max_metric = Some(0.0);
        assert!(config.validate().is_err());
        config.propagation.max_metric = None;
        assert!(config.validate().is_ok());

        let mut config = LocalizationConfig::default();
        config.cooperative.initial_area_side = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_nested_objects_use_defaults() {
        let json = r#"{
            "propagation": { "info_speed": 1.0 },
            "multilateration": { "max_iterations": 20 },
            "cooperative": { "refinement": { "step_size": 0.2 } }
        }"#;
        let config = LocalizationConfig::from_json_str(json).unwrap();
        assert_eq!(config.propagation.info_speed, 1.0);
        assert_eq!(config.propagation.max_metric, Some(1000.0));
        assert_eq!(config.propagation.retention_horizon, 5.0);
        assert_eq!(config.multilateration.max_iterations, 20);
        assert_eq!(config.multilateration.initial_lambda, 1e-3);
        assert_eq!(config.cooperative.refinement.step_size, 0.2);
        assert_eq!(config.cooperative.refinement.min_separation, 1e-6);
        assert_eq!(config.cooperative.initial_weight, 0.005);
    }

    #[test]
    fn test_malformed_json() {
        let err = LocalizationConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::SerializationError { .. }));
    }

    #[test]
    fn test_config_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("localization.json");

        let mut config = LocalizationConfig::default();
        config.cooperative.method = CooperativeMethod::WeightedMultilateration {
            range_weight: 0.5,
            anchor_weight: 2.0,
        };
        config.save_to_file(&path).unwrap();

        let loaded = LocalizationConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = LocalizationConfig::from_file(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ConfigError::IoError { .. }));
    }
}
