//! Per-neighbor link metrics fed into anchor propagation

use std::collections::BTreeMap;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::core::{DeviceId, RangeSnapshot};
use crate::validation::error::{LocalizationError, LocalizationResult};

/// How a raw neighbor observation becomes a propagation contribution
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DistanceObservationModel {
    /// Use the (possibly noisy) measured range as the link metric
    MeasuredRange,
    /// Every reachable neighbor is one hop away, weighted by `increment`
    HopCount { increment: f64 },
}

impl Default for DistanceObservationModel {
    fn default() -> Self {
        DistanceObservationModel::MeasuredRange
    }
}

impl DistanceObservationModel {
    /// Unit hop counting
    pub fn hops() -> Self {
        DistanceObservationModel::HopCount { increment: 1.0 }
    }

    /// Contribution of a single link given its raw range observation
    pub fn link_metric(&self, neighbor: DeviceId, observed: f64) -> LocalizationResult<f64> {
        match *self {
            DistanceObservationModel::MeasuredRange => {
                if observed.is_finite() && observed >= 0.0 {
                    Ok(observed)
                } else {
                    Err(LocalizationError::InvalidMeasurement {
                        device_id: neighbor,
                        value: observed,
                    })
                }
            }
            DistanceObservationModel::HopCount { increment } => Ok(increment),
        }
    }

    /// Link metrics of every neighbor present in this round's observations.
    ///
    /// Neighbors with unusable observations are left out, exactly like a
    /// vanished link.
    pub fn link_metrics(&self, ranges: &RangeSnapshot) -> BTreeMap<DeviceId, f64> {
        ranges
            .iter()
            .filter_map(|(&id, &observed)| match self.link_metric(id, observed) {
                Ok(metric) => Some((id, metric)),
                Err(err) => {
                    debug!("dropping link: {}", err);
                    None
                }
            })
            .collect()
    }
}
