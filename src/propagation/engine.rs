//! Distance-vector anchor propagation with anchor self-calibration
//!
//! Every anchor seeds a beacon `(metric 0, own position, calibration)`. Each
//! round a device relaxes the beacons its neighbors exported over the link
//! metric to that neighbor, keeps the best candidate per anchor and exports
//! the result. Anchors additionally learn the ratio between true distance and
//! accumulated metric to the other anchors they hear, and ship that ratio so
//! non-anchors can rescale hop counts or noisy range sums into meters.
//!
//! Two dissemination modes are supported:
//! - `Unrestricted`: every reachable anchor is relayed.
//! - `KClosest`: only the `k` lowest-metric anchors are relayed, which bounds
//!   message size at the expense of coverage.
//!
//! In both modes beacons at or above `max_metric` are dropped. Without that
//! cap an anchor that left the network would be relayed back and forth
//! between its former neighbors forever with an ever growing metric.

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::core::{
    AnchorBeacon, AnchorRecord, AnchorRecords, AnchorTable, DeviceContext, DeviceId,
    NeighborSnapshot, RangeSnapshot, StateCell, DEFAULT_MAX_METRIC,
};
use crate::propagation::observation::DistanceObservationModel;
use crate::validation::error::{LocalizationError, LocalizationResult};

/// Which anchors a device relays
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PropagationMode {
    /// Relay every reachable anchor
    #[default]
    Unrestricted,
    /// Relay only the `k` anchors with lowest accumulated metric
    KClosest { k: usize },
}

/// Anchor propagation parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropagationConfig {
    pub mode: PropagationMode,
    /// Beacons whose metric reaches this are dropped; `None` disables the cap
    pub max_metric: Option<f64>,
    /// Link metric source (measured range or hop increment)
    pub observation: DistanceObservationModel,
    /// Minimum assumed information speed; stale metrics are raised to
    /// `age * info_speed`. Zero disables the bound.
    pub info_speed: f64,
    /// Neighbor values older than this are ignored
    pub retention_horizon: f64,
    /// Calibration factor a device starts with (1.0 or 0.0)
    pub initial_calibration: f64,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            mode: PropagationMode::default(),
            max_metric: Some(DEFAULT_MAX_METRIC),
            observation: DistanceObservationModel::MeasuredRange,
            info_speed: 80.0,
            retention_horizon: 5.0,
            initial_calibration: 1.0,
        }
    }
}

impl PropagationConfig {
    /// Hop-counting configuration relaying the `k` closest anchors
    pub fn k_closest_hops(k: usize) -> Self {
        Self {
            mode: PropagationMode::KClosest { k },
            observation: DistanceObservationModel::hops(),
            info_speed: 1.0,
            ..Default::default()
        }
    }
}

/// Persisted propagation state of one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropagationState {
    calibration: StateCell<f64>,
    records: AnchorRecords,
    exported: AnchorTable,
}

impl PropagationState {
    pub fn new(initial_calibration: f64) -> Self {
        Self {
            calibration: StateCell::new(initial_calibration),
            records: AnchorRecords::new(),
            exported: AnchorTable::new(),
        }
    }

    /// Calibration factor persisted by the last round
    pub fn calibration(&self) -> f64 {
        self.calibration.value()
    }

    /// Anchor records of the last round (never contains the device itself)
    pub fn records(&self) -> &AnchorRecords {
        &self.records
    }

    /// Beacons to publish for the neighbors' next round
    pub fn exported(&self) -> &AnchorTable {
        &self.exported
    }

    /// Number of beacons in the exported table, a proxy for message size
    pub fn message_size(&self) -> usize {
        self.exported.len()
    }
}

/// Distance-vector propagation engine
#[derive(Debug, Clone, Default)]
pub struct AnchorPropagationEngine {
    config: PropagationConfig,
}

impl AnchorPropagationEngine {
    pub fn new(config: PropagationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PropagationConfig {
        &self.config
    }

    pub fn initial_state(&self) -> PropagationState {
        PropagationState::new(self.config.initial_calibration)
    }

    /// Run one propagation round for the device described by `ctx`.
    ///
    /// `beacons` holds the anchor tables the neighbors exported, `ranges` the
    /// raw per-neighbor observations of this round. A neighbor needs both an
    /// exported table and a link observation to contribute.
    pub fn propagate_anchors(
        &self,
        ctx: &DeviceContext,
        mut state: PropagationState,
        beacons: &NeighborSnapshot<AnchorTable>,
        ranges: &RangeSnapshot,
    ) -> PropagationState {
        let previous_calibration = state.calibration();
        let own_position = ctx.anchor_position();

        let mut table = self.relax(ctx.id, beacons, ranges);
        if let Some(position) = own_position {
            table.insert(
                ctx.id,
                AnchorBeacon {
                    metric: 0.0,
                    age: 0.0,
                    position,
                    calibration: previous_calibration,
                },
            );
        }
        if let PropagationMode::KClosest { k } = self.config.mode {
            table = Self::keep_closest(table, k);
        }

        let records: AnchorRecords = table
            .iter()
            .filter(|(&id, _)| id != ctx.id)
            .map(|(&id, beacon)| {
                let distance = match own_position {
                    Some(own) => own.distance_to(&beacon.position),
                    None => beacon.metric * beacon.calibration,
                };
                let record = AnchorRecord {
                    metric: beacon.metric,
                    position: beacon.position,
                    calibration: beacon.calibration,
                    distance,
                };
                (id, record)
            })
            .collect();

        if own_position.is_some() {
            let calibration = *state.calibration.update(|&previous| {
                match Self::recalibrate(&records) {
                    Ok(factor) => factor,
                    Err(err) => {
                        trace!("device {}: keeping calibration {}: {}", ctx.id, previous, err);
                        previous
                    }
                }
            });
            if let Some(own) = table.get_mut(&ctx.id) {
                own.calibration = calibration;
            }
        }

        debug!(
            "device {}: {} anchor records, {} beacons exported, calibration {:.4}",
            ctx.id,
            records.len(),
            table.len(),
            state.calibration()
        );

        state.records = records;
        state.exported = table;
        state
    }

    /// Best candidate beacon per anchor over all fresh, linked neighbors
    fn relax(
        &self,
        own_id: DeviceId,
        beacons: &NeighborSnapshot<AnchorTable>,
        ranges: &RangeSnapshot,
    ) -> AnchorTable {
        let links = self.config.observation.link_metrics(ranges);
        let mut best = AnchorTable::new();

        for (neighbor, entry) in beacons.iter() {
            if entry.lag > self.config.retention_horizon {
                trace!(
                    "{}",
                    LocalizationError::StaleData {
                        device_id: neighbor,
                        lag: entry.lag,
                        horizon: self.config.retention_horizon,
                    }
                );
                continue;
            }
            let Some(&link) = links.get(&neighbor) else {
                continue;
            };

            for (&anchor_id, beacon) in entry.value.iter() {
                if anchor_id == own_id {
                    continue;
                }
                let Some(candidate) = self.extend(beacon, link, entry.lag) else {
                    continue;
                };
                let replace = match best.get(&anchor_id) {
                    Some(current) => {
                        candidate.metric < current.metric
                            || (candidate.metric == current.metric && candidate.age < current.age)
                    }
                    None => true,
                };
                if replace {
                    best.insert(anchor_id, candidate);
                }
            }
        }
        best
    }

    /// Beacon as seen one link further away, or `None` if it is out of range
    fn extend(&self, beacon: &AnchorBeacon, link: f64, lag: f64) -> Option<AnchorBeacon> {
        let age = beacon.age + lag;
        let mut metric = beacon.metric + link;
        if self.config.info_speed > 0.0 {
            metric = metric.max(age * self.config.info_speed);
        }
        if !metric.is_finite() {
            return None;
        }
        if let Some(max_metric) = self.config.max_metric {
            if metric >= max_metric {
                return None;
            }
        }
        Some(AnchorBeacon {
            metric,
            age,
            position: beacon.position,
            calibration: beacon.calibration,
        })
    }

    /// The `k` lowest-metric beacons, ties broken by lower anchor id
    fn keep_closest(table: AnchorTable, k: usize) -> AnchorTable {
        let mut entries: Vec<(DeviceId, AnchorBeacon)> = table.into_iter().collect();
        entries.sort_by(|(id_a, a), (id_b, b)| a.metric.total_cmp(&b.metric).then(id_a.cmp(id_b)));
        entries.truncate(k);
        entries.into_iter().collect()
    }

    /// Ratio of true distance to accumulated metric over the anchors heard
    fn recalibrate(records: &AnchorRecords) -> LocalizationResult<f64> {
        let (true_sum, metric_sum) = records
            .values()
            .fold((0.0, 0.0), |(t, m), r| (t + r.distance, m + r.metric));
        if true_sum == 0.0 || metric_sum == 0.0 {
            return Err(LocalizationError::ZeroDivision {
                operation: "calibration update",
            });
        }
        Ok(true_sum / metric_sum)
    }
}
