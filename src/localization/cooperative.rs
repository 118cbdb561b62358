//! Cooperative localization rounds
//!
//! Devices refine their own estimate against the estimates their neighbors
//! broadcast, either by a gradient step per peer or by multilateration over
//! all peers. The weighted variant also publishes a confidence weight that
//! neighbors use to trust this device's estimate.

use log::debug;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::algorithms::{
    CooperativeRefinementEngine, MultilaterationSolver, PeerObservation, RefinementConfig,
};
use crate::core::{
    DeviceContext, NeighborSnapshot, Position, RangeReference, RangeSnapshot, StateCell,
    WeightedReference,
};
use crate::utils::config::LocalizationConfig;

/// Cooperative update rule
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum CooperativeMethod {
    /// One fixed-step correction per peer
    #[default]
    GradientDescent,
    /// Multilateration over the peers' estimates
    Multilateration,
    /// Multilateration with per-peer confidence weights
    WeightedMultilateration {
        /// Inverse standard deviation of the sensed ranges
        range_weight: f64,
        /// Confidence anchors publish for their own position
        anchor_weight: f64,
    },
}

/// Cooperative localization parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CooperativeConfig {
    pub method: CooperativeMethod,
    pub refinement: RefinementConfig,
    /// Peer broadcasts older than this are ignored
    pub retention_horizon: f64,
    /// Confidence a non-anchor starts with
    pub initial_weight: f64,
    /// Random initial estimates are drawn from `[0, side)²`
    pub initial_area_side: f64,
}

impl Default for CooperativeConfig {
    fn default() -> Self {
        Self {
            method: CooperativeMethod::default(),
            refinement: RefinementConfig::default(),
            retention_horizon: 5.0,
            initial_weight: 0.005,
            initial_area_side: 500.0,
        }
    }
}

/// Value a device publishes on the cooperative slot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeerBroadcast {
    pub estimate: Position,
    pub weight: f64,
    pub is_anchor: bool,
    pub true_position: Option<Position>,
}

/// Persisted cooperative state of one device
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CooperativeState {
    estimate: StateCell<Position>,
    weight: StateCell<f64>,
}

impl CooperativeState {
    pub fn new(estimate: Position, weight: f64) -> Self {
        Self {
            estimate: StateCell::new(estimate),
            weight: StateCell::new(weight),
        }
    }

    pub fn estimate(&self) -> Position {
        self.estimate.value()
    }

    pub fn weight(&self) -> f64 {
        self.weight.value()
    }

    /// What neighbors will see from this device next round
    pub fn broadcast(&self, ctx: &DeviceContext) -> PeerBroadcast {
        PeerBroadcast {
            estimate: self.estimate(),
            weight: self.weight(),
            is_anchor: ctx.is_anchor,
            true_position: ctx.true_position,
        }
    }
}

/// Combined confidence of two independent error sources
fn combine_weights(a: f64, b: f64) -> f64 {
    if a <= 0.0 || b <= 0.0 {
        return 0.0;
    }
    1.0 / (1.0 / (a * a) + 1.0 / (b * b)).sqrt()
}

/// Per-device cooperative localization driver
#[derive(Debug, Clone)]
pub struct CooperativeLocalizer {
    config: CooperativeConfig,
    refinement: CooperativeRefinementEngine,
    multilateration: MultilaterationSolver,
}

impl CooperativeLocalizer {
    pub fn new(config: &LocalizationConfig) -> Self {
        Self {
            config: config.cooperative,
            refinement: CooperativeRefinementEngine::new(config.cooperative.refinement),
            multilateration: MultilaterationSolver::new(config.multilateration),
        }
    }

    pub fn config(&self) -> &CooperativeConfig {
        &self.config
    }

    fn anchor_weight(&self) -> Option<f64> {
        match self.config.method {
            CooperativeMethod::WeightedMultilateration { anchor_weight, .. } => Some(anchor_weight),
            _ => None,
        }
    }

    /// Fresh state; anchors start at their true position
    pub fn initial_state(&self, ctx: &DeviceContext, initial_estimate: Position) -> CooperativeState {
        match ctx.anchor_position() {
            Some(truth) => CooperativeState::new(
                truth,
                self.anchor_weight().unwrap_or(self.config.initial_weight),
            ),
            None => CooperativeState::new(initial_estimate, self.config.initial_weight),
        }
    }

    /// Fresh state with a uniformly random estimate in the configured square.
    ///
    /// An empty or non-finite square yields the origin.
    pub fn random_initial_state<R: Rng + ?Sized>(&self, ctx: &DeviceContext, rng: &mut R) -> CooperativeState {
        let side = self.config.initial_area_side;
        let estimate = if side > 0.0 && side.is_finite() {
            Position::new(rng.gen_range(0.0..side), rng.gen_range(0.0..side))
        } else {
            debug!("device {}: initial area side {} is empty, starting at origin", ctx.id, side);
            Position::origin()
        };
        self.initial_state(ctx, estimate)
    }

    /// Run one round and return the updated state
    pub fn round(
        &self,
        ctx: &DeviceContext,
        state: CooperativeState,
        peers: &NeighborSnapshot<PeerBroadcast>,
        ranges: &RangeSnapshot,
    ) -> CooperativeState {
        let CooperativeState {
            mut estimate,
            mut weight,
        } = state;

        if let Some(truth) = ctx.anchor_position() {
            estimate.update(|_| truth);
            if let Some(anchor_weight) = self.anchor_weight() {
                weight.update(|_| anchor_weight);
            }
            return CooperativeState { estimate, weight };
        }

        let mut observations = NeighborSnapshot::new();
        for (id, entry) in peers.fresh(self.config.retention_horizon) {
            let peer = &entry.value;
            let observation = PeerObservation {
                estimate: peer.estimate,
                true_position: peer.true_position,
                is_anchor: peer.is_anchor,
                sensed_distance: ranges.get(&id).copied(),
            };
            observations.insert(id, observation, entry.lag);
        }

        let previous = estimate.value();
        match self.config.method {
            CooperativeMethod::GradientDescent => {
                estimate.update(|&p| self.refinement.cooperative_refine(ctx, p, &observations));
            }
            CooperativeMethod::Multilateration => {
                let references: Vec<RangeReference> = observations
                    .iter()
                    .filter_map(|(_, entry)| {
                        let peer = &entry.value;
                        let distance = peer.real_distance(ctx.true_position)?;
                        Some(RangeReference::new(peer.reported_position(), distance))
                    })
                    .collect();
                let report = self.multilateration.multilaterate(previous, &references);
                estimate.update(|_| report.position);
            }
            CooperativeMethod::WeightedMultilateration { range_weight, .. } => {
                let references: Vec<WeightedReference> = observations
                    .iter()
                    .filter_map(|(id, entry)| {
                        let peer = &entry.value;
                        let distance = peer.real_distance(ctx.true_position)?;
                        let peer_weight = peers.get(id).map_or(0.0, |b| b.value.weight);
                        Some(WeightedReference::new(
                            peer.reported_position(),
                            distance,
                            combine_weights(peer_weight, range_weight),
                        ))
                    })
                    .collect();
                let solution =
                    self.multilateration
                        .multilaterate_weighted(previous, &references, weight.value());
                estimate.update(|_| solution.report.position);
                weight.update(|_| solution.weight);
            }
        }

        debug!(
            "device {}: cooperative round over {} peers moved estimate by {:.4}",
            ctx.id,
            observations.len(),
            previous.distance_to(estimate.get())
        );
        CooperativeState { estimate, weight }
    }
}
