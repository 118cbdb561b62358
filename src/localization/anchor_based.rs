//! Distance-vector localization rounds
//!
//! One round propagates anchor beacons, then turns the resulting records into
//! a position with the configured solver. Unrestricted propagation gives the
//! classic "all anchors" variant, `KClosest` the bounded-message variant;
//! either can run on measured ranges or hop counts.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::algorithms::{MultilaterationSolver, TrilaterationSolver};
use crate::core::{
    AnchorTable, DeviceContext, NeighborSnapshot, Position, RangeReference, RangeSnapshot, StateCell,
};
use crate::propagation::{AnchorPropagationEngine, PropagationState};
use crate::utils::config::LocalizationConfig;

/// Solver turning anchor records into a position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionSolverKind {
    /// Closed form from the records only
    Trilateration,
    /// Damped Gauss-Newton from the previous estimate
    #[default]
    Multilateration,
}

/// Everything a device persists between distance-vector rounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorLocalizationState {
    propagation: PropagationState,
    estimate: StateCell<Position>,
}

impl AnchorLocalizationState {
    pub fn estimate(&self) -> Position {
        self.estimate.value()
    }

    pub fn calibration(&self) -> f64 {
        self.propagation.calibration()
    }

    pub fn propagation(&self) -> &PropagationState {
        &self.propagation
    }

    /// Table to publish on the anchor-propagation slot
    pub fn exported(&self) -> &AnchorTable {
        self.propagation.exported()
    }
}

/// Per-device distance-vector localization driver
#[derive(Debug, Clone)]
pub struct AnchorLocalizer {
    engine: AnchorPropagationEngine,
    solver: PositionSolverKind,
    trilateration: TrilaterationSolver,
    multilateration: MultilaterationSolver,
}

impl AnchorLocalizer {
    pub fn new(config: &LocalizationConfig) -> Self {
        Self {
            engine: AnchorPropagationEngine::new(config.propagation),
            solver: config.solver,
            trilateration: TrilaterationSolver::new(config.trilateration),
            multilateration: MultilaterationSolver::new(config.multilateration),
        }
    }

    pub fn engine(&self) -> &AnchorPropagationEngine {
        &self.engine
    }

    /// Fresh state; anchors start (and stay) at their true position
    pub fn initial_state(&self, ctx: &DeviceContext, initial_estimate: Position) -> AnchorLocalizationState {
        AnchorLocalizationState {
            propagation: self.engine.initial_state(),
            estimate: StateCell::new(ctx.anchor_position().unwrap_or(initial_estimate)),
        }
    }

    /// Run one round and return the updated state
    pub fn round(
        &self,
        ctx: &DeviceContext,
        state: AnchorLocalizationState,
        beacons: &NeighborSnapshot<AnchorTable>,
        ranges: &RangeSnapshot,
    ) -> AnchorLocalizationState {
        let AnchorLocalizationState {
            propagation,
            mut estimate,
        } = state;

        let propagation = self.engine.propagate_anchors(ctx, propagation, beacons, ranges);
        let records = propagation.records();

        estimate.update(|&previous| {
            if let Some(truth) = ctx.anchor_position() {
                return truth;
            }
            match self.solver {
                PositionSolverKind::Trilateration => self.trilateration.trilaterate(ctx, records, previous),
                PositionSolverKind::Multilateration => {
                    let references: Vec<RangeReference> =
                        records.values().map(|r| r.as_reference()).collect();
                    let report = self.multilateration.multilaterate(previous, &references);
                    debug!(
                        "device {}: multilateration over {} anchors: {:?} after {} iterations",
                        ctx.id,
                        references.len(),
                        report.termination,
                        report.iterations
                    );
                    report.position
                }
            }
        });

        AnchorLocalizationState {
            propagation,
            estimate,
        }
    }
}
