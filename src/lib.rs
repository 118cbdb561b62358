//! Ad hoc network localization
//!
//! Devices in a multi-hop network estimate their 2D position from a few
//! anchors that know theirs. Anchor positions are disseminated by
//! distance-vector propagation with self-calibration, turned into positions by
//! trilateration or Levenberg-Marquardt multilateration, or refined
//! cooperatively against neighbor estimates.

pub mod core;
pub mod propagation;
pub mod algorithms;
pub mod localization;
pub mod validation;
pub mod utils;

// Re-export commonly used types
pub use core::{
    AnchorBeacon, AnchorRecord, AnchorRecords, AnchorTable, DeviceContext, DeviceId,
    NeighborSnapshot, Position, RangeReference, RangeSnapshot, StateCell, WeightedReference,
};
pub use propagation::{
    AnchorPropagationEngine, DistanceObservationModel, PropagationConfig, PropagationMode,
    PropagationState,
};
pub use algorithms::{
    CooperativeRefinementEngine, MultilaterationSolver, PeerObservation, TrilaterationSolver,
};
pub use localization::{
    AnchorLocalizer, CooperativeLocalizer, CooperativeMethod, PeerBroadcast, PositionSolverKind,
};
pub use validation::{AccuracyTracker, LocalizationError, LocalizationResult};
pub use utils::{ConfigError, LocalizationConfig};
