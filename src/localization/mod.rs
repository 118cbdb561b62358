//! Per-device round handlers combining propagation and solvers

pub mod anchor_based;
pub mod cooperative;

pub use anchor_based::{AnchorLocalizationState, AnchorLocalizer, PositionSolverKind};
pub use cooperative::{
    CooperativeConfig, CooperativeLocalizer, CooperativeMethod, CooperativeState, PeerBroadcast,
};
