//! Position estimators

pub mod cooperative;
pub mod multilateration;
pub mod trilateration;

pub use cooperative::{CooperativeRefinementEngine, PeerObservation, RefinementConfig};
pub use multilateration::{
    MultilaterationConfig, MultilaterationReport, MultilaterationSolver, Termination, WeightedSolution,
};
pub use trilateration::{TrilaterationConfig, TrilaterationSolver};
