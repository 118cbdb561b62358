//! Core types and constants for the localization engine

pub mod constants;
pub mod snapshot;
pub mod state;
pub mod types;

pub use constants::*;
pub use snapshot::{NeighborSnapshot, NeighborValue, RangeSnapshot};
pub use state::StateCell;
pub use types::*;
