//! Anchor dissemination across the network

pub mod engine;
pub mod observation;

pub use engine::{AnchorPropagationEngine, PropagationConfig, PropagationMode, PropagationState};
pub use observation::DistanceObservationModel;
