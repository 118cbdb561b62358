//! Core data types for the localization engine

use std::collections::BTreeMap;

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

/// Unique identity of a network participant
pub type DeviceId = u32;

/// Planar position in a shared local frame (meters)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub const fn origin() -> Self {
        Self { x: 0.0, y: 0.0 }
    }

    pub fn to_vector(self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }

    pub fn from_vector(v: &Vector2<f64>) -> Self {
        Self { x: v.x, y: v.y }
    }

    /// Euclidean distance to another position
    pub fn distance_to(&self, other: &Position) -> f64 {
        (self.to_vector() - other.to_vector()).norm()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Unweighted centroid of a set of positions, `None` when the set is empty
    pub fn centroid<'a, I>(positions: I) -> Option<Position>
    where
        I: IntoIterator<Item = &'a Position>,
    {
        let mut sum = Vector2::zeros();
        let mut count = 0usize;
        for p in positions {
            sum += p.to_vector();
            count += 1;
        }
        if count == 0 {
            return None;
        }
        Some(Position::from_vector(&(sum / count as f64)))
    }
}

impl From<Vector2<f64>> for Position {
    fn from(v: Vector2<f64>) -> Self {
        Position::from_vector(&v)
    }
}

/// A reference point with the distance measured (or estimated) to it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeReference {
    pub position: Position,
    pub distance: f64,
}

impl RangeReference {
    pub fn new(position: Position, distance: f64) -> Self {
        Self { position, distance }
    }
}

/// Range reference carrying an inverse standard deviation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightedReference {
    pub reference: RangeReference,
    pub weight: f64,
}

impl WeightedReference {
    pub fn new(position: Position, distance: f64, weight: f64) -> Self {
        Self {
            reference: RangeReference::new(position, distance),
            weight,
        }
    }
}

/// Value a device exports for one anchor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnchorBeacon {
    /// Accumulated path metric from the anchor (hops or range sum)
    pub metric: f64,
    /// Time elapsed since the anchor emitted this value
    pub age: f64,
    /// Anchor true position
    pub position: Position,
    /// Anchor calibration factor at emission time
    pub calibration: f64,
}

/// Exported anchor-propagation slot: one beacon per known anchor id
pub type AnchorTable = BTreeMap<DeviceId, AnchorBeacon>;

/// Locally held knowledge about one anchor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnchorRecord {
    pub metric: f64,
    pub position: Position,
    pub calibration: f64,
    /// Distance used by the solvers: calibrated metric, or ground truth at anchors
    pub distance: f64,
}

impl AnchorRecord {
    pub fn as_reference(&self) -> RangeReference {
        RangeReference::new(self.position, self.distance)
    }
}

/// Per-device anchor record map
pub type AnchorRecords = BTreeMap<DeviceId, AnchorRecord>;

/// Per-round environment inputs of a device
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviceContext {
    pub id: DeviceId,
    pub is_anchor: bool,
    /// Ground truth; always present for anchors, optional otherwise
    pub true_position: Option<Position>,
}

impl DeviceContext {
    pub fn anchor(id: DeviceId, position: Position) -> Self {
        Self {
            id,
            is_anchor: true,
            true_position: Some(position),
        }
    }

    pub fn device(id: DeviceId) -> Self {
        Self {
            id,
            is_anchor: false,
            true_position: None,
        }
    }

    /// Non-anchor device whose ground truth is known for error computation
    pub fn device_at(id: DeviceId, position: Position) -> Self {
        Self {
            id,
            is_anchor: false,
            true_position: Some(position),
        }
    }

    /// Position an anchor must report, if this device is one
    pub fn anchor_position(&self) -> Option<Position> {
        if self.is_anchor {
            self.true_position
        } else {
            None
        }
    }
}
