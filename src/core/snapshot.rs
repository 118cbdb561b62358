//! Read-only per-round view of neighbor-exported values
//!
//! The delivery substrate hands each device one immutable snapshot per round
//! and state slot: the last value every reachable neighbor broadcast, together
//! with how long ago it was broadcast. Entries older than the retention
//! horizon are absence, never an error.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::types::DeviceId;

/// A neighbor's last broadcast value and its lag in time units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborValue<T> {
    pub value: T,
    pub lag: f64,
}

/// Mapping from reachable neighbor id to its last broadcast value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborSnapshot<T> {
    entries: BTreeMap<DeviceId, NeighborValue<T>>,
}

/// Raw per-neighbor range observations of one round
pub type RangeSnapshot = BTreeMap<DeviceId, f64>;

impl<T> Default for NeighborSnapshot<T> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<T> NeighborSnapshot<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the value broadcast by `id`, replacing any older one
    pub fn insert(&mut self, id: DeviceId, value: T, lag: f64) {
        self.entries.insert(id, NeighborValue { value, lag });
    }

    pub fn with(mut self, id: DeviceId, value: T, lag: f64) -> Self {
        self.insert(id, value, lag);
        self
    }

    pub fn get(&self, id: DeviceId) -> Option<&NeighborValue<T>> {
        self.entries.get(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in ascending neighbor id order
    pub fn iter(&self) -> impl Iterator<Item = (DeviceId, &NeighborValue<T>)> {
        self.entries.iter().map(|(id, v)| (*id, v))
    }

    /// Entries whose lag does not exceed `horizon`
    pub fn fresh(&self, horizon: f64) -> impl Iterator<Item = (DeviceId, &NeighborValue<T>)> {
        self.iter().filter(move |(_, v)| v.lag <= horizon)
    }
}

impl<T> FromIterator<(DeviceId, T)> for NeighborSnapshot<T> {
    /// Collects values delivered in the current instant (zero lag)
    fn from_iter<I: IntoIterator<Item = (DeviceId, T)>>(iter: I) -> Self {
        let mut snapshot = Self::new();
        for (id, value) in iter {
            snapshot.insert(id, value, 0.0);
        }
        snapshot
    }
}
