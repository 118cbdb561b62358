//! Owner-mutated state carried from one round to the next

use serde::{Deserialize, Serialize};

/// Per-device persisted value: what round N stores is the input of round N+1
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StateCell<T> {
    value: T,
}

impl<T> StateCell<T> {
    pub fn new(initial: T) -> Self {
        Self { value: initial }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    /// Replace the stored value with `update(previous)` and return the new value
    pub fn update<F>(&mut self, update: F) -> &T
    where
        F: FnOnce(&T) -> T,
    {
        self.value = update(&self.value);
        &self.value
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T: Copy> StateCell<T> {
    pub fn value(&self) -> T {
        self.value
    }
}

impl<T: Default> Default for StateCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
