//! Deferred entity destruction.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::components::EntityHandle;
use crate::math::{fixed_serde, Fixed};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct Countdown(#[serde(with = "fixed_serde")] Fixed);

/// Entities waiting to be destroyed after a delay.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestructionQueue {
    pending: BTreeMap<EntityHandle, Countdown>,
}

impl DestructionQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `handle` for destruction in `delay` seconds.
    ///
    /// Returns `false` (and keeps the earlier schedule) if the entity is
    /// already pending.
    pub fn schedule(&mut self, handle: EntityHandle, delay: Fixed) -> bool {
        if self.pending.contains_key(&handle) {
            return false;
        }
        self.pending.insert(handle, Countdown(delay.max(Fixed::ZERO)));
        true
    }

    /// Count every delay down by `dt` and return the handles that came due,
    /// in handle order. Returned handles are no longer pending.
    pub fn advance(&mut self, dt: Fixed) -> Vec<EntityHandle> {
        let mut due = Vec::new();
        for (handle, countdown) in &mut self.pending {
            countdown.0 -= dt;
            if countdown.0 <= Fixed::ZERO {
                due.push(*handle);
            }
        }
        for handle in &due {
            self.pending.remove(handle);
        }
        due
    }

    /// Drop a pending destruction. Returns `true` if one existed.
    pub fn cancel(&mut self, handle: EntityHandle) -> bool {
        self.pending.remove(&handle).is_some()
    }

    /// Whether `handle` is scheduled.
    #[must_use]
    pub fn is_pending(&self, handle: EntityHandle) -> bool {
        self.pending.contains_key(&handle)
    }

    /// Number of scheduled entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is scheduled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
