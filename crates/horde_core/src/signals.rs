//! Deferred notifications to the behaviour layer.
//!
//! The engine announces state changes (damage taken, new move target,
//! enemies spotted) by pushing a [`Signal`] for a batch of handles with a
//! delay. Delivery is fire-and-forget: nothing is acknowledged.

use serde::{Deserialize, Serialize};

use crate::components::EntityHandle;
use crate::math::{fixed_serde, Fixed};

/// Notification kinds raised by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Signal {
    /// The entities took damage.
    ReceivedDamage,
    /// The entities were given a new walk target.
    MoveTargetChanged,
    /// The entities' enemy list went from empty to non-empty.
    FoundEnemy,
    /// The entities finished an attack.
    AttackFinished,
}

/// Sink for deferred signals.
pub trait SignalBus {
    /// Deliver `signal` to `handles` after `delay` seconds.
    fn notify_deferred(&mut self, signal: Signal, handles: &[EntityHandle], delay: Fixed);
}

/// A signal waiting for its delay to run out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSignal {
    /// Signal kind.
    pub signal: Signal,
    /// Recipients.
    pub handles: Vec<EntityHandle>,
    /// Seconds until delivery.
    #[serde(with = "fixed_serde")]
    pub remaining: Fixed,
}

/// A signal whose delay has elapsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredSignal {
    /// Signal kind.
    pub signal: Signal,
    /// Recipients.
    pub handles: Vec<EntityHandle>,
}

/// In-memory signal bus that counts delays down each tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalQueue {
    pending: Vec<PendingSignal>,
}

impl SignalQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance all delays by `dt` and return the batches that came due,
    /// in the order they were raised.
    pub fn advance(&mut self, dt: Fixed) -> Vec<DeliveredSignal> {
        let mut due = Vec::new();
        let mut waiting = Vec::with_capacity(self.pending.len());

        for mut pending in self.pending.drain(..) {
            pending.remaining -= dt;
            if pending.remaining <= Fixed::ZERO {
                due.push(DeliveredSignal {
                    signal: pending.signal,
                    handles: pending.handles,
                });
            } else {
                waiting.push(pending);
            }
        }

        self.pending = waiting;
        due
    }

    /// Signals not yet delivered.
    #[must_use]
    pub fn pending(&self) -> &[PendingSignal] {
        &self.pending
    }

    /// Number of undelivered batches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl SignalBus for SignalQueue {
    fn notify_deferred(&mut self, signal: Signal, handles: &[EntityHandle], delay: Fixed) {
        if handles.is_empty() {
            return;
        }
        self.pending.push(PendingSignal {
            signal,
            handles: handles.to_vec(),
            remaining: delay.max(Fixed::ZERO),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handles(n: u32) -> Vec<EntityHandle> {
        (0..n).map(|i| EntityHandle::new(i, 0)).collect()
    }

    #[test]
    fn test_signal_delivered_after_delay() {
        let mut queue = SignalQueue::new();
        queue.notify_deferred(Signal::ReceivedDamage, &handles(2), Fixed::from_num(0.5));

        assert!(queue.advance(Fixed::from_num(0.25)).is_empty());
        let due = queue.advance(Fixed::from_num(0.25));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].signal, Signal::ReceivedDamage);
        assert_eq!(due[0].handles, handles(2));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_empty_batches_dropped() {
        let mut queue = SignalQueue::new();
        queue.notify_deferred(Signal::FoundEnemy, &[], Fixed::ZERO);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_delivery_order_preserved() {
        let mut queue = SignalQueue::new();
        queue.notify_deferred(Signal::MoveTargetChanged, &handles(1), Fixed::ZERO);
        queue.notify_deferred(Signal::AttackFinished, &handles(1), Fixed::ZERO);

        let due = queue.advance(Fixed::from_num(0.05));
        let kinds: Vec<Signal> = due.iter().map(|d| d.signal).collect();
        assert_eq!(kinds, vec![Signal::MoveTargetChanged, Signal::AttackFinished]);
    }
}
