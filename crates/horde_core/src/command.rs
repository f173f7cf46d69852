//! Orders issued to the engine by the behaviour layer.
//!
//! Behaviour nodes do not call engine internals directly; they build an
//! [`EngineCommand`] and hand it to
//! [`SimulationEngine::apply_command`](crate::simulation::SimulationEngine::apply_command).
//! Commands are plain data, so they can be logged, queued or replayed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::combat::{AreaDamage, AreaDamageReport};
use crate::components::{DamageType, EntityHandle, TeamFilter};
use crate::economy::ResourceType;
use crate::math::{fixed_serde, Fixed, Vec3Fixed};
use crate::projectile::{ProjectileId, ProjectilePayload};

/// A single order for the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineCommand {
    /// Damage one target.
    Strike {
        /// Entity to damage.
        target: EntityHandle,
        /// Base damage.
        #[serde(with = "fixed_serde")]
        amount: Fixed,
        /// Damage classification.
        damage_type: DamageType,
    },
    /// Resolve an area strike immediately.
    Blast(AreaDamage),
    /// Launch a projectile from above a caster.
    Volley {
        /// Firing entity.
        caster: EntityHandle,
        /// Point to aim at.
        target: Vec3Fixed,
        /// Horizontal speed.
        #[serde(with = "fixed_serde")]
        speed: Fixed,
        /// Damage on arrival.
        payload: ProjectilePayload,
    },
    /// Send a group to a destination.
    MoveTo {
        /// Units to move.
        units: Vec<EntityHandle>,
        /// Group destination.
        destination: Vec3Fixed,
        /// Which of the units obey.
        team: TeamFilter,
    },
    /// Pick up a resource into the gatherer's cargo.
    Gather {
        /// Gathering entity.
        gatherer: EntityHandle,
        /// Resource picked up.
        resource: ResourceType,
        /// Amount before the carrier's bonus.
        base: u32,
    },
    /// Unload the carrier's cargo at the closest storage.
    Deposit {
        /// Carrying entity.
        carrier: EntityHandle,
    },
    /// Pay a cost from the storage pool, all or nothing.
    Spend {
        /// Amount per resource type.
        cost: BTreeMap<ResourceType, u32>,
    },
    /// Destroy an entity after a delay.
    Destroy {
        /// Entity to destroy.
        handle: EntityHandle,
        /// Delay in seconds.
        #[serde(with = "fixed_serde")]
        delay: Fixed,
    },
}

/// What applying a command did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The command took effect.
    Applied,
    /// The command was refused; nothing changed.
    Rejected,
    /// An area strike was resolved.
    AreaDamage(AreaDamageReport),
    /// A projectile was launched.
    Launched(ProjectileId),
    /// Resources changed hands.
    Transferred(u32),
}

impl CommandOutcome {
    /// Whether the command had any effect.
    #[must_use]
    pub fn is_applied(&self) -> bool {
        match self {
            Self::Rejected => false,
            Self::AreaDamage(report) => report.any_hit(),
            Self::Applied | Self::Launched(_) | Self::Transferred(_) => true,
        }
    }

    pub(crate) fn from_bool(applied: bool) -> Self {
        if applied {
            Self::Applied
        } else {
            Self::Rejected
        }
    }
}
