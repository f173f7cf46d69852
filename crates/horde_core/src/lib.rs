//! # Horde Core
//!
//! Deterministic engine for crowd-scale unit simulation: spatial indexing,
//! team-aware proximity queries, damage resolution, resource bookkeeping,
//! ballistic projectiles and deferred destruction.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No IO outside config loading
//! - No system randomness
//! - No floating-point math in the tick (uses fixed-point)
//!
//! Behaviour code (state machines, task nodes) lives outside the crate and
//! drives the engine through [`simulation::SimulationEngine`] and
//! [`command::EngineCommand`].
//!
//! ## Crate Structure
//!
//! - [`grid`] - Sparse uniform grid of entity handles
//! - [`proximity`] - Nearest-enemy, k-closest and rectangle queries
//! - [`combat`] - Single-target and area damage
//! - [`economy`] - Resource registry and ledger
//! - [`projectile`] - Ballistic projectiles
//! - [`destruction`] - Deferred entity destruction
//! - [`locomotion`] - Group move orders
//! - [`systems`] - Per-tick passes
//! - [`simulation`] - The engine context and tick loop
//! - [`math`] - Fixed-point math utilities

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod combat;
pub mod command;
pub mod components;
pub mod config;
pub mod destruction;
pub mod directory;
pub mod economy;
pub mod error;
pub mod grid;
pub mod locomotion;
pub mod math;
pub mod navigation;
pub mod projectile;
pub mod proximity;
pub mod signals;
pub mod simulation;
pub mod systems;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::combat::{AreaDamage, AreaDamageReport, HealthReadout};
    pub use crate::command::{CommandOutcome, EngineCommand};
    pub use crate::components::*;
    pub use crate::config::EngineConfig;
    pub use crate::directory::{Entity, EntityDirectory, EntityStorage};
    pub use crate::economy::{ResourceRegistry, ResourceType};
    pub use crate::error::{EngineError, Result};
    pub use crate::grid::{CellCoord, SpatialGrid};
    pub use crate::math::{Fixed, Vec3Fixed};
    pub use crate::navigation::{NavigationService, OpenTerrain};
    pub use crate::projectile::{ProjectileId, ProjectilePayload};
    pub use crate::signals::{Signal, SignalBus};
    pub use crate::simulation::{EntitySpawnParams, SimulationEngine, TickEvents};
}
