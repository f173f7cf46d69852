//! Engine configuration.
//!
//! Every tunable constant lives in [`EngineConfig`]. Configs are plain RON
//! and every field is optional; missing fields take the defaults below.
//!
//! ```
//! use horde_core::config::EngineConfig;
//! use horde_core::math::Fixed;
//!
//! let config = EngineConfig::from_ron_str("(cell_size: 250.0, projectile_max_lifetime: 4.0)")
//!     .unwrap();
//! assert_eq!(config.cell_size, Fixed::from_num(250));
//! assert_eq!(config.projectile_arrival_epsilon, Fixed::from_num(30));
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::grid::{CellRounding, QueryWindow, SpatialGrid};
use crate::math::{fixed_decimal_serde, Fixed, Vec3Fixed};

/// Tunable engine constants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// World units per grid cell.
    #[serde(with = "fixed_decimal_serde")]
    pub cell_size: Fixed,
    /// How positions are discretized into cells.
    pub cell_rounding: CellRounding,
    /// Shape of the grid query window.
    pub query_window: QueryWindow,
    /// Seconds before batched damage signals are delivered.
    #[serde(with = "fixed_decimal_serde")]
    pub damage_signal_delay: Fixed,
    /// Largest delta time a single tick will simulate.
    #[serde(with = "fixed_decimal_serde")]
    pub max_tick_delta: Fixed,
    /// Downward acceleration on projectiles, in units/s².
    #[serde(with = "fixed_decimal_serde")]
    pub projectile_gravity: Fixed,
    /// Fraction of projectile velocity lost per second.
    #[serde(with = "fixed_decimal_serde")]
    pub projectile_drag: Fixed,
    /// Distance at which a projectile counts as arrived.
    #[serde(with = "fixed_decimal_serde")]
    pub projectile_arrival_epsilon: Fixed,
    /// Seconds of flight after which a projectile expires without effect.
    #[serde(with = "fixed_decimal_serde")]
    pub projectile_max_lifetime: Fixed,
    /// Launch height above the firing entity.
    #[serde(with = "fixed_decimal_serde")]
    pub projectile_spawn_height: Fixed,
    /// Half-size of the box searched for a walkable point, in world units.
    pub nav_search_extents: [i32; 3],
    /// Push strength of the separation pass.
    #[serde(with = "fixed_decimal_serde")]
    pub separation_strength: Fixed,
    /// Neighbour search radius as a multiple of the agent radius.
    #[serde(with = "fixed_decimal_serde")]
    pub separation_search_factor: Fixed,
    /// Seconds between grid registrations for newly spawned entities.
    #[serde(with = "fixed_decimal_serde")]
    pub default_grid_refresh: Fixed,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cell_size: Fixed::from_num(500),
            cell_rounding: CellRounding::Truncate,
            query_window: QueryWindow::HalfOpen,
            damage_signal_delay: Fixed::from_num(0.001),
            max_tick_delta: Fixed::from_num(0.1),
            projectile_gravity: Fixed::from_num(980),
            projectile_drag: Fixed::from_num(0.0001),
            projectile_arrival_epsilon: Fixed::from_num(30),
            projectile_max_lifetime: Fixed::from_num(10),
            projectile_spawn_height: Fixed::from_num(180),
            nav_search_extents: [25, 25, 2500],
            separation_strength: Fixed::from_num(80),
            separation_search_factor: Fixed::from_num(2.1),
            default_grid_refresh: Fixed::from_num(0.2),
        }
    }
}

impl EngineConfig {
    /// Parse a config from RON text.
    pub fn from_ron_str(ron: &str) -> Result<Self> {
        let config: EngineConfig = ron::from_str(ron)?;
        Ok(config.validated())
    }

    /// Load a config from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_ron_str(&contents)
    }

    /// Replace out-of-range values with their defaults.
    #[must_use]
    pub fn validated(mut self) -> Self {
        let defaults = Self::default();

        if self.cell_size <= Fixed::ZERO {
            tracing::warn!(cell_size = %self.cell_size, "Non-positive cell size, using default");
            self.cell_size = defaults.cell_size;
        }
        if self.max_tick_delta <= Fixed::ZERO {
            tracing::warn!(max_tick_delta = %self.max_tick_delta, "Non-positive tick clamp, using default");
            self.max_tick_delta = defaults.max_tick_delta;
        }
        if self.damage_signal_delay < Fixed::ZERO {
            self.damage_signal_delay = defaults.damage_signal_delay;
        }
        if self.projectile_drag < Fixed::ZERO || self.projectile_drag >= Fixed::ONE {
            tracing::warn!(drag = %self.projectile_drag, "Projectile drag outside [0, 1), using default");
            self.projectile_drag = defaults.projectile_drag;
        }
        if self.projectile_arrival_epsilon < Fixed::ZERO {
            self.projectile_arrival_epsilon = defaults.projectile_arrival_epsilon;
        }
        if self.projectile_max_lifetime <= Fixed::ZERO {
            tracing::warn!("Non-positive projectile lifetime, using default");
            self.projectile_max_lifetime = defaults.projectile_max_lifetime;
        }
        if self.default_grid_refresh < Fixed::ZERO {
            self.default_grid_refresh = defaults.default_grid_refresh;
        }
        for extent in &mut self.nav_search_extents {
            *extent = (*extent).max(0);
        }

        self
    }

    /// Navigation search box as a vector.
    #[must_use]
    pub fn nav_extents(&self) -> Vec3Fixed {
        let [x, y, z] = self.nav_search_extents;
        Vec3Fixed::from_ints(x, y, z)
    }

    /// Build an empty grid with this config's layout.
    #[must_use]
    pub fn build_grid(&self) -> SpatialGrid {
        SpatialGrid::with_layout(self.cell_size, self.cell_rounding, self.query_window)
    }
}
