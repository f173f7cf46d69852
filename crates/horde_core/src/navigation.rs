//! Walkable-surface projection.
//!
//! Movement orders snap their destinations onto walkable ground through a
//! [`NavigationService`]. The engine ships two implementations:
//! [`OpenTerrain`], where every point is walkable, and [`WalkabilityGrid`],
//! a fixed-size grid of walkable and blocked cells.

use serde::{Deserialize, Serialize};

use crate::math::{fixed_serde, Fixed, Vec3Fixed};

/// Projects points onto walkable ground.
pub trait NavigationService {
    /// Nearest walkable point to `point` inside the box of half-size
    /// `extents`, or `None` if the box holds no walkable ground.
    fn project_to_walkable(&self, point: Vec3Fixed, extents: Vec3Fixed) -> Option<Vec3Fixed>;
}

/// Terrain with no obstacles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenTerrain;

impl NavigationService for OpenTerrain {
    fn project_to_walkable(&self, point: Vec3Fixed, _extents: Vec3Fixed) -> Option<Vec3Fixed> {
        Some(point)
    }
}

/// Grid of walkable and blocked cells anchored at the world origin.
///
/// Points outside the grid are not walkable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkabilityGrid {
    width: u32,
    height: u32,
    /// Row-major, `true` = walkable.
    cells: Vec<bool>,
    #[serde(with = "fixed_serde")]
    cell_size: Fixed,
}

impl WalkabilityGrid {
    /// Create a fully walkable grid.
    ///
    /// Zero dimensions are raised to one cell; a non-positive cell size
    /// falls back to one world unit.
    #[must_use]
    pub fn new(width: u32, height: u32, cell_size: Fixed) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let cell_size = if cell_size > Fixed::ZERO {
            cell_size
        } else {
            Fixed::ONE
        };

        Self {
            width,
            height,
            cells: vec![true; (width as usize) * (height as usize)],
            cell_size,
        }
    }

    /// Grid width in cells.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Grid height in cells.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> Option<usize> {
        (x < self.width && y < self.height)
            .then(|| (y as usize) * (self.width as usize) + (x as usize))
    }

    /// Mark a cell walkable or blocked. Returns `false` if out of bounds.
    pub fn set_walkable(&mut self, x: u32, y: u32, walkable: bool) -> bool {
        match self.index(x, y) {
            Some(index) => {
                self.cells[index] = walkable;
                true
            }
            None => false,
        }
    }

    /// Whether a cell is walkable. Out-of-bounds cells are not.
    #[must_use]
    pub fn is_walkable(&self, x: u32, y: u32) -> bool {
        self.index(x, y).is_some_and(|index| self.cells[index])
    }

    /// Cell containing a world position, if inside the grid.
    #[must_use]
    pub fn world_to_cell(&self, position: Vec3Fixed) -> Option<(u32, u32)> {
        if position.x < Fixed::ZERO || position.y < Fixed::ZERO {
            return None;
        }
        let x = (position.x / self.cell_size).to_num::<i64>();
        let y = (position.y / self.cell_size).to_num::<i64>();
        let x = u32::try_from(x).ok()?;
        let y = u32::try_from(y).ok()?;
        self.index(x, y).map(|_| (x, y))
    }

    /// World-space centre of a cell, at height `z`.
    #[must_use]
    pub fn cell_center(&self, x: u32, y: u32, z: Fixed) -> Vec3Fixed {
        let half = self.cell_size / 2;
        Vec3Fixed::new(
            Fixed::from_num(x).saturating_mul(self.cell_size) + half,
            Fixed::from_num(y).saturating_mul(self.cell_size) + half,
            z,
        )
    }

    /// Inclusive cell range covering `[low, high]` on one axis.
    fn span(&self, low: Fixed, high: Fixed, cells: u32) -> Option<(u32, u32)> {
        let first = (low / self.cell_size).saturating_floor().to_num::<i64>().max(0);
        let last = (high / self.cell_size)
            .saturating_floor()
            .to_num::<i64>()
            .min(i64::from(cells) - 1);
        if first > last {
            return None;
        }
        Some((u32::try_from(first).ok()?, u32::try_from(last).ok()?))
    }
}

impl Default for WalkabilityGrid {
    fn default() -> Self {
        Self::new(64, 64, Fixed::from_num(100))
    }
}

impl NavigationService for WalkabilityGrid {
    fn project_to_walkable(&self, point: Vec3Fixed, extents: Vec3Fixed) -> Option<Vec3Fixed> {
        if let Some((x, y)) = self.world_to_cell(point) {
            if self.is_walkable(x, y) {
                return Some(point);
            }
        }

        let (x0, x1) = self.span(
            point.x.saturating_sub(extents.x),
            point.x.saturating_add(extents.x),
            self.width,
        )?;
        let (y0, y1) = self.span(
            point.y.saturating_sub(extents.y),
            point.y.saturating_add(extents.y),
            self.height,
        )?;

        let mut best: Option<(Vec3Fixed, Fixed)> = None;
        for y in y0..=y1 {
            for x in x0..=x1 {
                if !self.is_walkable(x, y) {
                    continue;
                }
                let center = self.cell_center(x, y, point.z);
                let dist_sq = center.distance_squared(point);
                if best.map_or(true, |(_, d)| dist_sq < d) {
                    best = Some((center, dist_sq));
                }
            }
        }
        best.map(|(center, _)| center)
    }
}
