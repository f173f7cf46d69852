//! Team-aware spatial queries.
//!
//! Every query narrows candidates with a cell window from the
//! [`SpatialGrid`] and then re-filters by true distance and entity state
//! read through the [`EntityDirectory`]. Queries only read, so they can be
//! run from many threads at once between grid updates.

use crate::components::{EntityHandle, TeamFilter, TeamId};
use crate::directory::{Entity, EntityDirectory};
use crate::grid::SpatialGrid;
use crate::math::{sin_cos_degrees, Fixed, Vec2Fixed, Vec3Fixed};

/// Read-only query view over a grid and a directory.
#[derive(Debug)]
pub struct ProximityService<'a, D> {
    grid: &'a SpatialGrid,
    directory: &'a D,
}

impl<D> Clone for ProximityService<'_, D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<D> Copy for ProximityService<'_, D> {}

impl<'a, D: EntityDirectory> ProximityService<'a, D> {
    /// Create a query view.
    #[must_use]
    pub const fn new(grid: &'a SpatialGrid, directory: &'a D) -> Self {
        Self { grid, directory }
    }

    /// Live candidates from the cell window around `position`.
    fn candidates(
        &self,
        position: Vec3Fixed,
        cell_radius: i32,
    ) -> impl Iterator<Item = (EntityHandle, &'a Entity)> + 'a {
        let directory = self.directory;
        self.grid
            .query_around(self.grid.cell_of(position), cell_radius)
            .into_iter()
            .filter_map(move |handle| directory.entity(handle).map(|e| (handle, e)))
    }

    /// Closest living enemy of `exclude_team` within `max_radius`.
    ///
    /// Candidates need a position, a non-neutral team other than
    /// `exclude_team`, and a defence component with hit points left. Ties
    /// keep the first candidate in grid order.
    #[must_use]
    pub fn find_nearest_enemy(
        &self,
        position: Vec3Fixed,
        exclude_team: TeamId,
        max_radius: Fixed,
    ) -> Option<EntityHandle> {
        let radius_sq = max_radius.saturating_mul(max_radius);
        let filter = TeamFilter::Enemies(exclude_team);

        self.candidates(position, self.grid.covering_cell_radius(max_radius))
            .filter(|(_, entity)| filter.admits(entity.team_id()) && entity.is_alive())
            .filter_map(|(handle, entity)| {
                let dist_sq = entity.position()?.distance_squared(position);
                (dist_sq <= radius_sq).then_some((handle, dist_sq))
            })
            .min_by_key(|(_, dist_sq)| *dist_sq)
            .map(|(handle, _)| handle)
    }

    /// Up to `count` entities within `radius`, nearest first.
    ///
    /// Any entity with a position qualifies if `team` admits it; hit points
    /// are not checked. Equal distances keep grid order.
    #[must_use]
    pub fn find_k_closest(
        &self,
        position: Vec3Fixed,
        radius: Fixed,
        count: usize,
        team: TeamFilter,
    ) -> Vec<EntityHandle> {
        if count == 0 {
            return Vec::new();
        }
        let radius_sq = radius.saturating_mul(radius);

        let mut in_range: Vec<(EntityHandle, Fixed)> = self
            .candidates(position, self.grid.covering_cell_radius(radius))
            .filter(|(_, entity)| team.admits(entity.team_id()))
            .filter_map(|(handle, entity)| {
                let dist_sq = entity.position()?.distance_squared(position);
                (dist_sq <= radius_sq).then_some((handle, dist_sq))
            })
            .collect();

        in_range.sort_by_key(|(_, dist_sq)| *dist_sq);
        in_range.truncate(count);
        in_range.into_iter().map(|(handle, _)| handle).collect()
    }

    /// Entities whose ground position lies inside a rotated rectangle.
    ///
    /// The rectangle is centred between the two corners, has half-extents
    /// of half their difference, and is rotated by `yaw_degrees` about the
    /// vertical axis. Entities with zero hit points are skipped; entities
    /// without a defence component are kept.
    #[must_use]
    pub fn select_in_rect(
        &self,
        top_left: Vec3Fixed,
        bottom_right: Vec3Fixed,
        team: TeamFilter,
        yaw_degrees: Fixed,
    ) -> Vec<EntityHandle> {
        let a = top_left.ground();
        let b = bottom_right.ground();
        let center = a.midpoint(b);
        let half = (b - a).abs();
        let half = Vec2Fixed::new(half.x / 2, half.y / 2);

        let corner_cells_a = self.grid.cell_of(top_left);
        let corner_cells_b = self.grid.cell_of(bottom_right);
        let span = (i64::from(corner_cells_a.x) - i64::from(corner_cells_b.x)).abs()
            + (i64::from(corner_cells_a.y) - i64::from(corner_cells_b.y)).abs();
        let cell_radius = i32::try_from(span)
            .unwrap_or(i32::MAX)
            .saturating_add(self.grid.covering_cell_radius(Fixed::ZERO));

        let (sin, cos) = sin_cos_degrees(yaw_degrees);
        let axis_x = Vec2Fixed::new(cos, sin);
        let axis_y = Vec2Fixed::new(-sin, cos);

        let center3 = Vec3Fixed::new(center.x, center.y, Fixed::ZERO);
        self.candidates(center3, cell_radius)
            .filter(|(_, entity)| team.admits(entity.team_id()))
            .filter(|(_, entity)| entity.defence.map_or(true, |d| !d.is_dead()))
            .filter(|(_, entity)| {
                entity.position().is_some_and(|p| {
                    let offset = p.ground() - center;
                    offset.dot(axis_x).saturating_abs() <= half.x
                        && offset.dot(axis_y).saturating_abs() <= half.y
                })
            })
            .map(|(handle, _)| handle)
            .collect()
    }
}
