//! Sparse uniform spatial grid.
//!
//! Maps discretized `(cell_x, cell_y)` coordinates to the entity handles
//! filed there. Cells are created lazily and are never reclaimed when they
//! empty out, trading a little memory for allocation-free re-insertion.
//!
//! The grid knows nothing about actual entity positions. It holds whatever
//! registration last told it, and queries return the raw cell contents.
//! Callers re-filter by true distance.
//!
//! # Ordering
//!
//! Both map levels are `BTreeMap`s and cells keep insertion order, so
//! query results are identical on every run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::components::EntityHandle;
use crate::math::{fixed_serde, Fixed, Vec3Fixed};

/// Discretized grid coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellCoord {
    /// Cell column.
    pub x: i32,
    /// Cell row.
    pub y: i32,
}

impl CellCoord {
    /// Create a cell coordinate.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// How world coordinates are discretized into cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CellRounding {
    /// Truncate toward zero. Cell 0 spans `(-size, size)`, twice the width
    /// of every other cell.
    #[default]
    Truncate,
    /// Round toward negative infinity. Every cell spans `[k*size, (k+1)*size)`.
    Floor,
}

/// Shape of the window scanned by [`SpatialGrid::query_around`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum QueryWindow {
    /// Offsets in `[-r, r)`: a `2r x 2r` window biased toward negative cells.
    #[default]
    HalfOpen,
    /// Offsets in `[-r, r]`: a `(2r+1) x (2r+1)` window centred on the cell.
    Centered,
}

/// Handles filed in one cell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridCell {
    handles: Vec<EntityHandle>,
}

impl GridCell {
    /// Handles in insertion order.
    #[must_use]
    pub fn handles(&self) -> &[EntityHandle] {
        &self.handles
    }

    /// Whether the cell holds no handles.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

/// Sparse two-level grid: X -> (Y -> cell).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpatialGrid {
    #[serde(with = "fixed_serde")]
    cell_size: Fixed,
    rounding: CellRounding,
    window: QueryWindow,
    columns: BTreeMap<i32, BTreeMap<i32, GridCell>>,
    /// Reverse index: which cell each handle is filed in.
    membership: BTreeMap<EntityHandle, CellCoord>,
}

impl SpatialGrid {
    /// Create an empty grid with the given cell size.
    ///
    /// Non-positive sizes fall back to one world unit per cell.
    #[must_use]
    pub fn new(cell_size: Fixed) -> Self {
        Self::with_layout(cell_size, CellRounding::default(), QueryWindow::default())
    }

    /// Create an empty grid with explicit rounding and window shape.
    #[must_use]
    pub fn with_layout(cell_size: Fixed, rounding: CellRounding, window: QueryWindow) -> Self {
        let cell_size = if cell_size > Fixed::ZERO {
            cell_size
        } else {
            Fixed::ONE
        };
        Self {
            cell_size,
            rounding,
            window,
            columns: BTreeMap::new(),
            membership: BTreeMap::new(),
        }
    }

    /// World units per cell.
    #[must_use]
    pub const fn cell_size(&self) -> Fixed {
        self.cell_size
    }

    /// Cell containing a world position (ground plane only).
    #[must_use]
    pub fn cell_of(&self, position: Vec3Fixed) -> CellCoord {
        CellCoord::new(
            self.discretize(position.x),
            self.discretize(position.y),
        )
    }

    fn discretize(&self, coord: Fixed) -> i32 {
        let scaled = coord.saturating_div(self.cell_size);
        let rounded = match self.rounding {
            CellRounding::Truncate => scaled.round_to_zero(),
            CellRounding::Floor => scaled.saturating_floor(),
        };
        rounded.saturating_to_num::<i32>()
    }

    /// Cell radius that covers a world-space radius: `1 + radius / cell_size`.
    #[must_use]
    pub fn cell_radius_for(&self, radius: Fixed) -> i32 {
        let cells = radius
            .max(Fixed::ZERO)
            .saturating_div(self.cell_size)
            .round_to_zero()
            .saturating_to_num::<i32>();
        cells.saturating_add(1)
    }

    /// Cell radius whose [`query_around`](Self::query_around) window holds
    /// every point within `radius` of the centre cell's contents.
    ///
    /// The half-open window stops one cell short on the positive side, so
    /// it gets an extra ring.
    #[must_use]
    pub fn covering_cell_radius(&self, radius: Fixed) -> i32 {
        let cells = self.cell_radius_for(radius);
        match self.window {
            QueryWindow::HalfOpen => cells.saturating_add(1),
            QueryWindow::Centered => cells,
        }
    }

    /// File a handle in a cell.
    ///
    /// A handle filed elsewhere is moved, so it is never in two cells.
    /// Inserting into the cell it already occupies is a no-op.
    pub fn insert(&mut self, cell: CellCoord, handle: EntityHandle) {
        if let Some(previous) = self.membership.get(&handle).copied() {
            if previous == cell {
                return;
            }
            self.detach(previous, handle);
        }

        self.columns
            .entry(cell.x)
            .or_default()
            .entry(cell.y)
            .or_default()
            .handles
            .push(handle);
        self.membership.insert(handle, cell);

        #[cfg(feature = "debug-validation")]
        self.assert_consistent();
    }

    /// Remove a handle from a cell. No-op if it is not filed there.
    pub fn remove(&mut self, cell: CellCoord, handle: EntityHandle) {
        if self.membership.get(&handle) != Some(&cell) {
            return;
        }
        self.detach(cell, handle);
        self.membership.remove(&handle);
    }

    /// Remove a handle from whichever cell holds it.
    ///
    /// Returns the cell it was removed from.
    pub fn remove_entity(&mut self, handle: EntityHandle) -> Option<CellCoord> {
        let cell = self.membership.remove(&handle)?;
        self.detach(cell, handle);
        Some(cell)
    }

    fn detach(&mut self, cell: CellCoord, handle: EntityHandle) {
        if let Some(grid_cell) = self
            .columns
            .get_mut(&cell.x)
            .and_then(|column| column.get_mut(&cell.y))
        {
            grid_cell.handles.retain(|h| *h != handle);
        }
    }

    /// Move a handle from the cell of `old_position` to the cell of `new_position`.
    pub fn relocate(&mut self, handle: EntityHandle, old_position: Vec3Fixed, new_position: Vec3Fixed) {
        let old_cell = self.cell_of(old_position);
        let new_cell = self.cell_of(new_position);
        self.remove(old_cell, handle);
        self.insert(new_cell, handle);
    }

    /// Handles from every cell in the window around `center`.
    ///
    /// The window spans offsets `[-r, r)` or `[-r, r]` depending on the
    /// configured [`QueryWindow`]. Negative radii and coordinates that
    /// would overflow yield nothing.
    #[must_use]
    pub fn query_around(&self, center: CellCoord, cell_radius: i32) -> Vec<EntityHandle> {
        let mut found = Vec::new();
        if cell_radius < 0 {
            return found;
        }

        let upper = match self.window {
            QueryWindow::HalfOpen => cell_radius,
            QueryWindow::Centered => cell_radius.saturating_add(1),
        };
        let (Some(x_lo), Some(y_lo)) = (
            center.x.checked_sub(cell_radius),
            center.y.checked_sub(cell_radius),
        ) else {
            return found;
        };
        let (Some(x_hi), Some(y_hi)) = (center.x.checked_add(upper), center.y.checked_add(upper))
        else {
            return found;
        };

        for (_, column) in self.columns.range(x_lo..x_hi) {
            for (_, cell) in column.range(y_lo..y_hi) {
                found.extend_from_slice(&cell.handles);
            }
        }
        found
    }

    /// Handles filed in one cell.
    #[must_use]
    pub fn handles_in(&self, cell: CellCoord) -> &[EntityHandle] {
        self.columns
            .get(&cell.x)
            .and_then(|column| column.get(&cell.y))
            .map_or(&[][..], GridCell::handles)
    }

    /// Cell a handle is filed in.
    #[must_use]
    pub fn cell_of_entity(&self, handle: EntityHandle) -> Option<CellCoord> {
        self.membership.get(&handle).copied()
    }

    /// Number of filed handles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.membership.len()
    }

    /// Whether no handles are filed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.membership.is_empty()
    }

    /// Number of allocated cells, including empty ones.
    #[must_use]
    pub fn cell_count(&self) -> usize {
        self.columns.values().map(BTreeMap::len).sum()
    }

    /// Drop every cell and handle.
    pub fn clear(&mut self) {
        self.columns.clear();
        self.membership.clear();
    }

    #[cfg(feature = "debug-validation")]
    fn assert_consistent(&self) {
        let filed: usize = self
            .columns
            .values()
            .flat_map(BTreeMap::values)
            .map(|c| c.handles.len())
            .sum();
        debug_assert_eq!(filed, self.membership.len(), "grid membership out of sync");
    }
}

impl Default for SpatialGrid {
    fn default() -> Self {
        Self::new(Fixed::from_num(500))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(x: i32, y: i32) -> Vec3Fixed {
        Vec3Fixed::from_ints(x, y, 0)
    }

    fn handle(index: u32) -> EntityHandle {
        EntityHandle::new(index, 0)
    }

    #[test]
    fn test_cell_of_truncates_toward_zero() {
        let grid = SpatialGrid::default();
        assert_eq!(grid.cell_of(pos(499, 0)), CellCoord::new(0, 0));
        assert_eq!(grid.cell_of(pos(500, 1200)), CellCoord::new(1, 2));
        assert_eq!(grid.cell_of(pos(-499, -501)), CellCoord::new(0, -1));
    }

    #[test]
    fn test_cell_of_floor() {
        let grid = SpatialGrid::with_layout(
            Fixed::from_num(500),
            CellRounding::Floor,
            QueryWindow::HalfOpen,
        );
        assert_eq!(grid.cell_of(pos(-1, -499)), CellCoord::new(-1, -1));
        assert_eq!(grid.cell_of(pos(-500, 0)), CellCoord::new(-1, 0));
        assert_eq!(grid.cell_of(pos(-501, 0)), CellCoord::new(-2, 0));
    }

    #[test]
    fn test_insert_query_remove() {
        let mut grid = SpatialGrid::default();
        let cell = grid.cell_of(pos(120, 80));
        grid.insert(cell, handle(1));

        assert!(grid.query_around(cell, 1).contains(&handle(1)));

        grid.remove(cell, handle(1));
        assert!(!grid.query_around(cell, 1).contains(&handle(1)));
        assert_eq!(grid.cell_count(), 1);
    }

    #[test]
    fn test_remove_missing_is_noop() {
        let mut grid = SpatialGrid::default();
        grid.remove(CellCoord::new(3, 3), handle(9));
        grid.insert(CellCoord::new(0, 0), handle(1));
        grid.remove(CellCoord::new(5, 5), handle(1));
        assert_eq!(grid.cell_of_entity(handle(1)), Some(CellCoord::new(0, 0)));
    }

    #[test]
    fn test_insert_moves_existing_membership() {
        let mut grid = SpatialGrid::default();
        grid.insert(CellCoord::new(0, 0), handle(1));
        grid.insert(CellCoord::new(0, 0), handle(1));
        assert_eq!(grid.handles_in(CellCoord::new(0, 0)).len(), 1);

        grid.insert(CellCoord::new(4, -2), handle(1));
        assert!(grid.handles_in(CellCoord::new(0, 0)).is_empty());
        assert_eq!(grid.handles_in(CellCoord::new(4, -2)), &[handle(1)]);
        assert_eq!(grid.len(), 1);
    }

    #[test]
    fn test_relocate() {
        let mut grid = SpatialGrid::default();
        let p1 = pos(10, 10);
        let p2 = pos(2600, -900);
        grid.insert(grid.cell_of(p1), handle(7));
        grid.relocate(handle(7), p1, p2);

        assert!(!grid.handles_in(grid.cell_of(p1)).contains(&handle(7)));
        assert!(grid.handles_in(grid.cell_of(p2)).contains(&handle(7)));
    }

    #[test]
    fn test_half_open_window_is_biased() {
        let mut grid = SpatialGrid::default();
        grid.insert(CellCoord::new(-1, -1), handle(1));
        grid.insert(CellCoord::new(1, 1), handle(2));
        grid.insert(CellCoord::new(0, 0), handle(3));

        let found = grid.query_around(CellCoord::new(0, 0), 1);
        assert!(found.contains(&handle(1)));
        assert!(found.contains(&handle(3)));
        assert!(!found.contains(&handle(2)));
    }

    #[test]
    fn test_centered_window_is_symmetric() {
        let mut grid = SpatialGrid::with_layout(
            Fixed::from_num(500),
            CellRounding::Truncate,
            QueryWindow::Centered,
        );
        grid.insert(CellCoord::new(-1, -1), handle(1));
        grid.insert(CellCoord::new(1, 1), handle(2));
        grid.insert(CellCoord::new(2, 0), handle(3));

        let found = grid.query_around(CellCoord::new(0, 0), 1);
        assert!(found.contains(&handle(1)));
        assert!(found.contains(&handle(2)));
        assert!(!found.contains(&handle(3)));
    }

    #[test]
    fn test_zero_and_negative_radius() {
        let mut grid = SpatialGrid::default();
        grid.insert(CellCoord::new(0, 0), handle(1));
        assert!(grid.query_around(CellCoord::new(0, 0), 0).is_empty());
        assert!(grid.query_around(CellCoord::new(0, 0), -3).is_empty());
    }

    #[test]
    fn test_extreme_coordinates_are_noops() {
        let mut grid = SpatialGrid::default();
        grid.insert(CellCoord::new(i32::MAX, i32::MIN), handle(1));
        assert!(grid
            .query_around(CellCoord::new(i32::MAX, i32::MIN), 2)
            .is_empty());
        assert!(grid.query_around(CellCoord::new(0, 0), 2).is_empty());
    }

    #[test]
    fn test_cell_radius_for() {
        let grid = SpatialGrid::default();
        assert_eq!(grid.cell_radius_for(Fixed::from_num(100)), 1);
        assert_eq!(grid.cell_radius_for(Fixed::from_num(500)), 2);
        assert_eq!(grid.cell_radius_for(Fixed::from_num(1499)), 3);
        assert_eq!(grid.cell_radius_for(Fixed::from_num(-10)), 1);
    }

    #[test]
    fn test_covering_radius_reaches_next_positive_cell() {
        let mut grid = SpatialGrid::default();
        let center = grid.cell_of(Vec3Fixed::from_ints(490, 0, 0));
        let across = Vec3Fixed::from_ints(510, 0, 0);
        grid.insert(grid.cell_of(across), handle(1));

        let radius = Fixed::from_num(100);
        assert!(grid.query_around(center, grid.cell_radius_for(radius)).is_empty());
        assert_eq!(
            grid.query_around(center, grid.covering_cell_radius(radius)),
            vec![handle(1)]
        );

        let centered = SpatialGrid::with_layout(
            Fixed::from_num(500),
            CellRounding::Truncate,
            QueryWindow::Centered,
        );
        assert_eq!(centered.covering_cell_radius(radius), 1);
    }

    #[test]
    fn test_clear() {
        let mut grid = SpatialGrid::default();
        grid.insert(CellCoord::new(1, 1), handle(1));
        grid.clear();
        assert!(grid.is_empty());
        assert_eq!(grid.cell_count(), 0);
        assert_eq!(grid.cell_of_entity(handle(1)), None);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        fn arb_window() -> impl Strategy<Value = QueryWindow> {
            prop_oneof![Just(QueryWindow::HalfOpen), Just(QueryWindow::Centered)]
        }

        fn arb_rounding() -> impl Strategy<Value = CellRounding> {
            prop_oneof![Just(CellRounding::Truncate), Just(CellRounding::Floor)]
        }

        proptest! {
            /// Every point within the radius shows up in the covering window.
            #[test]
            fn prop_covering_window_holds_every_point_in_range(
                window in arb_window(),
                rounding in arb_rounding(),
                cx in -5_000i32..5_000,
                cy in -5_000i32..5_000,
                dx in -1_500i32..1_500,
                dy in -1_500i32..1_500,
            ) {
                // Manhattan length never undershoots the true distance.
                let radius = dx.abs() + dy.abs();
                let mut grid = SpatialGrid::with_layout(Fixed::from_num(500), rounding, window);
                let center = pos(cx, cy);
                grid.insert(grid.cell_of(pos(cx + dx, cy + dy)), handle(7));

                let found = grid.query_around(
                    grid.cell_of(center),
                    grid.covering_cell_radius(Fixed::from_num(radius)),
                );
                prop_assert_eq!(found, vec![handle(7)]);
            }
        }
    }
}
