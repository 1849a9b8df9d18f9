//! Fixed grid partition of the world map.

use glam::{DVec2, DVec3};
use std::cmp::Ordering;

/// World-map pixels covered by one grid unit.
const CELL_UNIT: u32 = 52;

/// Map a game-world position onto world-map coordinates.
pub fn map_to_grid(pos: DVec3) -> DVec2 {
    DVec2::new(
        0.183583939 * pos.x - 10.0328626,
        -0.183613514 * pos.y + 773.060633,
    )
}

/// One rectangle of the grid, covering `[min, max)` on both axes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridCell {
    pub id: usize,
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl GridCell {
    #[inline]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x < self.max_x && y >= self.min_y && y < self.max_y
    }

    /// Where the cell sits relative to the point, in sort order.
    #[inline]
    fn cmp_point(&self, x: f64, y: f64) -> Ordering {
        if x < self.min_x {
            Ordering::Greater
        } else if x >= self.max_x {
            Ordering::Less
        } else if y < self.min_y {
            Ordering::Greater
        } else if y >= self.max_y {
            Ordering::Less
        } else {
            Ordering::Equal
        }
    }
}

/// Immutable grid of square cells, sorted by `(min_x, min_y)`.
#[derive(Debug, Clone)]
pub struct WorldGrid {
    cells: Vec<GridCell>,
}

impl WorldGrid {
    /// Partition `width x height` into cells of edge `52 * cell_radius`.
    /// Cells on the right and bottom edges are clipped to the map.
    pub fn new(width: u32, height: u32, cell_radius: u32) -> Self {
        let edge = (CELL_UNIT * cell_radius.max(1)) as usize;
        let mut cells = Vec::new();

        for x in (0..width).step_by(edge) {
            let end_x = (x as usize + edge).min(width as usize);
            for y in (0..height).step_by(edge) {
                let end_y = (y as usize + edge).min(height as usize);
                cells.push(GridCell {
                    id: 0,
                    min_x: x as f64,
                    min_y: y as f64,
                    max_x: end_x as f64,
                    max_y: end_y as f64,
                });
            }
        }

        cells.sort_by(|a, b| {
            a.min_x
                .total_cmp(&b.min_x)
                .then(a.min_y.total_cmp(&b.min_y))
        });
        for (i, cell) in cells.iter_mut().enumerate() {
            cell.id = i;
        }

        Self { cells }
    }

    /// Find the cell containing a map-space point.
    pub fn find_cell(&self, x: f64, y: f64) -> Option<&GridCell> {
        if !x.is_finite() || !y.is_finite() {
            return None;
        }
        self.cells
            .binary_search_by(|cell| cell.cmp_point(x, y))
            .ok()
            .map(|i| &self.cells[i])
    }

    #[inline]
    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn cell(&self, id: usize) -> Option<&GridCell> {
        self.cells.get(id)
    }
}
