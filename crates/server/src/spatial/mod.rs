//! Spatial indexing utilities.
//!
//! A fixed grid over the world map, plus the per-cell occupant sets the
//! server refreshes every tick.

mod grid;
mod occupancy;

pub use grid::{GridCell, WorldGrid, map_to_grid};
pub use occupancy::CellOccupancy;
