//! Which clients currently sit in which grid cell.

use std::collections::HashSet;

/// Per-cell occupant sets, indexed by cell id.
#[derive(Debug, Clone)]
pub struct CellOccupancy {
    cells: Vec<HashSet<u32>>,
}

impl CellOccupancy {
    pub fn new(num_cells: usize) -> Self {
        Self {
            cells: vec![HashSet::new(); num_cells],
        }
    }

    /// Move a client from `from` (if any) into `to`.
    pub fn relocate(&mut self, client_id: u32, from: Option<usize>, to: usize) {
        if let Some(from) = from {
            self.remove(client_id, from);
        }
        if let Some(cell) = self.cells.get_mut(to) {
            cell.insert(client_id);
        }
    }

    pub fn remove(&mut self, client_id: u32, cell: usize) {
        if let Some(cell) = self.cells.get_mut(cell) {
            cell.remove(&client_id);
        }
    }

    /// Occupants of a cell, in no particular order.
    pub fn occupants(&self, cell: usize) -> impl Iterator<Item = u32> + '_ {
        self.cells.get(cell).into_iter().flatten().copied()
    }

    pub fn count(&self, cell: usize) -> usize {
        self.cells.get(cell).map_or(0, HashSet::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relocate() {
        let mut occ = CellOccupancy::new(4);
        occ.relocate(7, None, 1);
        occ.relocate(8, None, 1);
        assert_eq!(occ.count(1), 2);

        occ.relocate(7, Some(1), 3);
        assert_eq!(occ.occupants(1).collect::<Vec<_>>(), vec![8]);
        assert_eq!(occ.occupants(3).collect::<Vec<_>>(), vec![7]);

        occ.remove(8, 1);
        assert_eq!(occ.count(1), 0);
        assert_eq!(occ.occupants(99).count(), 0);
    }
}
