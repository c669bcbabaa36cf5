//! A world: the active set plus the candidate set for its next step.

use super::cell_set::CellSet;
use super::coord::Coord;

/// One generation of a sparse universe.
///
/// `candidates` must cover every cell whose state could change in the next
/// step. Every mutation here keeps that invariant by seeding the 3x3
/// neighborhood of the touched cell.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct World {
    pub active: CellSet,
    pub candidates: CellSet,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(active: CellSet, candidates: CellSet) -> Self {
        Self { active, candidates }
    }

    pub fn into_parts(self) -> (CellSet, CellSet) {
        (self.active, self.candidates)
    }

    /// Make `cell` alive and mark its 3x3 neighborhood as candidates.
    pub fn add_living_cell(&mut self, cell: Coord) {
        self.active.insert(cell);
        for c in cell.neighborhood() {
            self.candidates.insert(c);
        }
    }

    /// Kill `cell` if it is alive. Its neighborhood becomes candidates so
    /// births caused by the removal are not missed.
    pub fn kill_cell(&mut self, cell: Coord) -> bool {
        if !self.active.remove(cell) {
            return false;
        }
        for c in cell.neighborhood() {
            self.candidates.insert(c);
        }
        true
    }

    #[inline]
    pub fn is_alive(&self, cell: Coord) -> bool {
        self.active.contains(cell)
    }

    #[inline]
    pub fn population(&self) -> usize {
        self.active.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn clear(&mut self) {
        self.active.clear();
        self.candidates.clear();
    }

    /// Inclusive bounding box of the living cells as `(min, max)`.
    pub fn bounds(&self) -> Option<(Coord, Coord)> {
        let mut cells = self.active.iter();
        let first = cells.next()?;
        let (mut min, mut max) = (first, first);
        for c in cells {
            min.x = min.x.min(c.x);
            min.y = min.y.min(c.y);
            max.x = max.x.max(c.x);
            max.y = max.y.max(c.y);
        }
        Some((min, max))
    }
}

impl FromIterator<Coord> for World {
    fn from_iter<I: IntoIterator<Item = Coord>>(iter: I) -> Self {
        let mut world = World::new();
        for cell in iter {
            world.add_living_cell(cell);
        }
        world
    }
}
