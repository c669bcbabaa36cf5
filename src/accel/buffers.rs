//! Flat buffer records exchanged with the accelerator backends.
//!
//! Layouts are `#[repr(C)]` and `Pod` so the GPU backend can upload and read
//! them back without conversion.

use bytemuck::{Pod, Zeroable};

use crate::error::AccelError;
use crate::sparse::Coord;

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct RawCoord {
    pub x: i32,
    pub y: i32,
}

impl From<Coord> for RawCoord {
    #[inline(always)]
    fn from(c: Coord) -> Self {
        Self { x: c.x, y: c.y }
    }
}

impl From<RawCoord> for Coord {
    #[inline(always)]
    fn from(c: RawCoord) -> Self {
        Coord::new(c.x, c.y)
    }
}

/// Classification of one candidate cell.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct CellState {
    pub x: i32,
    pub y: i32,
    pub was_alive: u32,
    pub will_be_alive: u32,
}

impl CellState {
    #[inline]
    pub fn new(cell: Coord, was_alive: bool, will_be_alive: bool) -> Self {
        Self {
            x: cell.x,
            y: cell.y,
            was_alive: was_alive as u32,
            will_be_alive: will_be_alive as u32,
        }
    }

    #[inline]
    pub fn coord(&self) -> Coord {
        Coord::new(self.x, self.y)
    }

    #[inline]
    pub fn was_alive(&self) -> bool {
        self.was_alive != 0
    }

    #[inline]
    pub fn will_be_alive(&self) -> bool {
        self.will_be_alive != 0
    }

    #[inline]
    pub fn changed(&self) -> bool {
        self.was_alive() != self.will_be_alive()
    }
}

/// Neighborhood coordinates of changed cells, as produced by the backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NeighborHints {
    /// Every in-range 3x3 neighborhood cell of every changed cell. May hold
    /// duplicates.
    Complete(Vec<RawCoord>),
    /// The fixed-capacity hint buffer was too small; the list was dropped.
    Overflowed { required: usize, capacity: usize },
}

impl NeighborHints {
    /// Build the hint result from an accumulated list, enforcing `capacity`.
    pub fn bounded(hints: Vec<RawCoord>, capacity: usize) -> Self {
        if hints.len() > capacity {
            Self::Overflowed {
                required: hints.len(),
                capacity,
            }
        } else {
            Self::Complete(hints)
        }
    }

    pub fn overflow_error(&self) -> Option<AccelError> {
        match *self {
            Self::Complete(_) => None,
            Self::Overflowed { required, capacity } => {
                Some(AccelError::BufferOverflow { required, capacity })
            }
        }
    }

    pub fn is_overflowed(&self) -> bool {
        matches!(self, Self::Overflowed { .. })
    }
}

/// Output of one accelerator dispatch.
#[derive(Clone, Debug)]
pub struct Classification {
    /// One entry per candidate, in candidate order.
    pub states: Vec<CellState>,
    pub hints: NeighborHints,
}

impl Classification {
    pub fn empty() -> Self {
        Self {
            states: Vec::new(),
            hints: NeighborHints::Complete(Vec::new()),
        }
    }

    pub fn changed_count(&self) -> usize {
        self.states.iter().filter(|s| s.changed()).count()
    }
}

/// Sort the active batch into the lookup order shared by every backend.
#[inline]
pub fn sort_for_lookup(active: &mut [RawCoord]) {
    active.sort_unstable_by_key(|c| (c.x, c.y));
}

/// Membership test against a batch sorted with [`sort_for_lookup`].
#[inline]
pub fn contains_sorted(sorted: &[RawCoord], cell: Coord) -> bool {
    sorted
        .binary_search_by(|probe| (probe.x, probe.y).cmp(&(cell.x, cell.y)))
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::{CellState, NeighborHints, RawCoord, contains_sorted, sort_for_lookup};
    use crate::sparse::Coord;

    #[test]
    fn records_match_the_shader_layout() {
        assert_eq!(std::mem::size_of::<RawCoord>(), 8);
        assert_eq!(std::mem::size_of::<CellState>(), 16);
    }

    #[test]
    fn sorted_lookup_handles_signs_and_extremes() {
        let mut active: Vec<RawCoord> = [
            (i32::MAX, 0),
            (-1, 5),
            (-1, -5),
            (i32::MIN, i32::MIN),
            (3, 3),
        ]
        .into_iter()
        .map(|(x, y)| RawCoord { x, y })
        .collect();
        sort_for_lookup(&mut active);

        for c in active.clone() {
            assert!(contains_sorted(&active, c.into()));
        }
        assert!(!contains_sorted(&active, Coord::new(-1, 0)));
        assert!(!contains_sorted(&active, Coord::new(i32::MAX, 1)));
        assert!(!contains_sorted(&[], Coord::ORIGIN));
    }

    #[test]
    fn hints_over_capacity_are_dropped() {
        let hints = vec![RawCoord::default(); 10];
        assert_eq!(
            NeighborHints::bounded(hints.clone(), 10),
            NeighborHints::Complete(hints.clone())
        );
        let over = NeighborHints::bounded(hints, 9);
        assert!(over.is_overflowed());
        assert!(over.overflow_error().is_some());
    }

    #[test]
    fn cell_state_reports_changes() {
        let born = CellState::new(Coord::new(1, 2), false, true);
        assert!(born.changed());
        assert_eq!(born.coord(), Coord::new(1, 2));
        assert!(!CellState::new(Coord::ORIGIN, true, true).changed());
    }
}
