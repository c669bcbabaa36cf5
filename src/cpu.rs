//! Sequential stepping engine.
//!
//! Only the candidate set is evaluated, so a step costs
//! O(|candidates| * 8) set lookups regardless of how far apart the living
//! cells are.

use crate::rules::next_alive;
use crate::sparse::{CellSet, Coord, World};

/// Count the living Moore neighbors of `cell`.
#[inline]
pub fn live_neighbors(active: &CellSet, cell: Coord) -> u8 {
    cell.neighbors().filter(|&n| active.contains(n)).count() as u8
}

/// Compute the generation after `current` into `next`.
///
/// `next` is cleared first; its capacity is reused.
pub fn step_into(current: &World, next: &mut World) {
    next.clear();
    next.active.reserve(current.active.len());
    next.candidates.reserve(current.active.len());

    // Living cells stay candidates: their neighbors may still change.
    next.candidates.union_with(&current.active);

    for cell in current.candidates.iter() {
        let alive = current.active.contains(cell);
        let will_live = next_alive(alive, live_neighbors(&current.active, cell));
        if will_live {
            next.active.insert(cell);
        }
        if will_live != alive {
            for c in cell.neighborhood() {
                next.candidates.insert(c);
            }
        }
    }
}

/// Compute the generation after `current`.
pub fn step(current: &World) -> World {
    let mut next = World::new();
    step_into(current, &mut next);
    next
}
