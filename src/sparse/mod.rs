//! Coordinates and the sparse containers that hold a generation.

mod cell_set;
mod coord;
mod world;

pub use cell_set::{CellSet, Iter};
pub use coord::{Coord, Direction};
pub use world::World;
