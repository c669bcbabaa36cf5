//! Sparse Conway's Game of Life (B3/S23) on an unbounded `i32` plane.
//!
//! A [`World`] holds the living cells and the candidate cells that could
//! change next generation. [`cpu::step`] advances it sequentially;
//! [`HybridStepper`] can offload classification to a GPU or thread-pool
//! backend and falls back to the CPU engine on any accelerator fault.

pub mod accel;
pub mod config;
pub mod cpu;
pub mod error;
pub mod hybrid;
pub mod rules;
pub mod sparse;

pub use accel::StageTimings;
pub use config::{AcceleratorBackend, HybridConfig};
pub use error::AccelError;
pub use hybrid::{AccelerationDiagnostics, HybridStepper};
pub use sparse::{CellSet, Coord, World};
