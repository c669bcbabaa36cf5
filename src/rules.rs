//! Rule table for B3/S23.
//!
//! The rule is canonicalized once into two neighbor-count bitmasks; every
//! engine classifies cells through [`next_alive`].

/// Neighbor counts that bring a dead cell to life.
pub const BIRTH_MASK: u16 = 1 << 3;
/// Neighbor counts that keep a living cell alive.
pub const SURVIVE_MASK: u16 = (1 << 2) | (1 << 3);

const TABLE: [[bool; 9]; 2] = build_table();

const fn build_table() -> [[bool; 9]; 2] {
    let mut table = [[false; 9]; 2];
    let mut n = 0;
    while n < 9 {
        table[0][n] = (BIRTH_MASK >> n) & 1 == 1;
        table[1][n] = (SURVIVE_MASK >> n) & 1 == 1;
        n += 1;
    }
    table
}

/// Next state of a cell given its current state and its live Moore-neighbor
/// count (`0..=8`).
#[inline(always)]
pub fn next_alive(alive: bool, neighbors: u8) -> bool {
    TABLE[alive as usize][(neighbors as usize).min(8)]
}
