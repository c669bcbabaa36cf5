//! Sparse coordinate set used for both the active and candidate sets.
//!
//! This is an open-addressed linear-probing hash set keyed by [`Coord`].
//! Slots are lazily cleared with an epoch stamp, so `clear` is O(1) and a
//! recycled set can be refilled without touching the full backing array.
//! Removal uses backward-shift deletion, so no tombstones accumulate.

use std::fmt;

use super::coord::Coord;

const LOAD_NUM: usize = 3;
const LOAD_DEN: usize = 4;
const MIN_SLOTS: usize = 16;

#[derive(Clone, Copy)]
#[repr(C)]
struct Slot {
    coord: Coord,
    stamp: u32,
}

impl Slot {
    const EMPTY: Self = Self {
        coord: Coord::ORIGIN,
        stamp: 0,
    };
}

/// Mixes the packed 64-bit key so that neighboring cells and both signs of
/// each axis spread across the table.
#[inline(always)]
fn coord_hash(coord: Coord) -> u64 {
    let mut h = coord.packed().wrapping_mul(0x9E37_79B9_7F4A_7C15);
    h ^= h >> 32;
    h = h.wrapping_mul(0xD6E8_FEB8_6659_FD93);
    h ^ (h >> 29)
}

#[inline(always)]
fn slots_for(keys: usize) -> usize {
    keys.saturating_mul(LOAD_DEN)
        .div_ceil(LOAD_NUM)
        .next_power_of_two()
        .max(MIN_SLOTS)
}

#[derive(Clone)]
pub struct CellSet {
    slots: Vec<Slot>,
    mask: usize,
    stamp: u32,
    len: usize,
}

impl Default for CellSet {
    fn default() -> Self {
        Self::new()
    }
}

impl CellSet {
    pub fn new() -> Self {
        Self::with_capacity(64)
    }

    pub fn with_capacity(cap: usize) -> Self {
        let slots = slots_for(cap);
        Self {
            slots: vec![Slot::EMPTY; slots],
            mask: slots - 1,
            stamp: 1,
            len: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Remove every coordinate in O(1); capacity is kept.
    #[inline]
    pub fn clear(&mut self) {
        self.len = 0;
        self.stamp = self.stamp.wrapping_add(1);
        if self.stamp == 0 {
            self.stamp = 1;
            for slot in &mut self.slots {
                slot.stamp = 0;
            }
        }
    }

    /// Make room for `additional` more coordinates without regrowing.
    #[inline]
    pub fn reserve(&mut self, additional: usize) {
        let needed = slots_for(self.len.saturating_add(additional));
        if needed > self.slots.len() {
            self.resize(needed);
        }
    }

    #[inline(always)]
    fn home(&self, coord: Coord) -> usize {
        coord_hash(coord) as usize & self.mask
    }

    #[inline(always)]
    fn is_live(&self, slot: &Slot) -> bool {
        slot.stamp == self.stamp
    }

    #[inline(always)]
    fn needs_grow(&self) -> bool {
        (self.len + 1) * LOAD_DEN > self.slots.len() * LOAD_NUM
    }

    fn resize(&mut self, new_slots: usize) {
        debug_assert!(new_slots.is_power_of_two());
        let old_slots = std::mem::replace(&mut self.slots, vec![Slot::EMPTY; new_slots]);
        let old_stamp = self.stamp;
        self.mask = new_slots - 1;
        self.stamp = 1;
        self.len = 0;

        for slot in old_slots {
            if slot.stamp == old_stamp {
                self.insert_rehash(slot.coord);
            }
        }
    }

    #[inline(always)]
    fn insert_rehash(&mut self, coord: Coord) {
        let mask = self.mask;
        let mut pos = self.home(coord);
        loop {
            // SAFETY: `pos` is always masked into `0..slots.len()`.
            let slot = unsafe { self.slots.get_unchecked_mut(pos) };
            if slot.stamp != self.stamp {
                *slot = Slot {
                    coord,
                    stamp: self.stamp,
                };
                self.len += 1;
                return;
            }
            pos = (pos + 1) & mask;
        }
    }

    /// Insert a coordinate.
    /// Returns `true` if newly inserted, `false` if it already existed.
    #[inline]
    pub fn insert(&mut self, coord: Coord) -> bool {
        if self.needs_grow() {
            self.resize((self.slots.len() * 2).max(MIN_SLOTS));
        }

        let mask = self.mask;
        let stamp = self.stamp;
        let mut pos = self.home(coord);
        loop {
            // SAFETY: `pos` is always masked into `0..slots.len()`.
            let slot = unsafe { self.slots.get_unchecked_mut(pos) };
            if slot.stamp != stamp {
                *slot = Slot { coord, stamp };
                self.len += 1;
                return true;
            }
            if slot.coord == coord {
                return false;
            }
            pos = (pos + 1) & mask;
        }
    }

    #[inline]
    fn find(&self, coord: Coord) -> Option<usize> {
        let mask = self.mask;
        let mut pos = self.home(coord);
        loop {
            // SAFETY: `pos` is always masked into `0..slots.len()`.
            let slot = unsafe { self.slots.get_unchecked(pos) };
            if !self.is_live(slot) {
                return None;
            }
            if slot.coord == coord {
                return Some(pos);
            }
            pos = (pos + 1) & mask;
        }
    }

    #[inline]
    pub fn contains(&self, coord: Coord) -> bool {
        self.find(coord).is_some()
    }

    /// Remove a coordinate. Returns `true` if it was present.
    pub fn remove(&mut self, coord: Coord) -> bool {
        let Some(mut hole) = self.find(coord) else {
            return false;
        };

        let mask = self.mask;
        let mut next = (hole + 1) & mask;
        loop {
            let slot = self.slots[next];
            if !self.is_live(&slot) {
                break;
            }
            // Shift back any entry whose probe run passes through the hole.
            let home = self.home(slot.coord);
            if (next.wrapping_sub(home) & mask) >= (next.wrapping_sub(hole) & mask) {
                self.slots[hole] = slot;
                hole = next;
            }
            next = (next + 1) & mask;
        }

        self.slots[hole].stamp = 0;
        self.len -= 1;
        true
    }

    /// Insert every coordinate of `other`.
    pub fn union_with(&mut self, other: &CellSet) {
        self.reserve(other.len());
        for coord in other.iter() {
            self.insert(coord);
        }
    }

    /// Iterate the coordinates in unspecified order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            slots: self.slots.iter(),
            stamp: self.stamp,
            remaining: self.len,
        }
    }
}

pub struct Iter<'a> {
    slots: std::slice::Iter<'a, Slot>,
    stamp: u32,
    remaining: usize,
}

impl Iterator for Iter<'_> {
    type Item = Coord;

    #[inline]
    fn next(&mut self) -> Option<Coord> {
        if self.remaining == 0 {
            return None;
        }
        for slot in self.slots.by_ref() {
            if slot.stamp == self.stamp {
                self.remaining -= 1;
                return Some(slot.coord);
            }
        }
        None
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Iter<'_> {}

impl<'a> IntoIterator for &'a CellSet {
    type Item = Coord;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}

impl Extend<Coord> for CellSet {
    fn extend<I: IntoIterator<Item = Coord>>(&mut self, iter: I) {
        let iter = iter.into_iter();
        self.reserve(iter.size_hint().0);
        for coord in iter {
            self.insert(coord);
        }
    }
}

impl FromIterator<Coord> for CellSet {
    fn from_iter<I: IntoIterator<Item = Coord>>(iter: I) -> Self {
        let mut set = CellSet::new();
        set.extend(iter);
        set
    }
}

impl PartialEq for CellSet {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.iter().all(|c| other.contains(c))
    }
}

impl Eq for CellSet {}

impl fmt::Debug for CellSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut coords: Vec<Coord> = self.iter().collect();
        coords.sort_unstable();
        f.debug_set().entries(coords).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::CellSet;
    use crate::sparse::Coord;

    fn c(x: i32, y: i32) -> Coord {
        Coord::new(x, y)
    }

    #[test]
    fn dedups_and_resets_across_clears() {
        let mut set = CellSet::new();
        assert!(set.insert(c(1, 2)));
        assert!(!set.insert(c(1, 2)));
        assert!(set.insert(c(-5, 9)));
        assert_eq!(set.len(), 2);

        set.clear();
        assert!(set.is_empty());
        assert!(!set.contains(c(1, 2)));
        assert!(set.insert(c(1, 2)));
        assert!(!set.insert(c(1, 2)));
        assert_eq!(set.iter().count(), 1);
    }

    #[test]
    fn reserve_and_insert_many() {
        let mut set = CellSet::with_capacity(8);
        set.reserve(10_000);
        for i in 0..10_000i32 {
            assert!(set.insert(c(i, -i)));
        }
        for i in 0..10_000i32 {
            assert!(!set.insert(c(i, -i)));
            assert!(set.contains(c(i, -i)));
        }
        assert!(!set.contains(c(1, 1)));
        assert_eq!(set.len(), 10_000);
    }

    #[test]
    fn growth_keeps_members_after_clear() {
        let mut set = CellSet::with_capacity(4);
        set.insert(c(7, 7));
        set.clear();
        for i in 0..500 {
            set.insert(c(i, i * 3));
        }
        assert_eq!(set.len(), 500);
        assert!(!set.contains(c(7, 7)));
        assert!(set.contains(c(499, 1497)));
    }

    #[test]
    fn remove_keeps_probe_chains_intact() {
        let mut set = CellSet::with_capacity(4);
        let coords: Vec<_> = (-40..40).map(|i| c(i, i.wrapping_mul(7))).collect();
        set.extend(coords.iter().copied());

        for coord in coords.iter().step_by(2) {
            assert!(set.remove(*coord));
            assert!(!set.remove(*coord));
        }
        for (i, coord) in coords.iter().enumerate() {
            assert_eq!(set.contains(*coord), i % 2 == 1, "{coord:?}");
        }
        assert_eq!(set.len(), coords.len() / 2);
        assert_eq!(set.iter().count(), coords.len() / 2);
    }

    #[test]
    fn extreme_coordinates_are_distinct_keys() {
        let corners = [
            c(i32::MAX, i32::MAX),
            c(i32::MIN, i32::MIN),
            c(i32::MAX, i32::MIN),
            c(i32::MIN, i32::MAX),
            c(0, 0),
            c(-1, -1),
        ];
        let set: CellSet = corners.into_iter().collect();
        assert_eq!(set.len(), corners.len());
        for corner in corners {
            assert!(set.contains(corner));
        }
    }

    #[test]
    fn union_and_equality_ignore_insertion_order() {
        let mut a: CellSet = [c(0, 0), c(1, 0)].into_iter().collect();
        let b: CellSet = [c(1, 0), c(2, 0)].into_iter().collect();
        a.union_with(&b);

        let expected: CellSet = [c(2, 0), c(0, 0), c(1, 0)].into_iter().collect();
        assert_eq!(a, expected);
        assert_ne!(a, b);
        assert_eq!(format!("{b:?}"), "{Coord { x: 1, y: 0 }, Coord { x: 2, y: 0 }}");
    }
}
