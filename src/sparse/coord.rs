//! Integer cell coordinates and Moore-neighborhood addressing.

/// A cell position on the unbounded grid.
///
/// Ordering is lexicographic on `(x, y)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Coord {
    pub x: i32,
    pub y: i32,
}

impl Coord {
    pub const ORIGIN: Coord = Coord { x: 0, y: 0 };

    #[inline]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Offset by `(dx, dy)`, or `None` when the result leaves the `i32` range.
    #[inline]
    pub fn checked_offset(self, dx: i32, dy: i32) -> Option<Coord> {
        Some(Coord {
            x: self.x.checked_add(dx)?,
            y: self.y.checked_add(dy)?,
        })
    }

    /// The 8 Moore neighbors that exist inside the coordinate space.
    #[inline]
    pub fn neighbors(self) -> impl Iterator<Item = Coord> {
        Direction::ALL
            .into_iter()
            .filter_map(move |dir| dir.step(self))
    }

    /// The 3x3 block centered on `self` (including itself), clipped to the
    /// coordinate space.
    #[inline]
    pub fn neighborhood(self) -> impl Iterator<Item = Coord> {
        std::iter::once(self).chain(self.neighbors())
    }

    /// Packs the coordinate into one 64-bit key (`y` high, `x` low).
    #[inline(always)]
    pub const fn packed(self) -> u64 {
        ((self.y as u32 as u64) << 32) | (self.x as u32 as u64)
    }
}

impl From<(i32, i32)> for Coord {
    #[inline]
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}

impl From<Coord> for (i32, i32) {
    #[inline]
    fn from(c: Coord) -> Self {
        (c.x, c.y)
    }
}

/// The 8 cardinal and intercardinal directions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Direction {
    North = 0, // (x, y+1)
    South = 1, // (x, y-1)
    West  = 2, // (x-1, y)
    East  = 3, // (x+1, y)
    NW    = 4, // (x-1, y+1)
    NE    = 5, // (x+1, y+1)
    SW    = 6, // (x-1, y-1)
    SE    = 7, // (x+1, y-1)
}

impl Direction {
    pub const ALL: [Direction; 8] = [
        Direction::North, Direction::South,
        Direction::West,  Direction::East,
        Direction::NW,    Direction::NE,
        Direction::SW,    Direction::SE,
    ];

    #[inline]
    pub const fn offset(self) -> (i32, i32) {
        match self {
            Direction::North => (0, 1),
            Direction::South => (0, -1),
            Direction::West  => (-1, 0),
            Direction::East  => (1, 0),
            Direction::NW    => (-1, 1),
            Direction::NE    => (1, 1),
            Direction::SW    => (-1, -1),
            Direction::SE    => (1, -1),
        }
    }

    /// The neighbor of `from` in this direction, if it exists.
    #[inline(always)]
    pub fn step(self, from: Coord) -> Option<Coord> {
        let (dx, dy) = self.offset();
        from.checked_offset(dx, dy)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }
}
