//! Grid Cells and Directions
//!
//! Integer cell coordinates for the arena grid.
//! Equality is exact; there is no tolerance anywhere in the simulation.

use std::fmt;
use serde::{Serialize, Deserialize};

/// A cell on the arena grid (column, row).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Cell {
    /// Column (0 = left edge)
    pub x: i32,
    /// Row (0 = top edge)
    pub y: i32,
}

impl Cell {
    /// Create a new cell.
    #[inline]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The neighbouring cell one step in `direction`.
    #[inline]
    pub fn step(self, direction: Direction) -> Self {
        let (dx, dy) = direction.vector();
        Self {
            x: self.x.wrapping_add(dx),
            y: self.y.wrapping_add(dy),
        }
    }

    /// Convert to arena units for the wire.
    #[inline]
    pub fn to_units(self, cell_size: i32) -> (i32, i32) {
        (self.x * cell_size, self.y * cell_size)
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cell({}, {})", self.x, self.y)
    }
}

/// One of the four unit movement vectors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// (0, -1)
    Up,
    /// (0, 1)
    Down,
    /// (-1, 0)
    Left,
    /// (1, 0)
    Right,
}

impl Direction {
    /// All four directions.
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    /// Unit vector `(dx, dy)`. Rows grow downwards.
    #[inline]
    pub const fn vector(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }

    /// Parse a unit vector. Anything else is rejected.
    pub fn from_vector(x: i32, y: i32) -> Option<Self> {
        match (x, y) {
            (0, -1) => Some(Direction::Up),
            (0, 1) => Some(Direction::Down),
            (-1, 0) => Some(Direction::Left),
            (1, 0) => Some(Direction::Right),
            _ => None,
        }
    }

    /// The exact reverse.
    #[inline]
    pub const fn opposite(self) -> Self {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }

    /// Stable tag for hashing.
    #[inline]
    pub const fn as_u8(self) -> u8 {
        match self {
            Direction::Up => 0,
            Direction::Down => 1,
            Direction::Left => 2,
            Direction::Right => 3,
        }
    }
}
