use crate::bitboard::BitBoard;
use crate::hash::zobrist::zobrist_keys;
use crate::{EDGE_MARGIN, SIZE};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which player a stone (or the move right) belongs to. Red is the
/// first mover: Red plays at even plies, Blue at odd plies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Side {
    Red = 0,
    Blue = 1,
}

impl Side {
    #[inline(always)]
    pub fn opposite(self) -> Self {
        match self {
            Side::Red => Side::Blue,
            Side::Blue => Side::Red,
        }
    }

    /// Deterministic mover for a given ply depth (0 = empty board).
    #[inline(always)]
    pub fn to_move_at_ply(ply: u32) -> Self {
        if ply % 2 == 0 { Side::Red } else { Side::Blue }
    }

    #[inline(always)]
    pub(crate) fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Side::Red),
            1 => Some(Side::Blue),
            _ => None,
        }
    }
}

impl std::ops::Not for Side {
    type Output = Self;

    fn not(self) -> Self::Output {
        self.opposite()
    }
}

/// A single placement at `(x, y)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Move {
    pub x: u8,
    pub y: u8,
}

impl Move {
    #[inline(always)]
    pub const fn new(x: u8, y: u8) -> Self {
        Move { x, y }
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.x, self.y)
    }
}

/// Rejected placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MoveError {
    #[error("cell ({x},{y}) is outside the {size}x{size} board", size = SIZE)]
    OutOfRange { x: u8, y: u8 },
    #[error("cell ({x},{y}) is already occupied")]
    Occupied { x: u8, y: u8 },
}

// Cells within EDGE_MARGIN of any edge. Built once; the canonicalizer
// tests occupancy against it on every position.
fn edge_margin_mask() -> &'static BitBoard {
    static MASK: once_cell::sync::OnceCell<BitBoard> = once_cell::sync::OnceCell::new();
    MASK.get_or_init(|| {
        let mut bb = BitBoard::empty();
        for y in 0..SIZE {
            for x in 0..SIZE {
                if x < EDGE_MARGIN || x >= SIZE - EDGE_MARGIN || y < EDGE_MARGIN || y >= SIZE - EDGE_MARGIN {
                    bb = bb.with_bit(x, y, true);
                }
            }
        }
        bb
    })
}

/// An immutable position: one bit plane per player plus the cached
/// direct hash. `place` never aliases parent storage; successors differ
/// from their parent in exactly one bit.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Board {
    planes: [BitBoard; 2],
    hash: u64,
    stones: u16,
}

impl Board {
    /// The empty board. Its hash is the Zobrist initial constant.
    pub fn empty() -> Self {
        Board {
            planes: [BitBoard::empty(); 2],
            hash: zobrist_keys().initial,
            stones: 0,
        }
    }

    /// Direct hash of this position. Side-to-move is not folded in; it
    /// travels separately in the store's compound key.
    #[inline(always)]
    pub fn hash(&self) -> u64 {
        self.hash
    }

    #[inline(always)]
    pub fn total_stones(&self) -> u16 {
        self.stones
    }

    #[inline(always)]
    pub fn plane(&self, side: Side) -> &BitBoard {
        &self.planes[side as usize]
    }

    /// Union of both planes.
    #[inline(always)]
    pub fn occupied(&self) -> BitBoard {
        self.planes[0] | self.planes[1]
    }

    #[inline(always)]
    pub fn is_empty_cell(&self, x: u8, y: u8) -> bool {
        !self.planes[0].get(x, y) && !self.planes[1].get(x, y)
    }

    #[inline(always)]
    pub fn side_at(&self, x: u8, y: u8) -> Option<Side> {
        if self.planes[Side::Red as usize].get(x, y) {
            Some(Side::Red)
        } else if self.planes[Side::Blue as usize].get(x, y) {
            Some(Side::Blue)
        } else {
            None
        }
    }

    /// Place a stone, producing the successor board. The hash is the
    /// parent's XOR exactly one cell key.
    pub fn place(&self, x: u8, y: u8, side: Side) -> Result<Board, MoveError> {
        if x >= SIZE || y >= SIZE {
            return Err(MoveError::OutOfRange { x, y });
        }
        if !self.is_empty_cell(x, y) {
            return Err(MoveError::Occupied { x, y });
        }

        let mut planes = self.planes;
        planes[side as usize] = planes[side as usize].with_bit(x, y, true);

        Ok(Board {
            planes,
            hash: self.hash ^ zobrist_keys().cell(side, x, y),
            stones: self.stones + 1,
        })
    }

    /// True iff any stone lies within `margin` cells of a board edge.
    /// The canonicalizer suppresses symmetry reduction for such
    /// positions: the dihedral group is only an equivalence away from
    /// the edges.
    pub fn has_stone_near_edge(&self) -> bool {
        self.occupied().intersects(edge_margin_mask())
    }

    /// Occupied cells with their owners, row-major order.
    pub fn stones(&self) -> impl Iterator<Item = (u8, u8, Side)> + '_ {
        let red = self.planes[Side::Red as usize]
            .iter_ones()
            .map(|(x, y)| (x, y, Side::Red));
        let blue = self.planes[Side::Blue as usize]
            .iter_ones()
            .map(|(x, y)| (x, y, Side::Blue));
        red.chain(blue)
    }

    /// Empty cells, row-major order.
    pub fn empty_cells(&self) -> impl Iterator<Item = (u8, u8)> + '_ {
        (!self.occupied()).iter_ones()
    }

    /// Full recompute from the planes. Must match the cached hash at
    /// all times; used by debug assertions and tests.
    pub fn compute_hash_full(&self) -> u64 {
        let keys = zobrist_keys();
        let mut h = keys.initial;
        for (x, y, side) in self.stones() {
            h ^= keys.cell(side, x, y);
        }
        h
    }

    /// Validate the plane invariant: no cell belongs to both players,
    /// and the stone counter matches the planes.
    pub fn validate(&self) -> Result<(), String> {
        if self.planes[0].intersects(&self.planes[1]) {
            return Err("red and blue planes overlap".to_string());
        }
        let pop = self.occupied().popcount();
        if pop != self.stones as u32 {
            return Err(format!("stone counter {} != popcount {}", self.stones, pop));
        }
        Ok(())
    }

    #[cfg(debug_assertions)]
    #[inline]
    pub fn assert_hash(&self) {
        let full = self.compute_hash_full();
        debug_assert_eq!(
            self.hash, full,
            "hash parity mismatch: cached={:#018x}, full={:#018x}",
            self.hash, full
        );
    }
}

impl Default for Board {
    fn default() -> Self {
        Board::empty()
    }
}

impl fmt::Debug for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Board(stones={}, hash={:#018x})", self.stones, self.hash)?;
        for y in 0..SIZE {
            for x in 0..SIZE {
                let c = match self.side_at(x, y) {
                    Some(Side::Red) => 'r',
                    Some(Side::Blue) => 'b',
                    None => '.',
                };
                write!(f, "{c}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
