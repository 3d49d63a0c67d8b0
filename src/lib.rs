pub mod bitboard;
pub mod board;
pub mod book;
pub mod generator;
pub mod hash;
#[cfg(feature = "cli")]
pub mod logger;
pub mod search;
pub mod symmetry;

/// Board edge length. Cells are addressed as `(x, y)` with `0 <= x, y < SIZE`.
pub const SIZE: u8 = 32;

/// Total number of cells on the board.
pub const TOTAL_CELLS: usize = (SIZE as usize) * (SIZE as usize);

/// Stones within this distance of an edge suppress symmetry reduction.
pub const EDGE_MARGIN: u8 = 2;

/// Deepest ply the book schema accounts for (per-ply statistics are
/// indexed 0..=MAX_PLY).
pub const MAX_PLY: u32 = 64;
