pub mod context;
pub mod engine;
pub mod eval;
pub mod tt;

pub use engine::AlphaBeta;

use crate::board::{Board, Move, Side};
use crate::generator::CancelToken;

/// One ranked candidate as produced by the adapter, in board
/// coordinates (the generator rewrites into the canonical frame).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoredMove {
    pub mv: Move,
    /// Signed centi-unit evaluation from the mover's point of view.
    pub score: i32,
    pub nodes: u64,
    pub depth_reached: u32,
    pub is_forcing: bool,
}

/// The seam between the generator and whatever scores candidate moves.
///
/// Implementations return their candidates already sorted best-first
/// and must be deterministic for identical inputs; the pipeline treats
/// them as a black box, reranks by its own priority policy, and relies
/// on the cancellation token being honored within a bounded time.
pub trait SearchEngine: Send + Sync {
    fn rank_moves(
        &self,
        board: &Board,
        side: Side,
        target_depth: u32,
        cancel: &CancelToken,
    ) -> Vec<ScoredMove>;
}
