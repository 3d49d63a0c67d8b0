//! Default search adapter: fixed-depth alpha-beta over a stone
//! neighborhood, with per-call scratch so concurrent workers never
//! share mutable state.

use crate::SIZE;
use crate::board::{Board, Move, Side};
use crate::generator::CancelToken;
use crate::search::context::SearchContext;
use crate::search::eval::{FIVE_SCORE, has_five, has_winning_threat, static_eval};
use crate::search::tt::Bound;
use crate::search::{ScoredMove, SearchEngine};
use arrayvec::ArrayVec;
use tracing::trace;

const INF: i32 = i32::MAX / 2;
const WIN_SCORE: i32 = FIVE_SCORE;
/// Candidates live within this Chebyshev distance of an existing stone.
const NEIGHBORHOOD: u32 = 2;
/// Interior nodes expand at most this many pre-ordered moves.
const BRANCH_LIMIT: usize = 16;
/// Cancellation checkpoint granularity, in visited nodes.
const CANCEL_CHECK_MASK: u64 = 1023;

pub struct AlphaBeta {
    tt_size_mb: usize,
}

impl AlphaBeta {
    pub fn new(tt_size_mb: usize) -> Self {
        Self { tt_size_mb }
    }
}

impl Default for AlphaBeta {
    fn default() -> Self {
        Self::new(16)
    }
}

struct SearchState {
    nodes: u64,
    stopped: bool,
}

/// Empty cells within the neighborhood of the current stones, in
/// row-major order (the order is part of the adapter's determinism
/// contract). The empty board yields the single center opening.
pub fn candidate_cells(board: &Board) -> Vec<Move> {
    if board.total_stones() == 0 {
        return vec![Move::new(SIZE / 2, SIZE / 2)];
    }

    let occupied = board.occupied();
    let mut zone = occupied;
    for _ in 0..NEIGHBORHOOD {
        zone = zone
            | zone.shift_east()
            | zone.shift_west()
            | zone.shift_north()
            | zone.shift_south()
            | zone.shift_north_east()
            | zone.shift_north_west()
            | zone.shift_south_east()
            | zone.shift_south_west();
    }
    (zone & !occupied).iter_ones().map(|(x, y)| Move::new(x, y)).collect()
}

fn ordered_moves(
    board: &Board,
    ctx: &SearchContext,
    ply: usize,
    tt_move: Option<Move>,
) -> ArrayVec<Move, BRANCH_LIMIT> {
    let mut scored: Vec<(i32, Move)> = candidate_cells(board)
        .into_iter()
        .map(|mv| {
            let mut s = ctx.history_score(mv);
            if Some(mv) == tt_move {
                s += 1_000_000;
            } else if ctx.is_killer(ply, mv) {
                s += 100_000;
            }
            // cheap centrality bias keeps the opening search focused
            let cx = (mv.x as i32 - SIZE as i32 / 2).abs();
            let cy = (mv.y as i32 - SIZE as i32 / 2).abs();
            s -= (cx + cy) * 2;
            (s, mv)
        })
        .collect();
    // stable sort keeps the row-major order on equal scores
    scored.sort_by(|a, b| b.0.cmp(&a.0));

    scored
        .into_iter()
        .take(BRANCH_LIMIT)
        .map(|(_, mv)| mv)
        .collect()
}

#[allow(clippy::too_many_arguments)]
fn negamax(
    board: &Board,
    side: Side,
    depth: u32,
    ply: usize,
    mut alpha: i32,
    beta: i32,
    ctx: &mut SearchContext,
    state: &mut SearchState,
    cancel: &CancelToken,
) -> i32 {
    state.nodes += 1;
    if state.nodes & CANCEL_CHECK_MASK == 0 && cancel.is_cancelled() {
        state.stopped = true;
    }
    if state.stopped {
        return static_eval(board, side);
    }

    // the previous placement may have completed a five
    if has_five(board.plane(side.opposite())) {
        return -(WIN_SCORE - ply as i32);
    }
    if depth == 0 || board.total_stones() as usize >= crate::TOTAL_CELLS {
        return static_eval(board, side);
    }

    let key = board.hash();
    let mut tt_move = None;
    if let Some((best, score, tt_depth, bound)) = ctx.tt.probe(key) {
        tt_move = best;
        if tt_depth as u32 >= depth {
            let usable = match bound {
                b if b == Bound::Exact as u8 => true,
                b if b == Bound::Lower as u8 => score >= beta,
                b if b == Bound::Upper as u8 => score <= alpha,
                _ => false,
            };
            if usable {
                return score;
            }
        }
    }

    let moves = ordered_moves(board, ctx, ply, tt_move);
    if moves.is_empty() {
        return static_eval(board, side);
    }

    let mut best_score = -INF;
    let mut best_move = None;
    let alpha_orig = alpha;

    for mv in moves {
        let Ok(child) = board.place(mv.x, mv.y, side) else {
            continue; // candidates are generated from empty cells; unreachable
        };

        let score = if has_five(child.plane(side)) {
            WIN_SCORE - ply as i32
        } else {
            -negamax(
                &child,
                side.opposite(),
                depth - 1,
                ply + 1,
                -beta,
                -alpha,
                ctx,
                state,
                cancel,
            )
        };

        if score > best_score {
            best_score = score;
            best_move = Some(mv);
        }
        if score > alpha {
            alpha = score;
        }
        if alpha >= beta {
            ctx.update_killer(ply, mv);
            ctx.update_history(mv, depth as i32);
            break;
        }
    }

    if !state.stopped {
        let bound = if best_score <= alpha_orig {
            Bound::Upper
        } else if best_score >= beta {
            Bound::Lower
        } else {
            Bound::Exact
        };
        ctx.tt
            .save(key, best_move, best_score, depth.min(255) as u8, bound as u8);
    }

    best_score
}

impl SearchEngine for AlphaBeta {
    fn rank_moves(
        &self,
        board: &Board,
        side: Side,
        target_depth: u32,
        cancel: &CancelToken,
    ) -> Vec<ScoredMove> {
        let mut ctx = SearchContext::new(self.tt_size_mb);
        let mut ranked = Vec::new();

        for mv in candidate_cells(board) {
            if cancel.is_cancelled() {
                break;
            }
            let Ok(child) = board.place(mv.x, mv.y, side) else {
                continue;
            };

            let mut state = SearchState {
                nodes: 1,
                stopped: false,
            };
            let score = if has_five(child.plane(side)) {
                WIN_SCORE
            } else if target_depth == 0 {
                static_eval(&child, side)
            } else {
                -negamax(
                    &child,
                    side.opposite(),
                    target_depth - 1,
                    1,
                    -INF,
                    INF,
                    &mut ctx,
                    &mut state,
                    cancel,
                )
            };

            ranked.push(ScoredMove {
                mv,
                score,
                nodes: state.nodes,
                depth_reached: if state.stopped { 0 } else { target_depth },
                is_forcing: has_winning_threat(&child, side),
            });
        }

        // best first; row-major tiebreak keeps runs reproducible
        ranked.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| (a.mv.y, a.mv.x).cmp(&(b.mv.y, b.mv.x)))
        });
        trace!(
            stones = board.total_stones(),
            candidates = ranked.len(),
            "ranked position"
        );
        ranked
    }
}
