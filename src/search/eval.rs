//! Static evaluation by line patterns.
//!
//! Runs are detected with the chain trick: AND-ing a plane with its
//! own directional shift `n-1` times leaves one marker bit at the
//! forward end of every n-in-a-row. Open ends are then tested by
//! shifting the empty mask onto the marker cells, so the whole
//! evaluation is a handful of word-parallel passes with no per-cell
//! scanning.

use crate::bitboard::BitBoard;
use crate::board::{Board, Side};

// --- Pattern weights (centi-units) ---
pub const FIVE_SCORE: i32 = 1_000_000;
const OPEN_FOUR: i32 = 60_000;
const SIMPLE_FOUR: i32 = 12_000;
const OPEN_THREE: i32 = 6_000;
const SIMPLE_THREE: i32 = 1_200;
const OPEN_TWO: i32 = 300;
const SIMPLE_TWO: i32 = 60;

type Shift = fn(&BitBoard) -> BitBoard;

// (forward, backward) shift per axis: E/W, S/N, SE/NW, SW/NE.
const AXES: [(Shift, Shift); 4] = [
    (BitBoard::shift_east, BitBoard::shift_west),
    (BitBoard::shift_south, BitBoard::shift_north),
    (BitBoard::shift_south_east, BitBoard::shift_north_west),
    (BitBoard::shift_south_west, BitBoard::shift_north_east),
];

/// Marker bits at the forward end of every `n`-run of `plane` along
/// `fwd`.
fn run_markers(plane: &BitBoard, fwd: Shift, n: u32) -> BitBoard {
    let mut m = *plane;
    for _ in 1..n {
        m = m & fwd(&m);
    }
    m
}

/// Apply `shift` `n` times.
fn shift_n(bb: &BitBoard, shift: Shift, n: u32) -> BitBoard {
    let mut out = *bb;
    for _ in 0..n {
        out = shift(&out);
    }
    out
}

/// True iff the plane contains five (or more) in a row in any of the
/// four axes.
pub fn has_five(plane: &BitBoard) -> bool {
    AXES.iter()
        .any(|&(fwd, _)| !run_markers(plane, fwd, 5).is_empty())
}

/// Counts of (open, half-or-closed) `n`-runs over all four axes.
/// A run is open when the cells immediately beyond both ends are
/// empty. Marker cells sit at the forward end, so the forward gap is
/// `bwd(empty)` and the backward gap is `empty` shifted forward `n`
/// times.
fn count_runs(plane: &BitBoard, empty: &BitBoard, n: u32) -> (u32, u32) {
    let mut open = 0;
    let mut rest = 0;
    for &(fwd, bwd) in AXES.iter() {
        let markers = run_markers(plane, fwd, n);
        if markers.is_empty() {
            continue;
        }
        let fwd_open = markers & bwd(empty);
        let bwd_open = markers & shift_n(empty, fwd, n);
        let both = (fwd_open & bwd_open).popcount();
        open += both;
        rest += markers.popcount() - both;
    }
    (open, rest)
}

fn side_score(plane: &BitBoard, empty: &BitBoard) -> i32 {
    if has_five(plane) {
        return FIVE_SCORE;
    }

    let (open4, rest4) = count_runs(plane, empty, 4);
    let (open3, rest3) = count_runs(plane, empty, 3);
    let (open2, rest2) = count_runs(plane, empty, 2);

    open4 as i32 * OPEN_FOUR
        + rest4 as i32 * SIMPLE_FOUR
        + open3 as i32 * OPEN_THREE
        + rest3 as i32 * SIMPLE_THREE
        + open2 as i32 * OPEN_TWO
        + rest2 as i32 * SIMPLE_TWO
}

/// Evaluation from `side`'s point of view. The opponent's threats
/// weigh slightly heavier: standing threats belong to the player who
/// moves next against us.
pub fn static_eval(board: &Board, side: Side) -> i32 {
    let empty = !board.occupied();
    let own = side_score(board.plane(side), &empty);
    let opp = side_score(board.plane(side.opposite()), &empty);
    own - (opp * 11) / 10
}

/// True when `side` has an unstoppable shape: a five, or a four with
/// both ends open.
pub fn has_winning_threat(board: &Board, side: Side) -> bool {
    let plane = board.plane(side);
    if has_five(plane) {
        return true;
    }
    let empty = !board.occupied();
    let (open4, _) = count_runs(plane, &empty, 4);
    open4 > 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row_of(side: Side, y: u8, xs: &[u8]) -> Board {
        let mut b = Board::empty();
        for &x in xs {
            b = b.place(x, y, side).unwrap();
        }
        b
    }

    #[test]
    fn five_in_a_row_is_detected_on_every_axis() {
        // horizontal
        let b = row_of(Side::Red, 16, &[10, 11, 12, 13, 14]);
        assert!(has_five(b.plane(Side::Red)));

        // vertical
        let mut b = Board::empty();
        for y in 8..13 {
            b = b.place(20, y, Side::Blue).unwrap();
        }
        assert!(has_five(b.plane(Side::Blue)));

        // both diagonals
        let mut b = Board::empty();
        for i in 0..5u8 {
            b = b.place(10 + i, 10 + i, Side::Red).unwrap();
        }
        assert!(has_five(b.plane(Side::Red)));

        let mut b = Board::empty();
        for i in 0..5u8 {
            b = b.place(10 + i, 20 - i, Side::Red).unwrap();
        }
        assert!(has_five(b.plane(Side::Red)));
    }

    #[test]
    fn four_is_not_five() {
        let b = row_of(Side::Red, 16, &[10, 11, 12, 13]);
        assert!(!has_five(b.plane(Side::Red)));
    }

    #[test]
    fn open_three_outscores_blocked_three() {
        let open = row_of(Side::Red, 16, &[10, 11, 12]);
        let mut blocked = row_of(Side::Red, 16, &[10, 11, 12]);
        blocked = blocked.place(13, 16, Side::Blue).unwrap();

        let open_score = static_eval(&open, Side::Red);
        let blocked_score = static_eval(&blocked, Side::Red);
        assert!(
            open_score > blocked_score,
            "open {open_score} should beat blocked {blocked_score}"
        );
    }

    #[test]
    fn open_four_counts_as_winning_threat() {
        let b = row_of(Side::Red, 16, &[10, 11, 12, 13]);
        assert!(has_winning_threat(&b, Side::Red));

        let mut capped = b.place(9, 16, Side::Blue).unwrap();
        capped = capped.place(14, 16, Side::Blue).unwrap();
        assert!(!has_winning_threat(&capped, Side::Red));
    }

    #[test]
    fn eval_is_symmetric_between_sides() {
        let b = Board::empty()
            .place(10, 10, Side::Red)
            .unwrap()
            .place(20, 20, Side::Blue)
            .unwrap();
        // mirrored material: each side sees the same picture
        assert_eq!(static_eval(&b, Side::Red), static_eval(&b, Side::Blue));
    }

    #[test]
    fn runs_at_board_edge_do_not_wrap() {
        // A "four" split across the row boundary must not register:
        // (30,5),(31,5),(0,6),(1,6) are not a line.
        let mut b = Board::empty();
        for &(x, y) in &[(30u8, 5u8), (31, 5), (0, 6), (1, 6)] {
            b = b.place(x, y, Side::Red).unwrap();
        }
        let empty = !b.occupied();
        let (open, rest) = count_runs(b.plane(Side::Red), &empty, 4);
        assert_eq!((open, rest), (0, 0));
        let (open3, rest3) = count_runs(b.plane(Side::Red), &empty, 3);
        assert_eq!((open3, rest3), (0, 0));
    }
}
