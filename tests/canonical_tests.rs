// tests/canonical_tests.rs
use carobook::board::{Board, Move, Side};
use carobook::hash::zobrist::{ZobristKeys, zobrist_keys};
use carobook::symmetry::{
    ALL_TRANSFORMS, Transform, canonicalize, canonicalize_with, transformed_hash,
};

fn transform_board(board: &Board, t: Transform) -> Board {
    let mut out = Board::empty();
    for (x, y, side) in board.stones() {
        let (tx, ty) = t.apply_xy(x, y);
        out = out.place(tx, ty, side).unwrap();
    }
    out
}

fn interior_position() -> Board {
    Board::empty()
        .place(12, 14, Side::Red)
        .unwrap()
        .place(15, 13, Side::Blue)
        .unwrap()
        .place(13, 17, Side::Red)
        .unwrap()
        .place(18, 16, Side::Blue)
        .unwrap()
}

// Center placement canonicalizes without edge suppression, and the
// canonical hash is the minimum over all eight images.
#[test]
fn center_placement_takes_the_minimum_image() {
    let board = Board::empty().place(16, 16, Side::Red).unwrap();
    let keys = zobrist_keys();
    let canon = canonicalize(&board);

    assert!(!canon.is_near_edge);
    let min = ALL_TRANSFORMS
        .iter()
        .map(|&t| transformed_hash(keys, &board, t))
        .min()
        .unwrap();
    assert_eq!(canon.hash, min);
    assert_eq!(
        transformed_hash(keys, &board, canon.transform),
        canon.hash,
        "chosen transform must produce the minimum"
    );
}

// A corner stone suppresses reduction entirely.
#[test]
fn edge_stone_suppresses_canonicalization() {
    let board = Board::empty().place(0, 0, Side::Red).unwrap();
    let canon = canonicalize(&board);
    assert!(canon.is_near_edge);
    assert_eq!(canon.transform, Transform::Identity);
    assert_eq!(canon.hash, board.hash());
}

#[test]
fn margin_boundary_is_exactly_two_cells() {
    // x == 2 is the first interior column
    let inside = Board::empty().place(2, 16, Side::Red).unwrap();
    assert!(!canonicalize(&inside).is_near_edge);

    let outside = Board::empty().place(1, 16, Side::Red).unwrap();
    assert!(canonicalize(&outside).is_near_edge);

    // x == 29 is the last interior column
    let inside = Board::empty().place(29, 16, Side::Red).unwrap();
    assert!(!canonicalize(&inside).is_near_edge);

    let outside = Board::empty().place(30, 16, Side::Red).unwrap();
    assert!(canonicalize(&outside).is_near_edge);
}

// Every dihedral image of a non-edge board canonicalizes to the same
// hash.
#[test]
fn eight_image_equivalence() {
    let board = interior_position();
    assert!(!board.has_stone_near_edge());
    let expected = canonicalize(&board).hash;

    for t in ALL_TRANSFORMS {
        let image = transform_board(&board, t);
        let canon = canonicalize(&image);
        assert_eq!(canon.hash, expected, "image under {t:?} diverged");
        assert!(!canon.is_near_edge);
    }
}

// When several images produce the same minimum hash, the lowest
// transform ordinal must win the tie.
#[test]
fn ties_break_on_the_lowest_ordinal() {
    // a position symmetric under the full group: every image is the
    // same stone set, so all eight hashes are equal
    let mut board = Board::empty();
    for &(x, y) in &[(15u8, 15u8), (16, 15), (15, 16), (16, 16)] {
        board = board.place(x, y, Side::Red).unwrap();
    }
    let canon = canonicalize(&board);
    assert_eq!(canon.transform, Transform::Identity);
}

#[test]
fn canonicalize_with_injected_tables_is_self_consistent() {
    let keys = ZobristKeys::from_seed(99);
    let board = interior_position();
    let canon = canonicalize_with(&keys, &board);

    for t in ALL_TRANSFORMS {
        let image = transform_board(&board, t);
        assert_eq!(canonicalize_with(&keys, &image).hash, canon.hash);
    }
    // different tables generally choose a different representative
    let default_canon = canonicalize(&board);
    assert_ne!(canon.hash, default_canon.hash);
}

// A move stored in the canonical frame must come back to the same
// board cell through the inverse transform.
#[test]
fn move_round_trips_through_the_chosen_transform() {
    let board = interior_position();
    let canon = canonicalize(&board);

    for &(x, y) in &[(11u8, 14u8), (16, 16), (20, 9)] {
        let mv = Move::new(x, y);
        let stored = canon.transform.apply(mv);
        let recovered = canon.transform.inverse().apply(stored);
        assert_eq!(recovered, mv);
    }
}

#[test]
fn composition_is_closed_and_associative_on_samples() {
    for a in ALL_TRANSFORMS {
        for b in ALL_TRANSFORMS {
            for c in ALL_TRANSFORMS {
                let left = a.compose(b).compose(c);
                let right = a.compose(b.compose(c));
                assert_eq!(left, right, "({a:?}.{b:?}).{c:?} != {a:?}.({b:?}.{c:?})");
            }
        }
    }
}
