use crate::SIZE;
use crate::board::Side;
use crate::symmetry::Transform;
use serde::{Deserialize, Serialize};

/// One ranked candidate, stored in the canonical frame. The consumer
/// maps `(rel_x, rel_y)` back to board coordinates with the inverse of
/// the entry's transform.
///
/// Serialized as JSON inside the store's moves blob; unknown fields are
/// ignored and missing ones default, so old readers survive new
/// writers and vice versa.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookMove {
    pub rel_x: u8,
    pub rel_y: u8,
    /// 0..=100.
    #[serde(default)]
    pub win_rate: u8,
    /// Plies the search actually reached for this move.
    #[serde(default)]
    pub depth_achieved: u32,
    #[serde(default)]
    pub nodes_searched: u64,
    /// Signed centi-unit evaluation.
    #[serde(default)]
    pub score: i32,
    #[serde(default)]
    pub is_forcing: bool,
    /// Higher is preferred; assigned from the rank order.
    #[serde(default)]
    pub priority: u32,
    #[serde(default)]
    pub is_verified: bool,
}

/// Compound primary key: the canonical bucket plus the direct hash of
/// the canonical frame plus the mover. The direct hash distinguishes
/// positions that fall into the same canonical bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BookKey {
    pub canonical_hash: u64,
    pub direct_hash: u64,
    pub side_to_move: Side,
}

/// One persisted position with its ranked move list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookEntry {
    pub canonical_hash: u64,
    pub direct_hash: u64,
    /// Ply at which the position occurs; 0 is the empty board.
    pub depth: u32,
    pub side_to_move: Side,
    /// Transform that produced the canonical frame.
    pub symmetry: Transform,
    /// True iff symmetry reduction was suppressed.
    pub is_near_edge: bool,
    /// Non-empty, ordered best-first.
    pub moves: Vec<BookMove>,
    /// RFC 3339; informational only, excluded from equality of runs.
    pub created_at: String,
}

impl BookEntry {
    #[inline(always)]
    pub fn key(&self) -> BookKey {
        BookKey {
            canonical_hash: self.canonical_hash,
            direct_hash: self.direct_hash,
            side_to_move: self.side_to_move,
        }
    }

    /// Structural validation applied before anything is written. A
    /// batch containing one invalid entry is rejected whole.
    pub fn validate(&self) -> Result<(), String> {
        if self.moves.is_empty() {
            return Err(format!(
                "entry {:#018x}/{:#018x} has an empty move list",
                self.canonical_hash, self.direct_hash
            ));
        }
        for mv in &self.moves {
            if mv.rel_x >= SIZE || mv.rel_y >= SIZE {
                return Err(format!(
                    "move ({},{}) outside the {SIZE}x{SIZE} board",
                    mv.rel_x, mv.rel_y
                ));
            }
            if mv.win_rate > 100 {
                return Err(format!("win_rate {} exceeds 100", mv.win_rate));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_move() -> BookMove {
        BookMove {
            rel_x: 16,
            rel_y: 16,
            win_rate: 55,
            depth_achieved: 6,
            nodes_searched: 12_345,
            score: 120,
            is_forcing: false,
            priority: 4,
            is_verified: true,
        }
    }

    fn sample_entry() -> BookEntry {
        BookEntry {
            canonical_hash: 0xABCD,
            direct_hash: 0xABCD,
            depth: 0,
            side_to_move: Side::Red,
            symmetry: Transform::Identity,
            is_near_edge: false,
            moves: vec![sample_move()],
            created_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn validate_accepts_well_formed_entry() {
        sample_entry().validate().unwrap();
    }

    #[test]
    fn validate_rejects_empty_moves() {
        let mut e = sample_entry();
        e.moves.clear();
        assert!(e.validate().is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_move() {
        let mut e = sample_entry();
        e.moves[0].rel_x = 32;
        assert!(e.validate().is_err());
    }

    #[test]
    fn validate_rejects_win_rate_above_100() {
        let mut e = sample_entry();
        e.moves[0].win_rate = 101;
        assert!(e.validate().is_err());
    }

    #[test]
    fn moves_blob_tolerates_unknown_fields() {
        // a future writer may add fields; this reader must not choke
        let blob = r#"[{"rel_x":3,"rel_y":4,"win_rate":50,"novel_field":true}]"#;
        let moves: Vec<BookMove> = serde_json::from_str(blob).unwrap();
        assert_eq!(moves.len(), 1);
        assert_eq!((moves[0].rel_x, moves[0].rel_y), (3, 4));
        assert_eq!(moves[0].win_rate, 50);
        // omitted fields take their defaults
        assert_eq!(moves[0].priority, 0);
        assert!(!moves[0].is_forcing);
    }
}
