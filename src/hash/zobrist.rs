// src/hash/zobrist.rs

use crate::TOTAL_CELLS;
use crate::board::Side;
use once_cell::sync::OnceCell;
use rand::{RngCore, SeedableRng, rngs::StdRng};

/// Fixed process-independent seed. Book hashes are persisted, so the
/// tables must come out identical on every machine and every run;
/// a random seed would orphan every stored entry.
pub const ZOBRIST_SEED: u64 = 0x9E37_79B9_AAAC_5C87;

pub struct ZobristKeys {
    /// Per-cell key for red stones, indexed `y * 32 + x`.
    pub red: [u64; TOTAL_CELLS],
    /// Per-cell key for blue stones, indexed `y * 32 + x`.
    pub blue: [u64; TOTAL_CELLS],
    /// Starting constant: the direct hash of the empty board.
    pub initial: u64,
}

impl ZobristKeys {
    /// Build a table from an explicit seed. Production code goes through
    /// [`zobrist_keys`]; tests inject their own tables here.
    pub fn from_seed(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);

        #[inline]
        fn non_zero(r: &mut StdRng) -> u64 {
            // avoid zero keys to reduce degenerate collisions
            let mut v = r.next_u64();
            while v == 0 {
                v = r.next_u64();
            }
            v
        }

        let mut keys = ZobristKeys {
            red: [0u64; TOTAL_CELLS],
            blue: [0u64; TOTAL_CELLS],
            initial: 0,
        };

        for i in 0..TOTAL_CELLS {
            keys.red[i] = non_zero(&mut rng);
        }
        for i in 0..TOTAL_CELLS {
            keys.blue[i] = non_zero(&mut rng);
        }
        keys.initial = non_zero(&mut rng);

        keys
    }

    /// Key for one `(side, cell)` pair. Placing XORs this in, removing
    /// XORs it out again (XOR is its own inverse).
    #[inline(always)]
    pub fn cell(&self, side: Side, x: u8, y: u8) -> u64 {
        let idx = (y as usize) * 32 + (x as usize);
        match side {
            Side::Red => self.red[idx],
            Side::Blue => self.blue[idx],
        }
    }
}

/// Global keys, initialized on first use. Immutable for the rest of the
/// process lifetime.
pub fn zobrist_keys() -> &'static ZobristKeys {
    static KEYS: OnceCell<ZobristKeys> = OnceCell::new();
    KEYS.get_or_init(|| ZobristKeys::from_seed(ZOBRIST_SEED))
}
