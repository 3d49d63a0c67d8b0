// tests/generator_tests.rs
use carobook::board::{Board, Move, Side};
use carobook::book::{BookKey, BookStore, OpenMode};
use carobook::generator::{
    BeamSchedule, CancelToken, Generator, GeneratorConfig,
};
use carobook::search::{ScoredMove, SearchEngine};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

/// Deterministic stand-in for the search adapter: prefers empty cells
/// by Manhattan distance to the center, then row-major. Identical
/// inputs always produce identical rankings, which is the contract
/// the pipeline's reproducibility tests lean on.
struct StubEngine {
    per_position: usize,
}

impl SearchEngine for StubEngine {
    fn rank_moves(
        &self,
        board: &Board,
        _side: Side,
        target_depth: u32,
        cancel: &CancelToken,
    ) -> Vec<ScoredMove> {
        if cancel.is_cancelled() {
            return Vec::new();
        }
        let mut cells: Vec<(u8, u8)> = board.empty_cells().collect();
        cells.sort_by_key(|&(x, y)| {
            let d = (x as i32 - 16).abs() + (y as i32 - 16).abs();
            (d, y, x)
        });
        cells
            .into_iter()
            .take(self.per_position)
            .enumerate()
            .map(|(rank, (x, y))| ScoredMove {
                mv: Move::new(x, y),
                score: 1_000 - rank as i32 * 100,
                nodes: 10,
                depth_reached: target_depth,
                is_forcing: false,
            })
            .collect()
    }
}

/// Wrapper that pulls the cancellation cord after a fixed number of
/// positions, giving tests a deterministic mid-run cancel.
struct CancelAfter {
    inner: StubEngine,
    token: CancelToken,
    budget: AtomicUsize,
}

impl SearchEngine for CancelAfter {
    fn rank_moves(
        &self,
        board: &Board,
        side: Side,
        target_depth: u32,
        cancel: &CancelToken,
    ) -> Vec<ScoredMove> {
        if self.budget.fetch_sub(1, Ordering::SeqCst) <= 1 {
            self.token.cancel();
        }
        self.inner.rank_moves(board, side, target_depth, cancel)
    }
}

fn config(max_ply: u32, beam: usize) -> GeneratorConfig {
    GeneratorConfig {
        max_ply,
        search_depth: 3,
        beam: BeamSchedule::Flat(beam),
        workers: 2,
        channel_capacity: 64,
        batch_size: 4,
        flush_interval: Duration::from_millis(50),
        ..GeneratorConfig::default()
    }
}

fn open_store(dir: &TempDir) -> BookStore {
    BookStore::open(dir.path().join("book.cbk"), OpenMode::ReadWrite).unwrap()
}

fn sorted_keys(store: &BookStore) -> Vec<BookKey> {
    let mut keys = store.keys();
    keys.sort_by_key(|k| (k.canonical_hash, k.direct_hash, k.side_to_move as u8));
    keys
}

// Ply 0 boundary: exactly one position, the empty board, holding the
// adapter's top-K.
#[test]
fn ply_zero_produces_exactly_the_root_entry() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let engine = StubEngine { per_position: 5 };

    let generator = Generator::new(config(0, 3), &store, &engine);
    let result = generator.run(&CancelToken::new()).unwrap();

    assert_eq!(result.positions_generated, 1);
    assert!(!result.cancelled);
    assert_eq!(store.len(), 1);

    let stats = store.statistics();
    assert_eq!(stats.per_ply[0], 1);
    assert_eq!(stats.max_depth, 0);

    let root = store.get_any(Board::empty().hash()).unwrap();
    assert_eq!(root.depth, 0);
    assert_eq!(root.side_to_move, Side::Red);
    assert!(!root.is_near_edge);
    // beam of 3 out of 5 ranked; the stub's best move is the center
    assert_eq!(root.moves.len(), 3);
    assert_eq!((root.moves[0].rel_x, root.moves[0].rel_y), (16, 16));
    assert_eq!(root.moves[0].priority, 3);
    assert_eq!(root.moves[2].priority, 1);
    assert!(root.moves.iter().all(|m| m.is_verified));
}

// Ply 1 boundary: positions come from the moves actually kept at ply
// 0 (not all 1024 cells), collapsed by symmetry.
#[test]
fn ply_one_expands_only_chosen_moves_modulo_symmetry() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let engine = StubEngine { per_position: 5 };

    let generator = Generator::new(config(1, 3), &store, &engine);
    generator.run(&CancelToken::new()).unwrap();

    let stats = store.statistics();
    assert_eq!(stats.per_ply[0], 1);
    // kept root moves are (16,16), (16,15), (15,16); the four center
    // cells form one orbit of the dihedral group, so all three
    // successors collapse into a single ply-1 class
    assert_eq!(stats.per_ply[1], 1);
    assert_eq!(store.len(), 2);
}

// Identical inputs and a deterministic adapter give byte-identical
// books modulo created_at.
#[test]
fn generation_is_deterministic_across_runs() {
    let run = || {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let engine = StubEngine { per_position: 4 };
        let generator = Generator::new(config(3, 2), &store, &engine);
        generator.run(&CancelToken::new()).unwrap();
        let mut entries: Vec<_> = sorted_keys(&store)
            .into_iter()
            .map(|k| {
                let mut e = store
                    .get(k.canonical_hash, k.direct_hash, k.side_to_move)
                    .unwrap();
                e.created_at = String::new(); // timestamps may differ
                e
            })
            .collect();
        entries.sort_by_key(|e| (e.canonical_hash, e.direct_hash, e.side_to_move as u8));
        entries
    };

    let first = run();
    let second = run();
    assert!(!first.is_empty());
    assert_eq!(first, second);
}

// Cancel before the first position: nothing is written, not even
// metadata.
#[test]
fn cancel_before_start_leaves_the_store_untouched() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let engine = StubEngine { per_position: 4 };
    let generator = Generator::new(config(4, 2), &store, &engine);

    let cancel = CancelToken::new();
    cancel.cancel();
    let result = generator.run(&cancel).unwrap();

    assert!(result.cancelled);
    assert_eq!(result.positions_generated, 0);
    assert!(store.is_empty());
    assert!(store.get_metadata("GeneratedAt").is_none());
}

// A cancelled run keeps its committed prefix; rerunning to completion
// never regresses and lands on the uninterrupted result.
#[test]
fn cancelled_run_resumes_without_losing_or_redoing_work() {
    // reference: what an uninterrupted run produces
    let reference_dir = TempDir::new().unwrap();
    let reference_store = open_store(&reference_dir);
    {
        let engine = StubEngine { per_position: 4 };
        let generator = Generator::new(config(2, 2), &reference_store, &engine);
        generator.run(&CancelToken::new()).unwrap();
    }
    let reference_keys = sorted_keys(&reference_store);
    assert!(!reference_keys.is_empty());

    // run that cancels itself partway through
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let token = CancelToken::new();
    let engine = CancelAfter {
        inner: StubEngine { per_position: 4 },
        token: token.clone(),
        budget: AtomicUsize::new(2),
    };
    let generator = Generator::new(config(2, 2), &store, &engine);
    let partial = generator.run(&token).unwrap();
    assert!(partial.cancelled);
    let partial_keys = sorted_keys(&store);
    assert!(
        partial_keys.len() < reference_keys.len(),
        "cancellation should leave a strict prefix of the work"
    );
    for key in &partial_keys {
        assert!(reference_keys.contains(key), "partial key set must be a subset");
    }

    // resume on the same store with a fresh token
    let engine = StubEngine { per_position: 4 };
    let generator = Generator::new(config(2, 2), &store, &engine);
    let resumed = generator.run(&CancelToken::new()).unwrap();
    assert!(!resumed.cancelled);
    assert!(resumed.positions_skipped > 0, "resume must reuse stored entries");

    let final_keys = sorted_keys(&store);
    for key in &partial_keys {
        assert!(final_keys.contains(key), "restart must never regress");
    }
    assert_eq!(final_keys, reference_keys, "resume converges to the full run");
}

#[test]
fn result_counters_match_the_store() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let engine = StubEngine { per_position: 6 };
    let generator = Generator::new(config(2, 3), &store, &engine);
    let result = generator.run(&CancelToken::new()).unwrap();

    assert_eq!(result.positions_generated, store.len() as u64);
    assert_eq!(result.moves_stored, store.statistics().total_moves);
    // the stub always reaches the target depth
    assert_eq!(result.positions_verified, result.positions_generated);
    assert_eq!(result.positions_skipped, 0);
    assert!(store.get_metadata("Version").is_some());
    assert!(store.get_metadata("GeneratedAt").is_some());
}

#[test]
fn generator_requires_a_writable_store() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("book.cbk");
    {
        let store = BookStore::open(&path, OpenMode::ReadWrite).unwrap();
        store.put_batch(&[]).unwrap();
    }
    let ro = BookStore::open(&path, OpenMode::ReadOnly).unwrap();
    let engine = StubEngine { per_position: 2 };
    let generator = Generator::new(config(1, 1), &ro, &engine);
    let err = generator.run(&CancelToken::new());
    assert!(err.is_err(), "read-only store must fail the run up front");
}
