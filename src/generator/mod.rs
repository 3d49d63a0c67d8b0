//! Opening-book generation pipeline.
//!
//! Breadth-first over plies: each ply's frontier is canonicalized and
//! deduplicated, the surviving positions are scored in parallel by the
//! search adapter, the beam's top moves become both a stored entry and
//! the next frontier. Entries travel through a bounded channel to a
//! single writer that commits batches; a drain barrier between plies
//! guarantees the resume check at ply d+1 sees every ply-d entry.

pub mod cancel;
pub mod progress;
mod writer;

pub use cancel::CancelToken;
pub use progress::{Progress, ProgressSnapshot};

use crate::board::{Board, Move, Side};
use crate::book::{BookEntry, BookKey, BookMove, BookStore, StoreError};
use crate::hash::zobrist::zobrist_keys;
use crate::search::{ScoredMove, SearchEngine};
use crate::symmetry::{Canonical, canonicalize, transformed_hash};
use chrono::Utc;
use crossbeam_channel::Sender;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use writer::{ErrorSlot, WriterConfig, WriterMsg, run_writer};

/// One rung of a tapered beam: keep `keep` moves up to and including
/// `max_ply`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeamStage {
    pub max_ply: u32,
    pub keep: usize,
}

/// How many candidate moves survive per position at each ply. This is
/// an input policy; nothing in the pipeline assumes a particular
/// shape beyond "at least one move per position".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeamSchedule {
    Flat(usize),
    /// Stages in ascending `max_ply` order; plies beyond the last
    /// stage keep a single move.
    Tapered(Vec<BeamStage>),
}

impl BeamSchedule {
    /// The conventional 4-3-2-1 taper.
    pub fn default_taper() -> Self {
        BeamSchedule::Tapered(vec![
            BeamStage { max_ply: 14, keep: 4 },
            BeamStage { max_ply: 24, keep: 3 },
            BeamStage { max_ply: 32, keep: 2 },
        ])
    }

    pub fn keep_for(&self, ply: u32) -> usize {
        match self {
            BeamSchedule::Flat(k) => (*k).max(1),
            BeamSchedule::Tapered(stages) => stages
                .iter()
                .find(|s| ply <= s.max_ply)
                .map(|s| s.keep.max(1))
                .unwrap_or(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Expand positions up to and including this ply.
    pub max_ply: u32,
    /// Depth budget handed to the search adapter per position.
    pub search_depth: u32,
    pub beam: BeamSchedule,
    /// Outer worker count; 0 means one per logical CPU. The default
    /// adapter searches single-threaded, so outer workers times one
    /// inner thread stays within the machine.
    pub workers: usize,
    /// Bounded entry-channel capacity; the transient memory ceiling.
    pub channel_capacity: usize,
    pub batch_size: usize,
    pub flush_interval: Duration,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            max_ply: 8,
            search_depth: 4,
            beam: BeamSchedule::default_taper(),
            workers: 0,
            channel_capacity: 1000,
            batch_size: 50,
            flush_interval: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error("book store failure: {0}")]
    Store(#[from] StoreError),
}

/// Final tallies of one run. Partial on cancellation.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationResult {
    pub positions_generated: u64,
    pub positions_verified: u64,
    pub positions_skipped: u64,
    pub moves_stored: u64,
    pub elapsed: Duration,
    pub cancelled: bool,
}

struct Task {
    board: Board,
    canonical: Canonical,
    direct_hash: u64,
}

pub struct Generator<'a> {
    config: GeneratorConfig,
    store: &'a BookStore,
    engine: &'a dyn SearchEngine,
    progress: Arc<Progress>,
}

impl<'a> Generator<'a> {
    pub fn new(
        config: GeneratorConfig,
        store: &'a BookStore,
        engine: &'a dyn SearchEngine,
    ) -> Self {
        let progress = Arc::new(Progress::new(config.max_ply));
        Self {
            config,
            store,
            engine,
            progress,
        }
    }

    /// Shared handle for progress pollers (the CLI's bar thread).
    pub fn progress(&self) -> Arc<Progress> {
        Arc::clone(&self.progress)
    }

    fn worker_count(&self) -> usize {
        if self.config.workers == 0 {
            num_cpus::get().max(1)
        } else {
            self.config.workers
        }
    }

    /// Run the full expansion. Cancellation is a success path: the
    /// writer drains, the store keeps everything committed, and the
    /// partial tallies come back with `cancelled` set.
    pub fn run(&self, cancel: &CancelToken) -> Result<GenerationResult, GenerateError> {
        let started = Instant::now();
        if cancel.is_cancelled() {
            // cancel-before-start: the store is not touched at all
            return Ok(self.result(started, true));
        }

        self.store.set_metadata("Version", env!("CARGO_PKG_VERSION"))?;
        self.store
            .set_metadata("GeneratedAt", &Utc::now().to_rfc3339())?;

        let errors = ErrorSlot::default();
        let (entry_tx, entry_rx) = crossbeam_channel::bounded(self.config.channel_capacity.max(1));

        std::thread::scope(|scope| {
            let writer_config = WriterConfig {
                batch_size: self.config.batch_size.max(1),
                flush_interval: self.config.flush_interval,
            };
            let progress = &*self.progress;
            let errors_ref = &errors;
            let store = self.store;
            scope.spawn(move || run_writer(store, entry_rx, writer_config, progress, errors_ref));

            let mut frontier = vec![Board::empty()];
            for ply in 0..=self.config.max_ply {
                if cancel.is_cancelled() || errors.is_set() || frontier.is_empty() {
                    break;
                }
                let side = Side::to_move_at_ply(ply);
                let (tasks, mut next_frontier) = self.dedup_ply(frontier, side);
                self.progress.begin_ply(ply, tasks.len());
                info!(
                    ply,
                    positions = tasks.len(),
                    resumed_successors = next_frontier.len(),
                    "expanding ply"
                );

                let kept = self.evaluate_ply(&tasks, side, ply, &entry_tx, cancel, &errors);

                // ply barrier: everything of this ply must be durable
                // before the next ply's resume checks run
                let (ack_tx, ack_rx) = crossbeam_channel::bounded(1);
                if entry_tx.send(WriterMsg::Drain(ack_tx)).is_ok() {
                    let _ = ack_rx.recv();
                }

                for children in kept {
                    next_frontier.extend(children);
                }
                frontier = next_frontier;
                debug!(ply, next = frontier.len(), "ply complete");
            }

            drop(entry_tx); // closes the channel; the writer drains and exits
        });

        if let Some(err) = errors.take() {
            return Err(err.into());
        }
        Ok(self.result(started, cancel.is_cancelled()))
    }

    /// Canonical dedup of one frontier. Returns the positions still
    /// needing evaluation plus successors rebuilt from already-stored
    /// entries (resume hits reuse their persisted move lists instead
    /// of re-searching).
    fn dedup_ply(&self, frontier: Vec<Board>, side: Side) -> (Vec<Task>, Vec<Board>) {
        let keys = zobrist_keys();
        let mut seen: HashSet<BookKey> = HashSet::with_capacity(frontier.len());
        let mut tasks = Vec::new();
        let mut resumed_children = Vec::new();

        for board in frontier {
            let canonical = canonicalize(&board);
            let direct_hash = transformed_hash(keys, &board, canonical.transform);
            let key = BookKey {
                canonical_hash: canonical.hash,
                direct_hash,
                side_to_move: side,
            };
            if !seen.insert(key) {
                continue;
            }

            if let Some(entry) = self.store.get(key.canonical_hash, key.direct_hash, side) {
                self.progress.position_skipped();
                let inv = canonical.transform.inverse();
                for stored in &entry.moves {
                    let mv = inv.apply(Move::new(stored.rel_x, stored.rel_y));
                    match board.place(mv.x, mv.y, side) {
                        Ok(child) => resumed_children.push(child),
                        Err(err) => warn!(%err, "stored move no longer legal; dropping"),
                    }
                }
                continue;
            }

            tasks.push(Task {
                board,
                canonical,
                direct_hash,
            });
        }
        (tasks, resumed_children)
    }

    /// Fan one ply's tasks across the worker pool. Returns each task's
    /// kept successors, in task order, so the next frontier is
    /// deterministic regardless of worker scheduling.
    fn evaluate_ply(
        &self,
        tasks: &[Task],
        side: Side,
        ply: u32,
        entry_tx: &Sender<WriterMsg>,
        cancel: &CancelToken,
        errors: &ErrorSlot,
    ) -> Vec<Vec<Board>> {
        let cursor = AtomicUsize::new(0);
        let kept: Vec<Mutex<Vec<Board>>> =
            (0..tasks.len()).map(|_| Mutex::new(Vec::new())).collect();
        let workers = self.worker_count().min(tasks.len().max(1));

        std::thread::scope(|scope| {
            for _ in 0..workers {
                let tx = entry_tx.clone();
                let cursor = &cursor;
                let kept = &kept;
                scope.spawn(move || {
                    self.worker_loop(tasks, cursor, kept, side, ply, tx, cancel, errors)
                });
            }
        });

        kept.into_iter()
            .map(|m| m.into_inner().unwrap())
            .collect()
    }

    #[allow(clippy::too_many_arguments)]
    fn worker_loop(
        &self,
        tasks: &[Task],
        cursor: &AtomicUsize,
        kept: &[Mutex<Vec<Board>>],
        side: Side,
        ply: u32,
        tx: Sender<WriterMsg>,
        cancel: &CancelToken,
        errors: &ErrorSlot,
    ) {
        loop {
            // checkpoint: no new tasks once cancelled or failed
            if cancel.is_cancelled() || errors.is_set() {
                return;
            }
            let i = cursor.fetch_add(1, Ordering::Relaxed);
            if i >= tasks.len() {
                return;
            }
            let task = &tasks[i];

            let ranked =
                self.engine
                    .rank_moves(&task.board, side, self.config.search_depth, cancel);
            self.progress
                .nodes(ranked.iter().map(|m| m.nodes).sum());

            if ranked.is_empty() {
                if cancel.is_cancelled() {
                    return;
                }
                // adapter failure: skip this position, keep going
                warn!(ply, "search adapter produced no candidates; skipping position");
                self.progress.early_exit();
                self.progress.position_evaluated();
                continue;
            }

            let keep = self.config.beam.keep_for(ply);
            let top = &ranked[..keep.min(ranked.len())];
            self.progress
                .candidates(ranked.len() as u64, (ranked.len() - top.len()) as u64);

            let entry = self.build_entry(task, side, ply, top);
            if entry.moves.iter().all(|m| m.is_verified) {
                self.progress.position_verified();
            }

            let mut children = Vec::with_capacity(top.len());
            for scored in top {
                match task.board.place(scored.mv.x, scored.mv.y, side) {
                    Ok(child) => children.push(child),
                    // candidates come from empty cells; anything else
                    // is an adapter bug worth hearing about
                    Err(err) => warn!(%err, "adapter ranked an illegal move; dropping"),
                }
            }
            *kept[i].lock().unwrap() = children;
            self.progress.position_evaluated();

            // blocking send is the intended backpressure; an error
            // means the writer is gone and the run is ending anyway
            if tx.send(WriterMsg::Entry(entry)).is_err() {
                return;
            }
        }
    }

    /// Assemble the stored entry, rewriting each kept move into the
    /// canonical frame via the chosen transform.
    fn build_entry(&self, task: &Task, side: Side, ply: u32, top: &[ScoredMove]) -> BookEntry {
        let moves = top
            .iter()
            .enumerate()
            .map(|(rank, scored)| {
                let image = task.canonical.transform.apply(scored.mv);
                BookMove {
                    rel_x: image.x,
                    rel_y: image.y,
                    win_rate: win_rate_from_score(scored.score),
                    depth_achieved: scored.depth_reached,
                    nodes_searched: scored.nodes,
                    score: scored.score,
                    is_forcing: scored.is_forcing,
                    priority: (top.len() - rank) as u32,
                    is_verified: scored.depth_reached >= self.config.search_depth,
                }
            })
            .collect();

        BookEntry {
            canonical_hash: task.canonical.hash,
            direct_hash: task.direct_hash,
            depth: ply,
            side_to_move: side,
            symmetry: task.canonical.transform,
            is_near_edge: task.canonical.is_near_edge,
            moves,
            created_at: Utc::now().to_rfc3339(),
        }
    }

    fn result(&self, started: Instant, cancelled: bool) -> GenerationResult {
        let snap = self.progress.snapshot();
        GenerationResult {
            positions_generated: snap.positions_evaluated,
            positions_verified: snap.positions_verified,
            positions_skipped: snap.positions_skipped,
            moves_stored: snap.moves_stored,
            elapsed: started.elapsed(),
            cancelled,
        }
    }
}

/// Centi-unit score to a 0..=100 win percentage. Integer arithmetic
/// so every platform maps identically; saturates at the ends.
fn win_rate_from_score(score: i32) -> u8 {
    (50 + (score / 400).clamp(-50, 50)) as u8
}
