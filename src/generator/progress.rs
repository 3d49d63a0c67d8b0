use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Live counters for one generation run. Workers and the writer bump
/// these independently; readers get a consistent-enough snapshot for
/// display. Tearing between unrelated counters is acceptable: the
/// snapshot is diagnostic only and never feeds back into control flow.
pub struct Progress {
    max_ply: u32,
    started: Instant,
    current_ply: AtomicU64,
    ply_total: AtomicU64,
    ply_completed: AtomicU64,
    positions_evaluated: AtomicU64,
    positions_verified: AtomicU64,
    positions_stored: AtomicU64,
    positions_skipped: AtomicU64,
    moves_stored: AtomicU64,
    candidates_evaluated: AtomicU64,
    candidates_pruned: AtomicU64,
    early_exits: AtomicU64,
    nodes_searched: AtomicU64,
    buffer_len: AtomicU64,
    buffer_peak: AtomicU64,
    flushes: AtomicU64,
}

/// Point-in-time copy of the counters plus derived rates.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub current_ply: u32,
    pub ply_total: u64,
    pub ply_completed: u64,
    pub positions_evaluated: u64,
    pub positions_verified: u64,
    pub positions_stored: u64,
    pub positions_skipped: u64,
    pub moves_stored: u64,
    pub candidates_evaluated: u64,
    pub candidates_pruned: u64,
    pub early_exits: u64,
    pub nodes_searched: u64,
    pub buffer_len: u64,
    pub buffer_peak: u64,
    pub flushes: u64,
    pub positions_per_minute: f64,
    pub nodes_per_second: f64,
    pub percent_complete: f64,
}

impl Progress {
    pub fn new(max_ply: u32) -> Self {
        Self {
            max_ply,
            started: Instant::now(),
            current_ply: AtomicU64::new(0),
            ply_total: AtomicU64::new(0),
            ply_completed: AtomicU64::new(0),
            positions_evaluated: AtomicU64::new(0),
            positions_verified: AtomicU64::new(0),
            positions_stored: AtomicU64::new(0),
            positions_skipped: AtomicU64::new(0),
            moves_stored: AtomicU64::new(0),
            candidates_evaluated: AtomicU64::new(0),
            candidates_pruned: AtomicU64::new(0),
            early_exits: AtomicU64::new(0),
            nodes_searched: AtomicU64::new(0),
            buffer_len: AtomicU64::new(0),
            buffer_peak: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
        }
    }

    pub(crate) fn begin_ply(&self, ply: u32, total: usize) {
        self.current_ply.store(ply as u64, Ordering::Relaxed);
        self.ply_total.store(total as u64, Ordering::Relaxed);
        self.ply_completed.store(0, Ordering::Relaxed);
    }

    pub(crate) fn position_evaluated(&self) {
        self.positions_evaluated.fetch_add(1, Ordering::Relaxed);
        self.ply_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn position_skipped(&self) {
        self.positions_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn position_verified(&self) {
        self.positions_verified.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn positions_stored(&self, n: u64) {
        self.positions_stored.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn moves_stored(&self, n: u64) {
        self.moves_stored.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn candidates(&self, evaluated: u64, pruned: u64) {
        self.candidates_evaluated
            .fetch_add(evaluated, Ordering::Relaxed);
        self.candidates_pruned.fetch_add(pruned, Ordering::Relaxed);
    }

    pub(crate) fn early_exit(&self) {
        self.early_exits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn nodes(&self, n: u64) {
        self.nodes_searched.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn buffer_size(&self, len: u64) {
        self.buffer_len.store(len, Ordering::Relaxed);
        self.buffer_peak.fetch_max(len, Ordering::Relaxed);
    }

    pub(crate) fn flushed(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let elapsed = self.started.elapsed().as_secs_f64().max(1e-6);
        let evaluated = self.positions_evaluated.load(Ordering::Relaxed);
        let nodes = self.nodes_searched.load(Ordering::Relaxed);
        let ply = self.current_ply.load(Ordering::Relaxed) as u32;
        let ply_total = self.ply_total.load(Ordering::Relaxed);
        let ply_completed = self.ply_completed.load(Ordering::Relaxed);

        // ply progression plus the fraction of the current ply; crude
        // but monotone, which is all a progress bar needs
        let ply_fraction = if ply_total == 0 {
            0.0
        } else {
            (ply_completed as f64 / ply_total as f64).min(1.0)
        };
        let percent_complete =
            ((ply as f64 + ply_fraction) / (self.max_ply as f64 + 1.0) * 100.0).min(100.0);

        ProgressSnapshot {
            current_ply: ply,
            ply_total,
            ply_completed,
            positions_evaluated: evaluated,
            positions_verified: self.positions_verified.load(Ordering::Relaxed),
            positions_stored: self.positions_stored.load(Ordering::Relaxed),
            positions_skipped: self.positions_skipped.load(Ordering::Relaxed),
            moves_stored: self.moves_stored.load(Ordering::Relaxed),
            candidates_evaluated: self.candidates_evaluated.load(Ordering::Relaxed),
            candidates_pruned: self.candidates_pruned.load(Ordering::Relaxed),
            early_exits: self.early_exits.load(Ordering::Relaxed),
            nodes_searched: nodes,
            buffer_len: self.buffer_len.load(Ordering::Relaxed),
            buffer_peak: self.buffer_peak.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            positions_per_minute: evaluated as f64 / elapsed * 60.0,
            nodes_per_second: nodes as f64 / elapsed,
            percent_complete,
        }
    }
}
