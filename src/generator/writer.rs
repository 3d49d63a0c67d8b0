//! Single-consumer writer loop.
//!
//! Workers hand finished entries over a bounded channel (that bound is
//! the pipeline's memory ceiling and its backpressure). The writer
//! buffers them and commits one transactional batch when the buffer
//! fills, when the flush interval lapses, or when the channel closes.
//! A store failure parks the error in a shared slot and the loop keeps
//! draining so no producer stays blocked on a full channel.

use crate::book::{BookEntry, BookStore, StoreError};
use crate::generator::progress::Progress;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error};

pub(crate) enum WriterMsg {
    Entry(BookEntry),
    /// Ply barrier: flush everything buffered, then ack.
    Drain(Sender<()>),
}

/// First store error of the run. Workers poll `is_set` at their loop
/// checkpoints; the generator takes the value at the end.
#[derive(Default)]
pub(crate) struct ErrorSlot {
    flag: AtomicBool,
    slot: Mutex<Option<StoreError>>,
}

impl ErrorSlot {
    pub(crate) fn set(&self, err: StoreError) {
        let mut guard = self.slot.lock().unwrap();
        if guard.is_none() {
            *guard = Some(err);
        }
        self.flag.store(true, Ordering::SeqCst);
    }

    #[inline(always)]
    pub(crate) fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub(crate) fn take(&self) -> Option<StoreError> {
        self.slot.lock().unwrap().take()
    }
}

pub(crate) struct WriterConfig {
    pub batch_size: usize,
    pub flush_interval: Duration,
}

pub(crate) fn run_writer(
    store: &BookStore,
    rx: Receiver<WriterMsg>,
    config: WriterConfig,
    progress: &Progress,
    errors: &ErrorSlot,
) {
    let mut buffer: Vec<BookEntry> = Vec::with_capacity(config.batch_size);
    let mut last_flush = Instant::now();

    let flush = |buffer: &mut Vec<BookEntry>, last_flush: &mut Instant| -> Result<(), StoreError> {
        *last_flush = Instant::now();
        if buffer.is_empty() {
            return Ok(());
        }
        let count = buffer.len();
        let moves: u64 = buffer.iter().map(|e| e.moves.len() as u64).sum();
        store.put_batch(buffer)?;
        progress.positions_stored(count as u64);
        progress.moves_stored(moves);
        progress.flushed();
        debug!(count, "writer flushed batch");
        buffer.clear();
        Ok(())
    };

    loop {
        let timeout = config
            .flush_interval
            .checked_sub(last_flush.elapsed())
            .unwrap_or(Duration::ZERO);

        let outcome = match rx.recv_timeout(timeout) {
            Ok(WriterMsg::Entry(entry)) => {
                buffer.push(entry);
                progress.buffer_size(buffer.len() as u64);
                if buffer.len() >= config.batch_size {
                    flush(&mut buffer, &mut last_flush)
                } else {
                    Ok(())
                }
            }
            Ok(WriterMsg::Drain(ack)) => {
                let r = flush(&mut buffer, &mut last_flush);
                let _ = ack.send(());
                r
            }
            Err(RecvTimeoutError::Timeout) => flush(&mut buffer, &mut last_flush),
            Err(RecvTimeoutError::Disconnected) => {
                // shutdown or cancellation: one final drain-and-commit
                if let Err(err) = flush(&mut buffer, &mut last_flush) {
                    error!(%err, "final flush failed");
                    errors.set(err);
                }
                progress.buffer_size(0);
                return;
            }
        };
        progress.buffer_size(buffer.len() as u64);

        if let Err(err) = outcome {
            error!(%err, "batch write failed, stopping writer");
            errors.set(err);
            break;
        }
    }

    // After a failure: keep the channel moving so producers blocked on
    // a full buffer can observe the error and wind down. Their entries
    // are dropped; the committed prefix stays durable.
    for msg in rx.iter() {
        if let WriterMsg::Drain(ack) = msg {
            let _ = ack.send(());
        }
    }
}
