//! Durable book storage.
//!
//! One file, one writer, many readers. The file is a framed append
//! log: a fixed header followed by checksummed frames, each holding a
//! batch of entries or one metadata pair. A batch becomes durable when
//! its frame is fully on disk; a torn tail frame fails its checksum on
//! replay and is discarded, which is the rollback path. Compaction
//! rewrites the log as a single snapshot via a sibling temp file and
//! an atomic rename.

use crate::MAX_PLY;
use crate::board::Side;
use crate::book::entry::{BookEntry, BookKey, BookMove};
use crate::symmetry::Transform;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, info, warn};
use xxhash_rust::xxh64::xxh64;

const MAGIC: [u8; 8] = *b"CAROBOOK";
/// Current schema. Version 1 predates the direct-hash key component;
/// its entries cannot be disambiguated and are dropped on open.
const SCHEMA_VERSION: u32 = 2;
const HEADER_LEN: u64 = 12;

const TAG_ENTRIES: u8 = 1;
const TAG_META: u8 = 2;
const FRAME_HEADER_LEN: usize = 1 + 4 + 8; // tag + payload len + xxh64

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("book store I/O failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("book store is open read-only")]
    ReadOnly,
    #[error("entry rejected: {0}")]
    InvalidEntry(String),
    #[error("serialization failure: {0}")]
    Serialize(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    ReadOnly,
    ReadWrite,
}

/// Aggregate numbers over the whole store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookStats {
    pub total_entries: u64,
    pub max_depth: u32,
    pub total_moves: u64,
    /// Entry counts indexed by ply, `0..=MAX_PLY` (deeper entries are
    /// clamped into the last bucket).
    pub per_ply: Vec<u64>,
}

// On-disk row. `moves_blob` is JSON so the move schema can grow
// without a frame-format bump; everything else is bincode.
#[derive(Serialize, Deserialize)]
struct WireEntry {
    canonical_hash: u64,
    direct_hash: u64,
    depth: u32,
    side_to_move: u8,
    symmetry: u8,
    is_near_edge: bool,
    total_moves: u32,
    created_at: String,
    moves_blob: String,
}

struct Inner {
    entries: HashMap<BookKey, BookEntry>,
    by_canonical: HashMap<u64, Vec<BookKey>>,
    metadata: HashMap<String, String>,
    /// `None` in read-only mode.
    file: Option<File>,
}

impl Inner {
    fn insert_entry(&mut self, entry: BookEntry) {
        let key = entry.key();
        if let Some(prev) = self.entries.get(&key) {
            if prev.depth != entry.depth {
                warn!(
                    canonical_hash = format_args!("{:#018x}", key.canonical_hash),
                    old_depth = prev.depth,
                    new_depth = entry.depth,
                    "suspected hash collision: stored depth disagrees, overwriting"
                );
            }
        } else {
            self.by_canonical
                .entry(key.canonical_hash)
                .or_default()
                .push(key);
        }
        self.entries.insert(key, entry);
    }

    fn remove_all(&mut self) {
        self.entries.clear();
        self.by_canonical.clear();
        self.metadata.clear();
    }
}

/// The durable `{canonical_hash, direct_hash, side}` → entry map.
pub struct BookStore {
    path: PathBuf,
    mode: OpenMode,
    inner: RwLock<Inner>,
}

impl BookStore {
    /// Open (and in read-write mode create) the store at `path`,
    /// replaying the existing log into memory. A legacy or foreign
    /// header is logged and the file recreated; this is the schema
    /// migration path and is deliberately non-fatal.
    pub fn open<P: AsRef<Path>>(path: P, mode: OpenMode) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let mut inner = Inner {
            entries: HashMap::new(),
            by_canonical: HashMap::new(),
            metadata: HashMap::new(),
            file: None,
        };

        match mode {
            OpenMode::ReadOnly => {
                let raw = std::fs::read(&path)?;
                replay(&raw, &mut inner, &path, None);
            }
            OpenMode::ReadWrite => {
                let mut file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .truncate(false)
                    .open(&path)?;
                let raw = std::fs::read(&path)?;
                if raw.is_empty() {
                    write_header(&mut file)?;
                } else if !header_is_current(&raw) {
                    let found = if raw.len() >= HEADER_LEN as usize && raw[..8] == MAGIC {
                        u32::from_le_bytes([raw[8], raw[9], raw[10], raw[11]])
                    } else {
                        0
                    };
                    warn!(
                        path = %path.display(),
                        found_version = found,
                        current_version = SCHEMA_VERSION,
                        "book schema mismatch: dropping old contents and recreating"
                    );
                    file.set_len(0)?;
                    write_header(&mut file)?;
                } else {
                    replay(&raw, &mut inner, &path, Some(&mut file));
                }
                inner.file = Some(file);
            }
        }

        info!(
            path = %path.display(),
            entries = inner.entries.len(),
            ?mode,
            "book store opened"
        );

        Ok(BookStore {
            path,
            mode,
            inner: RwLock::new(inner),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Insert-or-replace one entry. Same durability unit as a
    /// one-element [`put_batch`](Self::put_batch).
    pub fn put(&self, entry: &BookEntry) -> Result<(), StoreError> {
        self.put_batch(std::slice::from_ref(entry))
    }

    /// All-or-nothing batch write. Every entry is validated and
    /// serialized before a single byte reaches the file; once the
    /// frame is synced the batch is committed and is never rolled
    /// back. A failure mid-write truncates the partial frame away.
    /// An empty batch is a no-op.
    pub fn put_batch(&self, entries: &[BookEntry]) -> Result<(), StoreError> {
        if entries.is_empty() {
            return Ok(());
        }

        for entry in entries {
            entry.validate().map_err(StoreError::InvalidEntry)?;
        }
        let wires = entries
            .iter()
            .map(to_wire)
            .collect::<Result<Vec<_>, _>>()?;
        let payload =
            bincode::serialize(&wires).map_err(|e| StoreError::Serialize(e.to_string()))?;

        let mut inner = self.inner.write().unwrap();
        let Some(file) = inner.file.as_mut() else {
            return Err(StoreError::ReadOnly);
        };
        append_frame(file, TAG_ENTRIES, &payload)?;

        for entry in entries {
            inner.insert_entry(entry.clone());
        }
        debug!(count = entries.len(), "batch committed");
        Ok(())
    }

    /// Exact lookup by the full compound key. This is the form new
    /// callers use.
    pub fn get(&self, canonical_hash: u64, direct_hash: u64, side: Side) -> Option<BookEntry> {
        let inner = self.inner.read().unwrap();
        inner
            .entries
            .get(&BookKey {
                canonical_hash,
                direct_hash,
                side_to_move: side,
            })
            .cloned()
    }

    /// Any entry in the canonical bucket with the given mover.
    /// Compatibility surface for legacy callers; which of several
    /// matches comes back is unspecified.
    pub fn get_for_side(&self, canonical_hash: u64, side: Side) -> Option<BookEntry> {
        let inner = self.inner.read().unwrap();
        inner
            .by_canonical
            .get(&canonical_hash)?
            .iter()
            .find(|k| k.side_to_move == side)
            .and_then(|k| inner.entries.get(k))
            .cloned()
    }

    /// Any entry in the canonical bucket. Legacy form.
    pub fn get_any(&self, canonical_hash: u64) -> Option<BookEntry> {
        let inner = self.inner.read().unwrap();
        inner
            .by_canonical
            .get(&canonical_hash)?
            .first()
            .and_then(|k| inner.entries.get(k))
            .cloned()
    }

    pub fn contains(&self, canonical_hash: u64, direct_hash: u64, side: Side) -> bool {
        let inner = self.inner.read().unwrap();
        inner.entries.contains_key(&BookKey {
            canonical_hash,
            direct_hash,
            side_to_move: side,
        })
    }

    pub fn contains_for_side(&self, canonical_hash: u64, side: Side) -> bool {
        self.get_for_side(canonical_hash, side).is_some()
    }

    pub fn contains_any(&self, canonical_hash: u64) -> bool {
        let inner = self.inner.read().unwrap();
        inner.by_canonical.contains_key(&canonical_hash)
    }

    /// Every primary key currently stored, in unspecified order.
    pub fn keys(&self) -> Vec<BookKey> {
        self.inner.read().unwrap().entries.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().unwrap().entries.is_empty()
    }

    pub fn statistics(&self) -> BookStats {
        let inner = self.inner.read().unwrap();
        let mut stats = BookStats {
            total_entries: inner.entries.len() as u64,
            max_depth: 0,
            total_moves: 0,
            per_ply: vec![0u64; MAX_PLY as usize + 1],
        };
        for entry in inner.entries.values() {
            stats.max_depth = stats.max_depth.max(entry.depth);
            stats.total_moves += entry.moves.len() as u64;
            let bucket = (entry.depth.min(MAX_PLY)) as usize;
            stats.per_ply[bucket] += 1;
        }
        stats
    }

    pub fn set_metadata(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let pair = (key.to_string(), value.to_string());
        let payload =
            bincode::serialize(&pair).map_err(|e| StoreError::Serialize(e.to_string()))?;

        let mut inner = self.inner.write().unwrap();
        let Some(file) = inner.file.as_mut() else {
            return Err(StoreError::ReadOnly);
        };
        append_frame(file, TAG_META, &payload)?;
        inner.metadata.insert(pair.0, pair.1);
        Ok(())
    }

    pub fn get_metadata(&self, key: &str) -> Option<String> {
        self.inner.read().unwrap().metadata.get(key).cloned()
    }

    /// Drop everything and reset the file to a bare header.
    pub fn clear(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap();
        let Some(file) = inner.file.as_mut() else {
            return Err(StoreError::ReadOnly);
        };
        file.set_len(0)?;
        write_header(file)?;
        inner.remove_all();
        Ok(())
    }

    /// Rewrite the log as one snapshot frame, discarding superseded
    /// rows. Goes through a sibling temp file and an atomic rename so
    /// a crash mid-compaction leaves the original intact.
    pub fn compact(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap();
        if inner.file.is_none() {
            return Err(StoreError::ReadOnly);
        }

        let mut ordered: Vec<&BookEntry> = inner.entries.values().collect();
        ordered.sort_by_key(|e| (e.canonical_hash, e.direct_hash, e.side_to_move as u8));
        let wires = ordered
            .into_iter()
            .map(to_wire)
            .collect::<Result<Vec<_>, _>>()?;
        let entries_payload =
            bincode::serialize(&wires).map_err(|e| StoreError::Serialize(e.to_string()))?;

        let tmp_path = self.path.with_extension("compact.tmp");
        let mut tmp = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        write_header(&mut tmp)?;
        append_frame(&mut tmp, TAG_ENTRIES, &entries_payload)?;
        let mut meta: Vec<(&String, &String)> = inner.metadata.iter().collect();
        meta.sort();
        for (k, v) in meta {
            let payload = bincode::serialize(&(k, v))
                .map_err(|e| StoreError::Serialize(e.to_string()))?;
            append_frame(&mut tmp, TAG_META, &payload)?;
        }
        drop(tmp);

        std::fs::rename(&tmp_path, &self.path)?;
        let file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        inner.file = Some(file);
        info!(path = %self.path.display(), entries = inner.entries.len(), "store compacted");
        Ok(())
    }

    /// Force buffered bytes to the device. Batches already sync on
    /// commit, so this is only meaningful after out-of-band writes.
    pub fn flush(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap();
        if let Some(file) = inner.file.as_mut() {
            file.sync_data()?;
        }
        Ok(())
    }
}

fn header_is_current(raw: &[u8]) -> bool {
    raw.len() >= HEADER_LEN as usize
        && raw[..8] == MAGIC
        && u32::from_le_bytes([raw[8], raw[9], raw[10], raw[11]]) == SCHEMA_VERSION
}

fn write_header(file: &mut File) -> Result<(), StoreError> {
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&MAGIC)?;
    file.write_all(&SCHEMA_VERSION.to_le_bytes())?;
    file.flush()?;
    file.sync_data()?;
    Ok(())
}

/// Append one checksummed frame. On a mid-write failure the partial
/// frame is truncated away so the log never carries a torn prefix;
/// after a successful sync nothing is ever undone.
fn append_frame(file: &mut File, tag: u8, payload: &[u8]) -> Result<(), StoreError> {
    let start = file.seek(SeekFrom::End(0))?;

    let result = (|| -> std::io::Result<()> {
        file.write_all(&[tag])?;
        file.write_all(&(payload.len() as u32).to_le_bytes())?;
        file.write_all(&xxh64(payload, 0).to_le_bytes())?;
        file.write_all(payload)?;
        file.flush()?;
        file.sync_data()
    })();

    if let Err(err) = result {
        // rollback only because the commit did not reach the disk
        let _ = file.set_len(start);
        return Err(StoreError::Io(err));
    }
    Ok(())
}

/// Rebuild the in-memory maps from the raw file image. Stops at the
/// first damaged frame; in read-write mode the damaged tail is
/// truncated so subsequent appends start from a clean boundary.
fn replay(raw: &[u8], inner: &mut Inner, path: &Path, file: Option<&mut File>) {
    if !header_is_current(raw) {
        warn!(path = %path.display(), "unreadable or legacy book header; treating as empty");
        return;
    }

    let mut offset = HEADER_LEN as usize;
    let valid_end = loop {
        if offset == raw.len() {
            break offset;
        }
        if raw.len() - offset < FRAME_HEADER_LEN {
            warn!(path = %path.display(), offset, "truncated frame header; discarding tail");
            break offset;
        }
        let tag = raw[offset];
        let len =
            u32::from_le_bytes([raw[offset + 1], raw[offset + 2], raw[offset + 3], raw[offset + 4]])
                as usize;
        let checksum = u64::from_le_bytes([
            raw[offset + 5],
            raw[offset + 6],
            raw[offset + 7],
            raw[offset + 8],
            raw[offset + 9],
            raw[offset + 10],
            raw[offset + 11],
            raw[offset + 12],
        ]);
        let body_start = offset + FRAME_HEADER_LEN;
        if raw.len() - body_start < len {
            warn!(path = %path.display(), offset, "truncated frame body; discarding tail");
            break offset;
        }
        let payload = &raw[body_start..body_start + len];
        if xxh64(payload, 0) != checksum {
            warn!(path = %path.display(), offset, "frame checksum mismatch; discarding tail");
            break offset;
        }

        match tag {
            TAG_ENTRIES => match bincode::deserialize::<Vec<WireEntry>>(payload) {
                Ok(wires) => {
                    for wire in &wires {
                        match from_wire(wire) {
                            Some(entry) => inner.insert_entry(entry),
                            None => warn!(
                                canonical_hash =
                                    format_args!("{:#018x}", wire.canonical_hash),
                                "skipping undecodable stored entry"
                            ),
                        }
                    }
                }
                Err(err) => {
                    warn!(path = %path.display(), offset, %err, "undecodable entries frame; discarding tail");
                    break offset;
                }
            },
            TAG_META => match bincode::deserialize::<(String, String)>(payload) {
                Ok((k, v)) => {
                    inner.metadata.insert(k, v);
                }
                Err(err) => {
                    warn!(path = %path.display(), offset, %err, "undecodable metadata frame; discarding tail");
                    break offset;
                }
            },
            other => {
                warn!(path = %path.display(), offset, tag = other, "unknown frame tag; discarding tail");
                break offset;
            }
        }
        offset = body_start + len;
    };

    if valid_end < raw.len() {
        if let Some(file) = file {
            if let Err(err) = file.set_len(valid_end as u64) {
                warn!(%err, "could not truncate damaged tail; appends may fail");
            }
        }
    }
}

fn to_wire(entry: &BookEntry) -> Result<WireEntry, StoreError> {
    let moves_blob =
        serde_json::to_string(&entry.moves).map_err(|e| StoreError::Serialize(e.to_string()))?;
    Ok(WireEntry {
        canonical_hash: entry.canonical_hash,
        direct_hash: entry.direct_hash,
        depth: entry.depth,
        side_to_move: entry.side_to_move as u8,
        symmetry: entry.symmetry.ordinal(),
        is_near_edge: entry.is_near_edge,
        total_moves: entry.moves.len() as u32,
        created_at: entry.created_at.clone(),
        moves_blob,
    })
}

fn from_wire(wire: &WireEntry) -> Option<BookEntry> {
    let side_to_move = Side::from_u8(wire.side_to_move)?;
    let symmetry = Transform::from_ordinal(wire.symmetry)?;
    let moves: Vec<BookMove> = serde_json::from_str(&wire.moves_blob).ok()?;
    if moves.is_empty() {
        return None;
    }
    Some(BookEntry {
        canonical_hash: wire.canonical_hash,
        direct_hash: wire.direct_hash,
        depth: wire.depth,
        side_to_move,
        symmetry,
        is_near_edge: wire.is_near_edge,
        moves,
        created_at: wire.created_at.clone(),
    })
}
