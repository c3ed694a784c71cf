//! Compression phase
//!
//! Collects dirty records from a cache snapshot and encodes them in parallel.

use std::collections::{BTreeMap, HashMap};

use bytes::Bytes;
use rayon::prelude::*;
use rayon::ThreadPool;
use tracing::warn;

use crate::cache::ChunkCache;
use crate::chunk::{Chunk, ChunkRef};
use crate::codec::ChunkCodec;
use crate::header::{HeaderTable, SlotKey};

/// New on-disk state of an occupied slot
#[derive(Debug, Clone)]
pub(crate) enum Change {
    /// Replace the record with this frame
    Rewrite(Bytes),
    /// Erase the slot
    Remove,
}

/// Encoded dirty records, ready for the sequential phase
///
/// Built without the region's file lock held. `classify` sorts the encoded
/// frames against the header once the lock is taken.
pub struct DirtySet<C> {
    /// Encoded frames by slot; `None` erases the slot
    pending: BTreeMap<SlotKey, Option<Bytes>>,
    /// Occupied slots that change
    pub(crate) changes: HashMap<SlotKey, Change>,
    /// Frames for previously empty slots, appended in slot order
    pub(crate) append: BTreeMap<SlotKey, Bytes>,
    /// Records to mark saved when the flush commits
    saved: Vec<ChunkRef<C>>,
    /// Deleted records to evict when the flush commits
    evicted: Vec<(SlotKey, ChunkRef<C>)>,
    /// Records that failed to encode
    pub(crate) failed: usize,
}

impl<C: Chunk> DirtySet<C> {
    fn new() -> Self {
        Self {
            pending: BTreeMap::new(),
            changes: HashMap::new(),
            append: BTreeMap::new(),
            saved: Vec::new(),
            evicted: Vec::new(),
            failed: 0,
        }
    }

    /// Split pending frames into changes of occupied slots and appends
    ///
    /// Removals of slots that are already empty are dropped. Calling it again
    /// is a no-op.
    pub fn classify(&mut self, header: &HeaderTable) {
        for (slot, frame) in std::mem::take(&mut self.pending) {
            let occupied = !header.location(slot).is_empty();
            match (frame, occupied) {
                (Some(frame), true) => {
                    self.changes.insert(slot, Change::Rewrite(frame));
                }
                (Some(frame), false) => {
                    self.append.insert(slot, frame);
                }
                (None, true) => {
                    self.changes.insert(slot, Change::Remove);
                }
                (None, false) => {}
            }
        }
    }

    /// Nothing to write to the file
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.changes.is_empty() && self.append.is_empty()
    }

    /// Whether any cached record was dirty at all
    pub fn had_dirty(&self) -> bool {
        !self.is_empty() || !self.evicted.is_empty() || self.failed > 0
    }

    /// Apply the flush outcome to the cache: written records become clean,
    /// deleted records are evicted.
    ///
    /// Locks each record; must not run under the region's file lock.
    pub fn commit(self, cache: &ChunkCache<C>) {
        for chunk in self.saved {
            chunk.lock().mark_saved();
        }
        for (slot, chunk) in self.evicted {
            cache.remove_if_same(slot, &chunk);
        }
    }
}

/// Encode every dirty record of `snapshot`
///
/// Compression runs on `pool`, or on the current rayon pool when `None`.
/// Returns once every task has finished. Each record is locked while its
/// flags are read and while it is serialized.
pub fn collect_dirty<C: Chunk>(
    snapshot: Vec<(SlotKey, ChunkRef<C>)>,
    codec: &ChunkCodec,
    pool: Option<&ThreadPool>,
) -> DirtySet<C> {
    let mut dirty = DirtySet::new();
    let mut to_encode = Vec::new();

    for (slot, chunk) in snapshot {
        let (deleted, modified) = {
            let guard = chunk.lock();
            (guard.is_deleted(), guard.is_modified())
        };

        if deleted {
            dirty.pending.insert(slot, None);
            dirty.evicted.push((slot, chunk));
        } else if modified {
            to_encode.push((slot, chunk));
        }
    }

    if to_encode.is_empty() {
        return dirty;
    }

    let encode_all = || {
        to_encode
            .par_iter()
            .map(|(slot, chunk)| (*slot, codec.encode(&*chunk.lock())))
            .collect::<Vec<_>>()
    };
    let results = match pool {
        Some(pool) => pool.install(encode_all),
        None => encode_all(),
    };

    for ((slot, result), (_, chunk)) in results.into_iter().zip(to_encode) {
        match result {
            Ok(Some(frame)) => {
                dirty.pending.insert(slot, Some(frame));
                dirty.saved.push(chunk);
            }
            Ok(None) => {
                dirty.pending.insert(slot, None);
                dirty.evicted.push((slot, chunk));
            }
            Err(e) => {
                warn!(
                    x = slot.local_x(),
                    z = slot.local_z(),
                    error = %e,
                    "Failed to encode chunk, keeping previous bytes"
                );
                dirty.failed += 1;
            }
        }
    }

    dirty
}
