//! Chunk cache implementation

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::chunk::{Chunk, ChunkRef};
use crate::error::Result;
use crate::header::SlotKey;

/// Thread-safe map from slot to cached record
///
/// The map is the sole authority over which records are in memory.
pub struct ChunkCache<C> {
    chunks: Mutex<HashMap<SlotKey, ChunkRef<C>>>,
}

impl<C: Chunk> ChunkCache<C> {
    pub fn new() -> Self {
        Self {
            chunks: Mutex::new(HashMap::new()),
        }
    }

    /// Cached record for a chunk, if any
    pub fn get(&self, cx: i32, cz: i32) -> Option<ChunkRef<C>> {
        self.chunks.lock().get(&SlotKey::new(cx, cz)).cloned()
    }

    /// Cached record, or the result of `load` inserted into the cache
    ///
    /// `load` runs without the map lock held. `Ok(None)` from `load` means the
    /// chunk is absent and nothing is cached. If another thread cached the
    /// slot meanwhile, its record is kept and returned.
    pub fn get_or_load<F>(&self, cx: i32, cz: i32, load: F) -> Result<Option<ChunkRef<C>>>
    where
        F: FnOnce() -> Result<Option<C>>,
    {
        if let Some(cached) = self.get(cx, cz) {
            return Ok(Some(cached));
        }

        let Some(chunk) = load()? else {
            return Ok(None);
        };
        Ok(Some(self.insert_if_absent(chunk)))
    }

    /// Cache a record, replacing whatever the slot held
    pub fn put(&self, chunk: C) -> ChunkRef<C> {
        let slot = chunk.slot();
        let handle = Arc::new(Mutex::new(chunk));
        self.chunks.lock().insert(slot, Arc::clone(&handle));
        handle
    }

    /// Cache a record unless the slot already holds one; returns the cached one
    pub fn insert_if_absent(&self, chunk: C) -> ChunkRef<C> {
        let slot = chunk.slot();
        let mut chunks = self.chunks.lock();
        Arc::clone(
            chunks
                .entry(slot)
                .or_insert_with(|| Arc::new(Mutex::new(chunk))),
        )
    }

    /// Evict a slot
    pub fn remove(&self, cx: i32, cz: i32) -> Option<ChunkRef<C>> {
        self.chunks.lock().remove(&SlotKey::new(cx, cz))
    }

    /// Evict a slot only if it still holds `handle`
    pub fn remove_if_same(&self, slot: SlotKey, handle: &ChunkRef<C>) -> bool {
        let mut chunks = self.chunks.lock();
        match chunks.get(&slot) {
            Some(current) if Arc::ptr_eq(current, handle) => {
                chunks.remove(&slot);
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, cx: i32, cz: i32) -> bool {
        self.chunks.lock().contains_key(&SlotKey::new(cx, cz))
    }

    /// Copy of the current entries, in slot order
    pub fn snapshot(&self) -> Vec<(SlotKey, ChunkRef<C>)> {
        let mut entries: Vec<_> = self
            .chunks
            .lock()
            .iter()
            .map(|(slot, chunk)| (*slot, Arc::clone(chunk)))
            .collect();
        entries.sort_by_key(|(slot, _)| *slot);
        entries
    }

    pub fn len(&self) -> usize {
        self.chunks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.lock().is_empty()
    }

    pub fn clear(&self) {
        self.chunks.lock().clear();
    }
}

impl<C: Chunk> Default for ChunkCache<C> {
    fn default() -> Self {
        Self::new()
    }
}
