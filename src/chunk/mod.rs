//! Chunk Module
//!
//! The record collaborator: what the region needs from a decoded chunk.
//!
//! The region never interprets chunk content. It parses decompressed bytes
//! through `Chunk::decode`, asks records whether they are modified or
//! deleted, and serializes dirty ones through `Chunk::serialize`.

mod raw;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;
use crate::header::{ChunkPos, SlotKey};

pub use raw::RawChunk;

/// Shared handle to a cached record
///
/// The cache owns the record; callers lock it to read or mutate.
pub type ChunkRef<C> = Arc<Mutex<C>>;

/// A decoded chunk record
pub trait Chunk: Send + Sized + 'static {
    /// Parse a decompressed payload
    ///
    /// `declared_size` is the space the header allocates to the record, in
    /// bytes. Fails with `RegionError::Parse` on malformed input.
    fn decode(data: &[u8], x: i32, z: i32, declared_size: usize) -> Result<Self>;

    /// Chunk X coordinate
    fn x(&self) -> i32;

    /// Chunk Z coordinate
    fn z(&self) -> i32;

    /// Content changed since it was loaded or last saved
    fn is_modified(&self) -> bool;

    /// Marked for removal on the next flush
    fn is_deleted(&self) -> bool;

    /// Write the uncompressed payload into `scratch` (which arrives empty)
    ///
    /// Fails with `RegionError::Serialization`.
    fn serialize(&self, scratch: &mut Vec<u8>) -> Result<()>;

    /// Called after the record's bytes were persisted by a flush
    fn mark_saved(&mut self);

    fn pos(&self) -> ChunkPos {
        ChunkPos::new(self.x(), self.z())
    }

    fn slot(&self) -> SlotKey {
        SlotKey::new(self.x(), self.z())
    }

    fn is_dirty(&self) -> bool {
        self.is_modified() || self.is_deleted()
    }
}
