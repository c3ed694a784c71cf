//! Opaque byte-payload record

use crate::error::Result;

use super::Chunk;

/// A chunk whose payload is kept as raw uncompressed bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChunk {
    x: i32,
    z: i32,
    data: Vec<u8>,
    modified: bool,
    deleted: bool,
}

impl RawChunk {
    /// A new chunk; it counts as modified until flushed
    pub fn new(x: i32, z: i32, data: impl Into<Vec<u8>>) -> Self {
        Self {
            x,
            z,
            data: data.into(),
            modified: true,
            deleted: false,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Replace the payload and mark the chunk modified
    pub fn set_data(&mut self, data: impl Into<Vec<u8>>) {
        self.data = data.into();
        self.modified = true;
    }

    /// Mutable access to the payload; marks the chunk modified
    pub fn data_mut(&mut self) -> &mut Vec<u8> {
        self.modified = true;
        &mut self.data
    }

    /// Mark for removal on the next flush
    pub fn delete(&mut self) {
        self.deleted = true;
    }

    pub fn set_deleted(&mut self, deleted: bool) {
        self.deleted = deleted;
    }
}

impl Chunk for RawChunk {
    fn decode(data: &[u8], x: i32, z: i32, _declared_size: usize) -> Result<Self> {
        Ok(Self {
            x,
            z,
            data: data.to_vec(),
            modified: false,
            deleted: false,
        })
    }

    fn x(&self) -> i32 {
        self.x
    }

    fn z(&self) -> i32 {
        self.z
    }

    fn is_modified(&self) -> bool {
        self.modified
    }

    fn is_deleted(&self) -> bool {
        self.deleted
    }

    fn serialize(&self, scratch: &mut Vec<u8>) -> Result<()> {
        scratch.extend_from_slice(&self.data);
        Ok(())
    }

    fn mark_saved(&mut self) {
        self.modified = false;
    }
}
