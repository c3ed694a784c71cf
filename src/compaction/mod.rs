//! Compaction Module
//!
//! The flush algorithm: reconciles cached modifications and deletions into
//! the region file and reclaims free space on every run.
//!
//! ## Phases
//! 1. **Compress** (parallel): dirty records are serialized and deflated on a
//!    rayon pool without the region's file lock. The phase ends at a full
//!    barrier. Once the lock is taken, results are split against the header
//!    into rewrites of occupied slots, removals, and appends for empty slots.
//! 2. **Scan** (sequential): occupied slots are visited in ascending offset
//!    order while a write cursor packs records from sector 2 upward. Before any
//!    sector is overwritten, every untouched record it holds is captured in
//!    memory and re-placed when the scan reaches it.
//! 3. **Append**: new records are written after the last packed record.
//! 4. **Truncate**: the file is cut to the last written sector.
//!
//! ## Failure Model
//! A record that fails to serialize or compress is logged and keeps its
//! previous on-disk bytes. An I/O failure aborts the flush and is returned.
//! There is no journal: a flush interrupted by an I/O failure or a crash can
//! leave the file with records partially moved. Callers needing stronger
//! guarantees must copy the file before flushing.

mod dirty;
mod writer;

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, Write};

pub use dirty::{collect_dirty, DirtySet};
pub use writer::CompactingWriter;

/// Random-access storage a region can be flushed into
pub trait SectorFile: Read + Write + Seek {
    /// Truncate or extend to exactly `len` bytes
    fn set_len(&mut self, len: u64) -> io::Result<()>;

    /// Push written data to durable storage
    fn sync_data(&mut self) -> io::Result<()>;
}

impl SectorFile for File {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        File::set_len(self, len)
    }

    fn sync_data(&mut self) -> io::Result<()> {
        File::sync_data(self)
    }
}

impl SectorFile for Cursor<Vec<u8>> {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        self.get_mut().resize(len as usize, 0);
        Ok(())
    }

    fn sync_data(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// What a flush did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushStats {
    /// Untouched records that stayed at their offset
    pub kept: usize,
    /// Modified records written with new bytes
    pub rewritten: usize,
    /// Untouched records moved to a new offset
    pub relocated: usize,
    /// Slots erased because their record was deleted
    pub removed: usize,
    /// Records written to previously empty slots
    pub appended: usize,
    /// Records left unchanged because they failed to encode
    pub failed: usize,
    /// Header entries cleared because they pointed at invalid sectors
    pub dropped: usize,
    /// File length after the flush, in bytes
    pub file_len: u64,
}

impl FlushStats {
    /// Whether any record bytes were written
    pub fn wrote_data(&self) -> bool {
        self.rewritten + self.relocated + self.appended > 0
    }
}
