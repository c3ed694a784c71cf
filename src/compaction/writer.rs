//! Sequential layout rewrite
//!
//! Walks the occupied slots in ascending offset order and packs records
//! towards the start of the file.
//!
//! ## Invariants
//! - `cursor` is the next free sector; everything below it is final.
//! - `frontier` indexes the first layout entry not yet claimed. An entry is
//!   claimed when the scan reaches it or when a write is about to cover its
//!   first sector. Claiming an untouched record copies its frame into
//!   `relocated` before anything is written over it.
//! - Unclaimed entries start at or after every sector written so far, so
//!   their bytes on disk are still intact.

use std::collections::HashMap;
use std::io::{Seek, SeekFrom};

use bytes::Bytes;
use tracing::{debug, warn};

use crate::chunk::Chunk;
use crate::codec::ChunkCodec;
use crate::error::Result;
use crate::header::{sectors_for, HeaderTable, SlotKey, SlotLocation, HEADER_SECTORS, SECTOR_SIZE};

use super::dirty::{Change, DirtySet};
use super::{FlushStats, SectorFile};

/// Rewrites a region's layout from an encoded `DirtySet`
pub struct CompactingWriter<'a, F> {
    file: &'a mut F,
    header: &'a mut HeaderTable,
    codec: &'a ChunkCodec,
    layout: Vec<SlotLocation>,
    frontier: usize,
    cursor: u32,
    relocated: HashMap<SlotKey, Bytes>,
    stats: FlushStats,
}

impl<'a, F: SectorFile> CompactingWriter<'a, F> {
    pub fn new(file: &'a mut F, header: &'a mut HeaderTable, codec: &'a ChunkCodec) -> Self {
        Self {
            file,
            header,
            codec,
            layout: Vec::new(),
            frontier: 0,
            cursor: HEADER_SECTORS,
            relocated: HashMap::new(),
            stats: FlushStats::default(),
        }
    }

    /// Write every change in `dirty`, compact, and truncate the file
    ///
    /// `header` is updated entry by entry as the file is.
    pub fn write<C: Chunk>(mut self, dirty: &mut DirtySet<C>) -> Result<FlushStats> {
        dirty.classify(self.header);
        self.stats.failed = dirty.failed;

        let file_len = self.file.seek(SeekFrom::End(0))?;
        let layout = self.header.sorted_layout(sectors_for(file_len) as u32);

        for entry in layout.rejected {
            self.drop_entry(entry, dirty)?;
        }
        self.layout = layout.entries;

        for idx in 0..self.layout.len() {
            self.visit(idx, dirty)?;
        }

        // Slots whose old entry was unusable get their new bytes appended
        for (slot, change) in dirty.changes.drain() {
            if let Change::Rewrite(frame) = change {
                dirty.append.insert(slot, frame);
            }
        }

        let append = std::mem::take(&mut dirty.append);
        for (slot, frame) in append {
            self.place(slot, &frame, dirty)?;
            self.stats.appended += 1;
        }

        let new_len = self.cursor as u64 * SECTOR_SIZE;
        self.file.set_len(new_len)?;
        self.stats.file_len = new_len;

        debug!(
            kept = self.stats.kept,
            rewritten = self.stats.rewritten,
            relocated = self.stats.relocated,
            removed = self.stats.removed,
            appended = self.stats.appended,
            failed = self.stats.failed,
            old_len = file_len,
            new_len,
            "Region layout rewritten"
        );

        Ok(self.stats)
    }

    /// Handle the layout entry at `idx`
    fn visit<C: Chunk>(&mut self, idx: usize, dirty: &mut DirtySet<C>) -> Result<()> {
        let SlotLocation { slot, location } = self.layout[idx];
        if self.frontier <= idx {
            self.frontier = idx + 1;
        }

        let frame = match dirty.changes.remove(&slot) {
            Some(Change::Remove) => {
                self.header.set(self.file, slot, 0, 0, false)?;
                self.stats.removed += 1;
                return Ok(());
            }
            Some(Change::Rewrite(frame)) => {
                self.stats.rewritten += 1;
                frame
            }
            // Untouched record, captured when an earlier write covered it
            None => match self.relocated.remove(&slot) {
                Some(frame) => {
                    self.stats.relocated += 1;
                    frame
                }
                None if location.offset() == self.cursor => {
                    self.header
                        .set(self.file, slot, location.offset(), location.sectors(), false)?;
                    self.cursor = location.end();
                    self.stats.kept += 1;
                    return Ok(());
                }
                // Untouched record behind a gap: moves down
                None => {
                    self.stats.relocated += 1;
                    self.codec.read_frame(
                        self.file,
                        slot.local_pos(),
                        location.offset_bytes(),
                        location.size_bytes(),
                    )?
                }
            },
        };

        self.place(slot, &frame, dirty)
    }

    /// Write `frame` at the cursor and point `slot` at it
    fn place<C: Chunk>(&mut self, slot: SlotKey, frame: &[u8], dirty: &DirtySet<C>) -> Result<()> {
        let sectors = sectors_for(frame.len() as u64) as u32;
        let end = self.cursor + sectors;
        self.claim(end, dirty)?;

        ChunkCodec::write_frame(self.file, self.cursor as u64 * SECTOR_SIZE, frame)?;
        self.header
            .set(self.file, slot, self.cursor, sectors as u8, true)?;
        self.cursor = end;
        Ok(())
    }

    /// Claim every entry starting before sector `end`, capturing untouched ones
    fn claim<C: Chunk>(&mut self, end: u32, dirty: &DirtySet<C>) -> Result<()> {
        while let Some(next) = self.layout.get(self.frontier).copied() {
            if next.location.offset() >= end {
                break;
            }
            if !dirty.changes.contains_key(&next.slot) {
                let frame = self.codec.read_frame(
                    self.file,
                    next.slot.local_pos(),
                    next.location.offset_bytes(),
                    next.location.size_bytes(),
                )?;
                self.relocated.insert(next.slot, frame);
            }
            self.frontier += 1;
        }
        Ok(())
    }

    /// Clear a header entry the layout could not place
    fn drop_entry<C: Chunk>(&mut self, entry: SlotLocation, dirty: &mut DirtySet<C>) -> Result<()> {
        warn!(
            x = entry.slot.local_x(),
            z = entry.slot.local_z(),
            offset = entry.location.offset(),
            sectors = entry.location.sectors(),
            "Clearing unusable header entry"
        );
        if let Some(Change::Rewrite(frame)) = dirty.changes.remove(&entry.slot) {
            dirty.append.insert(entry.slot, frame);
        }
        self.header.set(self.file, entry.slot, 0, 0, false)?;
        self.stats.dropped += 1;
        Ok(())
    }
}
