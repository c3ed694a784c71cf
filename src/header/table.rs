//! Header table implementation
//!
//! In-memory copy of the location and timestamp tables, kept in step with
//! the file on every `set`.

use std::io::{Read, Seek, SeekFrom, Write};

use tracing::{debug, warn};

use crate::error::{RegionError, Result};

use super::{
    now_timestamp, ChunkPos, Location, SlotKey, SlotLocation, HEADER_SECTORS, HEADER_SIZE,
    LOCATION_TABLE_SIZE, SLOT_COUNT,
};

/// The 8 KiB region header
///
/// Cloning yields an independent copy; the flush works on a copy and the
/// region swaps it in only when the flush succeeds.
#[derive(Clone)]
pub struct HeaderTable {
    locations: Box<[Location; SLOT_COUNT]>,
    timestamps: Box<[u32; SLOT_COUNT]>,
}

/// Occupied slots in ascending file-offset order
#[derive(Debug, Default)]
pub struct SortedLayout {
    /// Usable entries, sorted by offset, pairwise disjoint
    pub entries: Vec<SlotLocation>,
    /// Entries that point into the header, past EOF, or into another record
    pub rejected: Vec<SlotLocation>,
}

impl HeaderTable {
    /// A header with every slot empty
    pub fn empty() -> Self {
        Self {
            locations: Box::new([Location::EMPTY; SLOT_COUNT]),
            timestamps: Box::new([0; SLOT_COUNT]),
        }
    }

    /// Load the header from the start of `file`
    ///
    /// A file shorter than 8192 bytes cannot hold a header: it is given a
    /// zero-filled one and every slot is treated as empty.
    pub fn load<F: Read + Write + Seek>(file: &mut F) -> Result<Self> {
        let len = file.seek(SeekFrom::End(0))?;

        if len < HEADER_SIZE {
            if len > 0 {
                let err = RegionError::CorruptHeader(format!(
                    "{} bytes, expected at least {}",
                    len, HEADER_SIZE
                ));
                warn!(error = %err, "Resetting region header to empty");
            }
            file.seek(SeekFrom::Start(0))?;
            file.write_all(&[0u8; HEADER_SIZE as usize])?;
            return Ok(Self::empty());
        }

        let mut raw = vec![0u8; HEADER_SIZE as usize];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut raw)?;

        let mut table = Self::empty();
        let (locations, timestamps) = raw.split_at(LOCATION_TABLE_SIZE as usize);
        for (i, chunk) in locations.chunks_exact(4).enumerate() {
            table.locations[i] = Location::from_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        for (i, chunk) in timestamps.chunks_exact(4).enumerate() {
            table.timestamps[i] = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }

        Ok(table)
    }

    /// Offset and size of a chunk's record, in bytes; `None` if absent
    pub fn locate(&self, cx: i32, cz: i32) -> Option<(u64, u64)> {
        let loc = self.location(SlotKey::new(cx, cz));
        (!loc.is_empty()).then(|| (loc.offset_bytes(), loc.size_bytes()))
    }

    /// Raw location entry of a slot
    pub fn location(&self, slot: SlotKey) -> Location {
        self.locations[slot.index()]
    }

    /// Last-write timestamp of a slot (Unix seconds, 0 if never written)
    pub fn timestamp(&self, slot: SlotKey) -> u32 {
        self.timestamps[slot.index()]
    }

    /// Update a slot in memory and persist its location and timestamp entries
    ///
    /// `(0, 0)` erases the slot and zeroes its timestamp. Otherwise the
    /// timestamp is refreshed only when `write_timestamp` is set.
    pub fn set<F: Write + Seek>(
        &mut self,
        file: &mut F,
        slot: SlotKey,
        offset: u32,
        sectors: u8,
        write_timestamp: bool,
    ) -> Result<()> {
        let loc = Location::new(offset, sectors);
        self.locations[slot.index()] = loc;

        file.seek(SeekFrom::Start(slot.location_offset()))?;
        file.write_all(&loc.to_bytes())?;

        let timestamp = if offset == 0 && sectors == 0 {
            Some(0)
        } else if write_timestamp {
            Some(now_timestamp())
        } else {
            None
        };

        if let Some(ts) = timestamp {
            self.timestamps[slot.index()] = ts;
            file.seek(SeekFrom::Start(slot.timestamp_offset()))?;
            file.write_all(&ts.to_be_bytes())?;
        }

        Ok(())
    }

    /// Occupied slots in table order
    pub fn occupied(&self) -> impl Iterator<Item = SlotLocation> + '_ {
        SlotKey::all().filter_map(move |slot| {
            let location = self.location(slot);
            (!location.is_empty()).then_some(SlotLocation { slot, location })
        })
    }

    /// Number of occupied slots
    pub fn occupied_count(&self) -> usize {
        self.occupied().count()
    }

    /// Whether the chunk's slot holds a record
    pub fn contains(&self, pos: ChunkPos) -> bool {
        !self.location(pos.slot()).is_empty()
    }

    /// Occupied slots in ascending offset order, for a file of `file_sectors`
    ///
    /// Builds a projection `offset -> slot` and walks it forward. Entries that
    /// point into the header, run past the end of the file, or start inside an
    /// earlier record are logged and returned as rejected instead of failing.
    pub fn sorted_layout(&self, file_sectors: u32) -> SortedLayout {
        let mut layout = SortedLayout::default();
        let span = file_sectors.saturating_sub(HEADER_SECTORS) as usize;
        let mut by_offset: Vec<Option<SlotKey>> = vec![None; span];

        for entry in self.occupied() {
            let loc = entry.location;
            if loc.offset() < HEADER_SECTORS || loc.end() > file_sectors {
                warn!(
                    x = entry.slot.local_x(),
                    z = entry.slot.local_z(),
                    offset = loc.offset(),
                    sectors = loc.sectors(),
                    file_sectors,
                    "Ignoring invalid offset"
                );
                layout.rejected.push(entry);
                continue;
            }

            let cell = &mut by_offset[(loc.offset() - HEADER_SECTORS) as usize];
            match cell {
                Some(_) => {
                    warn!(
                        x = entry.slot.local_x(),
                        z = entry.slot.local_z(),
                        offset = loc.offset(),
                        "Ignoring slot sharing an offset with another slot"
                    );
                    layout.rejected.push(entry);
                }
                None => *cell = Some(entry.slot),
            }
        }

        let mut prev_end = HEADER_SECTORS;
        let mut gap_sectors = 0u32;
        for (i, cell) in by_offset.iter().enumerate() {
            let Some(slot) = *cell else { continue };
            let location = self.location(slot);
            let entry = SlotLocation { slot, location };
            let offset = HEADER_SECTORS + i as u32;

            if offset < prev_end {
                warn!(
                    x = slot.local_x(),
                    z = slot.local_z(),
                    offset,
                    overlaps_until = prev_end,
                    "Ignoring slot overlapping an earlier record"
                );
                layout.rejected.push(entry);
                continue;
            }

            gap_sectors += offset - prev_end;
            prev_end = location.end();
            layout.entries.push(entry);
        }

        if gap_sectors > 0 {
            debug!(gap_sectors, file_sectors, "Region layout has free sectors");
        }

        layout
    }
}

impl Default for HeaderTable {
    fn default() -> Self {
        Self::empty()
    }
}

impl std::fmt::Debug for HeaderTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeaderTable")
            .field("occupied", &self.occupied_count())
            .finish()
    }
}
