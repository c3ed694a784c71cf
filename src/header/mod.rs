//! Header Module
//!
//! The 8 KiB region header: slot arithmetic, location entries and the
//! in-memory `HeaderTable`.
//!
//! ## File Format
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │ Location table [0, 4096)                               │
//! │   1024 × [Offset: u24 BE (sectors)][Count: u8]         │
//! ├────────────────────────────────────────────────────────┤
//! │ Timestamp table [4096, 8192)                           │
//! │   1024 × [Unix seconds: u32 BE]                        │
//! ├────────────────────────────────────────────────────────┤
//! │ Record frames [8192, EOF), 4096-byte sectors           │
//! │   [Length: u32 BE][Scheme: u8][Payload: Length-1]      │
//! └────────────────────────────────────────────────────────┘
//! ```
//! Slot index = `(cx & 31) + (cz & 31) * 32`.

mod table;

use std::time::{SystemTime, UNIX_EPOCH};

pub use table::{HeaderTable, SortedLayout};

// =============================================================================
// Format Constants
// =============================================================================

/// Allocation unit for record frames
pub const SECTOR_SIZE: u64 = 4096;

/// Number of slots in a region (32 × 32)
pub const SLOT_COUNT: usize = 1024;

/// Chunks per region side
pub const REGION_WIDTH: i32 = 32;

/// Size of the location table, and offset of the timestamp table
pub const LOCATION_TABLE_SIZE: u64 = 4096;

/// Header size: location table + timestamp table
pub const HEADER_SIZE: u64 = 8192;

/// Sectors occupied by the header; first valid record sector
pub const HEADER_SECTORS: u32 = 2;

/// Largest sector offset a location entry can hold (u24)
pub const MAX_SECTOR_OFFSET: u32 = 0x00FF_FFFF;

/// Largest sector count a location entry can hold (u8)
pub const MAX_SECTOR_COUNT: usize = 255;

/// Number of sectors needed to hold `bytes`
pub fn sectors_for(bytes: u64) -> u64 {
    bytes.div_ceil(SECTOR_SIZE)
}

/// Current Unix time in seconds, as stored in the timestamp table
pub fn now_timestamp() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

// =============================================================================
// Coordinates
// =============================================================================

/// Chunk coordinates, either world-absolute or region-local
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}

impl ChunkPos {
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Slot this chunk maps to in its region
    pub fn slot(self) -> SlotKey {
        SlotKey::new(self.x, self.z)
    }

    /// Region coordinates containing this chunk
    pub fn region(self) -> (i32, i32) {
        (self.x >> 5, self.z >> 5)
    }
}

/// One of the 1024 fixed header slots
///
/// Every chunk coordinate maps to exactly one slot via `(cx & 31, cz & 31)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotKey(u16);

impl SlotKey {
    pub fn new(cx: i32, cz: i32) -> Self {
        Self(((cx & 31) + ((cz & 31) << 5)) as u16)
    }

    pub fn from_index(index: usize) -> Option<Self> {
        (index < SLOT_COUNT).then_some(Self(index as u16))
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn local_x(self) -> i32 {
        (self.0 & 31) as i32
    }

    pub fn local_z(self) -> i32 {
        (self.0 >> 5) as i32
    }

    pub fn local_pos(self) -> ChunkPos {
        ChunkPos::new(self.local_x(), self.local_z())
    }

    /// Byte position of this slot's location entry
    pub fn location_offset(self) -> u64 {
        self.0 as u64 * 4
    }

    /// Byte position of this slot's timestamp entry
    pub fn timestamp_offset(self) -> u64 {
        LOCATION_TABLE_SIZE + self.0 as u64 * 4
    }

    /// All slots in table order
    pub fn all() -> impl Iterator<Item = SlotKey> {
        (0..SLOT_COUNT as u16).map(SlotKey)
    }
}

// =============================================================================
// Location Entries
// =============================================================================

/// A location table entry: `(sector_offset: u24, sector_count: u8)`
///
/// `offset == 0` means the slot is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Location {
    offset: u32,
    sectors: u8,
}

impl Location {
    pub const EMPTY: Location = Location {
        offset: 0,
        sectors: 0,
    };

    /// Create an entry; the offset is truncated to 24 bits
    pub fn new(offset: u32, sectors: u8) -> Self {
        Self {
            offset: offset & MAX_SECTOR_OFFSET,
            sectors,
        }
    }

    /// Decode from the on-disk big-endian form
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self {
            offset: u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]),
            sectors: bytes[3],
        }
    }

    pub fn to_bytes(self) -> [u8; 4] {
        let o = self.offset.to_be_bytes();
        [o[1], o[2], o[3], self.sectors]
    }

    pub fn is_empty(self) -> bool {
        self.offset == 0 || self.sectors == 0
    }

    /// Offset in sectors
    pub fn offset(self) -> u32 {
        self.offset
    }

    /// Size in sectors
    pub fn sectors(self) -> u8 {
        self.sectors
    }

    /// First sector after this record
    pub fn end(self) -> u32 {
        self.offset + self.sectors as u32
    }

    pub fn offset_bytes(self) -> u64 {
        self.offset as u64 * SECTOR_SIZE
    }

    pub fn size_bytes(self) -> u64 {
        self.sectors as u64 * SECTOR_SIZE
    }
}

/// An occupied slot and where its record lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotLocation {
    pub slot: SlotKey,
    pub location: Location,
}

impl SlotLocation {
    /// Region-local coordinates of the slot
    pub fn pos(&self) -> ChunkPos {
        self.slot.local_pos()
    }
}
