//! Tests for HeaderTable
//!
//! These tests verify:
//! - Loading headers from full, empty and truncated files
//! - Location and timestamp entries written at their fixed positions
//! - Erasure and timestamp suppression
//! - Offset-ordered layout with graceful handling of invalid entries

use std::io::{Cursor, Seek, SeekFrom, Write};

use regionstore::header::{now_timestamp, HeaderTable, Location, SlotKey, HEADER_SIZE};

// =============================================================================
// Helper Functions
// =============================================================================

fn empty_region() -> Cursor<Vec<u8>> {
    Cursor::new(vec![0u8; HEADER_SIZE as usize])
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn write_location(file: &mut Cursor<Vec<u8>>, slot: SlotKey, offset: u32, sectors: u8) {
    file.seek(SeekFrom::Start(slot.location_offset())).unwrap();
    file.write_all(&Location::new(offset, sectors).to_bytes()).unwrap();
}

// =============================================================================
// Load Tests
// =============================================================================

#[test]
fn test_load_empty_file_creates_header() {
    let mut file = Cursor::new(Vec::new());

    let header = HeaderTable::load(&mut file).unwrap();

    assert_eq!(file.get_ref().len(), HEADER_SIZE as usize);
    assert!(file.get_ref().iter().all(|&b| b == 0));
    assert_eq!(header.occupied_count(), 0);
}

#[test]
fn test_load_truncated_header_treated_as_empty() {
    let mut file = Cursor::new(vec![0xFFu8; 100]);

    let header = HeaderTable::load(&mut file).unwrap();

    assert_eq!(file.get_ref().len(), HEADER_SIZE as usize);
    assert_eq!(header.occupied_count(), 0);
    assert_eq!(header.locate(0, 0), None);
}

#[test]
fn test_load_reads_existing_entries() {
    let mut file = empty_region();
    write_location(&mut file, SlotKey::new(3, 4), 2, 1);
    file.seek(SeekFrom::Start(SlotKey::new(3, 4).timestamp_offset())).unwrap();
    file.write_all(&1234u32.to_be_bytes()).unwrap();

    let header = HeaderTable::load(&mut file).unwrap();

    assert_eq!(header.occupied_count(), 1);
    assert_eq!(header.locate(3, 4), Some((8192, 4096)));
    assert_eq!(header.timestamp(SlotKey::new(3, 4)), 1234);
}

#[test]
fn test_locate_wraps_world_coordinates() {
    let mut file = empty_region();
    write_location(&mut file, SlotKey::new(1, 2), 5, 2);

    let header = HeaderTable::load(&mut file).unwrap();

    assert_eq!(header.locate(33, 66), Some((5 * 4096, 2 * 4096)));
    assert_eq!(header.locate(-31, -30), Some((5 * 4096, 2 * 4096)));
}

// =============================================================================
// Set Tests
// =============================================================================

#[test]
fn test_set_persists_location_and_timestamp() {
    let mut file = empty_region();
    let mut header = HeaderTable::load(&mut file).unwrap();
    let slot = SlotKey::new(7, 1);
    let before = now_timestamp();

    header.set(&mut file, slot, 0x01_02_03, 9, true).unwrap();

    let raw = file.get_ref();
    let at = slot.location_offset() as usize;
    assert_eq!(&raw[at..at + 4], &[0x01, 0x02, 0x03, 9]);
    let ts = read_u32(raw, slot.timestamp_offset() as usize);
    assert!(ts >= before);
    assert_eq!(header.timestamp(slot), ts);
    assert_eq!(header.location(slot), Location::new(0x01_02_03, 9));
}

#[test]
fn test_set_without_timestamp_keeps_old_one() {
    let mut file = empty_region();
    let slot = SlotKey::new(0, 0);
    file.seek(SeekFrom::Start(slot.timestamp_offset())).unwrap();
    file.write_all(&42u32.to_be_bytes()).unwrap();
    let mut header = HeaderTable::load(&mut file).unwrap();

    header.set(&mut file, slot, 2, 1, false).unwrap();

    assert_eq!(read_u32(file.get_ref(), slot.timestamp_offset() as usize), 42);
    assert_eq!(header.timestamp(slot), 42);
    assert_eq!(header.locate(0, 0), Some((8192, 4096)));
}

#[test]
fn test_set_zero_erases_slot_and_timestamp() {
    let mut file = empty_region();
    let mut header = HeaderTable::load(&mut file).unwrap();
    let slot = SlotKey::new(31, 31);
    header.set(&mut file, slot, 2, 1, true).unwrap();

    header.set(&mut file, slot, 0, 0, true).unwrap();

    assert_eq!(header.locate(31, 31), None);
    assert_eq!(header.timestamp(slot), 0);
    assert_eq!(read_u32(file.get_ref(), slot.location_offset() as usize), 0);
    assert_eq!(read_u32(file.get_ref(), slot.timestamp_offset() as usize), 0);
}

// =============================================================================
// Layout Tests
// =============================================================================

#[test]
fn test_sorted_layout_orders_by_offset() {
    let mut file = empty_region();
    write_location(&mut file, SlotKey::new(0, 0), 6, 1);
    write_location(&mut file, SlotKey::new(1, 0), 2, 2);
    write_location(&mut file, SlotKey::new(2, 0), 4, 1);
    let header = HeaderTable::load(&mut file).unwrap();

    let layout = header.sorted_layout(7);

    let offsets: Vec<u32> = layout.entries.iter().map(|e| e.location.offset()).collect();
    assert_eq!(offsets, vec![2, 4, 6]);
    assert_eq!(layout.entries[0].slot, SlotKey::new(1, 0));
    assert!(layout.rejected.is_empty());
}

#[test]
fn test_sorted_layout_rejects_invalid_entries() {
    let mut file = empty_region();
    // Inside the header
    write_location(&mut file, SlotKey::new(0, 0), 1, 1);
    // Past end of file
    write_location(&mut file, SlotKey::new(1, 0), 9, 2);
    // Valid
    write_location(&mut file, SlotKey::new(2, 0), 2, 2);
    // Starts inside the previous record
    write_location(&mut file, SlotKey::new(3, 0), 3, 1);
    // Same offset as an earlier slot
    write_location(&mut file, SlotKey::new(4, 0), 2, 1);
    let header = HeaderTable::load(&mut file).unwrap();

    let layout = header.sorted_layout(10);

    assert_eq!(layout.entries.len(), 1);
    assert_eq!(layout.entries[0].slot, SlotKey::new(2, 0));
    let mut rejected: Vec<SlotKey> = layout.rejected.iter().map(|e| e.slot).collect();
    rejected.sort();
    assert_eq!(
        rejected,
        vec![SlotKey::new(0, 0), SlotKey::new(1, 0), SlotKey::new(3, 0), SlotKey::new(4, 0)]
    );
}

#[test]
fn test_sorted_layout_tolerates_gaps() {
    let mut file = empty_region();
    write_location(&mut file, SlotKey::new(0, 0), 2, 1);
    write_location(&mut file, SlotKey::new(0, 1), 10, 1);
    let header = HeaderTable::load(&mut file).unwrap();

    let layout = header.sorted_layout(11);

    assert_eq!(layout.entries.len(), 2);
    assert_eq!(layout.entries[1].location.offset(), 10);
    assert_eq!(layout.entries[1].pos().z, 1);
}
