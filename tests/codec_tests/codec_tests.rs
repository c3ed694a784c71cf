//! Tests for ChunkCodec
//!
//! These tests verify:
//! - Frame layout of encoded records (length prefix, scheme tag)
//! - Decoding records from a file at a sector offset
//! - Rejection of absent offsets, unsupported schemes and corrupt frames
//! - Serialization failures and oversized records

use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use flate2::read::ZlibDecoder;
use regionstore::codec::{ChunkCodec, FRAME_HEADER_SIZE};
use regionstore::{Chunk, ChunkPos, RawChunk, RegionError, Result};

// =============================================================================
// Helper Functions
// =============================================================================

/// Incompressible bytes (xorshift64)
fn noise(seed: u64, len: usize) -> Vec<u8> {
    let mut state = seed.wrapping_mul(6364136223846793005) | 1;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 24) as u8
        })
        .collect()
}

/// Region-sized buffer with `frame` written at sector 2
fn file_with_frame(frame: &[u8]) -> Cursor<Vec<u8>> {
    let mut file = Cursor::new(vec![0u8; 8192]);
    file.seek(SeekFrom::Start(8192)).unwrap();
    file.write_all(frame).unwrap();
    file
}

struct BrokenChunk;

impl Chunk for BrokenChunk {
    fn decode(_data: &[u8], _x: i32, _z: i32, _declared_size: usize) -> Result<Self> {
        Err(RegionError::Parse("not a chunk".to_string()))
    }
    fn x(&self) -> i32 {
        0
    }
    fn z(&self) -> i32 {
        0
    }
    fn is_modified(&self) -> bool {
        true
    }
    fn is_deleted(&self) -> bool {
        false
    }
    fn serialize(&self, _scratch: &mut Vec<u8>) -> Result<()> {
        Err(RegionError::Serialization("cannot serialize".to_string()))
    }
    fn mark_saved(&mut self) {}
}

// =============================================================================
// Encode Tests
// =============================================================================

#[test]
fn test_encode_frame_layout() {
    let codec = ChunkCodec::default();
    let chunk = RawChunk::new(0, 0, b"hello region".to_vec());

    let frame = codec.encode(&chunk).unwrap().unwrap();

    let length = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
    assert_eq!(length, frame.len() - 4);
    assert_eq!(frame[4], 2);

    let mut inflated = Vec::new();
    ZlibDecoder::new(&frame[FRAME_HEADER_SIZE..])
        .read_to_end(&mut inflated)
        .unwrap();
    assert_eq!(inflated, b"hello region");
}

#[test]
fn test_encode_deleted_returns_none() {
    let codec = ChunkCodec::default();
    let mut chunk = RawChunk::new(0, 0, b"gone".to_vec());
    chunk.delete();

    assert!(codec.encode(&chunk).unwrap().is_none());
}

#[test]
fn test_encode_compresses_payload() {
    let codec = ChunkCodec::default();
    let chunk = RawChunk::new(0, 0, vec![7u8; 64 * 1024]);

    let frame = codec.encode(&chunk).unwrap().unwrap();

    assert!(frame.len() < 4096);
}

#[test]
fn test_encode_serialization_error() {
    let codec = ChunkCodec::default();

    let result = codec.encode(&BrokenChunk);

    assert!(matches!(result, Err(RegionError::Serialization(_))));
}

#[test]
fn test_encode_record_too_large() {
    let codec = ChunkCodec::default();
    let chunk = RawChunk::new(3, 4, noise(1, 1_100_000));

    let result = codec.encode(&chunk);

    match result {
        Err(RegionError::RecordTooLarge { x, z, sectors }) => {
            assert_eq!((x, z), (3, 4));
            assert!(sectors > 255);
        }
        other => panic!("expected RecordTooLarge, got {:?}", other.map(|f| f.map(|b| b.len()))),
    }
}

// =============================================================================
// Decode Tests
// =============================================================================

#[test]
fn test_decode_from_file() {
    let codec = ChunkCodec::default();
    let data = noise(2, 3000);
    let frame = codec.encode(&RawChunk::new(5, 6, data.clone())).unwrap().unwrap();
    let mut file = file_with_frame(&frame);

    let chunk: RawChunk = codec
        .decode(&mut file, ChunkPos::new(5, 6), 8192, 4096)
        .unwrap();

    assert_eq!(chunk.data(), &data[..]);
    assert_eq!((chunk.x(), chunk.z()), (5, 6));
    assert!(!chunk.is_modified());
    assert!(!chunk.is_deleted());
}

#[test]
fn test_decode_offset_zero_is_corrupt() {
    let codec = ChunkCodec::default();
    let mut file = Cursor::new(vec![0u8; 8192]);

    let result: Result<RawChunk> = codec.decode(&mut file, ChunkPos::new(0, 0), 0, 4096);

    assert!(matches!(result, Err(RegionError::CorruptRecord { .. })));
}

#[test]
fn test_decode_unsupported_compression() {
    let codec = ChunkCodec::default();
    let mut frame = codec.encode(&RawChunk::new(0, 0, b"gzip?".to_vec())).unwrap().unwrap().to_vec();
    frame[4] = 1;
    let mut file = file_with_frame(&frame);

    let result: Result<RawChunk> = codec.decode(&mut file, ChunkPos::new(0, 0), 8192, 4096);

    assert!(matches!(result, Err(RegionError::UnsupportedCompression(1))));
}

#[test]
fn test_decode_zero_length_is_corrupt() {
    let codec = ChunkCodec::default();
    let mut file = file_with_frame(&[0, 0, 0, 0, 2]);

    let result: Result<RawChunk> = codec.decode(&mut file, ChunkPos::new(0, 0), 8192, 4096);

    assert!(matches!(result, Err(RegionError::CorruptRecord { .. })));
}

#[test]
fn test_decode_length_beyond_allocation_is_corrupt() {
    let codec = ChunkCodec::default();
    let mut frame = vec![0u8; 16];
    frame[..4].copy_from_slice(&5000u32.to_be_bytes());
    frame[4] = 2;
    let mut file = file_with_frame(&frame);

    let result: Result<RawChunk> = codec.decode(&mut file, ChunkPos::new(0, 0), 8192, 4096);

    assert!(matches!(result, Err(RegionError::CorruptRecord { .. })));
}

#[test]
fn test_decode_truncated_record_is_corrupt() {
    let codec = ChunkCodec::default();
    let mut frame = vec![0u8; 16];
    frame[..4].copy_from_slice(&1000u32.to_be_bytes());
    frame[4] = 2;
    let mut file = file_with_frame(&frame);

    let result: Result<RawChunk> = codec.decode(&mut file, ChunkPos::new(0, 0), 8192, 4096);

    assert!(matches!(result, Err(RegionError::CorruptRecord { .. })));
}

#[test]
fn test_decode_garbage_payload_is_corrupt() {
    let codec = ChunkCodec::default();
    let mut frame = vec![0xABu8; 64];
    frame[..4].copy_from_slice(&60u32.to_be_bytes());
    frame[4] = 2;
    let mut file = file_with_frame(&frame);

    let result: Result<RawChunk> = codec.decode(&mut file, ChunkPos::new(0, 0), 8192, 4096);

    assert!(matches!(result, Err(RegionError::CorruptRecord { .. })));
}

#[test]
fn test_decode_parse_error_propagates() {
    let codec = ChunkCodec::default();
    let frame = codec.encode(&RawChunk::new(0, 0, b"x".to_vec())).unwrap().unwrap();
    let mut file = file_with_frame(&frame);

    let result: Result<BrokenChunk> = codec.decode(&mut file, ChunkPos::new(0, 0), 8192, 4096);

    assert!(matches!(result, Err(RegionError::Parse(_))));
}

// =============================================================================
// Raw Frame Tests
// =============================================================================

#[test]
fn test_read_frame_returns_exact_frame() {
    let codec = ChunkCodec::default();
    let frame = codec.encode(&RawChunk::new(0, 0, noise(3, 500))).unwrap().unwrap();
    let mut file = file_with_frame(&frame);
    file.get_mut().resize(8192 + 4096, 0xEE);

    let read = codec
        .read_frame(&mut file, ChunkPos::new(0, 0), 8192, 4096)
        .unwrap();

    assert_eq!(read, frame);
}

#[test]
fn test_read_compressed_skips_frame_header() {
    let codec = ChunkCodec::default();
    let frame = codec.encode(&RawChunk::new(0, 0, b"payload".to_vec())).unwrap().unwrap();
    let mut file = file_with_frame(&frame);

    let payload = codec
        .read_compressed(&mut file, ChunkPos::new(0, 0), 8192, 4096)
        .unwrap();

    assert_eq!(&payload[..], &frame[FRAME_HEADER_SIZE..]);
}

#[test]
fn test_write_frame_at_offset() {
    let mut file = Cursor::new(vec![0u8; 8192]);

    ChunkCodec::write_frame(&mut file, 3 * 4096, &[1, 2, 3]).unwrap();

    assert_eq!(file.get_ref().len(), 3 * 4096 + 3);
    assert_eq!(&file.get_ref()[3 * 4096..], &[1, 2, 3]);
}

#[test]
fn test_buffers_are_returned_to_pool() {
    let codec = ChunkCodec::default();
    let frame = codec.encode(&RawChunk::new(0, 0, noise(4, 2000))).unwrap().unwrap();
    let mut file = file_with_frame(&frame);

    let _: RawChunk = codec.decode(&mut file, ChunkPos::new(0, 0), 8192, 4096).unwrap();

    assert!(codec.buffers().idle_count() >= 1);
}

// =============================================================================
// Inflate Limit Tests
// =============================================================================

#[test]
fn test_decode_rejects_payload_over_inflate_limit() {
    let codec = ChunkCodec::default().with_max_inflated(1024);
    let frame = codec.encode(&RawChunk::new(0, 0, vec![0u8; 64 * 1024])).unwrap().unwrap();
    let mut file = file_with_frame(&frame);

    let result: Result<RawChunk> = codec.decode(&mut file, ChunkPos::new(0, 0), 8192, 4096);

    assert!(matches!(result, Err(RegionError::CorruptRecord { .. })));
}

#[test]
fn test_decode_accepts_payload_at_inflate_limit() {
    let codec = ChunkCodec::default().with_max_inflated(1024);
    let frame = codec.encode(&RawChunk::new(0, 0, vec![9u8; 1024])).unwrap().unwrap();
    let mut file = file_with_frame(&frame);

    let chunk: RawChunk = codec.decode(&mut file, ChunkPos::new(0, 0), 8192, 4096).unwrap();

    assert_eq!(chunk.data().len(), 1024);
}

#[test]
fn test_inflate_limit_from_config() {
    let config = regionstore::Config::builder().max_inflated_size(100).build();
    let codec = ChunkCodec::from_config(&config);
    let frame = codec.encode(&RawChunk::new(0, 0, vec![1u8; 101])).unwrap().unwrap();
    let mut file = file_with_frame(&frame);

    let result: Result<RawChunk> = codec.decode(&mut file, ChunkPos::new(0, 0), 8192, 4096);

    assert!(matches!(result, Err(RegionError::CorruptRecord { .. })));
}
