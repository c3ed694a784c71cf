//! Chunk codec implementation

use std::io::{self, Read, Seek, SeekFrom, Write};

use bytes::{BufMut, Bytes, BytesMut};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use tracing::warn;

use crate::buffer::BufferPool;
use crate::chunk::Chunk;
use crate::config::Config;
use crate::error::{RegionError, Result};
use crate::header::{sectors_for, ChunkPos, MAX_SECTOR_COUNT};

use super::{CompressionScheme, FRAME_HEADER_SIZE};

/// Compresses and decompresses record frames using pooled buffers
#[derive(Debug, Clone)]
pub struct ChunkCodec {
    buffers: BufferPool,
    level: Compression,
    max_inflated: usize,
}

impl ChunkCodec {
    pub fn new(buffers: BufferPool, compression_level: u32) -> Self {
        Self {
            buffers,
            level: Compression::new(compression_level.min(9)),
            max_inflated: Config::default().max_inflated_size,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(BufferPool::from_config(config), config.compression_level)
            .with_max_inflated(config.max_inflated_size)
    }

    /// Reject records whose payload inflates beyond `limit` bytes
    pub fn with_max_inflated(mut self, limit: usize) -> Self {
        self.max_inflated = limit;
        self
    }

    pub fn buffers(&self) -> &BufferPool {
        &self.buffers
    }

    // =========================================================================
    // Decoding
    // =========================================================================

    /// Decode the record stored at `offset_bytes`
    ///
    /// `size_bytes` is the space allocated by the header. An offset of 0 means
    /// the slot is absent; callers check that first, here it is a corrupt record.
    pub fn decode<C: Chunk, R: Read + Seek>(
        &self,
        file: &mut R,
        pos: ChunkPos,
        offset_bytes: u64,
        size_bytes: u64,
    ) -> Result<C> {
        let mut payload = self.buffers.acquire();
        self.read_payload(file, pos, offset_bytes, size_bytes, &mut payload)?;
        self.decode_payload(&payload, pos, size_bytes as usize)
    }

    /// Inflate a compressed payload and parse it into a chunk
    ///
    /// Output is capped at the configured inflate limit; a payload that
    /// inflates past it is a corrupt record.
    pub fn decode_payload<C: Chunk>(
        &self,
        payload: &[u8],
        pos: ChunkPos,
        declared_size: usize,
    ) -> Result<C> {
        let mut inflated = self.buffers.acquire();
        let limit = self.max_inflated as u64;
        ZlibDecoder::new(payload)
            .take(limit.saturating_add(1))
            .read_to_end(&mut inflated)
            .map_err(|e| corrupt(pos, format!("inflate failed: {}", e)))?;
        if inflated.len() as u64 > limit {
            return Err(corrupt(
                pos,
                format!("payload inflates beyond {} bytes", limit),
            ));
        }

        C::decode(&inflated, pos.x, pos.z, declared_size)
    }

    /// Read the compressed payload of the frame at `offset_bytes` into `out`
    pub fn read_payload<R: Read + Seek>(
        &self,
        file: &mut R,
        pos: ChunkPos,
        offset_bytes: u64,
        size_bytes: u64,
        out: &mut Vec<u8>,
    ) -> Result<()> {
        if offset_bytes == 0 {
            return Err(corrupt(pos, "offset 0 points at the header"));
        }

        file.seek(SeekFrom::Start(offset_bytes))?;
        let mut header = [0u8; FRAME_HEADER_SIZE];
        file.read_exact(&mut header).map_err(|e| truncated(pos, e))?;

        let length = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as u64;
        if length == 0 {
            return Err(corrupt(pos, "zero frame length"));
        }
        if size_bytes > 0 && length + 4 > size_bytes {
            return Err(corrupt(
                pos,
                format!("frame length {} exceeds allocated {} bytes", length, size_bytes),
            ));
        }

        let tag = header[4];
        if CompressionScheme::from_tag(tag) != Some(CompressionScheme::Deflate) {
            return Err(RegionError::UnsupportedCompression(tag));
        }

        out.clear();
        out.resize((length - 1) as usize, 0);
        file.read_exact(out).map_err(|e| truncated(pos, e))?;
        Ok(())
    }

    /// Read the whole frame at `offset_bytes`, length prefix included
    ///
    /// Used to move records without decoding them. If the length prefix does
    /// not fit the `allocated` bytes the full allocation is copied verbatim.
    pub fn read_frame<R: Read + Seek>(
        &self,
        file: &mut R,
        pos: ChunkPos,
        offset_bytes: u64,
        allocated: u64,
    ) -> Result<Bytes> {
        file.seek(SeekFrom::Start(offset_bytes))?;
        let mut prefix = [0u8; 4];
        file.read_exact(&mut prefix)?;
        let length = u32::from_be_bytes(prefix) as u64;

        if length > 0 && length + 4 <= allocated {
            let mut frame = BytesMut::zeroed((length + 4) as usize);
            frame[..4].copy_from_slice(&prefix);
            file.read_exact(&mut frame[4..])?;
            return Ok(frame.freeze());
        }

        warn!(
            x = pos.x,
            z = pos.z,
            length,
            allocated,
            "Frame length does not fit its sectors, copying raw sectors"
        );
        let mut raw = prefix.to_vec();
        (&mut *file).take(allocated.saturating_sub(4)).read_to_end(&mut raw)?;
        Ok(Bytes::from(raw))
    }

    /// Compressed payload of the frame at `offset_bytes`
    pub fn read_compressed<R: Read + Seek>(
        &self,
        file: &mut R,
        pos: ChunkPos,
        offset_bytes: u64,
        size_bytes: u64,
    ) -> Result<Bytes> {
        let mut payload = self.buffers.acquire();
        self.read_payload(file, pos, offset_bytes, size_bytes, &mut payload)?;
        Ok(Bytes::copy_from_slice(&payload))
    }

    // =========================================================================
    // Encoding
    // =========================================================================

    /// Serialize and compress a chunk into a complete frame
    ///
    /// Returns `None` for a deleted chunk: its slot is to be removed.
    pub fn encode<C: Chunk>(&self, chunk: &C) -> Result<Option<Bytes>> {
        if chunk.is_deleted() {
            return Ok(None);
        }

        let mut scratch = self.buffers.acquire();
        chunk.serialize(&mut scratch)?;

        let mut out = BytesMut::with_capacity(FRAME_HEADER_SIZE + scratch.len() / 2);
        out.put_u32(0);
        out.put_u8(CompressionScheme::Deflate.tag());

        let mut encoder = ZlibEncoder::new(out.writer(), self.level);
        encoder.write_all(&scratch)?;
        let mut frame = encoder.finish()?.into_inner();

        let sectors = sectors_for(frame.len() as u64) as usize;
        if sectors > MAX_SECTOR_COUNT {
            return Err(RegionError::RecordTooLarge {
                x: chunk.x(),
                z: chunk.z(),
                sectors,
            });
        }

        let length = (frame.len() - 4) as u32;
        frame[..4].copy_from_slice(&length.to_be_bytes());
        Ok(Some(frame.freeze()))
    }

    /// Write a complete frame at `offset_bytes`
    pub fn write_frame<W: Write + Seek>(file: &mut W, offset_bytes: u64, frame: &[u8]) -> Result<()> {
        file.seek(SeekFrom::Start(offset_bytes))?;
        file.write_all(frame)?;
        Ok(())
    }
}

impl Default for ChunkCodec {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

fn corrupt(pos: ChunkPos, reason: impl Into<String>) -> RegionError {
    RegionError::CorruptRecord {
        x: pos.x,
        z: pos.z,
        reason: reason.into(),
    }
}

fn truncated(pos: ChunkPos, err: io::Error) -> RegionError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        corrupt(pos, "record truncated by end of file")
    } else {
        RegionError::Io(err)
    }
}
