//! Codec Module
//!
//! Reads and writes record frames, and converts between frames and
//! decoded chunks.
//!
//! ## Frame Format
//! ```text
//! ┌──────────────┬────────────┬──────────────────────────┬─────────┐
//! │ Length (4 BE)│ Scheme (1) │ Payload (Length - 1)     │ Padding │
//! └──────────────┴────────────┴──────────────────────────┴─────────┘
//! ```
//! `Length` covers the scheme byte plus the payload. A frame occupies
//! `ceil((Length + 4) / 4096)` sectors; padding up to the sector boundary is
//! unspecified. Only scheme 2 (zlib deflate) is supported.

mod frame;

pub use frame::ChunkCodec;

/// Length prefix (4) + scheme tag (1)
pub const FRAME_HEADER_SIZE: usize = 5;

/// Compression scheme tags found in record frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionScheme {
    Gzip = 1,
    Deflate = 2,
    Uncompressed = 3,
}

impl CompressionScheme {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Gzip),
            2 => Some(Self::Deflate),
            3 => Some(Self::Uncompressed),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        self as u8
    }
}
