//! # regionstore
//!
//! A storage engine for region files: up to 1024 independently compressed
//! chunks, addressed by a 32×32 local grid, inside one seekable file.
//! - Random-access reads by chunk coordinate
//! - Write-back cache of decoded chunks
//! - Compacting flush with parallel compression
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        RegionFile                            │
//! │          (file + header mutex, chunk cache mutex)            │
//! └──────────┬──────────────────────────────────┬───────────────┘
//!            │ get_chunk                         │ flush
//!            ▼                                   ▼
//!   ┌─────────────┐   miss   ┌─────────────┐   ┌──────────────────┐
//!   │ ChunkCache  │─────────▶│ HeaderTable │◀──│ CompactingWriter │
//!   └─────────────┘          └──────┬──────┘   │ (rayon compress, │
//!                                   │          │  sequential scan)│
//!                                   ▼          └────────┬─────────┘
//!                            ┌─────────────┐            │
//!                            │ ChunkCodec  │◀───────────┘
//!                            │ (zlib, pool)│
//!                            └──────┬──────┘
//!                                   ▼
//!                            ┌─────────────┐
//!                            │ BufferPool  │
//!                            └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod buffer;
pub mod header;
pub mod chunk;
pub mod codec;
pub mod cache;
pub mod compaction;
pub mod region;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{RegionError, Result};
pub use config::Config;
pub use chunk::{Chunk, ChunkRef, RawChunk};
pub use compaction::FlushStats;
pub use header::{ChunkPos, Location, SlotKey, SlotLocation};
pub use region::{RegionFile, ScanReport};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of regionstore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
