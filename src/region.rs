//! Region Module
//!
//! `RegionFile` owns the file handle, the header and the chunk cache, and
//! exposes chunk reads, writes, scans, flush and close.
//!
//! ## Concurrency Model
//!
//! - **File + header**: one `state` mutex per region. Reads that touch the
//!   file and the sequential phase of a flush are serialized on it.
//!   Different regions never contend.
//! - **Cache**: its own mutex, held only for map operations. When both are
//!   held the order is `state` then cache.
//! - **Records**: each cached record has its own mutex (`ChunkRef`). No
//!   record lock is ever requested while `state` is held, so a caller may
//!   hold a record lock and still read other chunks.
//! - **Flush**: a separate `flush_lock` serializes whole flushes. Records are
//!   locked and compressed under it, before `state` is taken; saved records
//!   are marked after `state` is released.
//!
//! Visitors passed to the `for_each_*` methods run with no region lock held
//! and may call back into the region.

use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use parking_lot::Mutex;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, error, warn};

use crate::cache::ChunkCache;
use crate::chunk::{Chunk, ChunkRef};
use crate::codec::ChunkCodec;
use crate::compaction::{collect_dirty, CompactingWriter, DirtySet, FlushStats};
use crate::config::Config;
use crate::error::{RegionError, Result};
use crate::header::{sectors_for, ChunkPos, HeaderTable, Location, SlotKey, SlotLocation, REGION_WIDTH};

/// Result of a full-region scan
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Records decoded and passed to the visitor
    pub visited: usize,
    /// Records that could not be decoded, with the reason
    pub failures: Vec<(ChunkPos, RegionError)>,
}

/// File handle and header, guarded together
struct RegionState {
    file: Option<File>,
    header: HeaderTable,
}

impl RegionState {
    /// Open the file and load the header if not already done
    fn ensure_open(&mut self, path: &Path) -> Result<(&mut File, &mut HeaderTable)> {
        if self.file.is_none() {
            let mut file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(path)?;
            self.header = HeaderTable::load(&mut file)?;
            debug!(
                path = %path.display(),
                chunks = self.header.occupied_count(),
                "Region opened"
            );
            self.file = Some(file);
        }

        let file = self
            .file
            .as_mut()
            .ok_or_else(|| RegionError::Io(io::Error::other("region file not open")))?;
        Ok((file, &mut self.header))
    }
}

/// A region file: up to 1024 chunks addressed by local coordinates
pub struct RegionFile<C> {
    path: PathBuf,
    x: i32,
    z: i32,
    config: Config,
    codec: ChunkCodec,
    state: Mutex<RegionState>,
    /// Serializes whole flushes, compression included
    flush_lock: Mutex<()>,
    cache: ChunkCache<C>,
}

impl<C: Chunk> RegionFile<C> {
    // =========================================================================
    // Construction
    // =========================================================================

    /// Open an existing region file named `r.<X>.<Z>.mca`
    ///
    /// The file itself is opened lazily on first access.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(path, Config::default())
    }

    pub fn open_with_config(path: impl AsRef<Path>, config: Config) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(RegionError::FileNotFound(path.to_path_buf()));
        }
        let (x, z) = Self::parse_file_name(path)?;
        Ok(Self::new(path.to_path_buf(), x, z, config))
    }

    /// Open the region `(x, z)` inside `dir`
    pub fn open_in(dir: impl AsRef<Path>, x: i32, z: i32) -> Result<Self> {
        Self::open(dir.as_ref().join(Self::file_name(x, z)))
    }

    /// Create an empty region file (8 KiB header) or open an existing one
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Self::create_with_config(path, Config::default())
    }

    pub fn create_with_config(path: impl AsRef<Path>, config: Config) -> Result<Self> {
        let path = path.as_ref();
        let (x, z) = Self::parse_file_name(path)?;
        let region = Self::new(path.to_path_buf(), x, z, config);
        region.init()?;
        Ok(region)
    }

    /// Create the region `(x, z)` inside `dir`
    pub fn create_in(dir: impl AsRef<Path>, x: i32, z: i32) -> Result<Self> {
        Self::create(dir.as_ref().join(Self::file_name(x, z)))
    }

    fn new(path: PathBuf, x: i32, z: i32, config: Config) -> Self {
        Self {
            path,
            x,
            z,
            codec: ChunkCodec::from_config(&config),
            config,
            state: Mutex::new(RegionState {
                file: None,
                header: HeaderTable::empty(),
            }),
            flush_lock: Mutex::new(()),
            cache: ChunkCache::new(),
        }
    }

    /// File name of region `(x, z)`
    pub fn file_name(x: i32, z: i32) -> String {
        format!("r.{}.{}.mca", x, z)
    }

    /// Region coordinates from a `r.<X>.<Z>.mca` file name
    pub fn parse_file_name(path: &Path) -> Result<(i32, i32)> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let coords = {
            let parts: Vec<&str> = name.split('.').collect();
            match parts.as_slice() {
                ["r", x, z, "mca"] => x.parse::<i32>().ok().zip(z.parse::<i32>().ok()),
                _ => None,
            }
        };
        coords.ok_or(RegionError::InvalidRegionName(name))
    }

    /// Open the file and load its header now rather than on first access
    ///
    /// A file shorter than the header is extended with an empty one.
    pub fn init(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_open(&self.path)?;
        Ok(())
    }

    // =========================================================================
    // Chunk Access
    // =========================================================================

    /// Get a chunk, reading it from the file on a cache miss
    ///
    /// Returns `Ok(None)` if the slot is empty.
    pub fn get_chunk(&self, cx: i32, cz: i32) -> Result<Option<ChunkRef<C>>> {
        self.cache.get_or_load(cx, cz, || self.load_chunk(cx, cz))
    }

    /// Read a chunk from the file, replacing any cached copy
    pub fn read_chunk(&self, cx: i32, cz: i32) -> Result<Option<ChunkRef<C>>> {
        Ok(self.load_chunk(cx, cz)?.map(|chunk| self.cache.put(chunk)))
    }

    /// Cached copy of a chunk, without touching the file
    pub fn get_cached_chunk(&self, cx: i32, cz: i32) -> Option<ChunkRef<C>> {
        self.cache.get(cx, cz)
    }

    /// Cache a chunk; it is written on the next flush if modified
    pub fn put_chunk(&self, chunk: C) -> ChunkRef<C> {
        self.cache.put(chunk)
    }

    /// Drop a chunk from the cache; unflushed changes are lost
    pub fn uncache(&self, cx: i32, cz: i32) {
        self.cache.remove(cx, cz);
    }

    /// Snapshot of every cached chunk
    pub fn cached_chunks(&self) -> Vec<ChunkRef<C>> {
        self.cache
            .snapshot()
            .into_iter()
            .map(|(_, chunk)| chunk)
            .collect()
    }

    pub fn for_each_cached_chunk<F: FnMut(ChunkRef<C>)>(&self, visitor: F) {
        self.cached_chunks().into_iter().for_each(visitor);
    }

    /// Compressed payload of a chunk as stored, without decoding
    pub fn chunk_frame(&self, cx: i32, cz: i32) -> Result<Option<Bytes>> {
        let mut state = self.state.lock();
        let (file, header) = state.ensure_open(&self.path)?;
        match header.locate(cx, cz) {
            Some((offset, size)) => self
                .codec
                .read_compressed(file, ChunkPos::new(cx, cz), offset, size)
                .map(Some),
            None => Ok(None),
        }
    }

    fn load_chunk(&self, cx: i32, cz: i32) -> Result<Option<C>> {
        let mut state = self.state.lock();
        let (file, header) = state.ensure_open(&self.path)?;
        match header.locate(cx, cz) {
            Some((offset, size)) => self
                .codec
                .decode(file, ChunkPos::new(cx, cz), offset, size)
                .map(Some),
            None => Ok(None),
        }
    }

    // =========================================================================
    // Header Queries
    // =========================================================================

    /// Location entry of a chunk; `None` if absent
    pub fn location(&self, cx: i32, cz: i32) -> Result<Option<Location>> {
        let mut state = self.state.lock();
        let (_, header) = state.ensure_open(&self.path)?;
        let loc = header.location(SlotKey::new(cx, cz));
        Ok((!loc.is_empty()).then_some(loc))
    }

    /// Byte offset of a chunk's record, 0 if absent
    pub fn offset(&self, cx: i32, cz: i32) -> Result<u64> {
        Ok(self.location(cx, cz)?.map_or(0, Location::offset_bytes))
    }

    /// Bytes allocated to a chunk's record, 0 if absent
    pub fn size(&self, cx: i32, cz: i32) -> Result<u64> {
        Ok(self.location(cx, cz)?.map_or(0, Location::size_bytes))
    }

    /// Last-write timestamp of a chunk (Unix seconds), 0 if absent
    pub fn timestamp(&self, cx: i32, cz: i32) -> Result<u32> {
        let mut state = self.state.lock();
        let (_, header) = state.ensure_open(&self.path)?;
        Ok(header.timestamp(SlotKey::new(cx, cz)))
    }

    /// Number of occupied slots
    pub fn chunk_count(&self) -> Result<usize> {
        let mut state = self.state.lock();
        let (_, header) = state.ensure_open(&self.path)?;
        Ok(header.occupied_count())
    }

    /// Current file length in bytes
    pub fn file_len(&self) -> Result<u64> {
        let mut state = self.state.lock();
        let (file, _) = state.ensure_open(&self.path)?;
        Ok(file.seek(SeekFrom::End(0))?)
    }

    // =========================================================================
    // Iteration
    // =========================================================================

    /// Visit every occupied slot in table order, without decoding
    pub fn for_each_location<F: FnMut(SlotLocation)>(&self, visitor: F) -> Result<()> {
        let entries: Vec<SlotLocation> = {
            let mut state = self.state.lock();
            let (_, header) = state.ensure_open(&self.path)?;
            header.occupied().collect()
        };
        entries.into_iter().for_each(visitor);
        Ok(())
    }

    /// Visit occupied slots in ascending file-offset order, without decoding
    ///
    /// Entries pointing into the header, past the end of the file, or into
    /// another record are logged and skipped.
    pub fn for_each_sorted_chunk<F: FnMut(SlotLocation)>(&self, visitor: F) -> Result<()> {
        let entries = {
            let mut state = self.state.lock();
            let (file, header) = state.ensure_open(&self.path)?;
            let file_len = file.seek(SeekFrom::End(0))?;
            header.sorted_layout(sectors_for(file_len) as u32).entries
        };
        entries.into_iter().for_each(visitor);
        Ok(())
    }

    /// Decode and visit every chunk stored in the region
    ///
    /// Records that fail to decode are logged and reported, not fatal; I/O
    /// errors abort the scan.
    pub fn for_each_chunk<F: FnMut(ChunkRef<C>)>(&self, mut visitor: F) -> Result<ScanReport> {
        let mut slots = Vec::new();
        self.for_each_location(|entry| slots.push(entry.slot))?;

        let mut report = ScanReport::default();
        for slot in slots {
            let pos = self.world_pos(slot);
            match self.get_chunk(pos.x, pos.z) {
                Ok(Some(chunk)) => {
                    report.visited += 1;
                    visitor(chunk);
                }
                Ok(None) => {}
                Err(e) if e.is_record_error() => {
                    warn!(x = pos.x, z = pos.z, error = %e, "Skipping unreadable chunk");
                    report.failures.push((pos, e));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(report)
    }

    /// World chunk coordinates of a slot in this region
    fn world_pos(&self, slot: SlotKey) -> ChunkPos {
        ChunkPos::new(
            self.x * REGION_WIDTH + slot.local_x(),
            self.z * REGION_WIDTH + slot.local_z(),
        )
    }

    // =========================================================================
    // Flush / Close
    // =========================================================================

    /// Write all modified and deleted cached chunks to the file and compact it
    ///
    /// Compression runs on `pool` if given, otherwise on an ad hoc pool
    /// (`Config::flush_threads`) or the global rayon pool. The file lock is
    /// taken only after compression, for the layout rewrite. A no-op when no
    /// cached chunk is dirty.
    ///
    /// Every cached record is locked in turn; do not call this while holding
    /// a `ChunkRef` lock.
    ///
    /// An I/O error aborts the flush and is returned. The in-memory header
    /// and cache are left as before, but the file may hold a partially
    /// rewritten layout: there is no journal.
    pub fn flush(&self, pool: Option<&ThreadPool>) -> Result<FlushStats> {
        let _flushing = self.flush_lock.lock();
        self.flush_inner(pool, false)
    }

    /// Flush, then release the file handle
    ///
    /// The region reopens the file on its next access.
    pub fn close(&self, pool: Option<&ThreadPool>) -> Result<FlushStats> {
        let _flushing = self.flush_lock.lock();
        self.flush_inner(pool, true)
    }

    /// Release the file handle and forget all cached chunks without flushing
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.file = None;
        state.header = HeaderTable::empty();
        self.cache.clear();
    }

    fn flush_inner(&self, pool: Option<&ThreadPool>, close: bool) -> Result<FlushStats> {
        let ad_hoc;
        let pool = match (pool, self.config.flush_threads) {
            (Some(pool), _) => Some(pool),
            (None, Some(threads)) => {
                ad_hoc = ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .map_err(|e| RegionError::WorkerPool(e.to_string()))?;
                Some(&ad_hoc)
            }
            (None, _) => None,
        };

        // Record locks are taken here, before the file lock
        let mut dirty = collect_dirty(self.cache.snapshot(), &self.codec, pool);

        let stats = {
            let mut state = self.state.lock();
            if close && state.file.is_none() && !dirty.had_dirty() {
                return Ok(FlushStats::default());
            }
            let stats = self.write_locked(&mut state, &mut dirty)?;
            if close {
                state.file = None;
                state.header = HeaderTable::empty();
                debug!(path = %self.path.display(), "Region closed");
            }
            stats
        };

        dirty.commit(&self.cache);
        Ok(stats)
    }

    /// Sequential phase: rewrite the layout under the file lock
    fn write_locked(&self, state: &mut RegionState, dirty: &mut DirtySet<C>) -> Result<FlushStats> {
        let (file, header) = state.ensure_open(&self.path)?;
        dirty.classify(header);

        if dirty.is_empty() {
            return Ok(FlushStats {
                failed: dirty.failed,
                file_len: file.seek(SeekFrom::End(0))?,
                ..FlushStats::default()
            });
        }

        let mut working = header.clone();
        let stats = match CompactingWriter::new(file, &mut working, &self.codec).write(dirty) {
            Ok(stats) => stats,
            Err(e) => {
                error!(
                    path = %self.path.display(),
                    error = %e,
                    "Flush failed, region file may be partially rewritten"
                );
                return Err(e);
            }
        };

        if self.config.sync_on_flush {
            file.sync_data()?;
        }

        *header = working;

        debug!(
            path = %self.path.display(),
            rewritten = stats.rewritten,
            relocated = stats.relocated,
            removed = stats.removed,
            appended = stats.appended,
            file_len = stats.file_len,
            "Region flushed"
        );
        Ok(stats)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Region X coordinate
    pub fn x(&self) -> i32 {
        self.x
    }

    /// Region Z coordinate
    pub fn z(&self) -> i32 {
        self.z
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Number of cached chunks
    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }
}
