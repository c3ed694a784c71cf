//! Configuration for regionstore
//!
//! Centralized configuration with sensible defaults.

/// Main configuration for a region file
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Buffer Pool Configuration
    // -------------------------------------------------------------------------
    /// Initial capacity of pooled buffers used for inflating records (bytes)
    pub inflate_buffer_capacity: usize,

    /// Initial capacity of pooled scratch buffers used for serializing records (bytes)
    pub serialize_buffer_capacity: usize,

    /// Max idle buffers kept by the pool
    pub max_pooled_buffers: usize,

    /// Buffers that grew beyond this size are dropped instead of pooled (bytes)
    pub max_retained_buffer_size: usize,

    /// Largest decompressed payload accepted from a record (bytes)
    pub max_inflated_size: usize,

    // -------------------------------------------------------------------------
    // Compression Configuration
    // -------------------------------------------------------------------------
    /// Deflate level used when encoding records (0-9)
    pub compression_level: u32,

    // -------------------------------------------------------------------------
    // Flush Configuration
    // -------------------------------------------------------------------------
    /// Threads for the ad hoc compression pool when flush is given no pool.
    /// `None` uses the global rayon pool.
    pub flush_threads: Option<usize>,

    /// fsync file data after every successful flush
    pub sync_on_flush: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            inflate_buffer_capacity: 4096,
            serialize_buffer_capacity: 4096,
            max_pooled_buffers: 64,
            max_retained_buffer_size: 1024 * 1024, // 1 MB
            max_inflated_size: 32 * 1024 * 1024,   // 32 MB
            compression_level: 6,
            flush_threads: None,
            sync_on_flush: true,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the initial inflate buffer capacity (in bytes)
    pub fn inflate_buffer_capacity(mut self, size: usize) -> Self {
        self.config.inflate_buffer_capacity = size;
        self
    }

    /// Set the initial serialize scratch capacity (in bytes)
    pub fn serialize_buffer_capacity(mut self, size: usize) -> Self {
        self.config.serialize_buffer_capacity = size;
        self
    }

    /// Set the maximum number of idle pooled buffers
    pub fn max_pooled_buffers(mut self, count: usize) -> Self {
        self.config.max_pooled_buffers = count.max(1);
        self
    }

    /// Set the size above which buffers are not returned to the pool
    pub fn max_retained_buffer_size(mut self, size: usize) -> Self {
        self.config.max_retained_buffer_size = size;
        self
    }

    /// Set the largest decompressed payload a record may have
    pub fn max_inflated_size(mut self, size: usize) -> Self {
        self.config.max_inflated_size = size;
        self
    }

    /// Set the deflate compression level (clamped to 0-9)
    pub fn compression_level(mut self, level: u32) -> Self {
        self.config.compression_level = level.min(9);
        self
    }

    /// Set the thread count of the ad hoc flush pool
    pub fn flush_threads(mut self, threads: usize) -> Self {
        self.config.flush_threads = Some(threads.max(1));
        self
    }

    /// Enable or disable fsync after flush
    pub fn sync_on_flush(mut self, sync: bool) -> Self {
        self.config.sync_on_flush = sync;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
