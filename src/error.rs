//! Error types for regionstore
//!
//! Provides a unified error type for all region operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using RegionError
pub type Result<T> = std::result::Result<T, RegionError>;

/// Unified error type for region file operations
#[derive(Debug, Error)]
pub enum RegionError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    /// Seek/read/write/truncate failure. Fatal to the enclosing operation.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Region file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Invalid region file name: {0}")]
    InvalidRegionName(String),

    // -------------------------------------------------------------------------
    // Format Errors
    // -------------------------------------------------------------------------
    #[error("Corrupt header: {0}")]
    CorruptHeader(String),

    #[error("Corrupt record at chunk ({x}, {z}): {reason}")]
    CorruptRecord { x: i32, z: i32, reason: String },

    #[error("Unsupported compression scheme: {0}")]
    UnsupportedCompression(u8),

    #[error("Record for chunk ({x}, {z}) needs {sectors} sectors (max 255)")]
    RecordTooLarge { x: i32, z: i32, sectors: usize },

    // -------------------------------------------------------------------------
    // Record Collaborator Errors
    // -------------------------------------------------------------------------
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Concurrency Errors
    // -------------------------------------------------------------------------
    #[error("Worker pool error: {0}")]
    WorkerPool(String),
}

impl RegionError {
    /// Whether this error only affects a single record.
    ///
    /// Record-level failures are logged and skipped during region scans and
    /// flushes; anything else aborts the enclosing operation.
    pub fn is_record_error(&self) -> bool {
        matches!(
            self,
            RegionError::CorruptRecord { .. }
                | RegionError::UnsupportedCompression(_)
                | RegionError::RecordTooLarge { .. }
                | RegionError::Parse(_)
                | RegionError::Serialization(_)
        )
    }
}
