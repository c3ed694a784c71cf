//! Cache Module
//!
//! In-memory write-back cache of decoded chunks, keyed by slot.
//!
//! ## Concurrency
//! One coarse `Mutex` guards the map. It is held only for the map operation
//! itself, never across file I/O: a read-through miss releases the lock,
//! loads, and re-inserts, keeping whichever record won the race.

mod map;

pub use map::ChunkCache;
