//! Buffer Pool Module
//!
//! Reusable scratch buffers for record decompression and compression.
//!
//! ## Responsibilities
//! - Hand out exclusively owned byte buffers to one encode/decode call
//! - Return buffers to the pool when the call finishes (on drop)
//! - Bound memory: cap the number of idle buffers and drop oversized ones
//!
//! Buffers are never shared between tasks: a `PooledBuffer` is moved into
//! the task that uses it and goes back to the queue when it is dropped.

mod pool;

pub use pool::{BufferPool, PooledBuffer};
