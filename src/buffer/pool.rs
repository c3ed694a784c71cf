//! Buffer pool implementation
//!
//! Lock-free queue of idle `Vec<u8>` buffers.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crossbeam::queue::ArrayQueue;

use crate::config::Config;

/// Pool of reusable byte buffers
///
/// Cloning is cheap and shares the same queue.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    /// Idle buffers, ready to hand out
    idle: ArrayQueue<Vec<u8>>,
    /// Capacity of freshly allocated buffers
    initial_capacity: usize,
    /// Buffers with a larger capacity are not kept
    max_retained: usize,
}

impl BufferPool {
    /// Create a pool holding at most `max_idle` idle buffers
    pub fn new(max_idle: usize, initial_capacity: usize, max_retained: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                idle: ArrayQueue::new(max_idle.max(1)),
                initial_capacity,
                max_retained,
            }),
        }
    }

    /// Create a pool sized from the region config
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.max_pooled_buffers,
            config
                .inflate_buffer_capacity
                .max(config.serialize_buffer_capacity),
            config.max_retained_buffer_size,
        )
    }

    /// Take an empty buffer from the pool, allocating one if none is idle
    pub fn acquire(&self) -> PooledBuffer {
        let buf = self
            .inner
            .idle
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(self.inner.initial_capacity));
        PooledBuffer {
            buf,
            pool: Arc::clone(&self.inner),
        }
    }

    /// Number of idle buffers currently held
    pub fn idle_count(&self) -> usize {
        self.inner.idle.len()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("idle", &self.inner.idle.len())
            .field("max_idle", &self.inner.idle.capacity())
            .finish()
    }
}

/// A buffer borrowed from a `BufferPool`
///
/// Dereferences to `Vec<u8>`; returned to the pool (cleared) on drop.
pub struct PooledBuffer {
    buf: Vec<u8>,
    pool: Arc<PoolInner>,
}

impl Deref for PooledBuffer {
    type Target = Vec<u8>;

    fn deref(&self) -> &Vec<u8> {
        &self.buf
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let mut buf = std::mem::take(&mut self.buf);
        if buf.capacity() > self.pool.max_retained {
            return;
        }
        buf.clear();
        // Pool full: let the buffer go
        let _ = self.pool.idle.push(buf);
    }
}
