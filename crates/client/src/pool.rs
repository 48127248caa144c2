//! Bounded pool of reusable byte buffers.
//!
//! Buffers are cleared when they come back to the pool, never by the caller,
//! so a buffer handed out by [`BufferPool::acquire`] is always empty.

use std::{
    ops::{Deref, DerefMut},
    sync::Mutex,
};

const DEFAULT_MAX_POOLED: usize = 64;
const DEFAULT_INITIAL_CAPACITY: usize = 4 * 1024;
const DEFAULT_MAX_RETAINED_CAPACITY: usize = 64 * 1024;

pub struct BufferPool {
    slots: Mutex<Vec<Vec<u8>>>,
    max_pooled: usize,
    initial_capacity: usize,
    /// Buffers that grew beyond this are dropped instead of pooled.
    max_retained_capacity: usize,
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_POOLED)
    }
}

impl BufferPool {
    #[must_use]
    pub fn new(max_pooled: usize) -> Self {
        Self::with_limits(
            max_pooled,
            DEFAULT_INITIAL_CAPACITY,
            DEFAULT_MAX_RETAINED_CAPACITY,
        )
    }

    #[must_use]
    pub fn with_limits(
        max_pooled: usize,
        initial_capacity: usize,
        max_retained_capacity: usize,
    ) -> Self {
        Self {
            slots: Mutex::new(Vec::with_capacity(max_pooled)),
            max_pooled,
            initial_capacity,
            max_retained_capacity,
        }
    }

    pub fn acquire(&self) -> PooledBuffer<'_> {
        let buf = self
            .slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(self.initial_capacity));
        PooledBuffer { buf, pool: self }
    }

    /// Number of idle buffers currently held.
    pub fn available(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn release(&self, mut buf: Vec<u8>) {
        if buf.capacity() > self.max_retained_capacity {
            return;
        }
        buf.clear();
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        if slots.len() < self.max_pooled {
            slots.push(buf);
        }
    }
}

/// A buffer on loan from a [`BufferPool`]; returned on drop.
pub struct PooledBuffer<'a> {
    buf: Vec<u8>,
    pool: &'a BufferPool,
}

impl Deref for PooledBuffer<'_> {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        &self.buf
    }
}

impl DerefMut for PooledBuffer<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buf
    }
}

impl Drop for PooledBuffer<'_> {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.buf));
    }
}
