//! Bounded pool of reusable string buffers.
//!
//! `check` builds a residue copy of the input text once the overlay matches
//! have been collected. Those buffers come from a small per-language pool so
//! a burst of requests does not allocate without bound; acquisition suspends
//! until a buffer is free and honours cancellation like any other await.

use std::ops::{Deref, DerefMut};
use std::sync::Mutex;

use tokio::sync::{AcquireError, Semaphore, SemaphorePermit};

pub struct BufferPool {
    permits: Semaphore,
    buffers: Mutex<Vec<String>>,
}

impl BufferPool {
    pub fn new(capacity: usize) -> BufferPool {
        BufferPool {
            permits: Semaphore::new(capacity),
            buffers: Mutex::new(Vec::with_capacity(capacity)),
        }
    }

    /// Waits for a free slot and hands out a cleared buffer.
    pub async fn acquire(&self) -> Result<PooledBuffer<'_>, AcquireError> {
        let permit = self.permits.acquire().await?;
        let buffer = lock_ignore_poison(&self.buffers).pop().unwrap_or_default();

        Ok(PooledBuffer {
            pool: self,
            buffer,
            _permit: permit,
        })
    }
}

/// A buffer on loan from a [`BufferPool`]; returned on drop.
pub struct PooledBuffer<'a> {
    pool: &'a BufferPool,
    buffer: String,
    _permit: SemaphorePermit<'a>,
}

impl Deref for PooledBuffer<'_> {
    type Target = String;

    fn deref(&self) -> &String {
        &self.buffer
    }
}

impl DerefMut for PooledBuffer<'_> {
    fn deref_mut(&mut self) -> &mut String {
        &mut self.buffer
    }
}

impl Drop for PooledBuffer<'_> {
    fn drop(&mut self) {
        let mut buffer = std::mem::take(&mut self.buffer);
        buffer.clear();
        lock_ignore_poison(&self.pool.buffers).push(buffer);
    }
}

// The pooled values are plain strings, so a panic while holding the lock
// cannot leave them in a state worth poisoning over.
fn lock_ignore_poison<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
