//! Scratch buffer ownership and pooling
//!
//! Stages borrow one buffer per role (carry buffer, packet buffer, PCM
//! buffer) for their whole lifetime and hand it back exactly once when
//! they are disposed. Pools are injected at construction, so rent/return
//! accounting is per pool instance rather than process-wide.

use crossbeam::queue::ArrayQueue;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::ResourceError;

/// Source of reusable byte buffers
pub trait BufferPool: Send + Sync {
    /// Rent a zero-initialised buffer of exactly `len` bytes
    fn rent(&self, len: usize) -> Result<Vec<u8>, ResourceError>;

    /// Return a buffer previously obtained from `rent`
    fn give_back(&self, buffer: Vec<u8>);
}

/// Pool handle as stored by stages
pub type SharedBufferPool = Arc<dyn BufferPool>;

/// Bounded buffer pool with rent/return instrumentation
pub struct SharedPool {
    free: ArrayQueue<Vec<u8>>,
    /// Maximum number of buffers rented at once (0 = unlimited)
    max_outstanding: usize,
    outstanding: AtomicUsize,
    rented: AtomicUsize,
    returned: AtomicUsize,
}

impl SharedPool {
    /// Create a pool retaining up to `capacity` idle buffers
    pub fn new(capacity: usize) -> Self {
        Self::with_limit(capacity, 0)
    }

    /// Create a pool that refuses to rent more than `max_outstanding` buffers
    pub fn with_limit(capacity: usize, max_outstanding: usize) -> Self {
        Self {
            free: ArrayQueue::new(capacity.max(1)),
            max_outstanding,
            outstanding: AtomicUsize::new(0),
            rented: AtomicUsize::new(0),
            returned: AtomicUsize::new(0),
        }
    }

    /// Create a shared pool handle
    pub fn shared(capacity: usize) -> Arc<Self> {
        Arc::new(Self::new(capacity))
    }

    /// Get statistics
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            rented: self.rented.load(Ordering::Relaxed),
            returned: self.returned.load(Ordering::Relaxed),
            outstanding: self.outstanding.load(Ordering::Relaxed),
            idle: self.free.len(),
        }
    }

    fn reserve_slot(&self) -> Result<(), ResourceError> {
        if self.max_outstanding == 0 {
            self.outstanding.fetch_add(1, Ordering::AcqRel);
            return Ok(());
        }

        self.outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < self.max_outstanding).then_some(current + 1)
            })
            .map(|_| ())
            .map_err(|current| ResourceError::PoolExhausted {
                outstanding: current,
                limit: self.max_outstanding,
            })
    }
}

impl BufferPool for SharedPool {
    fn rent(&self, len: usize) -> Result<Vec<u8>, ResourceError> {
        self.reserve_slot()?;

        let buffer = match self.free.pop() {
            Some(mut buffer) => {
                buffer.clear();
                try_zeroed(&mut buffer, len).map(|()| buffer)
            }
            None => allocate(len),
        };

        match buffer {
            Ok(buffer) => {
                self.rented.fetch_add(1, Ordering::Relaxed);
                Ok(buffer)
            }
            Err(e) => {
                self.outstanding.fetch_sub(1, Ordering::AcqRel);
                Err(e)
            }
        }
    }

    fn give_back(&self, buffer: Vec<u8>) {
        self.returned.fetch_add(1, Ordering::Relaxed);
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
        // Idle list full: let the buffer go
        let _ = self.free.push(buffer);
    }
}

/// Pool statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub rented: usize,
    pub returned: usize,
    pub outstanding: usize,
    pub idle: usize,
}

impl PoolStats {
    /// Every rented buffer has been returned
    pub fn is_balanced(&self) -> bool {
        self.rented == self.returned && self.outstanding == 0
    }
}

/// Allocate a zeroed buffer, reporting failure instead of aborting
pub fn allocate(len: usize) -> Result<Vec<u8>, ResourceError> {
    let mut buffer = Vec::new();
    try_zeroed(&mut buffer, len)?;
    Ok(buffer)
}

fn try_zeroed(buffer: &mut Vec<u8>, len: usize) -> Result<(), ResourceError> {
    buffer
        .try_reserve_exact(len)
        .map_err(|_| ResourceError::AllocationFailed(len))?;
    buffer.resize(len, 0);
    Ok(())
}

/// A fixed-length byte buffer owned by one stage for its whole lifetime.
///
/// Pooled buffers go back to their pool when the scratch buffer is dropped,
/// which happens exactly once.
pub struct ScratchBuffer {
    data: Vec<u8>,
    pool: Option<SharedBufferPool>,
}

impl ScratchBuffer {
    /// Borrow from `pool`, or allocate privately when no pool is given
    pub fn acquire(len: usize, pool: Option<&SharedBufferPool>) -> Result<Self, ResourceError> {
        match pool {
            Some(pool) => {
                let data = pool.rent(len)?;
                Ok(Self {
                    data,
                    pool: Some(pool.clone()),
                })
            }
            None => Ok(Self {
                data: allocate(len)?,
                pool: None,
            }),
        }
    }

    pub fn is_pooled(&self) -> bool {
        self.pool.is_some()
    }
}

impl Deref for ScratchBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for ScratchBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl Drop for ScratchBuffer {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.give_back(std::mem::take(&mut self.data));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rent_and_return() {
        let pool = SharedPool::shared(4);
        let shared: SharedBufferPool = pool.clone();

        let a = ScratchBuffer::acquire(64, Some(&shared)).unwrap();
        let b = ScratchBuffer::acquire(32, Some(&shared)).unwrap();
        assert_eq!(a.len(), 64);
        assert_eq!(b.len(), 32);
        assert!(a.is_pooled());
        assert_eq!(pool.stats().outstanding, 2);

        drop(a);
        drop(b);

        let stats = pool.stats();
        assert!(stats.is_balanced());
        assert_eq!(stats.rented, 2);
        assert_eq!(stats.idle, 2);
    }

    #[test]
    fn test_reused_buffer_is_zeroed() {
        let pool: SharedBufferPool = SharedPool::shared(1);

        let mut first = ScratchBuffer::acquire(8, Some(&pool)).unwrap();
        first.copy_from_slice(&[7; 8]);
        drop(first);

        let second = ScratchBuffer::acquire(16, Some(&pool)).unwrap();
        assert_eq!(&second[..], &[0; 16]);
    }

    #[test]
    fn test_pool_exhaustion() {
        let pool = Arc::new(SharedPool::with_limit(2, 1));
        let shared: SharedBufferPool = pool.clone();

        let held = ScratchBuffer::acquire(8, Some(&shared)).unwrap();
        let err = ScratchBuffer::acquire(8, Some(&shared)).err();
        assert_eq!(
            err,
            Some(ResourceError::PoolExhausted {
                outstanding: 1,
                limit: 1
            })
        );

        drop(held);
        assert!(ScratchBuffer::acquire(8, Some(&shared)).is_ok());
        assert!(pool.stats().is_balanced());
    }

    #[test]
    fn test_unpooled_buffer() {
        let buffer = ScratchBuffer::acquire(10, None).unwrap();
        assert!(!buffer.is_pooled());
        assert_eq!(buffer.len(), 10);
    }
}
