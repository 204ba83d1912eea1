//! Trivial buffer pool interface. A full pooling allocator is out of
//! scope for this crate; this is the minimal interface so other layers
//! can accept a pool without depending on one.

use super::ByteBuffer;

pub trait Pool: Send + Sync {
    fn acquire(&self, size: usize) -> ByteBuffer;
    fn release(&self, buf: ByteBuffer);
}

/// Always allocates fresh, never recycles. The default used everywhere
/// a [`Pool`] is accepted but the caller doesn't supply one.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPool;

impl Pool for NoopPool {
    fn acquire(&self, size: usize) -> ByteBuffer {
        ByteBuffer::with_capacity(size)
    }

    fn release(&self, _buf: ByteBuffer) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_pool_allocates_requested_capacity() {
        let pool = NoopPool;
        let buf = pool.acquire(128);
        assert_eq!(buf.capacity(), 128);
        pool.release(buf);
    }
}
