// A small pool of reusable write buffers, replacing the original
// client's per-command 16 KB stack buffer (spec §9: "pooled or
// arena-allocated buffer with the same small-path/large-path split").
// Buffers below `INLINE_CAPACITY` are served from the pool; anything
// larger is allocated fresh and simply dropped instead of returned,
// so one oversized batch command can't permanently bloat the pool.

use parking_lot::Mutex;

use crate::buf::WriteBuf;

pub const INLINE_CAPACITY: usize = 16 * 1024;

pub struct BufferPool {
    free: Mutex<Vec<Vec<u8>>>,
    max_pooled: usize,
}

impl BufferPool {
    pub fn new(max_pooled: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            max_pooled,
        }
    }

    pub fn checkout(&self) -> PooledBuf<'_> {
        let bytes = self
            .free
            .lock()
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(INLINE_CAPACITY));
        PooledBuf {
            pool: self,
            buf: Some(WriteBuf::from_vec(bytes)),
        }
    }

    fn give_back(&self, mut bytes: Vec<u8>) {
        bytes.clear();
        if bytes.capacity() <= INLINE_CAPACITY {
            let mut free = self.free.lock();
            if free.len() < self.max_pooled {
                free.push(bytes);
            }
        }
        // Oversized buffers are simply dropped.
    }
}

pub struct PooledBuf<'a> {
    pool: &'a BufferPool,
    buf: Option<WriteBuf>,
}

impl<'a> std::ops::Deref for PooledBuf<'a> {
    type Target = WriteBuf;
    fn deref(&self) -> &WriteBuf {
        self.buf.as_ref().unwrap()
    }
}

impl<'a> std::ops::DerefMut for PooledBuf<'a> {
    fn deref_mut(&mut self) -> &mut WriteBuf {
        self.buf.as_mut().unwrap()
    }
}

impl<'a> Drop for PooledBuf<'a> {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.give_back(buf.into_vec());
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn buffer_is_reused_after_checkin() {
        let pool = BufferPool::new(4);
        {
            let mut b = pool.checkout();
            b.put_bytes(b"hello");
        }
        assert_eq!(pool.free.lock().len(), 1);
        let b = pool.checkout();
        assert_eq!(b.len(), 0);
        assert_eq!(pool.free.lock().len(), 0);
    }

    #[test]
    fn oversized_buffer_is_not_retained() {
        let pool = BufferPool::new(4);
        {
            let mut b = pool.checkout();
            b.put_bytes(&vec![0u8; INLINE_CAPACITY + 1]);
        }
        assert_eq!(pool.free.lock().len(), 0);
    }
}
