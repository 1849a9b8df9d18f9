//! Reusable outbound datagram buffers.

use bytes::BytesMut;
use std::sync::Mutex;

/// Initial capacity of a pooled buffer; a full slot update fits comfortably.
const BUFFER_CAPACITY: usize = 2048;

/// A small free-list of write buffers shared by the receive and maintenance
/// loops.
#[derive(Debug)]
pub struct BufferPool {
    free: Mutex<Vec<BytesMut>>,
    max_idle: usize,
}

impl BufferPool {
    pub fn new(max_idle: usize) -> Self {
        Self {
            free: Mutex::new(Vec::with_capacity(max_idle)),
            max_idle,
        }
    }

    /// Take an empty buffer, allocating if none are idle.
    pub fn take(&self) -> BytesMut {
        let mut free = self.free.lock().unwrap_or_else(|e| e.into_inner());
        match free.pop() {
            Some(mut buf) => {
                buf.clear();
                buf
            }
            None => BytesMut::with_capacity(BUFFER_CAPACITY),
        }
    }

    /// Return a buffer after its datagram has been sent.
    pub fn put(&self, mut buf: BytesMut) {
        let mut free = self.free.lock().unwrap_or_else(|e| e.into_inner());
        if free.len() < self.max_idle {
            buf.clear();
            free.push(buf);
        }
    }

    pub fn idle(&self) -> usize {
        self.free.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BufMut;

    #[test]
    fn test_reuse() {
        let pool = BufferPool::new(2);
        let mut buf = pool.take();
        buf.put_slice(b"hello");
        let ptr = buf.as_ptr();
        pool.put(buf);
        assert_eq!(pool.idle(), 1);

        let again = pool.take();
        assert!(again.is_empty());
        assert_eq!(again.as_ptr(), ptr);
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn test_idle_is_bounded() {
        let pool = BufferPool::new(1);
        pool.put(BytesMut::new());
        pool.put(BytesMut::new());
        assert_eq!(pool.idle(), 1);
    }
}
