//! Pool of reusable encode buffers.

use crate::serializer::Serializer;
use bytes::BytesMut;
use parking_lot::Mutex;

/// Upper bound on pooled buffers per cache.
const MAX_POOLED: usize = 16;

/// A small pool of encode buffers for one serializer.
///
/// Fixed-width serializers get buffers pre-sized to their width. For
/// variable-length serializers the pool only recycles whatever buffers
/// callers hand back.
#[derive(Debug)]
pub struct BufferCache {
    size: Option<usize>,
    pool: Mutex<Vec<BytesMut>>,
}

impl BufferCache {
    /// Creates a cache for buffers of `size` bytes, or unsized buffers.
    #[must_use]
    pub fn new(size: Option<usize>) -> Self {
        Self {
            size,
            pool: Mutex::new(Vec::new()),
        }
    }

    /// Creates a cache sized by `serializer`'s buffer hint.
    #[must_use]
    pub fn for_serializer<S: Serializer + ?Sized>(serializer: &S) -> Self {
        Self::new(serializer.cached_buffer_size())
    }

    /// Preferred width, if fixed.
    #[must_use]
    pub fn size(&self) -> Option<usize> {
        self.size
    }

    /// Takes a buffer to pass to [`Serializer::serialize`].
    ///
    /// Returns `None` for variable-length caches with nothing pooled, which
    /// lets the serializer allocate an exact-size buffer.
    pub fn acquire(&self) -> Option<BytesMut> {
        if let Some(buf) = self.pool.lock().pop() {
            return Some(buf);
        }
        self.size.map(BytesMut::with_capacity)
    }

    /// Returns a buffer to the pool.
    pub fn release(&self, mut buf: BytesMut) {
        buf.clear();
        let mut pool = self.pool.lock();
        if pool.len() < MAX_POOLED {
            pool.push(buf);
        }
    }

    /// Number of buffers currently pooled.
    #[must_use]
    pub fn pooled(&self) -> usize {
        self.pool.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LONG, STRING};

    #[test]
    fn fixed_width_cache_presizes() {
        let cache = BufferCache::for_serializer(&LONG);
        assert_eq!(cache.size(), Some(8));
        let buf = cache.acquire().unwrap();
        assert!(buf.capacity() >= 8);
        assert!(buf.is_empty());
    }

    #[test]
    fn variable_cache_starts_empty() {
        let cache = BufferCache::for_serializer(&STRING);
        assert_eq!(cache.size(), None);
        assert!(cache.acquire().is_none());
    }

    #[test]
    fn released_buffer_is_reused() {
        let cache = BufferCache::for_serializer(&LONG);
        let buf = LONG.serialize(&9, cache.acquire()).unwrap();
        let ptr = buf.as_ptr();
        cache.release(buf);
        assert_eq!(cache.pooled(), 1);

        let again = cache.acquire().unwrap();
        assert_eq!(again.as_ptr(), ptr);
        assert!(again.is_empty());
    }

    #[test]
    fn pool_is_capped() {
        let cache = BufferCache::new(Some(4));
        for _ in 0..MAX_POOLED + 5 {
            cache.release(BytesMut::with_capacity(4));
        }
        assert_eq!(cache.pooled(), MAX_POOLED);
    }
}
