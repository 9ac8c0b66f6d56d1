//! The serializer contract and the variable-length serializers.

use crate::error::{CodecError, CodecResult};
use bytes::{BufMut, BytesMut};

/// Converts a typed value to and from the bytes stored in LMDB.
///
/// # Buffer contract
///
/// [`serialize`](Self::serialize) may be handed a buffer to reuse. If the
/// buffer can hold the encoding it is cleared, written and returned;
/// otherwise a new buffer of exactly the encoded length is allocated. The
/// returned buffer holds exactly the encoded bytes.
///
/// [`deserialize`](Self::deserialize) receives a slice that may point
/// straight into the memory map. It must not keep it beyond the call.
pub trait Serializer: Send + Sync {
    /// The type this serializer encodes.
    type Value;

    /// Width to pre-allocate and reuse, or `None` for variable-length values.
    fn cached_buffer_size(&self) -> Option<usize>;

    /// True if keys must be compared as native machine integers.
    fn integer_keys(&self) -> bool;

    /// True if every encoded value has the same width.
    fn fixed_size(&self) -> bool;

    /// Encodes `value`, reusing `buf` when it has enough capacity.
    ///
    /// # Errors
    ///
    /// Only the opaque-object serializer can fail, with
    /// [`CodecError::Serialization`].
    fn serialize(&self, value: &Self::Value, buf: Option<BytesMut>) -> CodecResult<BytesMut>;

    /// Decodes a value from `bytes` without modifying them.
    ///
    /// # Errors
    ///
    /// Returns an error if `bytes` is not a valid encoding.
    fn deserialize(&self, bytes: &[u8]) -> CodecResult<Self::Value>;
}

/// Returns an empty buffer with room for `len` bytes, reusing `buf` if it
/// is large enough.
pub(crate) fn prepare(buf: Option<BytesMut>, len: usize) -> BytesMut {
    match buf {
        Some(mut buf) => {
            buf.clear();
            if buf.capacity() >= len {
                buf
            } else {
                BytesMut::with_capacity(len)
            }
        }
        None => BytesMut::with_capacity(len),
    }
}

pub(crate) fn write_bytes(bytes: &[u8], buf: Option<BytesMut>) -> BytesMut {
    let mut buf = prepare(buf, bytes.len());
    buf.put_slice(bytes);
    buf
}

/// Serializer for UTF-8 strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8Serializer;

impl Serializer for Utf8Serializer {
    type Value = String;

    fn cached_buffer_size(&self) -> Option<usize> {
        None
    }

    fn integer_keys(&self) -> bool {
        false
    }

    fn fixed_size(&self) -> bool {
        false
    }

    fn serialize(&self, value: &String, buf: Option<BytesMut>) -> CodecResult<BytesMut> {
        Ok(write_bytes(value.as_bytes(), buf))
    }

    fn deserialize(&self, bytes: &[u8]) -> CodecResult<String> {
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| CodecError::InvalidUtf8)
    }
}

/// Serializer for raw byte sequences.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteArraySerializer;

impl Serializer for ByteArraySerializer {
    type Value = Vec<u8>;

    fn cached_buffer_size(&self) -> Option<usize> {
        None
    }

    fn integer_keys(&self) -> bool {
        false
    }

    fn fixed_size(&self) -> bool {
        false
    }

    fn serialize(&self, value: &Vec<u8>, buf: Option<BytesMut>) -> CodecResult<BytesMut> {
        Ok(write_bytes(value, buf))
    }

    fn deserialize(&self, bytes: &[u8]) -> CodecResult<Vec<u8>> {
        Ok(bytes.to_vec())
    }
}
