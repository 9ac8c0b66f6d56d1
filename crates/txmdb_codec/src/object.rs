//! Opaque-object serializer backed by CBOR.

use crate::error::{CodecError, CodecResult};
use crate::serializer::{write_bytes, Serializer};
use bytes::BytesMut;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;

/// Fallback serializer for any `serde` type.
///
/// Values are encoded to CBOR and then copied into the output buffer, so
/// this is slower than the dedicated serializers. Any encode or decode
/// failure is reported as [`CodecError::Serialization`] and is not
/// recoverable.
pub struct ObjectSerializer<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> ObjectSerializer<T> {
    /// Creates a serializer for `T`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for ObjectSerializer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for ObjectSerializer<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ObjectSerializer<T> {}

impl<T> fmt::Debug for ObjectSerializer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectSerializer")
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T> Serializer for ObjectSerializer<T>
where
    T: Serialize + DeserializeOwned,
{
    type Value = T;

    fn cached_buffer_size(&self) -> Option<usize> {
        None
    }

    fn integer_keys(&self) -> bool {
        false
    }

    fn fixed_size(&self) -> bool {
        false
    }

    fn serialize(&self, value: &T, buf: Option<BytesMut>) -> CodecResult<BytesMut> {
        let mut encoded = Vec::new();
        ciborium::into_writer(value, &mut encoded)
            .map_err(|e| CodecError::serialization(e.to_string()))?;
        Ok(write_bytes(&encoded, buf))
    }

    fn deserialize(&self, bytes: &[u8]) -> CodecResult<T> {
        ciborium::from_reader(bytes).map_err(|e| CodecError::serialization(e.to_string()))
    }
}
