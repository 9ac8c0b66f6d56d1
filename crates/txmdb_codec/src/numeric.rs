//! Fixed-width integer serializers.
//!
//! LMDB's `MDB_INTEGERKEY` compares keys as unsigned native-endian machine
//! words, so these serializers always write native byte order. The signed
//! variants shift the value by the type's minimum so that unsigned
//! comparison of the stored word matches signed comparison of the value.

use crate::error::{CodecError, CodecResult};
use crate::serializer::{prepare, Serializer};
use bytes::{BufMut, BytesMut};

/// How an integer is mapped onto the unsigned word LMDB compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntOrder {
    /// Subtract the minimum value so negative numbers sort first.
    Signed,
    /// Store the bits unchanged; negative numbers sort after positive ones.
    Unsigned,
}

impl IntOrder {
    /// Maps a 32-bit value to the word stored in LMDB.
    #[must_use]
    pub const fn encode_i32(self, value: i32) -> u32 {
        match self {
            Self::Signed => value.wrapping_sub(i32::MIN) as u32,
            Self::Unsigned => value as u32,
        }
    }

    /// Inverse of [`encode_i32`](Self::encode_i32).
    #[must_use]
    pub const fn decode_i32(self, word: u32) -> i32 {
        match self {
            Self::Signed => (word as i32).wrapping_add(i32::MIN),
            Self::Unsigned => word as i32,
        }
    }

    /// Maps a 64-bit value to the word stored in LMDB.
    #[must_use]
    pub const fn encode_i64(self, value: i64) -> u64 {
        match self {
            Self::Signed => value.wrapping_sub(i64::MIN) as u64,
            Self::Unsigned => value as u64,
        }
    }

    /// Inverse of [`encode_i64`](Self::encode_i64).
    #[must_use]
    pub const fn decode_i64(self, word: u64) -> i64 {
        match self {
            Self::Signed => (word as i64).wrapping_add(i64::MIN),
            Self::Unsigned => word as i64,
        }
    }
}

/// Serializer for 32-bit integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntSerializer {
    order: IntOrder,
}

impl IntSerializer {
    const WIDTH: usize = 4;

    /// Creates a serializer with the given ordering.
    #[must_use]
    pub const fn new(order: IntOrder) -> Self {
        Self { order }
    }

    /// Returns the ordering.
    #[must_use]
    pub const fn order(&self) -> IntOrder {
        self.order
    }
}

impl Serializer for IntSerializer {
    type Value = i32;

    fn cached_buffer_size(&self) -> Option<usize> {
        Some(Self::WIDTH)
    }

    fn integer_keys(&self) -> bool {
        true
    }

    fn fixed_size(&self) -> bool {
        true
    }

    fn serialize(&self, value: &i32, buf: Option<BytesMut>) -> CodecResult<BytesMut> {
        let mut buf = prepare(buf, Self::WIDTH);
        buf.put_slice(&self.order.encode_i32(*value).to_ne_bytes());
        Ok(buf)
    }

    fn deserialize(&self, bytes: &[u8]) -> CodecResult<i32> {
        let word: [u8; Self::WIDTH] = bytes
            .try_into()
            .map_err(|_| CodecError::invalid_length(bytes.len(), Self::WIDTH))?;
        Ok(self.order.decode_i32(u32::from_ne_bytes(word)))
    }
}

/// Serializer for 64-bit integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LongSerializer {
    order: IntOrder,
}

impl LongSerializer {
    const WIDTH: usize = 8;

    /// Creates a serializer with the given ordering.
    #[must_use]
    pub const fn new(order: IntOrder) -> Self {
        Self { order }
    }

    /// Returns the ordering.
    #[must_use]
    pub const fn order(&self) -> IntOrder {
        self.order
    }
}

impl Serializer for LongSerializer {
    type Value = i64;

    fn cached_buffer_size(&self) -> Option<usize> {
        Some(Self::WIDTH)
    }

    fn integer_keys(&self) -> bool {
        true
    }

    fn fixed_size(&self) -> bool {
        true
    }

    fn serialize(&self, value: &i64, buf: Option<BytesMut>) -> CodecResult<BytesMut> {
        let mut buf = prepare(buf, Self::WIDTH);
        buf.put_slice(&self.order.encode_i64(*value).to_ne_bytes());
        Ok(buf)
    }

    fn deserialize(&self, bytes: &[u8]) -> CodecResult<i64> {
        let word: [u8; Self::WIDTH] = bytes
            .try_into()
            .map_err(|_| CodecError::invalid_length(bytes.len(), Self::WIDTH))?;
        Ok(self.order.decode_i64(u64::from_ne_bytes(word)))
    }
}
