//! # txmdb Codec
//!
//! Serializers that move typed keys and values in and out of the byte
//! buffers handed to LMDB.
//!
//! Every serializer reports three hints to the storage layer:
//!
//! - [`Serializer::cached_buffer_size`]: the fixed width callers may
//!   pre-allocate and reuse, or `None` for variable-length encodings
//! - [`Serializer::integer_keys`]: keys must be compared as native machine
//!   integers (`MDB_INTEGERKEY`)
//! - [`Serializer::fixed_size`]: duplicate values all have the same width
//!   (`MDB_DUPFIXED`)
//!
//! ## Fixed instances
//!
//! | Constant | Value type | Width | Integer keys |
//! |---|---|---|---|
//! | [`STRING`] | `String` (UTF-8) | variable | no |
//! | [`BYTE_ARRAY`] | `Vec<u8>` | variable | no |
//! | [`INT`] | `i32`, signed order | 4 | yes |
//! | [`UNSIGNED_INT`] | `i32`, unsigned order | 4 | yes |
//! | [`LONG`] | `i64`, signed order | 8 | yes |
//! | [`UNSIGNED_LONG`] | `i64`, unsigned order | 8 | yes |
//!
//! [`ObjectSerializer`] is the fallback for any `serde` type and encodes it
//! as CBOR.
//!
//! ## Usage
//!
//! ```
//! use txmdb_codec::{Serializer, INT};
//!
//! let buf = INT.serialize(&-5, None).unwrap();
//! assert_eq!(buf.len(), 4);
//! assert_eq!(INT.deserialize(&buf).unwrap(), -5);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod buffer;
mod error;
mod numeric;
mod object;
mod serializer;

pub use buffer::BufferCache;
pub use bytes::BytesMut;
pub use error::{CodecError, CodecResult};
pub use numeric::{IntOrder, IntSerializer, LongSerializer};
pub use object::ObjectSerializer;
pub use serializer::{ByteArraySerializer, Serializer, Utf8Serializer};

/// UTF-8 text.
pub const STRING: Utf8Serializer = Utf8Serializer;

/// Raw byte sequences.
pub const BYTE_ARRAY: ByteArraySerializer = ByteArraySerializer;

/// Signed 32-bit integers, ordered as signed values.
pub const INT: IntSerializer = IntSerializer::new(IntOrder::Signed);

/// 32-bit integers ordered as unsigned values.
///
/// `i32::MIN` sorts after `i32::MAX`.
pub const UNSIGNED_INT: IntSerializer = IntSerializer::new(IntOrder::Unsigned);

/// Signed 64-bit integers, ordered as signed values.
pub const LONG: LongSerializer = LongSerializer::new(IntOrder::Signed);

/// 64-bit integers ordered as unsigned values.
///
/// `i64::MIN` sorts after `i64::MAX`.
pub const UNSIGNED_LONG: LongSerializer = LongSerializer::new(IntOrder::Unsigned);
