//! Serde-backed codecs for ordinary Rust types.
//!
//! These stand in for generated serializer classes: any
//! `Serialize + DeserializeOwned` type gets a value codec, a key-value codec
//! keyed by an [`OrderedKey`], and a comparator built from a closure. Values
//! are encoded with postcard.
//!
//! ```
//! use dagflow::codec::typed::{FnComparator, SerdeKeyValueCodec, SerdeValueCodec};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Clone, Serialize, Deserialize)]
//! struct Sale { shop: u32, amount: i64 }
//!
//! let values = SerdeValueCodec::<Sale>::new();
//! let by_shop = SerdeKeyValueCodec::<Sale, u32>::new(|s: &Sale| s.shop);
//! let by_amount_desc = FnComparator::<Sale>::new(|a: &Sale, b: &Sale| b.amount.cmp(&a.amount));
//! # let _ = (values, by_shop, by_amount_desc);
//! ```

use super::{DataComparator, KeyValueSerDe, Record, ValueSerDe, downcast_object};
use crate::buffer::DataBuffer;
use crate::error::DagError;
use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::any::{Any, type_name};
use std::cmp::Ordering;
use std::marker::PhantomData;
use std::sync::Arc;

/// Bound for record types carried by the typed codecs.
pub trait RecordBound: 'static + Send + Sync + Serialize + DeserializeOwned {}
impl<T> RecordBound for T where T: 'static + Send + Sync + Serialize + DeserializeOwned {}

fn encode_postcard<T: Serialize>(object: &T, output: &mut DataBuffer) -> Result<()> {
    let bytes = postcard::to_allocvec(object)
        .with_context(|| format!("encode {}", type_name::<T>()))?;
    output.write_raw(&bytes);
    Ok(())
}

fn decode_postcard<T: DeserializeOwned>(input: &mut DataBuffer) -> Result<T> {
    let remaining = input.remaining_slice();
    let (value, rest) = postcard::take_from_bytes::<T>(remaining).map_err(|e| {
        DagError::contract(format!("cannot decode {}: {e}", type_name::<T>()))
    })?;
    let consumed = remaining.len() - rest.len();
    input.skip_bytes(consumed);
    Ok(value)
}

/// Key types with an order-preserving byte encoding.
///
/// Scatter-gather edges group and order records by raw key bytes, so the
/// encoding must sort (unsigned, lexicographically) the way the keys do.
pub trait OrderedKey: Sized + Send + Sync + 'static {
    fn encode_key(&self, output: &mut DataBuffer);
    fn decode_key(input: &mut DataBuffer) -> Result<Self>;
}

macro_rules! ordered_unsigned {
    ($($t:ty => $write:ident, $read:ident);* $(;)?) => {$(
        impl OrderedKey for $t {
            fn encode_key(&self, output: &mut DataBuffer) {
                output.$write(*self);
            }
            fn decode_key(input: &mut DataBuffer) -> Result<Self> {
                Ok(input.$read()?)
            }
        }
    )*};
}

ordered_unsigned! {
    u8 => write_u8, read_u8;
    u16 => write_u16, read_u16;
    u32 => write_u32, read_u32;
    u64 => write_u64, read_u64;
}

// Signed keys flip the sign bit so negative values sort first.
macro_rules! ordered_signed {
    ($($t:ty as $u:ty => $write:ident, $read:ident);* $(;)?) => {$(
        impl OrderedKey for $t {
            #[allow(clippy::cast_sign_loss)]
            fn encode_key(&self, output: &mut DataBuffer) {
                output.$write((*self as $u) ^ (1 << (<$u>::BITS - 1)));
            }
            #[allow(clippy::cast_possible_wrap)]
            fn decode_key(input: &mut DataBuffer) -> Result<Self> {
                Ok((input.$read()? ^ (1 << (<$u>::BITS - 1))) as $t)
            }
        }
    )*};
}

ordered_signed! {
    i32 as u32 => write_u32, read_u32;
    i64 as u64 => write_u64, read_u64;
}

impl OrderedKey for bool {
    fn encode_key(&self, output: &mut DataBuffer) {
        output.write_bool(*self);
    }
    fn decode_key(input: &mut DataBuffer) -> Result<Self> {
        Ok(input.read_bool()?)
    }
}

/// Strings are written as raw UTF-8 without a length: a key occupies its own
/// byte segment, and raw bytes sort like the strings do.
impl OrderedKey for String {
    fn encode_key(&self, output: &mut DataBuffer) {
        output.write_raw(self.as_bytes());
    }
    fn decode_key(input: &mut DataBuffer) -> Result<Self> {
        let bytes = input.remaining_slice().to_vec();
        input.skip_bytes(bytes.len());
        String::from_utf8(bytes).map_err(|e| DagError::contract(format!("key is not UTF-8: {e}")))
    }
}

/// Value codec for `T` on one-to-one and broadcast edges.
pub struct SerdeValueCodec<T>(PhantomData<fn() -> T>);

impl<T: RecordBound> SerdeValueCodec<T> {
    #[must_use]
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T: RecordBound> Default for SerdeValueCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: RecordBound> ValueSerDe for SerdeValueCodec<T> {
    fn serialize(&self, object: &dyn Any, output: &mut DataBuffer) -> Result<()> {
        encode_postcard(downcast_object::<T>(object)?, output)
    }

    fn deserialize(&self, input: &mut DataBuffer) -> Result<Record> {
        Ok(Box::new(decode_postcard::<T>(input)?))
    }
}

type KeyFn<T, K> = Arc<dyn Fn(&T) -> K + Send + Sync>;

/// Key-value codec for `T`, grouped by the key `K` extracted from each record.
///
/// The value part is the complete record, so [`deserialize_pair`] only
/// decodes the value bytes.
///
/// [`deserialize_pair`]: KeyValueSerDe::deserialize_pair
pub struct SerdeKeyValueCodec<T, K> {
    key_fn: KeyFn<T, K>,
}

impl<T: RecordBound, K: OrderedKey> SerdeKeyValueCodec<T, K> {
    pub fn new<F>(key_fn: F) -> Self
    where
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        Self {
            key_fn: Arc::new(key_fn),
        }
    }
}

impl<T: RecordBound, K: OrderedKey> KeyValueSerDe for SerdeKeyValueCodec<T, K> {
    fn serialize_key(&self, object: &dyn Any, output: &mut DataBuffer) -> Result<()> {
        (self.key_fn)(downcast_object::<T>(object)?).encode_key(output);
        Ok(())
    }

    fn serialize_value(&self, object: &dyn Any, output: &mut DataBuffer) -> Result<()> {
        encode_postcard(downcast_object::<T>(object)?, output)
    }

    fn deserialize_key(&self, key: &mut DataBuffer) -> Result<Record> {
        Ok(Box::new(K::decode_key(key)?))
    }

    fn deserialize_pair(&self, _key: &mut DataBuffer, value: &mut DataBuffer) -> Result<Record> {
        Ok(Box::new(decode_postcard::<T>(value)?))
    }
}

type CompareFn<T> = Arc<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

/// Comparator over values encoded by [`SerdeKeyValueCodec<T, _>`].
///
/// Decodes both sides and applies the closure; use a hand-written
/// [`DataComparator`] when comparing raw bytes directly is possible.
pub struct FnComparator<T> {
    compare: CompareFn<T>,
}

impl<T: RecordBound> FnComparator<T> {
    pub fn new<F>(compare: F) -> Self
    where
        F: Fn(&T, &T) -> Ordering + Send + Sync + 'static,
    {
        Self {
            compare: Arc::new(compare),
        }
    }
}

impl<T: RecordBound> DataComparator for FnComparator<T> {
    fn compare(&self, a: &[u8], b: &[u8]) -> Result<Ordering> {
        let left: T = postcard::from_bytes(a)
            .map_err(|e| DagError::contract(format!("comparator cannot decode {}: {e}", type_name::<T>())))?;
        let right: T = postcard::from_bytes(b)
            .map_err(|e| DagError::contract(format!("comparator cannot decode {}: {e}", type_name::<T>())))?;
        Ok((self.compare)(&left, &right))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_bytes<K: OrderedKey>(k: &K) -> Vec<u8> {
        let mut buf = DataBuffer::new();
        k.encode_key(&mut buf);
        buf.as_slice().to_vec()
    }

    #[test]
    fn signed_keys_sort_numerically() {
        let mut keys = vec![5i64, -3, 0, i64::MIN, 42, -1];
        let mut by_bytes = keys.clone();
        by_bytes.sort_by_key(key_bytes);
        keys.sort_unstable();
        assert_eq!(by_bytes, keys);
    }

    #[test]
    fn signed_key_decodes_back() {
        let mut buf = DataBuffer::new();
        (-17i32).encode_key(&mut buf);
        buf.clear();
        assert_eq!(i32::decode_key(&mut buf).unwrap(), -17);
    }

    #[test]
    fn value_codec_consumes_exactly_one_record() {
        let codec = SerdeValueCodec::<(u32, String)>::new();
        let mut buf = DataBuffer::new();
        codec.serialize(&(1u32, "a".to_string()), &mut buf).unwrap();
        codec.serialize(&(2u32, "bb".to_string()), &mut buf).unwrap();
        buf.clear();
        let first = codec.deserialize(&mut buf).unwrap();
        let second = codec.deserialize(&mut buf).unwrap();
        assert_eq!(first.downcast_ref::<(u32, String)>(), Some(&(1, "a".to_string())));
        assert_eq!(second.downcast_ref::<(u32, String)>(), Some(&(2, "bb".to_string())));
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn value_codec_rejects_wrong_type() {
        let codec = SerdeValueCodec::<u64>::new();
        let mut buf = DataBuffer::new();
        let err = codec.serialize(&"nope", &mut buf).unwrap_err();
        assert!(matches!(DagError::find(&err), Some(DagError::Contract(_))));
    }
}
