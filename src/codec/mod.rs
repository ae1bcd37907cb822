//! Serialization and comparison contracts used by edge channels.
//!
//! Edges never see typed records: producers hand objects to a serializer,
//! the channel moves bytes, and consumers get objects back from the matching
//! deserializer. Scatter-gather edges split every record into *key* bytes
//! (grouping and partitioning) and *value* bytes (the payload plus whatever
//! the comparator needs for secondary ordering).
//!
//! Implementations are strategy objects registered in the
//! [`Registry`](crate::registry::Registry). The [`typed`] module supplies
//! serde-backed implementations for any `Serialize + DeserializeOwned` type.

pub mod typed;

use crate::buffer::DataBuffer;
use crate::error::DagError;
use anyhow::Result;
use std::any::{Any, type_name};
use std::cmp::Ordering;

/// A type-erased record moving between vertices.
pub type Record = Box<dyn Any + Send + Sync>;

/// Serializer for values on one-to-one and broadcast edges.
pub trait ValueSerDe: Send + Sync {
    /// Append the encoding of `object` to `output`.
    fn serialize(&self, object: &dyn Any, output: &mut DataBuffer) -> Result<()>;

    /// Decode one object starting at the cursor of `input`.
    fn deserialize(&self, input: &mut DataBuffer) -> Result<Record>;
}

/// Serializer for records on scatter-gather edges.
pub trait KeyValueSerDe: Send + Sync {
    /// Append the grouping key of `object` to `output`.
    fn serialize_key(&self, object: &dyn Any, output: &mut DataBuffer) -> Result<()>;

    /// Append the value part of `object` to `output`.
    fn serialize_value(&self, object: &dyn Any, output: &mut DataBuffer) -> Result<()>;

    /// Decode a grouping key, as exposed by a group reader.
    fn deserialize_key(&self, key: &mut DataBuffer) -> Result<Record>;

    /// Rebuild the full object from its key and value parts.
    fn deserialize_pair(&self, key: &mut DataBuffer, value: &mut DataBuffer) -> Result<Record>;
}

/// Orders two encoded values without decoding them into objects.
///
/// The inputs are the value bytes produced by
/// [`KeyValueSerDe::serialize_value`] of the same edge.
pub trait DataComparator: Send + Sync {
    fn compare(&self, a: &[u8], b: &[u8]) -> Result<Ordering>;
}

/// Downcast helper for serializer implementations.
///
/// # Errors
/// [`DagError::Contract`] naming both types when `object` is not a `T`.
pub fn downcast_object<T: Any>(object: &dyn Any) -> Result<&T> {
    object.downcast_ref::<T>().ok_or_else(|| {
        DagError::contract(format!(
            "serializer expected an object of type {}",
            type_name::<T>()
        ))
    })
}

/// Sort `items` stably with a fallible comparison.
///
/// The first comparison error aborts the sort result; the slice is left in
/// an unspecified but valid order.
pub(crate) fn try_sort_by<T>(
    items: &mut [T],
    mut compare: impl FnMut(&T, &T) -> Result<Ordering>,
) -> Result<()> {
    let mut failure: Option<anyhow::Error> = None;
    items.sort_by(|a, b| {
        if failure.is_some() {
            return Ordering::Equal;
        }
        compare(a, b).unwrap_or_else(|e| {
            failure = Some(e);
            Ordering::Equal
        })
    });
    failure.map_or(Ok(()), Err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn try_sort_is_stable() {
        let mut v = vec![(1, 'a'), (0, 'b'), (1, 'c'), (0, 'd')];
        try_sort_by(&mut v, |x, y| Ok(x.0.cmp(&y.0))).unwrap();
        assert_eq!(v, vec![(0, 'b'), (0, 'd'), (1, 'a'), (1, 'c')]);
    }

    #[test]
    fn try_sort_reports_comparator_failure() {
        let mut v = vec![3, 1, 2];
        let err = try_sort_by(&mut v, |_, _| Err(anyhow!("boom"))).unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn downcast_names_expected_type() {
        let err = downcast_object::<String>(&5u32).unwrap_err();
        assert!(err.to_string().contains("alloc::string::String"));
    }
}
