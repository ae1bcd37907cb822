//! Assertions over records collected from a test graph.

use std::cmp::Ordering;
use std::fmt::Debug;

/// Assert that `actual` equals `expected` element by element.
///
/// # Panics
/// Panics with the first differing index when the collections differ.
///
/// ```
/// use dagflow::testing::assert_collections_equal;
///
/// assert_collections_equal(&["x", "z"], &["x", "z"]);
/// ```
pub fn assert_collections_equal<T: Debug + PartialEq>(actual: &[T], expected: &[T]) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "length mismatch:\n  expected: {expected:?}\n  actual:   {actual:?}"
    );
    if let Some(i) = actual.iter().zip(expected).position(|(a, e)| a != e) {
        panic!(
            "mismatch at index {i}: expected {:?}, got {:?}\n  expected: {expected:?}\n  actual:   {actual:?}",
            expected[i], actual[i]
        );
    }
}

/// Assert that `actual` holds the same records as `expected`, duplicates
/// included, in any order. Parallel sinks receive records in task
/// completion order, so most graph outputs are checked this way.
///
/// # Panics
/// Panics when the multisets differ.
pub fn assert_collections_unordered_equal<T: Debug + Ord + Clone>(actual: &[T], expected: &[T]) {
    let mut left = actual.to_vec();
    let mut right = expected.to_vec();
    left.sort();
    right.sort();
    assert_eq!(left, right, "collections differ (compared sorted)");
}

/// Assert that `records` is ordered by `compare`.
///
/// # Panics
/// Panics naming the first adjacent pair out of order.
pub fn assert_sorted_by<T, F>(records: &[T], mut compare: F)
where
    T: Debug,
    F: FnMut(&T, &T) -> Ordering,
{
    if let Some(i) = records
        .windows(2)
        .position(|pair| compare(&pair[0], &pair[1]) == Ordering::Greater)
    {
        panic!(
            "records out of order at index {}: {:?} before {:?}",
            i + 1,
            records[i],
            records[i + 1]
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unordered_counts_duplicates() {
        assert_collections_unordered_equal(&[2, 1, 2], &[1, 2, 2]);
        let result = std::panic::catch_unwind(|| assert_collections_unordered_equal(&[1, 1, 2], &[1, 2, 2]));
        assert!(result.is_err());
    }

    #[test]
    #[should_panic(expected = "out of order at index 2")]
    fn sorted_by_names_first_inversion() {
        assert_sorted_by(&[1, 2, 1], i32::cmp);
    }
}
