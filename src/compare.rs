//! Comparator presets for state and result equivalence.
//!
//! A selector consults two comparators: the state comparator (root selectors
//! only) decides whether a new state is "the same" as the one a cached value
//! was computed from, and the result comparator decides whether a recomputed
//! value is equivalent to the previous one (a phantom run).
//!
//! Comparators receive the shared `Arc` handles so that reference identity is
//! available to them, not just value equality.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::rc::Rc;
use std::sync::Arc;

/// Pure, total predicate deciding whether two values are equivalent.
pub type Comparator<T> = fn(&Arc<T>, &Arc<T>) -> bool;

/// Equivalent only when both handles point at the same allocation.
///
/// This is the default for both comparators.
pub fn same_allocation<T>(a: &Arc<T>, b: &Arc<T>) -> bool {
    Arc::ptr_eq(a, b)
}

/// Equivalent when the values are identical in the sense of [`Identity`].
///
/// Scalars and strings are identical when equal, so a recomputed `'a'` is the
/// same reference as the cached `'a'`. Shared pointers are identical when they
/// point at the same allocation, and any other type only when both handles do.
pub fn same_reference<T: Identity>(a: &Arc<T>, b: &Arc<T>) -> bool {
    Arc::ptr_eq(a, b) || a.is_identical(b)
}

/// Equivalent when the values compare equal.
///
/// This is the natural choice for small scalar outputs (`char`, integers,
/// short strings), where identity of the allocation carries no meaning.
pub fn same_value<T: PartialEq>(a: &Arc<T>, b: &Arc<T>) -> bool {
    Arc::ptr_eq(a, b) || **a == **b
}

/// Equivalent when [`same_reference`] holds or both values are empty.
///
/// Keeps a fresh empty collection from invalidating downstream selectors.
pub fn same_reference_or_empty<T: Identity + IsEmpty>(a: &Arc<T>, b: &Arc<T>) -> bool {
    same_reference(a, b) || (a.is_empty_value() && b.is_empty_value())
}

/// Equivalent when the values compare equal or both are empty.
pub fn same_value_or_empty<T: PartialEq + IsEmpty>(a: &Arc<T>, b: &Arc<T>) -> bool {
    same_value(a, b) || (a.is_empty_value() && b.is_empty_value())
}

/// Every pair is equivalent.
pub fn always<T>(_a: &Arc<T>, _b: &Arc<T>) -> bool {
    true
}

/// No pair is equivalent, so every recomputation is a full run.
pub fn never<T>(_a: &Arc<T>, _b: &Arc<T>) -> bool {
    false
}

/// Identity as seen by [`same_reference`].
///
/// The default method says no two distinct values are identical, which gives
/// plain structs reference semantics with an empty impl:
///
/// ```ignore
/// impl Identity for State {}
/// ```
pub trait Identity {
    /// Returns `true` if `self` and `other` count as the same reference.
    fn is_identical(&self, _other: &Self) -> bool {
        false
    }
}

macro_rules! impl_value_identity {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Identity for $ty {
                fn is_identical(&self, other: &Self) -> bool {
                    self == other
                }
            }
        )*
    };
}

impl_value_identity!(
    (), bool, char, u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64,
    String, &'static str,
);

impl<T: Identity> Identity for Option<T> {
    fn is_identical(&self, other: &Self) -> bool {
        match (self, other) {
            (Some(a), Some(b)) => a.is_identical(b),
            (None, None) => true,
            _ => false,
        }
    }
}

// Collections are objects: identical only as the same allocation.
impl<T> Identity for Vec<T> {}
impl<K, V, H> Identity for HashMap<K, V, H> {}
impl<T, H> Identity for HashSet<T, H> {}
impl<K, V> Identity for BTreeMap<K, V> {}
impl<T> Identity for BTreeSet<T> {}

impl<T: ?Sized> Identity for Arc<T> {
    fn is_identical(&self, other: &Self) -> bool {
        Arc::ptr_eq(self, other)
    }
}

impl<T: ?Sized> Identity for Rc<T> {
    fn is_identical(&self, other: &Self) -> bool {
        Rc::ptr_eq(self, other)
    }
}

/// Values that have a notion of emptiness.
pub trait IsEmpty {
    /// Returns `true` if the value holds nothing.
    fn is_empty_value(&self) -> bool;
}

impl<T> IsEmpty for Vec<T> {
    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }
}

impl<T> IsEmpty for [T] {
    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }
}

impl IsEmpty for String {
    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }
}

impl IsEmpty for str {
    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }
}

impl<T> IsEmpty for Option<T> {
    fn is_empty_value(&self) -> bool {
        self.is_none()
    }
}

impl<K, V, H> IsEmpty for HashMap<K, V, H> {
    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }
}

impl<T, H> IsEmpty for HashSet<T, H> {
    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }
}

impl<K, V> IsEmpty for BTreeMap<K, V> {
    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }
}

impl<T> IsEmpty for BTreeSet<T> {
    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Document {
        _title: String,
    }

    impl Identity for Document {}

    #[test]
    fn test_same_allocation() {
        let a = Arc::new(vec![1]);
        let b = Arc::new(vec![1]);
        assert!(same_allocation(&a, &a.clone()));
        assert!(!same_allocation(&a, &b));
    }

    #[test]
    fn test_same_reference_on_scalars() {
        assert!(same_reference(&Arc::new('a'), &Arc::new('a')));
        assert!(!same_reference(&Arc::new('a'), &Arc::new('b')));
        assert!(same_reference(&Arc::new(Some(3u32)), &Arc::new(Some(3u32))));
        assert!(!same_reference(&Arc::new(Some(3u32)), &Arc::new(None)));
        assert!(same_reference(&Arc::new("ab".to_string()), &Arc::new("ab".to_string())));
    }

    #[test]
    fn test_same_reference_on_objects() {
        let a = Arc::new(Document { _title: "a".into() });
        let b = Arc::new(Document { _title: "a".into() });
        assert!(same_reference(&a, &a.clone()));
        assert!(!same_reference(&a, &b));

        // Shared payloads compare by the inner allocation
        let inner = Arc::new(vec![1, 2]);
        assert!(same_reference(&Arc::new(inner.clone()), &Arc::new(inner.clone())));
        assert!(!same_reference(&Arc::new(inner), &Arc::new(Arc::new(vec![1, 2]))));
    }

    #[test]
    fn test_same_value() {
        assert!(same_value(&Arc::new('a'), &Arc::new('a')));
        assert!(!same_value(&Arc::new('a'), &Arc::new('b')));
    }

    #[test]
    fn test_empty_variants() {
        let a: Arc<Vec<i32>> = Arc::new(Vec::new());
        let b: Arc<Vec<i32>> = Arc::new(Vec::new());
        let c = Arc::new(vec![1]);
        let d = Arc::new(vec![1]);
        assert!(same_reference_or_empty(&Arc::new(None::<char>), &Arc::new(None)));
        assert!(same_reference_or_empty(&Arc::new(Some('a')), &Arc::new(Some('a'))));
        assert!(!same_reference_or_empty(&Arc::new(Some('a')), &Arc::new(None)));
        assert!(same_reference_or_empty(&a, &b));
        assert!(!same_reference_or_empty(&c, &d));
        assert!(same_value_or_empty(&c, &d));
        assert!(!same_value_or_empty(&a, &c));
    }

    #[test]
    fn test_always_never() {
        let a = Arc::new(1);
        assert!(always(&a, &Arc::new(2)));
        assert!(!never(&a, &a));
    }
}
