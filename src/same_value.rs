use std::rc::Rc;
use std::sync::Arc;

/// Value equality used to decide whether a write or recomputation changed
/// anything.
///
/// Unlike `PartialEq` on floats, `same_value` treats every NaN as equal to
/// every other NaN and distinguishes `+0.0` from `-0.0`. A write that stores
/// a same value is a no-op: no dependants are re-evaluated and no effects
/// run.
///
/// For types whose `PartialEq` already has these properties, implement the
/// trait with [`same_value_by_eq!`](crate::same_value_by_eq).
pub trait SameValue {
    fn same_value(&self, other: &Self) -> bool;
}

/// Implements [`SameValue`] for types by delegating to `PartialEq`.
#[macro_export]
macro_rules! same_value_by_eq {
    ($($ty:ty),* $(,)?) => {
        $(
            impl $crate::SameValue for $ty {
                fn same_value(&self, other: &Self) -> bool {
                    self == other
                }
            }
        )*
    };
}

same_value_by_eq!(
    (),
    bool,
    char,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    String,
    &str,
);

impl SameValue for f32 {
    fn same_value(&self, other: &Self) -> bool {
        (self.is_nan() && other.is_nan()) || self.to_bits() == other.to_bits()
    }
}

impl SameValue for f64 {
    fn same_value(&self, other: &Self) -> bool {
        (self.is_nan() && other.is_nan()) || self.to_bits() == other.to_bits()
    }
}

impl<T: SameValue> SameValue for Option<T> {
    fn same_value(&self, other: &Self) -> bool {
        match (self, other) {
            (Some(a), Some(b)) => a.same_value(b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl<T: SameValue> SameValue for Vec<T> {
    fn same_value(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().zip(other).all(|(a, b)| a.same_value(b))
    }
}

impl<T: SameValue> SameValue for Box<T> {
    fn same_value(&self, other: &Self) -> bool {
        T::same_value(self, other)
    }
}

// Shared handles compare by identity, like the reference semantics of the
// values they stand in for.
impl<T: ?Sized + 'static> SameValue for Rc<T> {
    fn same_value(&self, other: &Self) -> bool {
        Rc::ptr_eq(self, other)
    }
}

impl<T: ?Sized + 'static> SameValue for Arc<T> {
    fn same_value(&self, other: &Self) -> bool {
        Arc::ptr_eq(self, other)
    }
}

impl<A: SameValue, B: SameValue> SameValue for (A, B) {
    fn same_value(&self, other: &Self) -> bool {
        self.0.same_value(&other.0) && self.1.same_value(&other.1)
    }
}

impl<A: SameValue, B: SameValue, C: SameValue> SameValue for (A, B, C) {
    fn same_value(&self, other: &Self) -> bool {
        self.0.same_value(&other.0) && self.1.same_value(&other.1) && self.2.same_value(&other.2)
    }
}
