//! Same-value equality for change detection.
//!
//! Writes to a cell are skipped when the new value is "the same" as the old
//! one. Plain `PartialEq` has the wrong float semantics for this: a cell
//! holding `NaN` would notify on every `set(NaN)` because `NaN != NaN`.
//! [`SameValue`] uses same-value semantics instead: `NaN` equals `NaN`, and
//! `+0.0` does not equal `-0.0` (bit comparison), matching what subscribers
//! actually care about: "did the stored value change".

/// Same-value comparison used by the write-skip check.
pub trait SameValue {
    fn same_value(&self, other: &Self) -> bool;
}

macro_rules! same_value_via_eq {
    ($($t:ty),* $(,)?) => {
        $(
            impl SameValue for $t {
                fn same_value(&self, other: &Self) -> bool {
                    self == other
                }
            }
        )*
    };
}

same_value_via_eq!(
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
    &'static str,
);

impl SameValue for f64 {
    fn same_value(&self, other: &Self) -> bool {
        (self.is_nan() && other.is_nan()) || self.to_bits() == other.to_bits()
    }
}

impl SameValue for f32 {
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
        self.len() == other.len()
            && self
                .iter()
                .zip(other.iter())
                .all(|(a, b)| a.same_value(b))
    }
}

impl<A: SameValue, B: SameValue> SameValue for (A, B) {
    fn same_value(&self, other: &Self) -> bool {
        self.0.same_value(&other.0) && self.1.same_value(&other.1)
    }
}

impl<A: SameValue, B: SameValue, C: SameValue> SameValue for (A, B, C) {
    fn same_value(&self, other: &Self) -> bool {
        self.0.same_value(&other.0)
            && self.1.same_value(&other.1)
            && self.2.same_value(&other.2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_compare_by_value() {
        assert!(1i32.same_value(&1));
        assert!(!1i32.same_value(&2));
    }

    #[test]
    fn nan_is_same_value_as_nan() {
        assert!(f64::NAN.same_value(&f64::NAN));
        assert!(f32::NAN.same_value(&f32::NAN));
        assert!(!f64::NAN.same_value(&1.0));
    }

    #[test]
    fn signed_zeros_differ() {
        assert!(!0.0f64.same_value(&-0.0));
        assert!(0.0f64.same_value(&0.0));
    }

    #[test]
    fn options_and_vecs_compare_structurally() {
        assert!(Some(f64::NAN).same_value(&Some(f64::NAN)));
        assert!(!Some(1).same_value(&None));
        assert!(vec![1, 2].same_value(&vec![1, 2]));
        assert!(!vec![1, 2].same_value(&vec![1, 3]));
        assert!(!vec![1].same_value(&vec![1, 2]));
    }
}
