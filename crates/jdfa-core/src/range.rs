//! Integral value sets.
//!
//! [`LongRangeSet`] is a union of disjoint inclusive `[lo, hi]` ranges over
//! `i64`, kept sorted and non-adjacent so that structurally equal sets compare
//! equal. It carries the numeric facts of byte/char/short/int/long values.
//!
//! ```text
//!            all  [i64::MIN, i64::MAX]
//!           /   \
//!   [0, 255]     {-1} ∪ [10, 20]
//!           \   /
//!            {5}
//!             |
//!           empty (unreachable)
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::PrimitiveType;

/// A set of `i64` values represented as sorted disjoint ranges.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LongRangeSet {
    ranges: Vec<(i64, i64)>,
}

impl LongRangeSet {
    pub fn empty() -> Self {
        LongRangeSet { ranges: Vec::new() }
    }

    pub fn all() -> Self {
        LongRangeSet::range(i64::MIN, i64::MAX)
    }

    pub fn point(value: i64) -> Self {
        LongRangeSet::range(value, value)
    }

    /// `[lo, hi]`, or the empty set when `lo > hi`.
    pub fn range(lo: i64, hi: i64) -> Self {
        if lo > hi {
            LongRangeSet::empty()
        } else {
            LongRangeSet {
                ranges: vec![(lo, hi)],
            }
        }
    }

    /// All values representable by an integral type; the full `i64` range
    /// for non-integral types.
    pub fn of_type(kind: PrimitiveType) -> Self {
        match kind.bounds() {
            Some((lo, hi)) => LongRangeSet::range(lo, hi),
            None => LongRangeSet::all(),
        }
    }

    /// Builds a normalized set from arbitrary (possibly overlapping) ranges.
    pub fn from_ranges(ranges: impl IntoIterator<Item = (i64, i64)>) -> Self {
        let mut ranges: Vec<(i64, i64)> = ranges.into_iter().filter(|(lo, hi)| lo <= hi).collect();
        ranges.sort_unstable();
        let mut normalized: Vec<(i64, i64)> = Vec::with_capacity(ranges.len());
        for (lo, hi) in ranges {
            if let Some(last) = normalized.last_mut() {
                // Merge overlapping or adjacent ranges.
                if (lo as i128) <= (last.1 as i128) + 1 {
                    last.1 = last.1.max(hi);
                    continue;
                }
            }
            normalized.push((lo, hi));
        }
        LongRangeSet { ranges: normalized }
    }

    pub fn ranges(&self) -> &[(i64, i64)] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn is_all(&self) -> bool {
        self.ranges == [(i64::MIN, i64::MAX)]
    }

    pub fn min(&self) -> Option<i64> {
        self.ranges.first().map(|(lo, _)| *lo)
    }

    pub fn max(&self) -> Option<i64> {
        self.ranges.last().map(|(_, hi)| *hi)
    }

    /// The single value of a singleton set.
    pub fn as_constant(&self) -> Option<i64> {
        match self.ranges.as_slice() {
            [(lo, hi)] if lo == hi => Some(*lo),
            _ => None,
        }
    }

    pub fn contains(&self, value: i64) -> bool {
        self.ranges.iter().any(|(lo, hi)| *lo <= value && value <= *hi)
    }

    /// Returns `true` if every value of `other` is in `self`.
    pub fn contains_set(&self, other: &LongRangeSet) -> bool {
        other.subtract(self).is_empty()
    }

    pub fn intersect(&self, other: &LongRangeSet) -> LongRangeSet {
        let mut result = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < self.ranges.len() && j < other.ranges.len() {
            let (a_lo, a_hi) = self.ranges[i];
            let (b_lo, b_hi) = other.ranges[j];
            let lo = a_lo.max(b_lo);
            let hi = a_hi.min(b_hi);
            if lo <= hi {
                result.push((lo, hi));
            }
            if a_hi < b_hi {
                i += 1;
            } else {
                j += 1;
            }
        }
        LongRangeSet { ranges: result }
    }

    pub fn unite(&self, other: &LongRangeSet) -> LongRangeSet {
        LongRangeSet::from_ranges(self.ranges.iter().chain(other.ranges.iter()).copied())
    }

    pub fn subtract(&self, other: &LongRangeSet) -> LongRangeSet {
        let mut result = Vec::new();
        for &(lo, hi) in &self.ranges {
            let mut current = lo as i128;
            let end = hi as i128;
            for &(o_lo, o_hi) in &other.ranges {
                let (o_lo, o_hi) = (o_lo as i128, o_hi as i128);
                if o_hi < current || o_lo > end {
                    continue;
                }
                if o_lo > current {
                    result.push((current as i64, (o_lo - 1) as i64));
                }
                current = o_hi + 1;
                if current > end {
                    break;
                }
            }
            if current <= end {
                result.push((current as i64, end as i64));
            }
        }
        LongRangeSet { ranges: result }
    }

    /// Values of `[lo, hi]` that are not in `self`.
    pub fn complement_within(&self, lo: i64, hi: i64) -> LongRangeSet {
        LongRangeSet::range(lo, hi).subtract(self)
    }

    /// Values of the integral type `kind` that are not in `self`.
    pub fn complement_in(&self, kind: PrimitiveType) -> LongRangeSet {
        LongRangeSet::of_type(kind).subtract(self)
    }

    /// Set without a single value.
    pub fn without(&self, value: i64) -> LongRangeSet {
        self.subtract(&LongRangeSet::point(value))
    }

    /// Converts the set to the integral type `kind` with two's-complement
    /// wrapping.
    ///
    /// Ranges that fit are kept. A range that wraps around without covering
    /// the whole target domain is split at the wrap point; a range wider than
    /// the target domain produces the full target range.
    pub fn cast_to(&self, kind: PrimitiveType) -> LongRangeSet {
        let (Some((t_lo, t_hi)), Some(bits)) = (kind.bounds(), kind.bits()) else {
            return self.clone();
        };
        if bits == 64 {
            return self.clone();
        }
        let domain = 1i128 << bits;
        let mut pieces = Vec::new();
        for &(lo, hi) in &self.ranges {
            if t_lo <= lo && hi <= t_hi {
                pieces.push((lo, hi));
                continue;
            }
            if (hi as i128) - (lo as i128) + 1 >= domain {
                return LongRangeSet::range(t_lo, t_hi);
            }
            let (w_lo, w_hi) = (kind.wrap(lo), kind.wrap(hi));
            if w_lo <= w_hi {
                pieces.push((w_lo, w_hi));
            } else {
                pieces.push((w_lo, t_hi));
                pieces.push((t_lo, w_hi));
            }
        }
        LongRangeSet::from_ranges(pieces)
    }

    /// Hull-based interval addition in the value domain of `kind`.
    pub fn plus(&self, other: &LongRangeSet, kind: PrimitiveType) -> LongRangeSet {
        self.hull_op(other, kind, |a, b| a + b)
    }

    /// Hull-based interval subtraction in the value domain of `kind`.
    pub fn minus(&self, other: &LongRangeSet, kind: PrimitiveType) -> LongRangeSet {
        self.hull_op(other, kind, |a, b| a - b)
    }

    /// Hull-based interval multiplication in the value domain of `kind`.
    pub fn times(&self, other: &LongRangeSet, kind: PrimitiveType) -> LongRangeSet {
        self.hull_op(other, kind, |a, b| a * b)
    }

    /// Applies a monotone-per-corner operation on the hulls of both sets.
    /// Results leaving the domain of `kind` overflow and become the full
    /// domain.
    fn hull_op(
        &self,
        other: &LongRangeSet,
        kind: PrimitiveType,
        op: impl Fn(i128, i128) -> i128,
    ) -> LongRangeSet {
        let (Some(a_lo), Some(a_hi), Some(b_lo), Some(b_hi)) =
            (self.min(), self.max(), other.min(), other.max())
        else {
            return LongRangeSet::empty();
        };
        let corners = [
            op(a_lo as i128, b_lo as i128),
            op(a_lo as i128, b_hi as i128),
            op(a_hi as i128, b_lo as i128),
            op(a_hi as i128, b_hi as i128),
        ];
        let lo = corners.iter().copied().min().unwrap_or(i128::MIN);
        let hi = corners.iter().copied().max().unwrap_or(i128::MAX);
        let (t_lo, t_hi) = kind.bounds().unwrap_or((i64::MIN, i64::MAX));
        if lo < t_lo as i128 || hi > t_hi as i128 {
            return LongRangeSet::range(t_lo, t_hi);
        }
        LongRangeSet::range(lo as i64, hi as i64)
    }

    /// Widening: bounds that moved between `self` and `next` jump to the
    /// bounds of `kind`.
    pub fn widen(&self, next: &LongRangeSet, kind: PrimitiveType) -> LongRangeSet {
        if self.contains_set(next) {
            return self.clone();
        }
        let joined = self.unite(next);
        let (t_lo, t_hi) = kind.bounds().unwrap_or((i64::MIN, i64::MAX));
        let (Some(lo), Some(hi)) = (joined.min(), joined.max()) else {
            return joined;
        };
        let lo = match (self.min(), next.min()) {
            (Some(old), Some(new)) if new < old => t_lo,
            _ => lo,
        };
        let hi = match (self.max(), next.max()) {
            (Some(old), Some(new)) if new > old => t_hi,
            _ => hi,
        };
        LongRangeSet::range(lo, hi)
    }
}

impl fmt::Display for LongRangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("{}");
        }
        f.write_str("{")?;
        for (i, (lo, hi)) in self.ranges.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            if lo == hi {
                write!(f, "{}", lo)?;
            } else {
                write!(f, "{}..{}", lo, hi)?;
            }
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn from_ranges_normalizes() {
        let set = LongRangeSet::from_ranges([(5, 10), (0, 3), (4, 4), (20, 15)]);
        assert_eq!(set.ranges(), &[(0, 10)]);
    }

    #[test]
    fn intersect_and_subtract() {
        let a = LongRangeSet::range(0, 10);
        let b = LongRangeSet::from_ranges([(-5, 2), (8, 20)]);
        assert_eq!(a.intersect(&b).ranges(), &[(0, 2), (8, 10)]);
        assert_eq!(a.subtract(&b).ranges(), &[(3, 7)]);
    }

    #[test]
    fn complement_of_point() {
        let set = LongRangeSet::point(0).complement_in(PrimitiveType::Byte);
        assert_eq!(set.ranges(), &[(-128, -1), (1, 127)]);
    }

    #[test]
    fn subtract_at_extremes_does_not_overflow() {
        let set = LongRangeSet::all().without(i64::MAX);
        assert_eq!(set.max(), Some(i64::MAX - 1));
        let set = LongRangeSet::all().without(i64::MIN);
        assert_eq!(set.min(), Some(i64::MIN + 1));
    }

    #[test]
    fn cast_point_wraps() {
        assert_eq!(
            LongRangeSet::point(300).cast_to(PrimitiveType::Byte),
            LongRangeSet::point(44)
        );
    }

    #[test]
    fn cast_range_wrapping_over_boundary_splits() {
        let set = LongRangeSet::range(120, 130).cast_to(PrimitiveType::Byte);
        assert_eq!(set.ranges(), &[(-128, -126), (120, 127)]);
    }

    #[test]
    fn cast_wide_range_gives_full_domain() {
        let set = LongRangeSet::range(0, 1000).cast_to(PrimitiveType::Byte);
        assert_eq!(set, LongRangeSet::of_type(PrimitiveType::Byte));
    }

    #[test]
    fn plus_overflow_gives_full_domain() {
        let a = LongRangeSet::point(i32::MAX as i64);
        let b = LongRangeSet::point(1);
        assert_eq!(
            a.plus(&b, PrimitiveType::Int),
            LongRangeSet::of_type(PrimitiveType::Int)
        );
        assert_eq!(a.plus(&b, PrimitiveType::Long), LongRangeSet::point(i32::MAX as i64 + 1));
    }

    #[test]
    fn times_uses_all_corners() {
        let a = LongRangeSet::range(-2, 3);
        let b = LongRangeSet::range(-4, 5);
        assert_eq!(a.times(&b, PrimitiveType::Int), LongRangeSet::range(-12, 15));
    }

    #[test]
    fn widen_jumps_moving_bound() {
        let old = LongRangeSet::range(0, 1);
        let new = LongRangeSet::range(0, 2);
        assert_eq!(
            old.widen(&new, PrimitiveType::Int),
            LongRangeSet::range(0, i32::MAX as i64)
        );
        assert_eq!(old.widen(&LongRangeSet::point(1), PrimitiveType::Int), old);
    }

    #[test]
    fn display() {
        let set = LongRangeSet::from_ranges([(0, 10), (20, 20)]);
        assert_eq!(format!("{}", set), "{0..10, 20}");
        assert_eq!(format!("{}", LongRangeSet::empty()), "{}");
    }

    fn small_set() -> impl Strategy<Value = LongRangeSet> {
        prop::collection::vec((-50i64..50, 0i64..20), 0..4)
            .prop_map(|v| LongRangeSet::from_ranges(v.into_iter().map(|(lo, len)| (lo, lo + len))))
    }

    proptest! {
        #[test]
        fn intersect_is_commutative(a in small_set(), b in small_set()) {
            prop_assert_eq!(a.intersect(&b), b.intersect(&a));
        }

        #[test]
        fn unite_contains_both(a in small_set(), b in small_set()) {
            let u = a.unite(&b);
            prop_assert!(u.contains_set(&a));
            prop_assert!(u.contains_set(&b));
        }

        #[test]
        fn subtract_is_disjoint_from_subtrahend(a in small_set(), b in small_set()) {
            prop_assert!(a.subtract(&b).intersect(&b).is_empty());
        }

        #[test]
        fn complement_is_involution(a in small_set()) {
            let twice = a.complement_within(-100, 100).complement_within(-100, 100);
            prop_assert_eq!(twice, a);
        }

        #[test]
        fn cast_of_fitting_set_is_identity(a in small_set()) {
            prop_assert_eq!(a.cast_to(PrimitiveType::Byte), a);
        }
    }
}
