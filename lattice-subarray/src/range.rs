use std::fmt::{Display, Formatter};

use lattice_dtype::NativeCellType;
use lattice_error::{lattice_bail, LatticeResult};

/// A closed coordinate interval `[lo, hi]` on a single dimension.
///
/// Never empty: `lo <= hi` holds for every constructed range, and float
/// endpoints are never NaN.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range<T> {
    lo: T,
    hi: T,
}

impl<T: NativeCellType> Range<T> {
    /// Creates a range, rejecting empty intervals and NaN endpoints.
    pub fn new(lo: T, hi: T) -> LatticeResult<Self> {
        if lo.is_nan() || hi.is_nan() {
            lattice_bail!(Domain: "range endpoints may not be NaN");
        }
        if !(lo <= hi) {
            lattice_bail!(Domain: "range lower bound {} exceeds upper bound {}", lo, hi);
        }
        Ok(Self { lo, hi })
    }

    /// The inclusive lower bound.
    pub fn lo(&self) -> T {
        self.lo
    }

    /// The inclusive upper bound.
    pub fn hi(&self) -> T {
        self.hi
    }

    /// Whether the range covers a single coordinate.
    pub fn is_unary(&self) -> bool {
        self.lo == self.hi
    }

    /// Whether `v` lies inside the range.
    pub fn contains(&self, v: T) -> bool {
        self.lo <= v && v <= self.hi
    }

    /// Whether `other` lies entirely inside this range.
    pub fn encloses(&self, other: &Self) -> bool {
        self.lo <= other.lo && other.hi <= self.hi
    }

    /// Whether the range can be split into two non-empty ranges.
    pub fn is_splittable(&self) -> bool {
        T::is_splittable(self.lo, self.hi)
    }

    /// The number of candidate splitting points inside the range.
    pub fn splittable_points(&self) -> u128 {
        T::splittable_points(self.lo, self.hi)
    }

    /// The midpoint used as the default splitting point.
    pub fn midpoint(&self) -> T {
        T::split_midpoint(self.lo, self.hi)
    }

    /// Splits at `p` into `[lo, p]` and `[succ(p), hi]`, where `succ` is
    /// `+1` for integers and the float successor for floats. Requires
    /// `lo <= p < hi`.
    pub fn split_at(&self, p: T) -> LatticeResult<(Self, Self)> {
        if !(self.lo <= p && p < self.hi) {
            lattice_bail!(
                Domain: "splitting point {} does not fall inside [{}, {})",
                p,
                self.lo,
                self.hi
            );
        }
        Ok((
            Self {
                lo: self.lo,
                hi: p,
            },
            Self {
                lo: p.next_point(),
                hi: self.hi,
            },
        ))
    }

    /// The coordinate span covered by the range: cell count for integers,
    /// interval length for floats.
    pub fn span_volume(&self) -> f64 {
        T::span_volume(self.lo, self.hi)
    }
}

impl<T: NativeCellType> Display for Range<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.lo, self.hi)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn rejects_empty() {
        assert!(Range::new(3_i32, 1).is_err());
        assert!(Range::new(1_i32, 1).is_ok());
    }

    #[test]
    fn rejects_nan() {
        assert!(Range::new(f64::NAN, 1.0).is_err());
        assert!(Range::new(0.0, f64::NAN).is_err());
    }

    #[rstest]
    #[case(1, 100, 50, (1, 50), (51, 100))]
    #[case(1, 2, 1, (1, 1), (2, 2))]
    #[case(-10, 10, 0, (-10, 0), (1, 10))]
    fn split_integer(
        #[case] lo: i32,
        #[case] hi: i32,
        #[case] p: i32,
        #[case] left: (i32, i32),
        #[case] right: (i32, i32),
    ) {
        let (l, r) = Range::new(lo, hi).unwrap().split_at(p).unwrap();
        assert_eq!((l.lo(), l.hi()), left);
        assert_eq!((r.lo(), r.hi()), right);
    }

    #[test]
    fn split_float_uses_successor() {
        let (l, r) = Range::new(0.0_f64, 1.0).unwrap().split_at(0.5).unwrap();
        assert_eq!(l.hi(), 0.5);
        assert_eq!(r.lo(), 0.5_f64.next_up());
        assert_eq!(r.hi(), 1.0);
    }

    #[test]
    fn split_point_must_be_interior() {
        let r = Range::new(1_i32, 10).unwrap();
        assert!(r.split_at(0).is_err());
        assert!(r.split_at(10).is_err());
    }

    #[test]
    fn containment() {
        let r = Range::new(5_i64, 9).unwrap();
        assert!(r.contains(5) && r.contains(9));
        assert!(!r.contains(4));
        assert!(r.encloses(&Range::new(6, 8).unwrap()));
        assert!(!r.encloses(&Range::new(6, 10).unwrap()));
    }

    #[test]
    fn unary_is_not_splittable() {
        let r = Range::new(7_u8, 7).unwrap();
        assert!(r.is_unary());
        assert!(!r.is_splittable());
        assert_eq!(r.splittable_points(), 0);
    }

    #[test]
    fn midpoint_matches_dtype_rule() {
        assert_eq!(Range::new(1_i32, 100).unwrap().midpoint(), 50);
        assert_eq!(Range::new(0.0_f32, 1.0).unwrap().midpoint(), 0.5);
    }
}
