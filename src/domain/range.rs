use std::cmp::Ordering;
use std::fmt::{self, Display};
use std::ops::{Add, Sub};

use crate::error::{FieldError, Result};

/// One end of a [`UnitRange`]. The derived ordering puts `NegInf` below every finite
/// value and `PosInf` above every finite value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Bound {
    NegInf,
    Finite(isize),
    PosInf,
}

impl Bound {
    pub fn is_finite(&self) -> bool {
        matches!(self, Bound::Finite(_))
    }

    pub fn finite(&self) -> Option<isize> {
        match self {
            Bound::Finite(x) => Some(*x),
            _ => None,
        }
    }

    /// Sum of two bounds; infinities of opposite sign have no sum.
    pub fn checked_add(self, other: Bound) -> Option<Bound> {
        use Bound::*;
        match (self, other) {
            (Finite(a), Finite(b)) => Some(Finite(a + b)),
            (NegInf, PosInf) | (PosInf, NegInf) => None,
            (NegInf, _) | (_, NegInf) => Some(NegInf),
            (PosInf, _) | (_, PosInf) => Some(PosInf),
        }
    }
}

impl Add<isize> for Bound {
    type Output = Bound;
    fn add(self, rhs: isize) -> Bound {
        match self {
            Bound::Finite(x) => Bound::Finite(x + rhs),
            inf => inf,
        }
    }
}

impl Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bound::NegInf => write!(f, "-inf"),
            Bound::Finite(x) => write!(f, "{}", x),
            Bound::PosInf => write!(f, "inf"),
        }
    }
}

/////////////////////////////////////////////////////////////////////
// UnitRange, the half open interval [start, stop) of one dimension
/////////////////////////////////////////////////////////////////////

/// A half open integer interval `[start, stop)`, either end may be infinite.
/// Empty finite ranges are always stored as `[0, 0)` so that equality does not depend
/// on where an empty range came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UnitRange {
    start: Bound,
    stop: Bound,
}

impl UnitRange {
    pub fn new(start: isize, stop: isize) -> UnitRange {
        Self::ordered(Bound::Finite(start), Bound::Finite(stop))
    }

    /// A range may not start at `+inf` nor stop at `-inf`.
    pub fn from_bounds(start: Bound, stop: Bound) -> Result<UnitRange> {
        if start == Bound::PosInf || stop == Bound::NegInf {
            return Err(FieldError::invalid(format!("invalid range bounds [{}, {})", start, stop)));
        }
        Ok(Self::ordered(start, stop))
    }

    /// Bounds already known to be valid; `start >= stop` gives the empty range.
    fn ordered(start: Bound, stop: Bound) -> UnitRange {
        if start < stop {
            UnitRange { start, stop }
        } else {
            UnitRange::empty()
        }
    }

    pub fn empty() -> UnitRange {
        UnitRange { start: Bound::Finite(0), stop: Bound::Finite(0) }
    }

    pub fn infinite() -> UnitRange {
        UnitRange { start: Bound::NegInf, stop: Bound::PosInf }
    }

    /// `(-inf, stop)`
    pub fn left_infinite(stop: isize) -> UnitRange {
        UnitRange { start: Bound::NegInf, stop: Bound::Finite(stop) }
    }

    /// `[start, inf)`
    pub fn right_infinite(start: isize) -> UnitRange {
        UnitRange { start: Bound::Finite(start), stop: Bound::PosInf }
    }

    pub fn start(&self) -> Bound {
        self.start
    }

    pub fn stop(&self) -> Bound {
        self.stop
    }

    pub fn is_left_finite(&self) -> bool {
        self.start.is_finite()
    }

    pub fn is_right_finite(&self) -> bool {
        self.stop.is_finite()
    }

    pub fn is_finite(&self) -> bool {
        self.is_left_finite() && self.is_right_finite()
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.stop
    }

    /// Finite `(start, stop)` pair, fails for infinite ranges.
    pub fn finite_bounds(&self) -> Result<(isize, isize)> {
        match (self.start, self.stop) {
            (Bound::Finite(a), Bound::Finite(b)) => Ok((a, b)),
            _ => Err(FieldError::InfiniteRange(format!("range {} has no finite bounds", self))),
        }
    }

    pub fn len(&self) -> Result<usize> {
        let (start, stop) = self
            .finite_bounds()
            .map_err(|_| FieldError::InfiniteRange(format!("cannot compute length of range {}", self)))?;
        Ok((stop - start).max(0) as usize)
    }

    pub fn contains(&self, index: isize) -> bool {
        let i = Bound::Finite(index);
        self.start <= i && i < self.stop
    }

    /// Inclusion test, an empty range is a subset of everything.
    pub fn is_subset_of(&self, other: &UnitRange) -> bool {
        self.is_empty() || (other.start <= self.start && self.stop <= other.stop)
    }

    pub fn shift(&self, offset: isize) -> UnitRange {
        if self.is_empty() {
            return *self;
        }
        UnitRange { start: self.start + offset, stop: self.stop + offset }
    }

    pub fn intersection(&self, other: &UnitRange) -> UnitRange {
        let start = self.start.max(other.start);
        let stop = self.stop.min(other.stop);
        UnitRange::ordered(start, stop)
    }

    /// Intersection of any number of ranges, the empty intersection is the infinite range.
    pub fn intersect_all<'a>(ranges: impl IntoIterator<Item = &'a UnitRange>) -> UnitRange {
        ranges.into_iter().fold(UnitRange::infinite(), |acc, r| acc.intersection(r))
    }

    /// Iterates over the indices of a finite range.
    pub fn iter(&self) -> Result<std::ops::Range<isize>> {
        let (start, stop) = self.finite_bounds()?;
        Ok(start..stop)
    }
}

impl Add<isize> for UnitRange {
    type Output = UnitRange;
    fn add(self, rhs: isize) -> UnitRange {
        self.shift(rhs)
    }
}

impl Sub<isize> for UnitRange {
    type Output = UnitRange;
    fn sub(self, rhs: isize) -> UnitRange {
        self.shift(-rhs)
    }
}

impl PartialOrd for UnitRange {
    /// Ranges are partially ordered by inclusion.
    fn partial_cmp(&self, other: &UnitRange) -> Option<Ordering> {
        match (self.is_subset_of(other), other.is_subset_of(self)) {
            (true, true) => Some(Ordering::Equal),
            (true, false) => Some(Ordering::Less),
            (false, true) => Some(Ordering::Greater),
            (false, false) => None,
        }
    }
}

impl From<std::ops::Range<isize>> for UnitRange {
    fn from(r: std::ops::Range<isize>) -> UnitRange {
        UnitRange::new(r.start, r.end)
    }
}

impl Display for UnitRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.stop)
    }
}
