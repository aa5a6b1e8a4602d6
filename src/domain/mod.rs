mod range;
mod index;

pub use range::{Bound, UnitRange};
pub use index::{
    sub_domain, slices_from_domain_slice, AbsoluteIndex, AxisSlice, IndexSpec, RelativeIndex,
};
pub(crate) use index::domain_slice;

use std::fmt::{self, Display};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use strum::{Display as StrumDisplay, EnumString};

use crate::error::{FieldError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, StrumDisplay, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum DimensionKind {
    Horizontal,
    Vertical,
    Local,
}

/// A named axis of the computational grid, compared by name and kind.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Dimension {
    pub value: String,
    pub kind: DimensionKind,
}

impl Dimension {
    pub fn new(value: impl Into<String>, kind: DimensionKind) -> Dimension {
        Dimension { value: value.into(), kind }
    }

    pub fn horizontal(value: impl Into<String>) -> Dimension {
        Self::new(value, DimensionKind::Horizontal)
    }

    pub fn vertical(value: impl Into<String>) -> Dimension {
        Self::new(value, DimensionKind::Vertical)
    }

    pub fn local(value: impl Into<String>) -> Dimension {
        Self::new(value, DimensionKind::Local)
    }

    pub fn is_local(&self) -> bool {
        self.kind == DimensionKind::Local
    }

    pub fn range(&self, range: impl Into<UnitRange>) -> NamedRange {
        NamedRange::new(self.clone(), range.into())
    }

    pub fn index(&self, index: isize) -> NamedIndex {
        NamedIndex { dim: self.clone(), index }
    }
}

impl Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.value, self.kind)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NamedRange {
    pub dim: Dimension,
    pub range: UnitRange,
}

impl NamedRange {
    pub fn new(dim: Dimension, range: UnitRange) -> NamedRange {
        NamedRange { dim, range }
    }
}

impl Display for NamedRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.dim.value, self.range)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NamedIndex {
    pub dim: Dimension,
    pub index: isize,
}

/////////////////////////////////////////////////////////////////////
// Domain, the ordered product of named ranges a field is defined on
/////////////////////////////////////////////////////////////////////

/// Ordered sequence of named ranges with unique dimensions. The order matches the
/// axis order of any array paired with the domain.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct Domain {
    ranges: SmallVec<[NamedRange; 4]>,
}

impl Domain {
    pub fn new(ranges: impl IntoIterator<Item = NamedRange>) -> Result<Domain> {
        let ranges: SmallVec<[NamedRange; 4]> = ranges.into_iter().collect();
        if let Some(dup) = ranges.iter().map(|nr| &nr.dim).duplicates().next() {
            return Err(FieldError::dims(format!("dimension '{}' appears more than once in domain", dup)));
        }
        Ok(Domain { ranges })
    }

    /// The 0-dimensional domain.
    pub fn empty() -> Domain {
        Domain::default()
    }

    pub fn ndim(&self) -> usize {
        self.ranges.len()
    }

    pub fn dims(&self) -> Vec<Dimension> {
        self.ranges.iter().map(|nr| nr.dim.clone()).collect()
    }

    pub fn ranges(&self) -> impl Iterator<Item = &UnitRange> + '_ {
        self.ranges.iter().map(|nr| &nr.range)
    }

    pub fn named_ranges(&self) -> &[NamedRange] {
        &self.ranges
    }

    pub fn dim_index(&self, dim: &Dimension) -> Option<usize> {
        self.ranges.iter().position(|nr| &nr.dim == dim)
    }

    pub fn get(&self, dim: &Dimension) -> Option<&NamedRange> {
        self.ranges.iter().find(|nr| &nr.dim == dim)
    }

    pub fn contains_dim(&self, dim: &Dimension) -> bool {
        self.dim_index(dim).is_some()
    }

    pub fn is_finite(&self) -> bool {
        self.ranges.iter().all(|nr| nr.range.is_finite())
    }

    /// True if any range is empty; the 0-d domain is not empty.
    pub fn is_empty(&self) -> bool {
        self.ranges.iter().any(|nr| nr.range.is_empty())
    }

    pub fn shape(&self) -> Result<Vec<usize>> {
        self.ranges.iter().map(|nr| nr.range.len()).collect()
    }

    /// Replaces the range at `index` by any number of named ranges.
    pub fn replace(&self, index: usize, with: impl IntoIterator<Item = NamedRange>) -> Result<Domain> {
        if index >= self.ndim() {
            return Err(FieldError::invalid(format!("no dimension at position {} of domain {}", index, self)));
        }
        let ranges = self.ranges[..index]
            .iter()
            .cloned()
            .chain(with)
            .chain(self.ranges[index + 1..].iter().cloned());
        Domain::new(ranges)
    }

    /// Replaces the range of `dim`.
    pub fn replace_dim(&self, dim: &Dimension, range: UnitRange) -> Result<Domain> {
        let index = self
            .dim_index(dim)
            .ok_or_else(|| FieldError::dims(format!("dimension '{}' not in domain {}", dim, self)))?;
        self.replace(index, [NamedRange::new(dim.clone(), range)])
    }

    pub fn without(&self, dim: &Dimension) -> Domain {
        Domain { ranges: self.ranges.iter().filter(|nr| &nr.dim != dim).cloned().collect() }
    }

    /// Intersection over the promoted dimensions of both domains, a dimension missing
    /// from one side is unrestricted on that side.
    pub fn intersection(&self, other: &Domain) -> Result<Domain> {
        let dims = promote_dims(&[self.dims(), other.dims()])?;
        let ranges = dims.into_iter().map(|dim| {
            let a = self.get(&dim).map_or(UnitRange::infinite(), |nr| nr.range);
            let b = other.get(&dim).map_or(UnitRange::infinite(), |nr| nr.range);
            NamedRange::new(dim, a.intersection(&b))
        });
        Domain::new(ranges)
    }
}

impl Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Domain({})", self.ranges.iter().join(", "))
    }
}

impl From<NamedRange> for Domain {
    fn from(nr: NamedRange) -> Domain {
        Domain { ranges: smallvec::smallvec![nr] }
    }
}

/// Merges dimension lists into one list that respects the relative order of every
/// input. Among dimensions without an ordering constraint the smallest by kind, then
/// name, comes first, so the result does not depend on the order of the lists.
pub fn promote_dims(dim_lists: &[Vec<Dimension>]) -> Result<Vec<Dimension>> {
    let all: Vec<&Dimension> = dim_lists.iter().flatten().unique().collect();
    let position = |d: &Dimension| all.iter().position(|x| *x == d);
    // predecessors of each dimension, from consecutive pairs of every list
    let mut preds: Vec<Vec<usize>> = vec![Vec::new(); all.len()];
    for list in dim_lists {
        for (a, b) in list.iter().tuple_windows() {
            if let (Some(ia), Some(ib)) = (position(a), position(b)) {
                if !preds[ib].contains(&ia) {
                    preds[ib].push(ia);
                }
            }
        }
    }

    let mut placed = vec![false; all.len()];
    let mut result = Vec::with_capacity(all.len());
    while result.len() < all.len() {
        let next = (0..all.len())
            .filter(|&i| !placed[i] && preds[i].iter().all(|&p| placed[p]))
            .min_by_key(|&i| (all[i].kind, &all[i].value));
        match next {
            Some(i) => {
                placed[i] = true;
                result.push(all[i].clone());
            }
            None => {
                return Err(FieldError::dims(format!(
                    "dimensions can not be promoted, contradicting order in {}",
                    dim_lists.iter().map(|l| format!("[{}]", l.iter().join(", "))).join(", ")
                )));
            }
        }
    }
    Ok(result)
}

/// Intersection of all domains; no domains gives the 0-d domain.
pub fn domain_intersection<'a>(domains: impl IntoIterator<Item = &'a Domain>) -> Result<Domain> {
    let mut iter = domains.into_iter();
    let first = match iter.next() {
        Some(d) => d.clone(),
        None => return Ok(Domain::empty()),
    };
    iter.try_fold(first, |acc, d| acc.intersection(d))
}

/// Restricts every domain to the common intersection, except along `ignore_dims`
/// where each domain keeps its own range.
pub fn restrict_to_intersection(domains: &[Domain], ignore_dims: &[Dimension]) -> Result<Vec<Domain>> {
    let stripped: Vec<Domain> = domains
        .iter()
        .map(|d| Domain::new(d.named_ranges().iter().filter(|nr| !ignore_dims.contains(&nr.dim)).cloned()))
        .collect::<Result<_>>()?;
    let common = domain_intersection(&stripped)?;
    domains
        .iter()
        .map(|d| {
            Domain::new(d.named_ranges().iter().map(|nr| {
                if ignore_dims.contains(&nr.dim) {
                    nr.clone()
                } else {
                    common.get(&nr.dim).cloned().unwrap_or_else(|| nr.clone())
                }
            }))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims() -> (Dimension, Dimension, Dimension) {
        (Dimension::horizontal("I"), Dimension::horizontal("J"), Dimension::vertical("K"))
    }

    #[test]
    fn duplicate_dims_rejected() {
        let (i, _, _) = dims();
        let err = Domain::new([i.range(0..2), i.range(0..3)]).unwrap_err();
        assert!(matches!(err, FieldError::DimensionMismatch(_)));
    }

    #[test]
    fn intersection_is_commutative_and_idempotent() {
        let (i, j, k) = dims();
        let d1 = Domain::new([i.range(0..5), k.range(-1..3)]).unwrap();
        let d2 = Domain::new([i.range(2..9), j.range(0..4), k.range(0..10)]).unwrap();
        let a = d1.intersection(&d2).unwrap();
        let b = d2.intersection(&d1).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.dims(), vec![i.clone(), j.clone(), k.clone()]);
        assert_eq!(a.get(&i).unwrap().range, UnitRange::new(2, 5));
        assert_eq!(a.get(&j).unwrap().range, UnitRange::new(0, 4));
        assert_eq!(d1.intersection(&d1).unwrap(), d1);
    }

    #[test]
    fn random_intersections() {
        use rand::Rng;
        let (i, _, k) = dims();
        let mut rng = rand::thread_rng();
        let mut random_domain = || {
            let (a, b): (isize, isize) = (rng.gen_range(-10..10), rng.gen_range(-10..10));
            let (c, d): (isize, isize) = (rng.gen_range(-10..10), rng.gen_range(-10..10));
            Domain::new([i.range(a.min(b)..a.max(b)), k.range(c.min(d)..c.max(d))]).unwrap()
        };
        for _ in 0..100 {
            let (d1, d2) = (random_domain(), random_domain());
            assert_eq!(d1.intersection(&d2).unwrap(), d2.intersection(&d1).unwrap());
            assert_eq!(d1.intersection(&d1).unwrap(), d1);
        }
    }

    #[test]
    fn promote_respects_order() {
        let (i, j, k) = dims();
        let p = promote_dims(&[vec![i.clone(), k.clone()], vec![j.clone(), k.clone()]]).unwrap();
        assert_eq!(p, vec![i.clone(), j.clone(), k.clone()]);
        let err = promote_dims(&[vec![i.clone(), j.clone()], vec![j, i]]);
        assert!(err.is_err());
    }

    #[test]
    fn promote_is_independent_of_list_order() {
        let (i, j, k) = dims();
        let e = Dimension::local("E2V");
        let lists = [vec![j.clone(), k.clone()], vec![i.clone(), k.clone()], vec![e.clone()]];
        let forward = promote_dims(&lists).unwrap();
        let backward = promote_dims(&[lists[2].clone(), lists[1].clone(), lists[0].clone()]).unwrap();
        assert_eq!(forward, backward);
        assert_eq!(forward, vec![i, j, k, e]);
    }

    #[test]
    fn intersection_of_unordered_dimensions_commutes() {
        let (i, j, k) = dims();
        let d1 = Domain::new([i.range(0..5), k.range(0..3)]).unwrap();
        let d2 = Domain::new([j.range(0..4), k.range(1..3)]).unwrap();
        let a = d1.intersection(&d2).unwrap();
        assert_eq!(a, d2.intersection(&d1).unwrap());
        assert_eq!(a, Domain::new([i.range(0..5), j.range(0..4), k.range(1..3)]).unwrap());
        assert_eq!(domain_intersection([&d2, &d1]).unwrap(), domain_intersection([&d1, &d2]).unwrap());
    }

    #[test]
    fn replace_one_by_many() {
        let (i, j, k) = dims();
        let d = Domain::new([i.range(0..4), k.range(0..2)]).unwrap();
        let r = d.replace(0, [i.range(1..3), j.range(0..2)]).unwrap();
        assert_eq!(r.dims(), vec![i.clone(), j.clone(), k.clone()]);
        assert!(d.replace(0, [k.range(0..1)]).is_err());
    }

    #[test]
    fn restrict_to_intersection_ignores_dims() {
        let (i, j, _) = dims();
        let a = Domain::new([i.range(0..4), j.range(0..10)]).unwrap();
        let b = Domain::new([i.range(0..10), j.range(3..6)]).unwrap();
        let out = restrict_to_intersection(&[a, b], &[i.clone()]).unwrap();
        assert_eq!(out[0], Domain::new([i.range(0..4), j.range(3..6)]).unwrap());
        assert_eq!(out[1], Domain::new([i.range(0..10), j.range(3..6)]).unwrap());
    }

    #[test]
    fn shape_fails_on_infinite() {
        let (i, _, _) = dims();
        let d = Domain::new([NamedRange::new(i, UnitRange::infinite())]).unwrap();
        assert!(!d.is_finite());
        assert!(matches!(d.shape(), Err(FieldError::InfiniteRange(_))));
    }
}
