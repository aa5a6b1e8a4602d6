//! Index specifications come in two flavours: absolute ones name the dimension and use
//! the coordinates of the domain, relative ones are positional and count from the first
//! element of each axis (negative values count from the end, as in numpy).
//!
//! Index spec          | new domain          | array slice
//! Absolute(named ..)  | sub_domain          | slices_from_domain_slice
//! Relative(slices ..) | sub_domain          | passed through, ellipsis expanded

use super::{Bound, Dimension, Domain, NamedIndex, NamedRange, UnitRange};
use crate::error::{FieldError, Result};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum AbsoluteIndex {
    Range(NamedRange),
    Index(NamedIndex),
}

impl AbsoluteIndex {
    pub fn dim(&self) -> &Dimension {
        match self {
            AbsoluteIndex::Range(nr) => &nr.dim,
            AbsoluteIndex::Index(ni) => &ni.dim,
        }
    }

    fn describe(&self) -> String {
        match self {
            AbsoluteIndex::Range(nr) => nr.to_string(),
            AbsoluteIndex::Index(ni) => format!("{}={}", ni.dim.value, ni.index),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RelativeIndex {
    Slice { start: Option<isize>, stop: Option<isize> },
    Index(isize),
    Ellipsis,
}

impl RelativeIndex {
    pub fn full() -> RelativeIndex {
        RelativeIndex::Slice { start: None, stop: None }
    }

    pub fn slice(start: isize, stop: isize) -> RelativeIndex {
        RelativeIndex::Slice { start: Some(start), stop: Some(stop) }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum IndexSpec {
    Absolute(Vec<AbsoluteIndex>),
    Relative(Vec<RelativeIndex>),
}

impl From<&Domain> for IndexSpec {
    fn from(d: &Domain) -> IndexSpec {
        IndexSpec::Absolute(d.named_ranges().iter().cloned().map(AbsoluteIndex::Range).collect())
    }
}

impl From<Domain> for IndexSpec {
    fn from(d: Domain) -> IndexSpec {
        IndexSpec::from(&d)
    }
}

impl From<NamedRange> for IndexSpec {
    fn from(nr: NamedRange) -> IndexSpec {
        IndexSpec::Absolute(vec![AbsoluteIndex::Range(nr)])
    }
}

impl From<NamedIndex> for IndexSpec {
    fn from(ni: NamedIndex) -> IndexSpec {
        IndexSpec::Absolute(vec![AbsoluteIndex::Index(ni)])
    }
}

impl From<Vec<AbsoluteIndex>> for IndexSpec {
    fn from(v: Vec<AbsoluteIndex>) -> IndexSpec {
        IndexSpec::Absolute(v)
    }
}

impl From<Vec<RelativeIndex>> for IndexSpec {
    fn from(v: Vec<RelativeIndex>) -> IndexSpec {
        IndexSpec::Relative(v)
    }
}

impl From<RelativeIndex> for IndexSpec {
    fn from(r: RelativeIndex) -> IndexSpec {
        IndexSpec::Relative(vec![r])
    }
}

/// Positional selection along one array axis, negative values count from the end.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AxisSlice {
    Range { start: Option<isize>, stop: Option<isize> },
    Index(isize),
}

impl AxisSlice {
    pub fn full() -> AxisSlice {
        AxisSlice::Range { start: None, stop: None }
    }
}

fn out_of_bounds(domain: &Domain, index: String, dim: &Dimension) -> FieldError {
    FieldError::IndexOutOfBounds { domain: domain.clone(), index, dim: dim.value.clone() }
}

/// Domain of the sub-field selected by `index`.
pub fn sub_domain(domain: &Domain, index: &IndexSpec) -> Result<Domain> {
    match index {
        IndexSpec::Absolute(idx) => absolute_sub_domain(domain, idx),
        IndexSpec::Relative(idx) => relative_sub_domain(domain, idx),
    }
}

fn absolute_sub_domain(domain: &Domain, index: &[AbsoluteIndex]) -> Result<Domain> {
    let mut named_ranges = Vec::with_capacity(domain.ndim());
    for nr in domain.named_ranges() {
        match index.iter().find(|i| i.dim() == &nr.dim) {
            Some(AbsoluteIndex::Range(sel)) => {
                if !sel.range.is_subset_of(&nr.range) {
                    return Err(out_of_bounds(domain, sel.to_string(), &nr.dim));
                }
                named_ranges.push(sel.clone());
            }
            Some(i @ AbsoluteIndex::Index(ni)) => {
                // integer indices remove the dimension
                if !nr.range.contains(ni.index) {
                    return Err(out_of_bounds(domain, i.describe(), &nr.dim));
                }
            }
            None => named_ranges.push(nr.clone()),
        }
    }
    Domain::new(named_ranges)
}

fn expand_ellipsis(index: &[RelativeIndex], ndim: usize) -> Result<Vec<RelativeIndex>> {
    let n_ellipsis = index.iter().filter(|i| matches!(i, RelativeIndex::Ellipsis)).count();
    if n_ellipsis > 1 {
        return Err(FieldError::invalid("an index can only have a single ellipsis"));
    }
    let mut expanded = Vec::with_capacity(ndim);
    for i in index {
        if let RelativeIndex::Ellipsis = i {
            let fill = (ndim + 1).saturating_sub(index.len());
            expanded.extend(std::iter::repeat(RelativeIndex::full()).take(fill));
        } else {
            expanded.push(*i);
        }
    }
    Ok(expanded)
}

fn relative_sub_domain(domain: &Domain, index: &[RelativeIndex]) -> Result<Domain> {
    let mut expanded = expand_ellipsis(index, domain.ndim())?;
    if expanded.len() > domain.ndim() {
        return Err(FieldError::invalid(format!(
            "can not access dimension with index {:?} of a field with {} dimensions",
            index,
            domain.ndim()
        )));
    }
    expanded.resize(domain.ndim(), RelativeIndex::full());

    let mut named_ranges = Vec::with_capacity(domain.ndim());
    for (nr, idx) in domain.named_ranges().iter().zip(expanded) {
        match idx {
            RelativeIndex::Slice { start, stop } => {
                let sliced = slice_range(&nr.range, start, stop).map_err(|e| match e {
                    FieldError::InvalidArgument(_) => out_of_bounds(domain, format!("{:?}", idx), &nr.dim),
                    e => e,
                })?;
                named_ranges.push(NamedRange::new(nr.dim.clone(), sliced));
            }
            RelativeIndex::Index(i) => {
                let base = if i >= 0 { nr.range.start() } else { nr.range.stop() };
                let target = base
                    .finite()
                    .ok_or_else(|| FieldError::InfiniteRange(format!("integer index on range {}", nr.range)))?
                    + i;
                if !nr.range.contains(target) {
                    return Err(out_of_bounds(domain, i.to_string(), &nr.dim));
                }
            }
            RelativeIndex::Ellipsis => return Err(FieldError::Internal("unexpanded ellipsis".into())),
        }
    }
    Domain::new(named_ranges)
}

/// Applies a positional slice to a range without clipping.
fn slice_range(range: &UnitRange, start: Option<isize>, stop: Option<isize>) -> Result<UnitRange> {
    if start.is_none() && stop.is_none() {
        return Ok(*range);
    }
    let offset_from = |x: isize| -> Result<Bound> {
        let base = if x >= 0 { range.start() } else { range.stop() };
        match base {
            Bound::Finite(b) => Ok(Bound::Finite(b + x)),
            _ => Err(FieldError::InfiniteRange(format!("relative slice on range {}", range))),
        }
    };
    let new_start = match start {
        Some(s) => offset_from(s)?,
        None => range.start(),
    };
    let new_stop = match stop {
        Some(s) => offset_from(s)?,
        None => range.stop(),
    };
    if new_start < range.start() || new_stop > range.stop() {
        return Err(FieldError::invalid(format!("slice out of range {} (no clipping)", range)));
    }
    if new_start >= new_stop {
        return Ok(UnitRange::empty());
    }
    UnitRange::from_bounds(new_start, new_stop)
}

/// Converts absolute named ranges/indices into per-axis positional slices of an array
/// laid out according to `domain`. Axes not mentioned are taken whole.
pub fn slices_from_domain_slice(domain: &Domain, domain_slice: &[AbsoluteIndex]) -> Result<Vec<AxisSlice>> {
    domain
        .named_ranges()
        .iter()
        .map(|nr| match domain_slice.iter().find(|i| i.dim() == &nr.dim) {
            Some(AbsoluteIndex::Range(sel)) => compute_slice(&sel.range, &nr.range),
            Some(AbsoluteIndex::Index(ni)) => {
                let start = nr.range.start().finite().ok_or_else(|| {
                    FieldError::InfiniteRange(format!("integer index into infinite range {}", nr.range))
                })?;
                Ok(AxisSlice::Index(ni.index - start))
            }
            None => Ok(AxisSlice::full()),
        })
        .collect()
}

fn compute_slice(sel: &UnitRange, current: &UnitRange) -> Result<AxisSlice> {
    if sel.is_empty() {
        return Ok(AxisSlice::Range { start: Some(0), stop: Some(0) });
    }
    let origin = current.start().finite();
    let relative = |b: Bound| -> Result<Option<isize>> {
        match (b, origin) {
            (Bound::Finite(x), Some(o)) => Ok(Some(x - o)),
            _ => Err(FieldError::InfiniteRange(format!(
                "cannot convert {} to a relative slice of {}",
                sel, current
            ))),
        }
    };
    let start = if current.is_left_finite() { relative(sel.start())? } else { None };
    let stop = if current.is_right_finite() { relative(sel.stop())? } else { None };
    Ok(AxisSlice::Range { start, stop })
}

/// Translates a relative spec into per-axis slices, expanding the ellipsis.
pub(crate) fn relative_axis_slices(ndim: usize, index: &[RelativeIndex]) -> Result<Vec<AxisSlice>> {
    let mut expanded = expand_ellipsis(index, ndim)?;
    expanded.resize(ndim.max(expanded.len()), RelativeIndex::full());
    Ok(expanded
        .into_iter()
        .map(|i| match i {
            RelativeIndex::Slice { start, stop } => AxisSlice::Range { start, stop },
            RelativeIndex::Index(i) => AxisSlice::Index(i),
            RelativeIndex::Ellipsis => AxisSlice::full(),
        })
        .collect())
}

/// Sub-domain together with the array slices that select it.
pub(crate) fn domain_slice(domain: &Domain, index: &IndexSpec) -> Result<(Domain, Vec<AxisSlice>)> {
    let new_domain = sub_domain(domain, index)?;
    let slices = match index {
        IndexSpec::Absolute(idx) => slices_from_domain_slice(domain, idx)?,
        IndexSpec::Relative(idx) => relative_axis_slices(domain.ndim(), idx)?,
    };
    Ok((new_domain, slices))
}
