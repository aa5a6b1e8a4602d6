//! Connectivities map positions of one dimension onto indices of another (the
//! codomain). Remapping a field through a connectivity gathers its values along the
//! codomain dimension.

use std::collections::{HashMap, VecDeque};
use std::fmt::Debug;
use std::sync::Mutex;

use bitflags::bitflags;
use ndarray::{Array1, ArrayD, Axis, Slice};
use tracing::{debug, trace};

use crate::array::{ArrayData, DType};
use crate::backend::BackendRef;
use crate::config::DEFAULT_CONNECTIVITY_CACHE_CAPACITY;
use crate::domain::{Dimension, Domain, IndexSpec, NamedRange, UnitRange};
use crate::error::{FieldError, Result};
use crate::field::Field;

bitflags! {
    /// How remapping through a connectivity changes the field.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ConnectivityKind: u8 {
        /// dimensions of the result differ from the input
        const MODIFY_DIMS = 1 << 0;
        /// rank of the result differs from the input
        const MODIFY_RANK = 1 << 1;
        /// values are gathered, the buffer can not be reused
        const MODIFY_STRUCTURE = 1 << 2;
    }
}

pub trait Connectivity: Send + Sync + Debug {
    /// Dimension the connectivity values index into.
    fn codomain(&self) -> &Dimension;

    fn kind(&self) -> ConnectivityKind;

    /// Value marking a missing neighbour.
    fn skip_value(&self) -> Option<i64>;

    /// Smallest hypercube of source positions whose values all lie in `image_range`
    /// (or are skipped), as absolute ranges of the source dimensions.
    fn inverse_image(&self, image_range: &UnitRange) -> Result<Vec<NamedRange>>;

    /// Codomain indices of the source positions in `new_ranges`.
    fn gather_indices(&self, new_ranges: &[NamedRange]) -> Result<ArrayD<i64>>;
}

/////////////////////////////////////////////////////////////////////
// bounded memo
/////////////////////////////////////////////////////////////////////

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum MemoKey {
    InverseImage(UnitRange),
    Restrict(IndexSpec),
}

#[derive(Clone, Debug)]
enum MemoValue {
    Ranges(Vec<NamedRange>),
    Restricted(ConnectivityField),
}

#[derive(Debug, Default)]
struct MemoEntries {
    map: HashMap<MemoKey, MemoValue>,
    // least recently used first
    order: VecDeque<MemoKey>,
}

impl MemoEntries {
    fn touch(&mut self, key: &MemoKey) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            if let Some(k) = self.order.remove(pos) {
                self.order.push_back(k);
            }
        }
    }
}

/// LRU cache owned by one connectivity value. Queries are pure functions of the
/// immutable connectivity, so entries never go stale.
#[derive(Debug)]
struct Memo {
    capacity: usize,
    entries: Mutex<MemoEntries>,
}

impl Memo {
    fn new(capacity: usize) -> Memo {
        Memo { capacity, entries: Mutex::new(MemoEntries::default()) }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoEntries>> {
        self.entries.lock().map_err(|_| FieldError::Internal("connectivity memo lock poisoned".into()))
    }

    fn get(&self, key: &MemoKey) -> Result<Option<MemoValue>> {
        let mut entries = self.lock()?;
        let hit = entries.map.get(key).cloned();
        if hit.is_some() {
            entries.touch(key);
        }
        trace!(?key, hit = hit.is_some(), "connectivity memo lookup");
        Ok(hit)
    }

    fn insert(&self, key: MemoKey, value: MemoValue) -> Result<()> {
        if self.capacity == 0 {
            return Ok(());
        }
        let mut entries = self.lock()?;
        if entries.map.insert(key.clone(), value).is_some() {
            entries.touch(&key);
        } else {
            entries.order.push_back(key);
        }
        while entries.order.len() > self.capacity {
            if let Some(old) = entries.order.pop_front() {
                entries.map.remove(&old);
            }
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.lock().map(|e| e.map.len()).unwrap_or(0)
    }
}

/////////////////////////////////////////////////////////////////////
// table connectivity
/////////////////////////////////////////////////////////////////////

/// A field of integral codomain indices.
#[derive(Debug)]
pub struct ConnectivityField {
    field: Field,
    codomain: Dimension,
    skip_value: Option<i64>,
    kind: ConnectivityKind,
    memo: Memo,
}

impl Clone for ConnectivityField {
    fn clone(&self) -> Self {
        ConnectivityField {
            field: self.field.clone(),
            codomain: self.codomain.clone(),
            skip_value: self.skip_value,
            kind: self.kind,
            memo: Memo::new(self.memo.capacity),
        }
    }
}

impl PartialEq for ConnectivityField {
    fn eq(&self, other: &Self) -> bool {
        self.field == other.field && self.codomain == other.codomain && self.skip_value == other.skip_value
    }
}

fn kind_of(domain: &Domain, codomain: &Dimension) -> ConnectivityKind {
    let mut kind = ConnectivityKind::MODIFY_STRUCTURE;
    if domain.ndim() > 1 {
        kind |= ConnectivityKind::MODIFY_RANK | ConnectivityKind::MODIFY_DIMS;
    }
    if !domain.contains_dim(codomain) {
        kind |= ConnectivityKind::MODIFY_DIMS;
    }
    kind
}

impl ConnectivityField {
    pub fn from_array(
        backend: &BackendRef,
        data: impl Into<ArrayData>,
        codomain: Dimension,
        domain: Domain,
        skip_value: Option<i64>,
        dtype: Option<DType>,
    ) -> Result<ConnectivityField> {
        let field = Field::from_array(backend, data, domain, dtype)?;
        ConnectivityField::from_field(field, codomain, skip_value)
    }

    pub fn from_field(field: Field, codomain: Dimension, skip_value: Option<i64>) -> Result<ConnectivityField> {
        if !field.dtype().is_integral() {
            return Err(FieldError::DTypeMismatch {
                expected: "an integral type".into(),
                found: field.dtype().to_string(),
            });
        }
        let kind = kind_of(field.domain(), &codomain);
        Ok(ConnectivityField {
            field,
            codomain,
            skip_value,
            kind,
            memo: Memo::new(DEFAULT_CONNECTIVITY_CACHE_CAPACITY),
        })
    }

    /// Bounds the number of memoized inverse images and restrictions, 0 disables it.
    pub fn with_cache_capacity(mut self, capacity: usize) -> ConnectivityField {
        self.memo = Memo::new(capacity);
        self
    }

    pub fn field(&self) -> &Field {
        &self.field
    }

    pub fn domain(&self) -> &Domain {
        self.field.domain()
    }

    pub fn ndarray(&self) -> &ArrayData {
        self.field.ndarray()
    }

    pub fn cached_entries(&self) -> usize {
        self.memo.len()
    }

    /// Inverse image of a named range, which must be on the codomain dimension.
    pub fn inverse_image_named(&self, image: &NamedRange) -> Result<Vec<NamedRange>> {
        if image.dim != self.codomain {
            return Err(FieldError::dims(format!(
                "dimension '{}' does not match the codomain dimension '{}'",
                image.dim, self.codomain
            )));
        }
        self.inverse_image(&image.range)
    }

    /// Restriction of the connectivity, keeps codomain and skip value.
    pub fn restrict(&self, index: impl Into<IndexSpec>) -> Result<ConnectivityField> {
        let index = index.into();
        let key = MemoKey::Restrict(index.clone());
        if let Some(MemoValue::Restricted(c)) = self.memo.get(&key)? {
            return Ok(c);
        }
        let field = self.field.restrict(index)?;
        let restricted =
            ConnectivityField::from_field(field, self.codomain.clone(), self.skip_value)?.with_cache_capacity(self.memo.capacity);
        self.memo.insert(key, MemoValue::Restricted(restricted.clone()))?;
        Ok(restricted)
    }

    fn hypercube(&self, image: &UnitRange) -> Result<Vec<NamedRange>> {
        let (start, stop) = image.finite_bounds()?;
        let (start, stop) = (start as i64, stop as i64);
        let values = self.field.ndarray().to_typed::<i64>();
        let selected = values.mapv(|v| start <= v && v < stop);
        let nnz = self.field.backend().nonzero(&ArrayData::from(selected.clone()))?;
        let ranges = self.domain().named_ranges();

        if nnz.first().map_or(true, |c| c.is_empty()) {
            debug!(codomain = %self.codomain, image = %image, "no connectivity entry in image");
            return Ok(ranges.iter().map(|nr| NamedRange::new(nr.dim.clone(), UnitRange::empty())).collect());
        }

        let bounds: Vec<(usize, usize)> = nnz
            .iter()
            .map(|c| {
                let lo = c.iter().copied().min().unwrap_or(0);
                let hi = c.iter().copied().max().unwrap_or(0);
                (lo, hi + 1)
            })
            .collect();

        let mut box_selected = selected.view();
        let mut box_values = values.view();
        for (axis, &(lo, hi)) in bounds.iter().enumerate() {
            box_selected.slice_axis_inplace(Axis(axis), Slice::from(lo..hi));
            box_values.slice_axis_inplace(Axis(axis), Slice::from(lo..hi));
        }
        let contiguous = box_selected
            .iter()
            .zip(box_values.iter())
            .all(|(&sel, &v)| sel || Some(v) == self.skip_value);
        if !contiguous {
            return Err(FieldError::NonContiguousDomain(format!(
                "restricting '{}' to {} generates non-contiguous dimensions",
                self.codomain.value, image
            )));
        }

        ranges
            .iter()
            .zip(bounds)
            .map(|(nr, (lo, hi))| {
                let origin = nr.range.start().finite().ok_or_else(|| {
                    FieldError::InfiniteRange(format!("connectivity dimension '{}' is not finite", nr.dim.value))
                })?;
                Ok(NamedRange::new(nr.dim.clone(), UnitRange::new(origin + lo as isize, origin + hi as isize)))
            })
            .collect()
    }
}

impl Connectivity for ConnectivityField {
    fn codomain(&self) -> &Dimension {
        &self.codomain
    }

    fn kind(&self) -> ConnectivityKind {
        self.kind
    }

    fn skip_value(&self) -> Option<i64> {
        self.skip_value
    }

    fn inverse_image(&self, image_range: &UnitRange) -> Result<Vec<NamedRange>> {
        let key = MemoKey::InverseImage(*image_range);
        if let Some(MemoValue::Ranges(ranges)) = self.memo.get(&key)? {
            return Ok(ranges);
        }
        let ranges = self.hypercube(image_range)?;
        self.memo.insert(key, MemoValue::Ranges(ranges.clone()))?;
        Ok(ranges)
    }

    fn gather_indices(&self, new_ranges: &[NamedRange]) -> Result<ArrayD<i64>> {
        let domain = Domain::new(new_ranges.iter().cloned())?;
        if &domain == self.domain() {
            return Ok(self.ndarray().to_typed::<i64>());
        }
        Ok(self.restrict(&domain)?.ndarray().to_typed::<i64>())
    }
}

/////////////////////////////////////////////////////////////////////
// cartesian shifts
/////////////////////////////////////////////////////////////////////

/// Shift by a constant offset along one dimension. Remapping through it only moves
/// the domain, the buffer is reused.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CartesianConnectivity {
    dim: Dimension,
    offset: isize,
}

impl CartesianConnectivity {
    pub fn new(dim: Dimension, offset: isize) -> CartesianConnectivity {
        CartesianConnectivity { dim, offset }
    }

    pub fn offset(&self) -> isize {
        self.offset
    }
}

impl Connectivity for CartesianConnectivity {
    fn codomain(&self) -> &Dimension {
        &self.dim
    }

    fn kind(&self) -> ConnectivityKind {
        ConnectivityKind::empty()
    }

    fn skip_value(&self) -> Option<i64> {
        None
    }

    fn inverse_image(&self, image_range: &UnitRange) -> Result<Vec<NamedRange>> {
        Ok(vec![NamedRange::new(self.dim.clone(), *image_range - self.offset)])
    }

    fn gather_indices(&self, new_ranges: &[NamedRange]) -> Result<ArrayD<i64>> {
        let nr = new_ranges.iter().find(|nr| nr.dim == self.dim).ok_or_else(|| {
            FieldError::dims(format!("no range for dimension '{}' in {:?}", self.dim, new_ranges))
        })?;
        let indices = nr.range.iter()?.map(|i| (i + self.offset) as i64);
        Ok(Array1::from_iter(indices).into_dyn())
    }
}
