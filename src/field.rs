use std::ops::{Add, Div, Mul, Neg, Rem, Sub};
use std::sync::Arc;

use itertools::Itertools;
use tracing::debug;

use crate::array::{ArrayData, BinaryOp, DType, Element, Scalar, UnaryOp};
use crate::backend::{common_backend, BackendRef};
use crate::connectivity::{Connectivity, ConnectivityKind};
use crate::domain::{domain_intersection, domain_slice, AxisSlice, Dimension, Domain, IndexSpec, NamedRange, UnitRange};
use crate::error::{FieldError, Result};
use crate::offset::{FieldOffset, OffsetProvider};

/// A dense array indexed by a [`Domain`]. Each array axis either has the length of
/// its range or length 1, in which case it is broadcast along that dimension.
///
/// The buffer is shared between fields produced without touching the data (compact
/// remaps, restriction, broadcasting); `assign` copies it first if it is shared.
#[derive(Clone, Debug)]
pub struct Field {
    domain: Domain,
    data: Arc<ArrayData>,
    backend: BackendRef,
}

impl PartialEq for Field {
    fn eq(&self, other: &Field) -> bool {
        self.domain == other.domain && self.data == other.data
    }
}

/// Argument of an elementwise operation.
#[derive(Clone, Debug)]
pub enum Operand {
    Field(Field),
    Scalar(Scalar),
}

impl Operand {
    pub fn as_field(&self) -> Option<&Field> {
        match self {
            Operand::Field(f) => Some(f),
            Operand::Scalar(_) => None,
        }
    }
}

impl From<Field> for Operand {
    fn from(f: Field) -> Self {
        Operand::Field(f)
    }
}

impl From<&Field> for Operand {
    fn from(f: &Field) -> Self {
        Operand::Field(f.clone())
    }
}

impl From<Scalar> for Operand {
    fn from(s: Scalar) -> Self {
        Operand::Scalar(s)
    }
}

macro_rules! operand_from_scalar {
    ($($t:ty),*) => {$(
        impl From<$t> for Operand {
            fn from(x: $t) -> Self {
                Operand::Scalar(x.into())
            }
        }
    )*};
}

operand_from_scalar!(bool, i32, i64, f32, f64);

fn check_shape(domain: &Domain, shape: &[usize]) -> Result<()> {
    if shape.len() != domain.ndim() {
        return Err(FieldError::shape(format!(
            "cannot construct a field of domain {} from an array of rank {}",
            domain,
            shape.len()
        )));
    }
    for (nr, &len) in domain.named_ranges().iter().zip(shape) {
        if len == 1 {
            continue;
        }
        match nr.range.len() {
            Ok(l) if l == len => {}
            _ => {
                return Err(FieldError::shape(format!(
                    "axis of length {} does not match range {} of dimension '{}'",
                    len, nr.range, nr.dim.value
                )))
            }
        }
    }
    Ok(())
}

impl Field {
    pub fn from_array(
        backend: &BackendRef,
        data: impl Into<ArrayData>,
        domain: Domain,
        dtype: Option<DType>,
    ) -> Result<Field> {
        let data = backend.asarray(data.into(), dtype)?;
        check_shape(&domain, data.shape())?;
        Ok(Field { domain, data: Arc::new(data), backend: backend.clone() })
    }

    /// 0-d field.
    pub fn scalar(backend: &BackendRef, value: impl Into<Scalar>) -> Field {
        Field::from_parts(Domain::empty(), Arc::new(ArrayData::from_scalar(value.into())), backend.clone())
    }

    pub(crate) fn from_parts(domain: Domain, data: Arc<ArrayData>, backend: BackendRef) -> Field {
        Field { domain, data, backend }
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn ndarray(&self) -> &ArrayData {
        &self.data
    }

    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    /// Scalar type of the values.
    pub fn codomain(&self) -> DType {
        self.dtype()
    }

    pub fn ndim(&self) -> usize {
        self.domain.ndim()
    }

    pub fn backend(&self) -> &BackendRef {
        &self.backend
    }

    pub fn as_scalar(&self) -> Result<Scalar> {
        if self.ndim() != 0 {
            return Err(FieldError::shape(format!("'as_scalar' is only valid on 0-dimensional fields, got {}", self.domain)));
        }
        self.data.as_scalar()
    }

    /// Offset of the array index relative to the domain coordinate, per dimension.
    pub fn origin(&self) -> Result<Vec<isize>> {
        self.domain
            .named_ranges()
            .iter()
            .map(|nr| {
                nr.range
                    .start()
                    .finite()
                    .map(|s| -s)
                    .ok_or_else(|| FieldError::InfiniteRange(format!("origin of dimension '{}'", nr.dim.value)))
            })
            .collect()
    }

    /// Host copy of the data. The storage is copied on the first write to it.
    pub fn to_host(&self) -> ArrayData {
        (*self.data).clone()
    }

    /// Values in row-major order converted to `T`.
    pub fn to_vec<T: Element>(&self) -> Vec<T> {
        self.data.to_typed::<T>().iter().copied().collect()
    }

    pub fn shares_buffer(&self, other: &Field) -> bool {
        Arc::ptr_eq(&self.data, &other.data) || self.data.shares_storage(&other.data)
    }

    /// Adjusts slices computed from the domain to axes broadcast with length 1, those
    /// are never sliced.
    fn array_slices(&self, slices: Vec<AxisSlice>) -> Vec<AxisSlice> {
        slices
            .into_iter()
            .enumerate()
            .map(|(axis, s)| {
                let broadcast = self.data.shape().get(axis) == Some(&1)
                    && self.domain.named_ranges().get(axis).map_or(false, |nr| nr.range.len().ok() != Some(1));
                match (broadcast, s) {
                    (true, AxisSlice::Range { .. }) => AxisSlice::full(),
                    (true, AxisSlice::Index(_)) => AxisSlice::Index(0),
                    (false, s) => s,
                }
            })
            .collect()
    }

    /// Inserts unit axes with infinite ranges for every dimension of `dims` the field
    /// lacks. The field's dimensions must appear in `dims` in the same order.
    pub fn broadcast(&self, dims: &[Dimension]) -> Result<Field> {
        let own = self.domain.dims();
        let kept: Vec<&Dimension> = dims.iter().filter(|d| self.domain.contains_dim(d)).collect();
        if kept.len() != own.len() || kept.iter().zip(&own).any(|(a, b)| *a != b) {
            return Err(FieldError::dims(format!(
                "cannot broadcast field with dimensions [{}] to [{}]",
                own.iter().join(", "),
                dims.iter().join(", ")
            )));
        }
        let mut ranges = Vec::with_capacity(dims.len());
        let mut missing = Vec::new();
        for (axis, dim) in dims.iter().enumerate() {
            match self.domain.get(dim) {
                Some(nr) => ranges.push(nr.clone()),
                None => {
                    ranges.push(NamedRange::new(dim.clone(), UnitRange::infinite()));
                    missing.push(axis);
                }
            }
        }
        let domain = Domain::new(ranges)?;
        if missing.is_empty() {
            return Ok(Field::from_parts(domain, Arc::clone(&self.data), self.backend.clone()));
        }
        let data = missing.into_iter().try_fold((*self.data).clone(), |d, axis| d.insert_axis(axis))?;
        Ok(Field::from_parts(domain, Arc::new(data), self.backend.clone()))
    }

    /////////////////////////////////////////////////////////////////////
    // elementwise
    /////////////////////////////////////////////////////////////////////

    pub fn binary(&self, op: BinaryOp, rhs: impl Into<Operand>) -> Result<Field> {
        elementwise_binary(op, Operand::Field(self.clone()), rhs.into())
    }

    /// `lhs <op> self`, for scalars on the left hand side.
    pub fn reversed(&self, op: BinaryOp, lhs: impl Into<Operand>) -> Result<Field> {
        elementwise_binary(op, lhs.into(), Operand::Field(self.clone()))
    }

    pub fn unary(&self, op: UnaryOp) -> Result<Field> {
        let data = self.backend.unary(op, &self.data)?;
        Field::from_array(&self.backend, data, self.domain.clone(), None)
    }

    pub fn neg(&self) -> Result<Field> {
        self.unary(UnaryOp::Negative)
    }

    pub fn pos(&self) -> Result<Field> {
        self.unary(UnaryOp::Positive)
    }

    pub fn abs(&self) -> Result<Field> {
        self.unary(UnaryOp::Abs)
    }

    /// Logical not, bool fields only.
    pub fn invert(&self) -> Result<Field> {
        self.unary(UnaryOp::Invert)
    }

    pub fn astype(&self, dtype: DType) -> Result<Field> {
        let data = self.backend.astype(&self.data, dtype)?;
        Field::from_array(&self.backend, data, self.domain.clone(), None)
    }

    /////////////////////////////////////////////////////////////////////
    // indexing
    /////////////////////////////////////////////////////////////////////

    pub fn restrict(&self, index: impl Into<IndexSpec>) -> Result<Field> {
        let (domain, slices) = domain_slice(&self.domain, &index.into())?;
        if domain == self.domain {
            return Ok(self.clone());
        }
        let data = self.backend.slice(&self.data, &self.array_slices(slices))?;
        Field::from_array(&self.backend, data, domain, None)
    }

    /// In-place `self[index] = value`. A field value must cover exactly the target
    /// domain, a scalar is broadcast into it.
    pub fn assign(&mut self, index: impl Into<IndexSpec>, value: impl Into<Operand>) -> Result<()> {
        let index = index.into();
        match value.into() {
            Operand::Field(f) => {
                let (target, _) = domain_slice(&self.domain, &index)?;
                if f.domain != target {
                    return Err(FieldError::DomainMismatch { value: f.domain.clone(), target });
                }
                self.assign_array(index, &f.data)
            }
            Operand::Scalar(s) => self.assign_array(index, &ArrayData::from_scalar(s)),
        }
    }

    /// In-place `self[index] = value` for a raw array broadcastable to the target.
    pub fn assign_array(&mut self, index: impl Into<IndexSpec>, value: &ArrayData) -> Result<()> {
        if !self.backend.supports_inplace() {
            return Err(FieldError::unsupported(format!(
                "backend '{}' does not support in-place assignment",
                self.backend.kind()
            )));
        }
        let (_, slices) = domain_slice(&self.domain, &index.into())?;
        let slices = self.array_slices(slices);
        self.backend.assign(Arc::make_mut(&mut self.data), &slices, value)
    }

    /////////////////////////////////////////////////////////////////////
    // remapping
    /////////////////////////////////////////////////////////////////////

    /// Reindexes the field through `connectivity`: the new domain is the inverse image
    /// of the current range of the codomain dimension.
    pub fn remap(&self, connectivity: &dyn Connectivity) -> Result<Field> {
        // skipped neighbours index -1, which wraps around to the last element of a
        // non-empty axis and is masked out later
        let skip = connectivity.skip_value();
        match skip {
            None | Some(-1) => {}
            Some(v) => {
                return Err(FieldError::unsupported(format!("remap requires skip value -1, got {}", v)))
            }
        }
        let dim = connectivity.codomain();
        let axis = self.domain.dim_index(dim).ok_or_else(|| {
            FieldError::dims(format!("incompatible index field, expected a field with dimension '{}'", dim))
        })?;
        let current = self.domain.named_ranges()[axis].range;
        let new_ranges = connectivity.inverse_image(&current)?;
        let domain = self.domain.replace(axis, new_ranges.iter().cloned())?;

        if !connectivity.kind().contains(ConnectivityKind::MODIFY_STRUCTURE) {
            debug!(dim = %dim, "compact remap, buffer is reused");
            return Ok(Field::from_parts(domain, Arc::clone(&self.data), self.backend.clone()));
        }

        let start = current
            .start()
            .finite()
            .ok_or_else(|| FieldError::InfiniteRange(format!("remap of dimension '{}' over {}", dim.value, current)))?;
        // rebase to array positions, skip entries stay -1 whatever the start
        let indices = connectivity
            .gather_indices(&new_ranges)?
            .mapv(|i| if Some(i) == skip { i } else { i - start as i64 });
        debug!(dim = %dim, gathered = indices.len(), "remap by gather");
        let data = self.backend.take(&self.data, &indices, axis)?;
        Field::from_array(&self.backend, data, domain, None)
    }

    /// Remap through the connectivity an offset provider defines for `offset`.
    pub fn remap_offset(&self, offset: &FieldOffset, provider: &OffsetProvider) -> Result<Field> {
        let connectivity = offset.as_connectivity(provider, &self.backend)?;
        self.remap(connectivity.as_ref())
    }
}

/// Scalars adopt the dtype of the field operands unless they are of a higher kind.
pub(crate) fn weak_scalars(operands: Vec<Operand>) -> Vec<Operand> {
    let field_dtype = operands
        .iter()
        .filter_map(Operand::as_field)
        .map(Field::dtype)
        .reduce(DType::promote);
    match field_dtype {
        None => operands,
        Some(dtype) => operands
            .into_iter()
            .map(|op| match op {
                Operand::Scalar(s) => Operand::Scalar(s.cast(s.weak_dtype(dtype))),
                field => field,
            })
            .collect(),
    }
}

/// Restricts all field operands to the intersection of their domains. Operands whose
/// dimensions differ from the intersection are broadcast to its dimensions first.
pub(crate) fn align_operands(operands: &[Operand]) -> Result<(Domain, BackendRef, Vec<Arc<ArrayData>>)> {
    let fields: Vec<&Field> = operands.iter().filter_map(Operand::as_field).collect();
    let backend = common_backend(fields.iter().map(|f| &f.backend))?
        .ok_or_else(|| FieldError::invalid("elementwise operation needs at least one field operand"))?;
    let domain = domain_intersection(fields.iter().map(|f| &f.domain))?;
    let dims = domain.dims();
    let arrays = operands
        .iter()
        .map(|op| match op {
            Operand::Scalar(s) => Ok(Arc::new(ArrayData::from_scalar(*s))),
            Operand::Field(f) if f.domain == domain => Ok(Arc::clone(&f.data)),
            Operand::Field(f) => Ok(f.broadcast(&dims)?.restrict(&domain)?.data),
        })
        .collect::<Result<Vec<_>>>()?;
    Ok((domain, backend, arrays))
}

/// Runs `kernel` on the aligned operands and wraps the result over the intersection.
pub(crate) fn elementwise(
    operands: &[Operand],
    kernel: impl FnOnce(&BackendRef, &[Arc<ArrayData>]) -> Result<ArrayData>,
) -> Result<Field> {
    let (domain, backend, arrays) = align_operands(operands)?;
    let data = kernel(&backend, &arrays)?;
    Field::from_array(&backend, data, domain, None)
}

fn elementwise_binary(op: BinaryOp, lhs: Operand, rhs: Operand) -> Result<Field> {
    let operands = weak_scalars(vec![lhs, rhs]);
    elementwise(&operands, |backend, arrays| backend.binary(op, &arrays[0], &arrays[1]))
}

macro_rules! derive_binary_ops {
    ($($name:ident => $op:ident),* $(,)?) => {
        impl Field {
            $(
                pub fn $name(&self, rhs: impl Into<Operand>) -> Result<Field> {
                    self.binary(BinaryOp::$op, rhs)
                }
            )*
        }
    };
}

macro_rules! derive_reversed_ops {
    ($($name:ident => $op:ident),* $(,)?) => {
        impl Field {
            $(
                pub fn $name(&self, lhs: impl Into<Operand>) -> Result<Field> {
                    self.reversed(BinaryOp::$op, lhs)
                }
            )*
        }
    };
}

macro_rules! derive_std_ops {
    ($($trait:ident, $method:ident => $op:ident);* $(;)?) => {$(
        impl<R: Into<Operand>> $trait<R> for &Field {
            type Output = Result<Field>;
            fn $method(self, rhs: R) -> Result<Field> {
                self.binary(BinaryOp::$op, rhs)
            }
        }
    )*};
}

derive_binary_ops!(
    add => Add,
    sub => Subtract,
    mul => Multiply,
    div => Divide,
    floordiv => FloorDivide,
    pow => Power,
    modulo => Mod,
    equal => Equal,
    not_equal => NotEqual,
    less => Less,
    less_equal => LessEqual,
    greater => Greater,
    greater_equal => GreaterEqual,
    logical_and => LogicalAnd,
    logical_or => LogicalOr,
    logical_xor => LogicalXor,
);

derive_reversed_ops!(
    rsub => Subtract,
    rdiv => Divide,
    rfloordiv => FloorDivide,
    rmod => Mod,
    rpow => Power,
);

derive_std_ops!(
    Add, add => Add;
    Sub, sub => Subtract;
    Mul, mul => Multiply;
    Div, div => Divide;
    Rem, rem => Mod;
);

impl Neg for &Field {
    type Output = Result<Field>;
    fn neg(self) -> Result<Field> {
        self.unary(UnaryOp::Negative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{cpu, TracedBackend};
    use crate::domain::{AbsoluteIndex, RelativeIndex};
    use ndarray::{array, Array};
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;

    fn i() -> Dimension {
        Dimension::horizontal("I")
    }

    fn j() -> Dimension {
        Dimension::horizontal("J")
    }

    fn field_1d<T: Element>(values: Vec<T>, start: isize) -> Field {
        let len = values.len() as isize;
        let data = ArrayData::from(Array::from_vec(values).into_dyn());
        Field::from_array(&cpu(), data, Domain::from(i().range(start..start + len)), None).unwrap()
    }

    #[test]
    fn add_over_intersection() {
        let a = field_1d(vec![0, 1, 2, 3, 4], 0);
        let b = field_1d(vec![10, 20, 30, 40, 50], 2);
        let c = (&a + &b).unwrap();
        assert_eq!(c.domain(), &Domain::from(i().range(2..5)));
        assert_eq!(c.to_vec::<i32>(), vec![12, 23, 34]);
    }

    #[test]
    fn disjoint_domains_give_empty_field() {
        let a = field_1d(vec![1.0, 2.0], 0);
        let b = field_1d(vec![3.0, 4.0], 5);
        let c = a.add(&b).unwrap();
        assert!(c.domain().is_empty());
        assert_eq!(c.shape(), &[0]);
    }

    #[test]
    fn scalars_and_reversed_ops() {
        let a = field_1d(vec![1, 2, 3], 0);
        assert_eq!(a.mul(2).unwrap().dtype(), DType::Int32);
        assert_eq!(a.rsub(10).unwrap().to_vec::<i32>(), vec![9, 8, 7]);
        assert_eq!(a.rdiv(6).unwrap().to_vec::<f64>(), vec![6.0, 3.0, 2.0]);
        assert_eq!(a.add(0.5).unwrap().to_vec::<f64>(), vec![1.5, 2.5, 3.5]);
        assert_eq!(a.rpow(2).unwrap().to_vec::<i32>(), vec![2, 4, 8]);
        assert_eq!(a.rmod(7).unwrap().to_vec::<i32>(), vec![0, 1, 1]);
        assert_eq!((-&a).unwrap().to_vec::<i32>(), vec![-1, -2, -3]);
        assert_eq!(a.greater(1).unwrap().to_vec::<bool>(), vec![false, true, true]);
    }

    #[test]
    fn bool_only_ops() {
        let a = field_1d(vec![1, 2], 0);
        assert!(matches!(a.invert(), Err(FieldError::Unsupported(_))));
        assert!(matches!(a.logical_and(&a), Err(FieldError::Unsupported(_))));
        let t = field_1d(vec![true, false], 0);
        assert_eq!(t.invert().unwrap().to_vec::<bool>(), vec![false, true]);
        assert_eq!(t.logical_or(true).unwrap().to_vec::<bool>(), vec![true, true]);
    }

    #[test]
    fn broadcasting_between_dimensions() {
        let a = field_1d(vec![1, 2, 3], 0);
        let data = ArrayData::from(array![10, 20].into_dyn());
        let b = Field::from_array(&cpu(), data, Domain::from(j().range(0..2)), None).unwrap();
        let c = a.add(&b).unwrap();
        assert_eq!(c.domain().dims(), vec![i(), j()]);
        assert_eq!(c.shape(), &[3, 2]);
        assert_eq!(c.to_vec::<i32>(), vec![11, 21, 12, 22, 13, 23]);
        // operand order does not change the promoted dimensions
        let d = b.add(&a).unwrap();
        assert_eq!(d.domain(), c.domain());
        assert_eq!(d, c);
    }

    #[test]
    fn construction_checks_shape() {
        let data = ArrayData::from(array![1, 2, 3].into_dyn());
        let err = Field::from_array(&cpu(), data.clone(), Domain::from(i().range(0..4)), None).unwrap_err();
        assert!(matches!(err, FieldError::ShapeMismatch(_)));
        let two_d = Domain::new([i().range(0..3), j().range(0..1)]).unwrap();
        assert!(Field::from_array(&cpu(), data.clone(), two_d, None).is_err());
        // length one axes broadcast along any range
        let one = ArrayData::from(array![7].into_dyn());
        assert!(Field::from_array(&cpu(), one, Domain::from(i().range(0..4)), None).is_ok());
        let f = Field::from_array(&cpu(), data, Domain::from(i().range(0..3)), Some(DType::Float32)).unwrap();
        assert_eq!(f.dtype(), DType::Float32);
    }

    #[test]
    fn round_trip_from_array() {
        let values = Array::random((4, 3), Uniform::new(-1.0, 1.0)).into_dyn();
        let domain = Domain::new([i().range(-2..2), j().range(5..8)]).unwrap();
        let f = Field::from_array(&cpu(), ArrayData::from(values.clone()), domain, None).unwrap();
        let g = Field::from_array(&cpu(), f.to_host(), f.domain().clone(), None).unwrap();
        assert_eq!(g.ndarray(), f.ndarray());
        assert_eq!(g.ndarray().to_typed::<f64>(), values);
        assert_eq!(f.origin().unwrap(), vec![2, -5]);
    }

    #[test]
    fn restrict_to_own_domain_is_identity() {
        let f = field_1d(vec![5, 6, 7, 8], 3);
        let r = f.restrict(f.domain()).unwrap();
        assert_eq!(r, f);
        assert!(r.shares_buffer(&f));
    }

    #[test]
    fn restrict_absolute_and_relative() {
        let f = field_1d(vec![5, 6, 7, 8], 3);
        let r = f.restrict(i().range(4..6)).unwrap();
        assert_eq!(r.domain(), &Domain::from(i().range(4..6)));
        assert_eq!(r.to_vec::<i32>(), vec![6, 7]);

        let r = f.restrict(vec![RelativeIndex::slice(-2, 4)]).unwrap();
        assert_eq!(r.to_vec::<i32>(), vec![7, 8]);

        let s = f.restrict(i().index(6)).unwrap();
        assert_eq!(s.as_scalar().unwrap(), Scalar::Int32(8));

        let err = f.restrict(i().range(0..5)).unwrap_err();
        assert!(matches!(err, FieldError::IndexOutOfBounds { .. }));
    }

    #[test]
    fn assignment() {
        let mut f = field_1d(vec![0, 0, 0, 0], 0);
        let snapshot = f.clone();
        f.assign(i().range(1..3), 5).unwrap();
        assert_eq!(f.to_vec::<i32>(), vec![0, 5, 5, 0]);
        // other fields sharing the buffer are unaffected
        assert_eq!(snapshot.to_vec::<i32>(), vec![0, 0, 0, 0]);

        let v = field_1d(vec![7, 8], 2);
        f.assign(i().range(2..4), &v).unwrap();
        assert_eq!(f.to_vec::<i32>(), vec![0, 5, 7, 8]);

        let err = f.assign(i().range(0..2), &v).unwrap_err();
        assert!(matches!(err, FieldError::DomainMismatch { .. }));

        let idx = vec![AbsoluteIndex::Index(i().index(0))];
        f.assign_array(idx, &ArrayData::from_scalar(Scalar::Int64(-1))).unwrap();
        assert_eq!(f.to_vec::<i32>(), vec![-1, 5, 7, 8]);
    }

    #[test]
    fn traced_backend_refuses_assignment() {
        let traced: BackendRef = Arc::new(TracedBackend::default());
        let data = ArrayData::from(array![1, 2].into_dyn());
        let mut f = Field::from_array(&traced, data, Domain::from(i().range(0..2)), None).unwrap();
        assert!(matches!(f.assign(i().range(0..1), 3), Err(FieldError::Unsupported(_))));
        let g = field_1d(vec![1, 2], 0);
        assert!(matches!(f.add(&g), Err(FieldError::BackendMismatch(_, _))));
    }

    #[test]
    fn broadcast_inserts_infinite_axes() {
        let f = field_1d(vec![1, 2, 3], 0);
        let b = f.broadcast(&[j(), i()]).unwrap();
        assert_eq!(b.shape(), &[1, 3]);
        assert_eq!(b.domain().get(&j()).unwrap().range, UnitRange::infinite());
        assert!(f.broadcast(&[j()]).is_err());
        assert!(f.broadcast(&[i()]).unwrap().shares_buffer(&f));
        // inserted axes are views on the same storage
        assert!(b.shares_buffer(&f));
        assert!(b.ndarray().shares_storage(f.ndarray()));
        let mut c = b.clone();
        c.assign(vec![AbsoluteIndex::Index(i().index(0))], 9).unwrap();
        assert_eq!(f.to_vec::<i32>(), vec![1, 2, 3]);
        assert_eq!(c.to_vec::<i32>(), vec![9, 2, 3]);
    }

    #[test]
    fn astype_and_queries() {
        let f = field_1d(vec![1.9, -1.2], 0);
        let g = f.astype(DType::Int64).unwrap();
        assert_eq!(g.to_vec::<i64>(), vec![1, -1]);
        assert_eq!(g.codomain(), DType::Int64);
        assert!(f.as_scalar().is_err());
        let s = Field::scalar(&cpu(), 2.5);
        assert_eq!(s.as_scalar().unwrap(), Scalar::Float64(2.5));
        assert_eq!(f.mul(&s).unwrap().to_vec::<f64>(), vec![4.75, -3.0]);
    }
}
