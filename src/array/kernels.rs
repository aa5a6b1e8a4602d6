use ndarray::{ArrayBase, ArrayD, ArrayViewD, Axis, Data, IxDyn, RawData, Slice, Zip};
use num::Float;
use strum::{Display, EnumIter, EnumString};

use super::{for_each_array, with_dtype, ArrayData, DType, Element, SharedArray};
use crate::domain::AxisSlice;
use crate::error::{FieldError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    FloorDivide,
    Power,
    Mod,
    Fmod,
    Minimum,
    Maximum,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    LogicalAnd,
    LogicalOr,
    LogicalXor,
}

impl BinaryOp {
    pub fn is_comparison(&self) -> bool {
        use BinaryOp::*;
        matches!(self, Equal | NotEqual | Less | LessEqual | Greater | GreaterEqual)
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::LogicalAnd | BinaryOp::LogicalOr | BinaryOp::LogicalXor)
    }
}

/// Elementwise unary operators. The lowercase names double as the builtin names the
/// math functions are registered under.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum UnaryOp {
    Negative,
    Positive,
    Invert,
    Abs,
    Sin,
    Cos,
    Tan,
    Arcsin,
    Arccos,
    Arctan,
    Sinh,
    Cosh,
    Tanh,
    Arcsinh,
    Arccosh,
    Arctanh,
    Sqrt,
    Exp,
    Log,
    Cbrt,
    Floor,
    Ceil,
    Trunc,
    Isfinite,
    Isinf,
    Isnan,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ReduceOp {
    Sum,
    Max,
    Min,
}

/////////////////////////////////////////////////////////////////////
// per element kernels
/////////////////////////////////////////////////////////////////////

pub trait Numeric: Element {
    fn kernel(op: BinaryOp) -> Option<fn(Self, Self) -> Self>;
}

macro_rules! impl_int_numeric {
    ($($t:ty),*) => {$(
        impl Numeric for $t {
            fn kernel(op: BinaryOp) -> Option<fn($t, $t) -> $t> {
                let f: fn($t, $t) -> $t = match op {
                    BinaryOp::Add => |a, b| a.wrapping_add(b),
                    BinaryOp::Subtract => |a, b| a.wrapping_sub(b),
                    BinaryOp::Multiply => |a, b| a.wrapping_mul(b),
                    // integer division by zero yields 0 instead of trapping
                    BinaryOp::Divide | BinaryOp::FloorDivide => |a, b| {
                        if b == 0 {
                            return 0;
                        }
                        let q = a.wrapping_div(b);
                        if a.wrapping_rem(b) != 0 && ((a < 0) != (b < 0)) {
                            q - 1
                        } else {
                            q
                        }
                    },
                    // result takes the sign of the divisor
                    BinaryOp::Mod => |a, b| {
                        if b == 0 {
                            return 0;
                        }
                        let r = a.wrapping_rem(b);
                        if r != 0 && ((r < 0) != (b < 0)) {
                            r + b
                        } else {
                            r
                        }
                    },
                    BinaryOp::Fmod => |a, b| if b == 0 { 0 } else { a.wrapping_rem(b) },
                    BinaryOp::Power => |a, b| {
                        if b >= 0 {
                            a.wrapping_pow(u32::try_from(b).unwrap_or(u32::MAX))
                        } else {
                            match a {
                                1 => 1,
                                -1 => if b % 2 == 0 { 1 } else { -1 },
                                _ => 0,
                            }
                        }
                    },
                    BinaryOp::Minimum => |a, b| a.min(b),
                    BinaryOp::Maximum => |a, b| a.max(b),
                    _ => return None,
                };
                Some(f)
            }
        }
    )*};
}

macro_rules! impl_float_numeric {
    ($($t:ty),*) => {$(
        impl Numeric for $t {
            fn kernel(op: BinaryOp) -> Option<fn($t, $t) -> $t> {
                let f: fn($t, $t) -> $t = match op {
                    BinaryOp::Add => |a, b| a + b,
                    BinaryOp::Subtract => |a, b| a - b,
                    BinaryOp::Multiply => |a, b| a * b,
                    BinaryOp::Divide => |a, b| a / b,
                    BinaryOp::FloorDivide => |a, b| (a / b).floor(),
                    BinaryOp::Mod => |a, b| {
                        let r = a % b;
                        if r != 0.0 && ((r < 0.0) != (b < 0.0)) {
                            r + b
                        } else {
                            r
                        }
                    },
                    BinaryOp::Fmod => |a, b| a % b,
                    BinaryOp::Power => |a, b| a.powf(b),
                    BinaryOp::Minimum => |a, b| if a.is_nan() || b.is_nan() { <$t>::NAN } else { a.min(b) },
                    BinaryOp::Maximum => |a, b| if a.is_nan() || b.is_nan() { <$t>::NAN } else { a.max(b) },
                    _ => return None,
                };
                Some(f)
            }
        }
    )*};
}

impl_int_numeric!(i32, i64);
impl_float_numeric!(f32, f64);

fn comparison<T: Element>(op: BinaryOp) -> Option<fn(T, T) -> bool> {
    let f: fn(T, T) -> bool = match op {
        BinaryOp::Equal => |a, b| a == b,
        BinaryOp::NotEqual => |a, b| a != b,
        BinaryOp::Less => |a, b| a < b,
        BinaryOp::LessEqual => |a, b| a <= b,
        BinaryOp::Greater => |a, b| a > b,
        BinaryOp::GreaterEqual => |a, b| a >= b,
        _ => return None,
    };
    Some(f)
}

/// Maps unary operators onto the `num::Float` method of the same meaning.
macro_rules! float_unary_table {
    ($($op:ident => $method:ident),* $(,)?) => {
        fn float_unary<F: Float>(op: UnaryOp) -> Option<fn(F) -> F> {
            match op {
                $(UnaryOp::$op => Some(|x: F| x.$method()),)*
                _ => None,
            }
        }
    };
}

macro_rules! float_predicate_table {
    ($($op:ident => $method:ident),* $(,)?) => {
        fn float_predicate<F: Float>(op: UnaryOp) -> Option<fn(F) -> bool> {
            match op {
                $(UnaryOp::$op => Some(|x: F| x.$method()),)*
                _ => None,
            }
        }
    };
}

float_unary_table!(
    Abs => abs,
    Sin => sin,
    Cos => cos,
    Tan => tan,
    Arcsin => asin,
    Arccos => acos,
    Arctan => atan,
    Sinh => sinh,
    Cosh => cosh,
    Tanh => tanh,
    Arcsinh => asinh,
    Arccosh => acosh,
    Arctanh => atanh,
    Sqrt => sqrt,
    Exp => exp,
    Log => ln,
    Cbrt => cbrt,
    Floor => floor,
    Ceil => ceil,
    Trunc => trunc,
);

float_predicate_table!(Isfinite => is_finite, Isinf => is_infinite, Isnan => is_nan);

/////////////////////////////////////////////////////////////////////
// broadcasting
/////////////////////////////////////////////////////////////////////

/// Right aligned numpy broadcasting of two shapes.
pub fn broadcast_shape(a: &[usize], b: &[usize]) -> Result<Vec<usize>> {
    let ndim = a.len().max(b.len());
    let dim_at = |s: &[usize], i: usize| if i + s.len() >= ndim { s[i + s.len() - ndim] } else { 1 };
    (0..ndim)
        .map(|i| match (dim_at(a, i), dim_at(b, i)) {
            (x, y) if x == y => Ok(x),
            (1, y) => Ok(y),
            (x, 1) => Ok(x),
            _ => Err(FieldError::shape(format!("shapes {:?} and {:?} cannot be broadcast together", a, b))),
        })
        .collect()
}

fn broadcast_view<'a, T, S: Data<Elem = T>>(a: &'a ArrayBase<S, IxDyn>, shape: &[usize]) -> Result<ArrayViewD<'a, T>> {
    a.broadcast(IxDyn(shape))
        .ok_or_else(|| FieldError::shape(format!("cannot broadcast shape {:?} to {:?}", a.shape(), shape)))
}

fn zip_map<A, C, S1, S2>(a: &ArrayBase<S1, IxDyn>, b: &ArrayBase<S2, IxDyn>, f: fn(A, A) -> C) -> Result<ArrayD<C>>
where
    A: Element,
    C: Element,
    S1: Data<Elem = A>,
    S2: Data<Elem = A>,
{
    let shape = broadcast_shape(a.shape(), b.shape())?;
    let av = broadcast_view(a, &shape)?;
    let bv = broadcast_view(b, &shape)?;
    Ok(Zip::from(av).and(bv).map_collect(|&x, &y| f(x, y)))
}

/////////////////////////////////////////////////////////////////////
// array kernels
/////////////////////////////////////////////////////////////////////

fn with_numeric(dtype: DType, lhs: &ArrayData, rhs: &ArrayData, op: BinaryOp) -> Result<ArrayData> {
    fn run<T: Numeric>(lhs: &ArrayData, rhs: &ArrayData, op: BinaryOp) -> Result<ArrayData> {
        let f = T::kernel(op).ok_or_else(|| FieldError::unsupported(format!("'{}' is not an arithmetic op", op)))?;
        Ok(zip_map(&lhs.to_typed::<T>(), &rhs.to_typed::<T>(), f)?.into())
    }
    match dtype {
        DType::Int32 => run::<i32>(lhs, rhs, op),
        DType::Bool | DType::Int64 => run::<i64>(lhs, rhs, op),
        DType::Float32 => run::<f32>(lhs, rhs, op),
        DType::Float64 => run::<f64>(lhs, rhs, op),
    }
}

/// Elementwise binary operation with numpy broadcasting and type promotion.
/// Comparisons give bool, true division of integers gives float64 and arithmetic
/// on bools is carried out in int64.
pub fn binary(op: BinaryOp, lhs: &ArrayData, rhs: &ArrayData) -> Result<ArrayData> {
    if op.is_logical() {
        let (a, b) = match (lhs, rhs) {
            (ArrayData::Bool(a), ArrayData::Bool(b)) => (a, b),
            _ => {
                return Err(FieldError::unsupported(format!(
                    "'{}' is only defined for bool operands, got {} and {}",
                    op,
                    lhs.dtype(),
                    rhs.dtype()
                )))
            }
        };
        let f: fn(bool, bool) -> bool = match op {
            BinaryOp::LogicalAnd => |x, y| x && y,
            BinaryOp::LogicalOr => |x, y| x || y,
            _ => |x, y| x ^ y,
        };
        return Ok(zip_map(a, b, f)?.into());
    }

    let common = lhs.dtype().promote(rhs.dtype());
    if op.is_comparison() {
        return with_dtype!(common, T => {
            let f = comparison::<T>(op).ok_or_else(|| FieldError::Internal(format!("'{}' is not a comparison", op)))?;
            Ok(zip_map(&lhs.to_typed::<T>(), &rhs.to_typed::<T>(), f)?.into())
        });
    }

    let work = match (op, common) {
        (BinaryOp::Divide, d) if !d.is_float() => DType::Float64,
        (_, d) => d,
    };
    with_numeric(work, lhs, rhs, op)
}

pub fn unary(op: UnaryOp, data: &ArrayData) -> Result<ArrayData> {
    use ArrayData::*;
    let unsupported = || FieldError::unsupported(format!("'{}' is not defined for dtype {}", op, data.dtype()));
    match (op, data) {
        (UnaryOp::Positive, _) => Ok(data.clone()),
        (UnaryOp::Invert, Bool(a)) => Ok(a.mapv(|x| !x).into()),
        (UnaryOp::Invert, _) | (UnaryOp::Negative, Bool(_)) => Err(unsupported()),
        (UnaryOp::Negative, Int32(a)) => Ok(a.mapv(i32::wrapping_neg).into()),
        (UnaryOp::Negative, Int64(a)) => Ok(a.mapv(i64::wrapping_neg).into()),
        (UnaryOp::Negative, Float32(a)) => Ok(a.mapv(|x| -x).into()),
        (UnaryOp::Negative, Float64(a)) => Ok(a.mapv(|x| -x).into()),
        (UnaryOp::Abs, Bool(_)) => Ok(data.clone()),
        (UnaryOp::Abs, Int32(a)) => Ok(a.mapv(i32::wrapping_abs).into()),
        (UnaryOp::Abs, Int64(a)) => Ok(a.mapv(i64::wrapping_abs).into()),
        (_, Float32(a)) => float_math(op, a).ok_or_else(unsupported),
        (_, Float64(a)) => float_math(op, a).ok_or_else(unsupported),
        // math on integers and bools is carried out in float64
        (_, other) => float_math(op, &other.to_typed::<f64>()).ok_or_else(unsupported),
    }
}

fn float_math<F: Float + Element, S: Data<Elem = F>>(op: UnaryOp, a: &ArrayBase<S, IxDyn>) -> Option<ArrayData> {
    if let Some(f) = float_unary::<F>(op) {
        return Some(a.mapv(f).into());
    }
    float_predicate::<F>(op).map(|p| a.mapv(p).into())
}

fn check_axis(data: &ArrayData, axis: usize) -> Result<()> {
    if axis >= data.ndim() {
        return Err(FieldError::invalid(format!("axis {} out of range for a {}-d array", axis, data.ndim())));
    }
    Ok(())
}

fn fold_sum<T: Numeric>(a: &SharedArray<T>, axis: usize) -> Result<ArrayD<T>> {
    let add = T::kernel(BinaryOp::Add).ok_or_else(|| FieldError::Internal("no addition kernel".into()))?;
    Ok(a.fold_axis(Axis(axis), T::from_i64(0), |&acc, &x| add(acc, x)))
}

fn fold_extreme<T: Element>(a: &SharedArray<T>, axis: usize, max: bool) -> ArrayD<T> {
    if max {
        a.fold_axis(Axis(axis), T::min_value(), |&acc, &x| if x > acc { x } else { acc })
    } else {
        a.fold_axis(Axis(axis), T::max_value(), |&acc, &x| if x < acc { x } else { acc })
    }
}

/// Reduction along `axis`; the axis is removed from the result.
pub fn reduce(op: ReduceOp, data: &ArrayData, axis: usize) -> Result<ArrayData> {
    check_axis(data, axis)?;
    match (op, data) {
        (ReduceOp::Sum, ArrayData::Bool(_)) => reduce(op, &data.astype(DType::Int64), axis),
        (ReduceOp::Sum, ArrayData::Int32(a)) => Ok(fold_sum(a, axis)?.into()),
        (ReduceOp::Sum, ArrayData::Int64(a)) => Ok(fold_sum(a, axis)?.into()),
        (ReduceOp::Sum, ArrayData::Float32(a)) => Ok(fold_sum(a, axis)?.into()),
        (ReduceOp::Sum, ArrayData::Float64(a)) => Ok(fold_sum(a, axis)?.into()),
        (ReduceOp::Max, d) => Ok(for_each_array!(d, a => ArrayData::from(fold_extreme(a, axis, true)))),
        (ReduceOp::Min, d) => Ok(for_each_array!(d, a => ArrayData::from(fold_extreme(a, axis, false)))),
    }
}

fn normalize_index(i: i64, len: usize) -> Result<usize> {
    let j = if i < 0 { i + len as i64 } else { i };
    if j < 0 || j >= len as i64 {
        return Err(FieldError::invalid(format!("index {} is out of bounds for axis with size {}", i, len)));
    }
    Ok(j as usize)
}

fn take_axis<T: Element>(a: &SharedArray<T>, indices: &ArrayD<i64>, axis: usize) -> Result<ArrayD<T>> {
    let len = a.len_of(Axis(axis));
    let positions = indices.iter().map(|&i| normalize_index(i, len)).collect::<Result<Vec<_>>>()?;
    let gathered = a.select(Axis(axis), &positions);
    let mut shape = a.shape()[..axis].to_vec();
    shape.extend_from_slice(indices.shape());
    shape.extend_from_slice(&a.shape()[axis + 1..]);
    // logical order of `gathered` already matches the row-major order of the result
    ArrayD::from_shape_vec(IxDyn(&shape), gathered.iter().copied().collect())
        .map_err(|e| FieldError::shape(e.to_string()))
}

/// Gathers along `axis`; the axis is replaced by the shape of `indices`.
/// Negative indices count from the end of the axis.
pub fn take(data: &ArrayData, indices: &ArrayD<i64>, axis: usize) -> Result<ArrayData> {
    check_axis(data, axis)?;
    for_each_array!(data, a => take_axis(a, indices, axis).map(ArrayData::from))
}

pub fn concatenate(arrays: &[ArrayData], axis: usize) -> Result<ArrayData> {
    let first = arrays.first().ok_or_else(|| FieldError::invalid("need at least one array to concatenate"))?;
    check_axis(first, axis)?;
    let dtype = arrays.iter().fold(first.dtype(), |d, a| d.promote(a.dtype()));
    with_dtype!(dtype, T => {
        let typed: Vec<ArrayD<T>> = arrays.iter().map(|a| a.to_typed::<T>()).collect();
        let views: Vec<ArrayViewD<T>> = typed.iter().map(|a| a.view()).collect();
        ndarray::concatenate(Axis(axis), &views)
            .map(ArrayData::from)
            .map_err(|e| FieldError::shape(e.to_string()))
    })
}

pub fn broadcast_to(data: &ArrayData, shape: &[usize]) -> Result<ArrayData> {
    for_each_array!(data, a => broadcast_view(a, shape).map(|v| ArrayData::from(v.to_owned())))
}

/// Coordinates of the truthy elements, one vector per axis.
pub fn nonzero(data: &ArrayData) -> Vec<Vec<usize>> {
    let mask = data.to_typed::<bool>();
    let mut coords = vec![Vec::new(); mask.ndim()];
    for (idx, _) in mask.indexed_iter().filter(|(_, v)| **v) {
        for (axis, c) in coords.iter_mut().enumerate() {
            c.push(idx[axis]);
        }
    }
    coords
}

/// `cond ? x : y` elementwise, all three broadcast together.
pub fn select_where(cond: &ArrayData, x: &ArrayData, y: &ArrayData) -> Result<ArrayData> {
    let mask = cond.to_typed::<bool>();
    let dtype = x.dtype().promote(y.dtype());
    with_dtype!(dtype, T => {
        let (a, b) = (x.to_typed::<T>(), y.to_typed::<T>());
        let shape = broadcast_shape(&broadcast_shape(mask.shape(), a.shape())?, b.shape())?;
        let (mv, av, bv) = (broadcast_view(&mask, &shape)?, broadcast_view(&a, &shape)?, broadcast_view(&b, &shape)?);
        Ok(Zip::from(mv).and(av).and(bv).map_collect(|&c, &p, &q| if c { p } else { q }).into())
    })
}

/// numpy slice clamping: negative bounds count from the end, everything is clipped
/// to the axis and a reversed range is empty.
fn clamp_bounds(start: Option<isize>, stop: Option<isize>, len: usize) -> (isize, isize) {
    let len = len as isize;
    let norm = |x: isize| if x < 0 { (x + len).max(0) } else { x.min(len) };
    let b = start.map_or(0, norm);
    let e = stop.map_or(len, norm);
    (b, e.max(b))
}

fn apply_slices<S: RawData>(mut a: ArrayBase<S, IxDyn>, slices: &[AxisSlice]) -> Result<ArrayBase<S, IxDyn>> {
    if slices.len() > a.ndim() {
        return Err(FieldError::invalid(format!("{} slices for a {}-d array", slices.len(), a.ndim())));
    }
    for (axis, s) in slices.iter().enumerate() {
        if let AxisSlice::Range { start, stop } = *s {
            let (b, e) = clamp_bounds(start, stop, a.len_of(Axis(axis)));
            a.slice_axis_inplace(Axis(axis), Slice::from(b..e));
        }
    }
    // integer indices remove axes, go backwards so positions stay valid
    for (axis, s) in slices.iter().enumerate().rev() {
        if let AxisSlice::Index(i) = *s {
            let j = normalize_index(i as i64, a.len_of(Axis(axis)))?;
            a = a.index_axis_move(Axis(axis), j);
        }
    }
    Ok(a)
}

/// Sliced array sharing the storage of `data`.
pub fn slice(data: &ArrayData, slices: &[AxisSlice]) -> Result<ArrayData> {
    for_each_array!(data, a => apply_slices(a.clone(), slices).map(ArrayData::from))
}

/// Writes through to the storage after copying it if other arrays share it.
fn assign_typed<T: Element>(a: &mut SharedArray<T>, slices: &[AxisSlice], value: &ArrayData) -> Result<()> {
    let value = value.to_typed::<T>();
    let mut target = apply_slices(a.view_mut(), slices)?;
    let src = value.broadcast(target.raw_dim()).ok_or_else(|| {
        FieldError::shape(format!("cannot assign shape {:?} to target of shape {:?}", value.shape(), target.shape()))
    })?;
    target.assign(&src);
    Ok(())
}

/// In-place `target[slices] = value`, with `value` cast and broadcast to the target.
pub fn assign(target: &mut ArrayData, slices: &[AxisSlice], value: &ArrayData) -> Result<()> {
    for_each_array!(target, a => assign_typed(a, slices, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array};

    fn data<T: Element, D: ndarray::Dimension>(a: Array<T, D>) -> ArrayData {
        a.into_dyn().into()
    }

    #[test]
    fn arithmetic_and_promotion() {
        let a = data(array![1, 2, 3]);
        let b = data(array![0.5, 0.5, 0.5]);
        assert_eq!(binary(BinaryOp::Add, &a, &b).unwrap(), data(array![1.5, 2.5, 3.5]));
        assert_eq!(binary(BinaryOp::Divide, &a, &data(array![2, 2, 2])).unwrap(), data(array![0.5, 1.0, 1.5]));
        let m = binary(BinaryOp::Multiply, &data(array![[1], [2]]), &data(array![10, 20])).unwrap();
        assert_eq!(m, data(array![[10, 20], [20, 40]]));
    }

    #[test]
    fn integer_division_semantics() {
        let a = data(array![7i64, -7, 7, -7, 5]);
        let b = data(array![2i64, 2, -2, -2, 0]);
        assert_eq!(binary(BinaryOp::FloorDivide, &a, &b).unwrap(), data(array![3i64, -4, -4, 3, 0]));
        assert_eq!(binary(BinaryOp::Mod, &a, &b).unwrap(), data(array![1i64, 1, -1, -1, 0]));
        assert_eq!(binary(BinaryOp::Fmod, &a, &b).unwrap(), data(array![1i64, -1, 1, -1, 0]));
        let p = binary(BinaryOp::Power, &data(array![2i64, -1, 3]), &data(array![3i64, -3, -1])).unwrap();
        assert_eq!(p, data(array![8i64, -1, 0]));
    }

    #[test]
    fn comparisons_and_logic() {
        let a = data(array![1, 5, 3]);
        let b = data(array![2.0, 5.0, 1.0]);
        assert_eq!(binary(BinaryOp::Less, &a, &b).unwrap(), data(array![true, false, false]));
        let t = data(array![true, false]);
        let f = data(array![true, true]);
        assert_eq!(binary(BinaryOp::LogicalXor, &t, &f).unwrap(), data(array![false, true]));
        assert!(matches!(binary(BinaryOp::LogicalAnd, &a, &a), Err(FieldError::Unsupported(_))));
    }

    #[test]
    fn unary_math_by_name() {
        let op: UnaryOp = "arcsin".parse().unwrap();
        assert_eq!(op, UnaryOp::Arcsin);
        assert!("gamma".parse::<UnaryOp>().is_err());
        let r = unary(UnaryOp::Floor, &data(array![1.5f32, -0.5])).unwrap();
        assert_eq!(r, data(array![1.0f32, -1.0]));
        // integers are promoted to float64
        let r = unary(UnaryOp::Sqrt, &data(array![4, 9])).unwrap();
        assert_eq!(r, data(array![2.0, 3.0]));
        let r = unary(UnaryOp::Isnan, &data(array![f64::NAN, 1.0])).unwrap();
        assert_eq!(r, data(array![true, false]));
        assert_eq!(unary(UnaryOp::Negative, &data(array![1, -2])).unwrap(), data(array![-1, 2]));
        assert!(unary(UnaryOp::Invert, &data(array![1, 2])).is_err());
    }

    #[test]
    fn reductions() {
        let a = data(array![[1, 2, 3], [4, 5, 6]]);
        assert_eq!(reduce(ReduceOp::Sum, &a, 1).unwrap(), data(array![6, 15]));
        assert_eq!(reduce(ReduceOp::Max, &a, 0).unwrap(), data(array![4, 5, 6]));
        assert_eq!(reduce(ReduceOp::Min, &a, 1).unwrap(), data(array![1, 4]));
        assert_eq!(reduce(ReduceOp::Sum, &data(array![true, true, false]), 0).unwrap(), data(ndarray::arr0(2i64)));
        assert!(reduce(ReduceOp::Sum, &a, 2).is_err());
    }

    #[test]
    fn take_wraps_negative_indices() {
        let a = data(array![[0, 1], [10, 11], [20, 21]]);
        let idx = array![[2i64, -1], [0, 0]].into_dyn();
        let t = take(&a, &idx, 0).unwrap();
        assert_eq!(t.shape(), &[2, 2, 2]);
        assert_eq!(t, data(array![[[20, 21], [20, 21]], [[0, 1], [0, 1]]]));
        assert!(take(&a, &array![3i64].into_dyn(), 0).is_err());
    }

    #[test]
    fn slicing_and_assignment() {
        let mut a = data(array![[0, 1, 2], [3, 4, 5]]);
        let s = slice(&a, &[AxisSlice::Index(1), AxisSlice::Range { start: Some(1), stop: None }]).unwrap();
        assert_eq!(s, data(array![4, 5]));
        let s = slice(&a, &[AxisSlice::full(), AxisSlice::Range { start: Some(-2), stop: Some(10) }]).unwrap();
        assert_eq!(s, data(array![[1, 2], [4, 5]]));
        assign(&mut a, &[AxisSlice::Index(0)], &ArrayData::from_scalar(9.7.into())).unwrap();
        assert_eq!(a, data(array![[9, 9, 9], [3, 4, 5]]));
        let bad = assign(&mut a, &[AxisSlice::Index(0)], &data(array![1, 2]));
        assert!(matches!(bad, Err(FieldError::ShapeMismatch(_))));
    }

    #[test]
    fn where_nonzero_concatenate() {
        let c = data(array![true, false, true]);
        let r = select_where(&c, &data(array![1, 2, 3]), &ArrayData::from_scalar(0.5.into())).unwrap();
        assert_eq!(r, data(array![1.0, 0.5, 3.0]));
        assert_eq!(nonzero(&data(array![[0, 1], [1, 0]])), vec![vec![0, 1], vec![1, 0]]);
        let cat = concatenate(&[data(array![1, 2]), data(array![3i64])], 0).unwrap();
        assert_eq!(cat, data(array![1i64, 2, 3]));
        let b = broadcast_to(&data(array![1, 2]), &[2, 2]).unwrap();
        assert_eq!(b, data(array![[1, 2], [1, 2]]));
    }
}
