//! Dtype-tagged dense arrays. Every backend hands these around; the typed
//! `ndarray::ArcArray` inside is chosen at runtime from [`DType`]. Storage is reference
//! counted, so reshapes and axis insertions share it and writes copy it first when it
//! is shared.

mod kernels;

pub use kernels::{
    assign, binary, broadcast_shape, broadcast_to, concatenate, nonzero, reduce, select_where,
    slice, take, unary, BinaryOp, Numeric, ReduceOp, UnaryOp,
};

use std::fmt::{self, Debug, Display};

use ndarray::{arr0, ArcArray, ArrayD, Axis, IxDyn};
use serde::{Deserialize, Serialize};
use strum::{Display as StrumDisplay, EnumIter, EnumString};

use crate::error::{FieldError, Result};

/// Runs `$body` with `$a` bound to the typed array inside an [`ArrayData`].
macro_rules! for_each_array {
    ($data:expr, $a:ident => $body:expr) => {
        match $data {
            $crate::array::ArrayData::Bool($a) => $body,
            $crate::array::ArrayData::Int32($a) => $body,
            $crate::array::ArrayData::Int64($a) => $body,
            $crate::array::ArrayData::Float32($a) => $body,
            $crate::array::ArrayData::Float64($a) => $body,
        }
    };
}
pub(crate) use for_each_array;

/// Runs `$body` with `$T` aliased to the element type of `$dtype`.
macro_rules! with_dtype {
    ($dtype:expr, $T:ident => $body:expr) => {
        match $dtype {
            $crate::array::DType::Bool => {
                type $T = bool;
                $body
            }
            $crate::array::DType::Int32 => {
                type $T = i32;
                $body
            }
            $crate::array::DType::Int64 => {
                type $T = i64;
                $body
            }
            $crate::array::DType::Float32 => {
                type $T = f32;
                $body
            }
            $crate::array::DType::Float64 => {
                type $T = f64;
                $body
            }
        }
    };
}
pub(crate) use with_dtype;

/////////////////////////////////////////////////////////////////////
// DType and Scalar
/////////////////////////////////////////////////////////////////////

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, StrumDisplay, EnumString, EnumIter,
)]
#[strum(serialize_all = "lowercase")]
pub enum DType {
    Bool,
    Int32,
    Int64,
    Float32,
    Float64,
}

impl DType {
    pub fn is_bool(&self) -> bool {
        *self == DType::Bool
    }

    pub fn is_integral(&self) -> bool {
        matches!(self, DType::Int32 | DType::Int64)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, DType::Float32 | DType::Float64)
    }

    /// bool < integral < floating point
    fn kind_rank(&self) -> u8 {
        match self {
            DType::Bool => 0,
            DType::Int32 | DType::Int64 => 1,
            DType::Float32 | DType::Float64 => 2,
        }
    }

    /// Smallest dtype both operands can be represented in, numpy style.
    pub fn promote(self, other: DType) -> DType {
        use DType::*;
        match (self, other) {
            (a, b) if a == b => a,
            (Int32 | Int64, Float32) | (Float32, Int32 | Int64) => Float64,
            (a, b) => a.max(b),
        }
    }

    pub fn zero(&self) -> Scalar {
        Scalar::Int64(0).cast(*self)
    }

    pub fn min_value(&self) -> Scalar {
        with_dtype!(self, T => <T as Element>::min_value().into_scalar())
    }

    pub fn max_value(&self) -> Scalar {
        with_dtype!(self, T => <T as Element>::max_value().into_scalar())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub enum Scalar {
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
}

macro_rules! scalar_from {
    ($($t:ty => $variant:ident),*) => {$(
        impl From<$t> for Scalar {
            fn from(x: $t) -> Self {
                Scalar::$variant(x)
            }
        }
    )*};
}

scalar_from!(bool => Bool, i32 => Int32, i64 => Int64, f32 => Float32, f64 => Float64);

impl Scalar {
    pub fn dtype(&self) -> DType {
        match self {
            Scalar::Bool(_) => DType::Bool,
            Scalar::Int32(_) => DType::Int32,
            Scalar::Int64(_) => DType::Int64,
            Scalar::Float32(_) => DType::Float32,
            Scalar::Float64(_) => DType::Float64,
        }
    }

    pub fn get<T: Element>(&self) -> T {
        match *self {
            Scalar::Bool(x) => x.cast(),
            Scalar::Int32(x) => x.cast(),
            Scalar::Int64(x) => x.cast(),
            Scalar::Float32(x) => x.cast(),
            Scalar::Float64(x) => x.cast(),
        }
    }

    pub fn cast(&self, dtype: DType) -> Scalar {
        with_dtype!(dtype, T => self.get::<T>().into_scalar())
    }

    pub fn is_truthy(&self) -> bool {
        self.get::<bool>()
    }

    /// Dtype of `array <op> scalar`. Scalars are weak: they adopt the array's dtype
    /// unless they are of a higher kind (e.g. a float scalar with an int array).
    pub fn weak_dtype(&self, array: DType) -> DType {
        if self.dtype().kind_rank() <= array.kind_rank() {
            array
        } else {
            self.dtype()
        }
    }
}

impl Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(x) => write!(f, "{}", x),
            Scalar::Int32(x) => write!(f, "{}", x),
            Scalar::Int64(x) => write!(f, "{}", x),
            Scalar::Float32(x) => write!(f, "{}", x),
            Scalar::Float64(x) => write!(f, "{}", x),
        }
    }
}

/////////////////////////////////////////////////////////////////////
// Element types
/////////////////////////////////////////////////////////////////////

pub trait Element: Copy + Debug + PartialEq + PartialOrd + Send + Sync + 'static {
    const DTYPE: DType;

    fn wrap(a: SharedArray<Self>) -> ArrayData;
    fn typed(data: &ArrayData) -> Option<&SharedArray<Self>>;
    fn to_f64(self) -> f64;
    fn to_i64(self) -> i64;
    fn from_f64(x: f64) -> Self;
    fn from_i64(x: i64) -> Self;
    fn min_value() -> Self;
    fn max_value() -> Self;
    fn into_scalar(self) -> Scalar;

    fn cast<U: Element>(self) -> U {
        if Self::DTYPE.is_float() || U::DTYPE.is_float() {
            U::from_f64(self.to_f64())
        } else {
            U::from_i64(self.to_i64())
        }
    }
}

macro_rules! impl_numeric_element {
    ($($t:ty => $variant:ident),*) => {$(
        impl Element for $t {
            const DTYPE: DType = DType::$variant;

            fn wrap(a: SharedArray<Self>) -> ArrayData {
                ArrayData::$variant(a)
            }

            fn typed(data: &ArrayData) -> Option<&SharedArray<Self>> {
                match data {
                    ArrayData::$variant(a) => Some(a),
                    _ => None,
                }
            }

            fn to_f64(self) -> f64 {
                self as f64
            }

            fn to_i64(self) -> i64 {
                self as i64
            }

            fn from_f64(x: f64) -> Self {
                x as $t
            }

            fn from_i64(x: i64) -> Self {
                x as $t
            }

            fn min_value() -> Self {
                <$t>::MIN
            }

            fn max_value() -> Self {
                <$t>::MAX
            }

            fn into_scalar(self) -> Scalar {
                Scalar::$variant(self)
            }
        }
    )*};
}

impl_numeric_element!(i32 => Int32, i64 => Int64, f32 => Float32, f64 => Float64);

impl Element for bool {
    const DTYPE: DType = DType::Bool;

    fn wrap(a: SharedArray<Self>) -> ArrayData {
        ArrayData::Bool(a)
    }

    fn typed(data: &ArrayData) -> Option<&SharedArray<Self>> {
        match data {
            ArrayData::Bool(a) => Some(a),
            _ => None,
        }
    }

    fn to_f64(self) -> f64 {
        self as u8 as f64
    }

    fn to_i64(self) -> i64 {
        self as i64
    }

    fn from_f64(x: f64) -> Self {
        x != 0.0
    }

    fn from_i64(x: i64) -> Self {
        x != 0
    }

    fn min_value() -> Self {
        false
    }

    fn max_value() -> Self {
        true
    }

    fn into_scalar(self) -> Scalar {
        Scalar::Bool(self)
    }
}

/////////////////////////////////////////////////////////////////////
// ArrayData
/////////////////////////////////////////////////////////////////////

pub type SharedArray<T> = ArcArray<T, IxDyn>;

/// Cloning shares the storage.
#[derive(Clone, Debug, PartialEq)]
pub enum ArrayData {
    Bool(SharedArray<bool>),
    Int32(SharedArray<i32>),
    Int64(SharedArray<i64>),
    Float32(SharedArray<f32>),
    Float64(SharedArray<f64>),
}

impl<T: Element> From<ArrayD<T>> for ArrayData {
    fn from(a: ArrayD<T>) -> Self {
        T::wrap(a.into_shared())
    }
}

impl<T: Element> From<SharedArray<T>> for ArrayData {
    fn from(a: SharedArray<T>) -> Self {
        T::wrap(a)
    }
}

impl From<Scalar> for ArrayData {
    fn from(s: Scalar) -> Self {
        ArrayData::from_scalar(s)
    }
}

impl ArrayData {
    pub fn from_scalar(s: Scalar) -> ArrayData {
        with_dtype!(s.dtype(), T => ArrayData::from(arr0(s.get::<T>()).into_dyn()))
    }

    pub fn from_shape_vec<T: Element>(shape: &[usize], values: Vec<T>) -> Result<ArrayData> {
        ArrayD::from_shape_vec(IxDyn(shape), values)
            .map(ArrayData::from)
            .map_err(|e| FieldError::shape(e.to_string()))
    }

    pub fn full(value: Scalar, shape: &[usize]) -> ArrayData {
        with_dtype!(value.dtype(), T => ArrayData::from(ArrayD::from_elem(IxDyn(shape), value.get::<T>())))
    }

    pub fn zeros(dtype: DType, shape: &[usize]) -> ArrayData {
        ArrayData::full(dtype.zero(), shape)
    }

    pub fn dtype(&self) -> DType {
        match self {
            ArrayData::Bool(_) => DType::Bool,
            ArrayData::Int32(_) => DType::Int32,
            ArrayData::Int64(_) => DType::Int64,
            ArrayData::Float32(_) => DType::Float32,
            ArrayData::Float64(_) => DType::Float64,
        }
    }

    pub fn shape(&self) -> &[usize] {
        for_each_array!(self, a => a.shape())
    }

    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.shape().iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_typed<T: Element>(&self) -> Option<&SharedArray<T>> {
        T::typed(self)
    }

    /// Copy converted to element type `T`.
    pub fn to_typed<T: Element>(&self) -> ArrayD<T> {
        match self.as_typed::<T>() {
            Some(a) => a.to_owned(),
            None => for_each_array!(self, a => a.mapv(|x| x.cast::<T>())),
        }
    }

    pub fn astype(&self, dtype: DType) -> ArrayData {
        if dtype == self.dtype() {
            return self.clone();
        }
        with_dtype!(dtype, T => ArrayData::from(self.to_typed::<T>()))
    }

    pub fn get(&self, index: &[usize]) -> Option<Scalar> {
        for_each_array!(self, a => a.get(IxDyn(index)).map(|x| x.into_scalar()))
    }

    /// Value of a 0-d array.
    pub fn as_scalar(&self) -> Result<Scalar> {
        if self.ndim() != 0 {
            return Err(FieldError::shape(format!(
                "only 0-d arrays convert to scalars, got shape {:?}",
                self.shape()
            )));
        }
        self.get(&[]).ok_or_else(|| FieldError::Internal("0-d array without element".into()))
    }

    /// True if both arrays start at the same element of the same storage.
    pub fn shares_storage(&self, other: &ArrayData) -> bool {
        let first = |d: &ArrayData| for_each_array!(d, a => a.as_ptr() as *const u8);
        self.dtype() == other.dtype() && first(self) == first(other)
    }

    /// New unit length axis at position `axis`, sharing the storage.
    pub fn insert_axis(self, axis: usize) -> Result<ArrayData> {
        if axis > self.ndim() {
            return Err(FieldError::invalid(format!("cannot insert axis {} into a {}-d array", axis, self.ndim())));
        }
        Ok(for_each_array!(self, a => ArrayData::from(a.insert_axis(Axis(axis)))))
    }
}
