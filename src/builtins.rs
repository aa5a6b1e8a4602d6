//! Builtin functions of the field DSL, dispatched by name through an explicit registry.
//! Every builtin runs on the backend descriptor of its field operands, so the same
//! implementation serves all backends.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, RwLock};

use ndarray::{Axis, Slice};
use tracing::debug;

use crate::array::{ArrayData, BinaryOp, DType, ReduceOp, Scalar};
use crate::backend::cpu;
use crate::domain::{Dimension, UnitRange};
use crate::error::{FieldError, Result};
use crate::field::{elementwise, weak_scalars, Field, Operand};
use crate::offset::{ExecContext, OffsetProvider};

/// Argument of a builtin call.
#[derive(Clone, Debug)]
pub enum Arg {
    Field(Field),
    Scalar(Scalar),
    Dim(Dimension),
    Dims(Vec<Dimension>),
    DType(DType),
}

impl From<Field> for Arg {
    fn from(f: Field) -> Self {
        Arg::Field(f)
    }
}

impl From<&Field> for Arg {
    fn from(f: &Field) -> Self {
        Arg::Field(f.clone())
    }
}

impl From<Dimension> for Arg {
    fn from(d: Dimension) -> Self {
        Arg::Dim(d)
    }
}

impl From<Vec<Dimension>> for Arg {
    fn from(d: Vec<Dimension>) -> Self {
        Arg::Dims(d)
    }
}

impl From<DType> for Arg {
    fn from(d: DType) -> Self {
        Arg::DType(d)
    }
}

macro_rules! arg_from_scalar {
    ($($t:ty),*) => {$(
        impl From<$t> for Arg {
            fn from(x: $t) -> Self {
                Arg::Scalar(x.into())
            }
        }
    )*};
}

arg_from_scalar!(Scalar, bool, i32, i64, f32, f64);

fn arity(name: &str, args: &[Arg], n: usize) -> Result<()> {
    if args.len() != n {
        return Err(FieldError::invalid(format!("'{}' takes {} arguments, got {}", name, n, args.len())));
    }
    Ok(())
}

fn operand(name: &str, arg: &Arg) -> Result<Operand> {
    match arg {
        Arg::Field(f) => Ok(Operand::Field(f.clone())),
        Arg::Scalar(s) => Ok(Operand::Scalar(*s)),
        other => Err(FieldError::invalid(format!("'{}' expects a field or scalar, got {:?}", name, other))),
    }
}

fn field_arg<'a>(name: &str, arg: &'a Arg) -> Result<&'a Field> {
    match arg {
        Arg::Field(f) => Ok(f),
        other => Err(FieldError::invalid(format!("'{}' expects a field, got {:?}", name, other))),
    }
}

fn dim_arg<'a>(name: &str, arg: &'a Arg) -> Result<&'a Dimension> {
    match arg {
        Arg::Dim(d) => Ok(d),
        other => Err(FieldError::invalid(format!("'{}' expects a dimension, got {:?}", name, other))),
    }
}

/////////////////////////////////////////////////////////////////////
// registry
/////////////////////////////////////////////////////////////////////

pub type BuiltinFn = Arc<dyn Fn(&[Arg], &ExecContext) -> Result<Field> + Send + Sync>;

pub struct BuiltinRegistry {
    builtins: RwLock<HashMap<String, BuiltinFn>>,
}

impl fmt::Debug for BuiltinRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltinRegistry").field("names", &self.names().unwrap_or_default()).finish()
    }
}

impl Default for BuiltinRegistry {
    fn default() -> Self {
        BuiltinRegistry::new()
    }
}

fn poisoned<T>(_: T) -> FieldError {
    FieldError::Internal("builtin registry lock poisoned".into())
}

impl BuiltinRegistry {
    /// Empty registry.
    pub fn new() -> BuiltinRegistry {
        BuiltinRegistry { builtins: RwLock::new(HashMap::new()) }
    }

    /// Registry holding every default builtin.
    pub fn with_defaults() -> Result<BuiltinRegistry> {
        let registry = BuiltinRegistry::new();
        register_defaults(&registry)?;
        Ok(registry)
    }

    /// Process wide registry with the default builtins.
    ///
    /// # Panics
    /// If the defaults fail to register, which only a broken default table can cause.
    pub fn global() -> &'static BuiltinRegistry {
        static GLOBAL: OnceLock<BuiltinRegistry> = OnceLock::new();
        GLOBAL.get_or_init(|| match BuiltinRegistry::with_defaults() {
            Ok(registry) => registry,
            Err(e) => panic!("default builtins failed to register: {}", e),
        })
    }

    /// Adds a builtin, names are unique.
    pub fn register(
        &self,
        name: impl Into<String>,
        f: impl Fn(&[Arg], &ExecContext) -> Result<Field> + Send + Sync + 'static,
    ) -> Result<()> {
        let name = name.into();
        let mut builtins = self.builtins.write().map_err(poisoned)?;
        if builtins.contains_key(&name) {
            return Err(FieldError::invalid(format!("builtin '{}' is already registered", name)));
        }
        builtins.insert(name, Arc::new(f));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<BuiltinFn> {
        let builtins = self.builtins.read().map_err(poisoned)?;
        builtins.get(name).cloned().ok_or_else(|| FieldError::UnknownBuiltin(name.to_string()))
    }

    pub fn call(&self, name: &str, args: &[Arg], ctx: &ExecContext) -> Result<Field> {
        let f = self.get(name)?;
        f(args, ctx)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Result<Vec<String>> {
        let builtins = self.builtins.read().map_err(poisoned)?;
        let mut names: Vec<String> = builtins.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

/// Unary math builtins of the DSL. Only those the backend has a kernel for are
/// registered.
pub const UNARY_MATH_BUILTINS: &[&str] = &[
    "sin", "cos", "tan", "arcsin", "arccos", "arctan", "sinh", "cosh", "tanh", "arcsinh", "arccosh", "arctanh",
    "sqrt", "exp", "log", "gamma", "cbrt", "floor", "ceil", "trunc", "isfinite", "isinf", "isnan", "abs",
];

macro_rules! register_binary_math {
    ($registry:expr, $($name:literal => $op:ident),* $(,)?) => {$(
        $registry.register($name, |args: &[Arg], _: &ExecContext| {
            arity($name, args, 2)?;
            binary_math(BinaryOp::$op, operand($name, &args[0])?, operand($name, &args[1])?)
        })?;
    )*};
}

macro_rules! register_reductions {
    ($registry:expr, $($name:literal => $op:ident),* $(,)?) => {$(
        $registry.register($name, |args: &[Arg], ctx: &ExecContext| {
            arity($name, args, 2)?;
            reduce_over(ReduceOp::$op, field_arg($name, &args[0])?, dim_arg($name, &args[1])?, &ctx.offset_provider)
        })?;
    )*};
}

fn register_defaults(registry: &BuiltinRegistry) -> Result<()> {
    let kernels = cpu();
    for &name in UNARY_MATH_BUILTINS {
        let Some(op) = kernels.unary_kernel(name) else {
            debug!(builtin = name, "no backend kernel, builtin not registered");
            continue;
        };
        registry.register(name, move |args: &[Arg], _: &ExecContext| {
            arity(name, args, 1)?;
            field_arg(name, &args[0])?.unary(op)
        })?;
    }

    register_binary_math!(registry,
        "minimum" => Minimum,
        "maximum" => Maximum,
        "fmod" => Fmod,
        "power" => Power,
    );

    register_reductions!(registry,
        "neighbor_sum" => Sum,
        "max_over" => Max,
        "min_over" => Min,
    );

    registry.register("where", |args: &[Arg], _: &ExecContext| {
        arity("where", args, 3)?;
        select(operand("where", &args[0])?, operand("where", &args[1])?, operand("where", &args[2])?)
    })?;

    registry.register("broadcast", |args: &[Arg], _: &ExecContext| {
        arity("broadcast", args, 2)?;
        match &args[1] {
            Arg::Dims(dims) => broadcast(operand("broadcast", &args[0])?, dims),
            other => Err(FieldError::invalid(format!("'broadcast' expects dimensions, got {:?}", other))),
        }
    })?;

    registry.register("astype", |args: &[Arg], _: &ExecContext| {
        arity("astype", args, 2)?;
        match &args[1] {
            Arg::DType(dtype) => astype(operand("astype", &args[0])?, *dtype),
            other => Err(FieldError::invalid(format!("'astype' expects a dtype, got {:?}", other))),
        }
    })?;

    Ok(())
}

/////////////////////////////////////////////////////////////////////
// implementations
/////////////////////////////////////////////////////////////////////

fn binary_math(op: BinaryOp, lhs: Operand, rhs: Operand) -> Result<Field> {
    let operands = weak_scalars(vec![lhs, rhs]);
    elementwise(&operands, |backend, arrays| backend.binary(op, &arrays[0], &arrays[1]))
}

/// Inserts unit axes with infinite ranges for the dimensions the operand lacks. A
/// scalar becomes a field that is unit along every dimension.
pub fn broadcast(value: impl Into<Operand>, dims: &[Dimension]) -> Result<Field> {
    match value.into() {
        Operand::Field(f) => f.broadcast(dims),
        Operand::Scalar(s) => Field::scalar(&cpu(), s).broadcast(dims),
    }
}

pub fn astype(value: impl Into<Operand>, dtype: DType) -> Result<Field> {
    match value.into() {
        Operand::Field(f) => f.astype(dtype),
        Operand::Scalar(s) => Ok(Field::scalar(&cpu(), s.cast(dtype))),
    }
}

/// `mask ? t : f` over the intersection of all field operands.
pub fn select(mask: impl Into<Operand>, t: impl Into<Operand>, f: impl Into<Operand>) -> Result<Field> {
    let mut operands = vec![mask.into()];
    operands.extend(weak_scalars(vec![t.into(), f.into()]));
    elementwise(&operands, |backend, arrays| backend.select_where(&arrays[0], &arrays[1], &arrays[2]))
}

fn table_window(range: &UnitRange, len: usize, what: &Dimension) -> Result<Slice> {
    let (start, stop) = range.finite_bounds()?;
    if range.is_empty() {
        return Ok(Slice::from(0..0));
    }
    if start < 0 || stop > len as isize {
        return Err(FieldError::dims(format!(
            "range {} of '{}' exceeds the neighbour table extent [0, {})",
            range, what.value, len
        )));
    }
    Ok(Slice::from(start..stop))
}

/// Reduces `field` along the local dimension `axis` using the neighbour table the
/// provider registers under the axis name. Skipped neighbours contribute the identity
/// of the reduction.
pub fn reduce_over(op: ReduceOp, field: &Field, axis: &Dimension, provider: &OffsetProvider) -> Result<Field> {
    if !axis.is_local() {
        return Err(FieldError::dims(format!("can only reduce over local dimensions, got '{}'", axis)));
    }
    let domain = field.domain();
    let local_axis = domain
        .dim_index(axis)
        .ok_or_else(|| FieldError::dims(format!("field with domain {} has no dimension '{}'", domain, axis)))?;
    let local_dims = domain.dims().into_iter().filter(Dimension::is_local).count();
    if local_dims > 1 {
        return Err(FieldError::unsupported(format!(
            "reducing a field with {} local dimensions is not supported",
            local_dims
        )));
    }

    let table = provider.neighbor_table(&axis.value)?;
    let origin_axis = domain.dim_index(&table.origin_axis).ok_or_else(|| {
        FieldError::dims(format!("field with domain {} has no origin dimension '{}'", domain, table.origin_axis))
    })?;
    if origin_axis > local_axis {
        return Err(FieldError::dims(format!(
            "origin dimension '{}' must come before the local dimension '{}'",
            table.origin_axis, axis
        )));
    }

    let ranges = domain.named_ranges();
    let rows = table_window(&ranges[origin_axis].range, table.rows(), &table.origin_axis)?;
    let cols = table_window(&ranges[local_axis].range, table.max_neighbors(), axis)?;
    let window = table.table.slice_axis(Axis(0), rows);
    let window = window.slice_axis(Axis(1), cols);

    // mask over (origin, local), unit axes for every other dimension of the field
    let mut mask = ArrayData::from(window.mapv(|v| v != table.skip_value).into_dyn());
    for a in (0..domain.ndim()).filter(|&a| a != origin_axis && a != local_axis) {
        mask = mask.insert_axis(a)?;
    }

    let identity = match op {
        ReduceOp::Sum => field.dtype().zero(),
        ReduceOp::Max => field.dtype().min_value(),
        ReduceOp::Min => field.dtype().max_value(),
    };
    debug!(op = %op, axis = %axis, origin = %table.origin_axis, "neighbour reduction");

    let backend = field.backend();
    let masked = backend.select_where(&mask, field.ndarray(), &ArrayData::from_scalar(identity))?;
    let reduced = backend.reduce(op, &masked, local_axis)?;
    Field::from_array(backend, reduced, domain.without(axis), None)
}

pub fn neighbor_sum(field: &Field, axis: &Dimension, provider: &OffsetProvider) -> Result<Field> {
    reduce_over(ReduceOp::Sum, field, axis, provider)
}

pub fn max_over(field: &Field, axis: &Dimension, provider: &OffsetProvider) -> Result<Field> {
    reduce_over(ReduceOp::Max, field, axis, provider)
}

pub fn min_over(field: &Field, axis: &Dimension, provider: &OffsetProvider) -> Result<Field> {
    reduce_over(ReduceOp::Min, field, axis, provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Domain;
    use crate::offset::{FieldOffset, NeighborTable};
    use ndarray::array;

    fn v() -> Dimension {
        Dimension::horizontal("V")
    }

    fn e() -> Dimension {
        Dimension::horizontal("E")
    }

    fn k() -> Dimension {
        Dimension::vertical("K")
    }

    fn e2v() -> Dimension {
        Dimension::local("E2V")
    }

    fn provider() -> OffsetProvider {
        OffsetProvider::new().with("E2V", NeighborTable::new(array![[0, 1], [1, 2], [2, -1]], e(), e2v()))
    }

    fn edge_neighbors() -> Field {
        let f = Field::from_array(&cpu(), array![1.0, 2.0, 3.0].into_dyn(), Domain::from(v().range(0..3)), None).unwrap();
        f.remap_offset(&FieldOffset::new("E2V", v(), vec![e(), e2v()]), &provider()).unwrap()
    }

    #[test]
    fn defaults_are_registered() {
        let names = BuiltinRegistry::global().names().unwrap();
        for name in ["sin", "isnan", "abs", "minimum", "where", "broadcast", "astype", "neighbor_sum", "max_over"] {
            assert!(names.iter().any(|n| n == name), "missing {}", name);
        }
        assert!(!names.iter().any(|n| n == "gamma"));
        assert!(matches!(BuiltinRegistry::global().get("gamma"), Err(FieldError::UnknownBuiltin(_))));
        assert_eq!(BuiltinRegistry::with_defaults().unwrap().names().unwrap(), names);
    }

    #[test]
    fn custom_builtins() {
        let registry = BuiltinRegistry::new();
        registry
            .register("double", |args: &[Arg], _: &ExecContext| field_arg("double", &args[0])?.mul(2))
            .unwrap();
        assert!(registry.register("double", |_: &[Arg], _: &ExecContext| Err(FieldError::invalid("x"))).is_err());

        let f = Field::from_array(&cpu(), array![1, 2].into_dyn(), Domain::from(v().range(0..2)), None).unwrap();
        let r = registry.call("double", &[f.into()], &ExecContext::default()).unwrap();
        assert_eq!(r.to_vec::<i32>(), vec![2, 4]);
        assert_eq!(registry.names().unwrap(), vec!["double".to_string()]);
    }

    #[test]
    fn math_by_name() {
        let registry = BuiltinRegistry::with_defaults().unwrap();
        let ctx = ExecContext::default();
        let f = Field::from_array(&cpu(), array![4.0, 9.0].into_dyn(), Domain::from(v().range(0..2)), None).unwrap();
        assert_eq!(registry.call("sqrt", &[f.clone().into()], &ctx).unwrap().to_vec::<f64>(), vec![2.0, 3.0]);
        let m = registry.call("minimum", &[f.clone().into(), 5.0.into()], &ctx).unwrap();
        assert_eq!(m.to_vec::<f64>(), vec![4.0, 5.0]);
        let p = registry.call("power", &[f.clone().into(), 2.into()], &ctx).unwrap();
        assert_eq!(p.to_vec::<f64>(), vec![16.0, 81.0]);
        assert_eq!(p.dtype(), DType::Float64);
        assert!(matches!(registry.call("sqrt", &[], &ctx), Err(FieldError::InvalidArgument(_))));
    }

    #[test]
    fn where_over_intersection() {
        let mask = Field::from_array(&cpu(), array![true, false, true].into_dyn(), Domain::from(v().range(0..3)), None).unwrap();
        let t = Field::from_array(&cpu(), array![1, 2, 3, 4].into_dyn(), Domain::from(v().range(1..5)), None).unwrap();
        let r = select(&mask, &t, 0).unwrap();
        assert_eq!(r.domain(), &Domain::from(v().range(1..3)));
        assert_eq!(r.to_vec::<i32>(), vec![0, 2]);
        assert_eq!(r.dtype(), DType::Int32);
    }

    #[test]
    fn broadcast_and_astype() {
        let f = Field::from_array(&cpu(), array![1, 2].into_dyn(), Domain::from(k().range(0..2)), None).unwrap();
        let b = broadcast(&f, &[v(), k()]).unwrap();
        assert_eq!(b.shape(), &[1, 2]);
        assert_eq!(b.domain().named_ranges()[0].range, UnitRange::infinite());
        assert!(matches!(broadcast(&f, &[v()]), Err(FieldError::DimensionMismatch(_))));

        let s = broadcast(3.0, &[v()]).unwrap();
        assert_eq!(s.shape(), &[1]);
        assert_eq!(astype(&f, DType::Float64).unwrap().to_vec::<f64>(), vec![1.0, 2.0]);
        assert_eq!(astype(1.5, DType::Int32).unwrap().as_scalar().unwrap(), Scalar::Int32(1));
    }

    #[test]
    fn reductions_skip_missing_neighbors() {
        let p = provider();
        let f = edge_neighbors();
        // rows: [1, 2], [2, 3], [3, skip]
        assert_eq!(neighbor_sum(&f, &e2v(), &p).unwrap().to_vec::<f64>(), vec![3.0, 5.0, 3.0]);
        assert_eq!(max_over(&f, &e2v(), &p).unwrap().to_vec::<f64>(), vec![2.0, 3.0, 3.0]);
        assert_eq!(min_over(&f, &e2v(), &p).unwrap().to_vec::<f64>(), vec![1.0, 2.0, 3.0]);
        let r = neighbor_sum(&f, &e2v(), &p).unwrap();
        assert_eq!(r.domain(), &Domain::from(e().range(0..3)));

        let ctx = ExecContext::new(provider());
        let via_registry = BuiltinRegistry::global().call("neighbor_sum", &[f.into(), e2v().into()], &ctx).unwrap();
        assert_eq!(via_registry, r);
    }

    #[test]
    fn reduction_uses_rows_of_origin_range() {
        let p = provider();
        let f = edge_neighbors().restrict(e().range(1..3)).unwrap();
        let r = neighbor_sum(&f, &e2v(), &p).unwrap();
        assert_eq!(r.domain(), &Domain::from(e().range(1..3)));
        assert_eq!(r.to_vec::<f64>(), vec![5.0, 3.0]);
    }

    #[test]
    fn reduction_over_extra_dimension() {
        let p = provider();
        let data = array![[[1, 2], [3, 4]], [[5, 6], [7, 8]], [[9, 10], [11, 12]]].into_dyn();
        let domain = Domain::new([e().range(0..3), k().range(0..2), e2v().range(0..2)]).unwrap();
        let f = Field::from_array(&cpu(), data, domain, None).unwrap();
        let r = neighbor_sum(&f, &e2v(), &p).unwrap();
        assert_eq!(r.domain().dims(), vec![e(), k()]);
        // last row has a skipped second neighbour
        assert_eq!(r.to_vec::<i32>(), vec![3, 7, 11, 15, 9, 11]);
    }

    #[test]
    fn reduction_validation() {
        let p = provider();
        let f = edge_neighbors();
        assert!(matches!(neighbor_sum(&f, &e(), &p), Err(FieldError::DimensionMismatch(_))));
        assert!(matches!(neighbor_sum(&f, &Dimension::local("C2E"), &p), Err(FieldError::DimensionMismatch(_))));

        let two_local = Domain::new([e().range(0..3), e2v().range(0..2), Dimension::local("C2E").range(0..1)]).unwrap();
        let g = Field::from_array(&cpu(), ArrayData::zeros(DType::Float64, &[3, 2, 1]), two_local, None).unwrap();
        assert!(matches!(neighbor_sum(&g, &e2v(), &p), Err(FieldError::Unsupported(_))));

        let swapped = Domain::new([e2v().range(0..2), e().range(0..3)]).unwrap();
        let h = Field::from_array(&cpu(), ArrayData::zeros(DType::Float64, &[2, 3]), swapped, None).unwrap();
        assert!(matches!(neighbor_sum(&h, &e2v(), &p), Err(FieldError::DimensionMismatch(_))));

        assert!(matches!(neighbor_sum(&f, &e2v(), &OffsetProvider::new()), Err(FieldError::DimensionMismatch(_))));
    }
}
