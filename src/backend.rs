//! Array backends. A backend is the capability descriptor a [`Field`](crate::Field)
//! carries around: every array operation of the field layer goes through it, so the
//! field code never depends on where or how the array lives.

use std::fmt::Debug;
use std::sync::{Arc, Mutex, OnceLock};

use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use tracing::{debug, trace};

use crate::array::{self, ArrayData, BinaryOp, DType, ReduceOp, UnaryOp};
use crate::domain::AxisSlice;
use crate::error::{FieldError, Result};

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[strum(serialize_all = "lowercase")]
pub enum BackendKind {
    /// Dense host arrays.
    #[default]
    Cpu,
    /// Dense device arrays, needs a device runtime.
    Gpu,
    /// Dense host arrays, every operation is recorded for later inspection.
    Traced,
}

pub type BackendRef = Arc<dyn ArrayBackend>;

/// The uniform array interface. The provided methods run the host kernels from
/// [`crate::array`]; a backend only overrides what it does differently.
pub trait ArrayBackend: Send + Sync + Debug {
    fn kind(&self) -> BackendKind;

    fn asarray(&self, data: ArrayData, dtype: Option<DType>) -> Result<ArrayData> {
        Ok(match dtype {
            Some(d) if d != data.dtype() => data.astype(d),
            _ => data,
        })
    }

    fn astype(&self, data: &ArrayData, dtype: DType) -> Result<ArrayData> {
        Ok(data.astype(dtype))
    }

    fn binary(&self, op: BinaryOp, lhs: &ArrayData, rhs: &ArrayData) -> Result<ArrayData> {
        array::binary(op, lhs, rhs)
    }

    fn unary(&self, op: UnaryOp, data: &ArrayData) -> Result<ArrayData> {
        array::unary(op, data)
    }

    /// Kernel registered under a builtin name, if this backend has one.
    fn unary_kernel(&self, name: &str) -> Option<UnaryOp> {
        name.parse().ok()
    }

    fn reduce(&self, op: ReduceOp, data: &ArrayData, axis: usize) -> Result<ArrayData> {
        array::reduce(op, data, axis)
    }

    fn take(&self, data: &ArrayData, indices: &ArrayD<i64>, axis: usize) -> Result<ArrayData> {
        array::take(data, indices, axis)
    }

    fn concatenate(&self, arrays: &[ArrayData], axis: usize) -> Result<ArrayData> {
        array::concatenate(arrays, axis)
    }

    fn broadcast_to(&self, data: &ArrayData, shape: &[usize]) -> Result<ArrayData> {
        array::broadcast_to(data, shape)
    }

    fn nonzero(&self, data: &ArrayData) -> Result<Vec<Vec<usize>>> {
        Ok(array::nonzero(data))
    }

    fn select_where(&self, cond: &ArrayData, x: &ArrayData, y: &ArrayData) -> Result<ArrayData> {
        array::select_where(cond, x, y)
    }

    fn slice(&self, data: &ArrayData, slices: &[AxisSlice]) -> Result<ArrayData> {
        array::slice(data, slices)
    }

    fn supports_inplace(&self) -> bool {
        true
    }

    fn assign(&self, target: &mut ArrayData, slices: &[AxisSlice], value: &ArrayData) -> Result<()> {
        array::assign(target, slices, value)
    }
}

#[derive(Debug, Default)]
pub struct CpuBackend;

impl ArrayBackend for CpuBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Cpu
    }
}

/// Evaluates on the host like [`CpuBackend`] but keeps a log of every operation it
/// executed. Arrays are treated as immutable, so in-place assignment is refused.
#[derive(Debug, Default)]
pub struct TracedBackend {
    ops: Mutex<Vec<String>>,
}

impl TracedBackend {
    fn record(&self, op: impl Into<String>) {
        let op = op.into();
        trace!(op = %op, "traced backend op");
        if let Ok(mut ops) = self.ops.lock() {
            ops.push(op);
        }
    }

    /// Operations recorded so far, in execution order.
    pub fn recorded(&self) -> Vec<String> {
        self.ops.lock().map(|ops| ops.clone()).unwrap_or_default()
    }
}

impl ArrayBackend for TracedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Traced
    }

    fn asarray(&self, data: ArrayData, dtype: Option<DType>) -> Result<ArrayData> {
        self.record("asarray");
        Ok(match dtype {
            Some(d) if d != data.dtype() => data.astype(d),
            _ => data,
        })
    }

    fn astype(&self, data: &ArrayData, dtype: DType) -> Result<ArrayData> {
        self.record(format!("astype:{}", dtype));
        Ok(data.astype(dtype))
    }

    fn binary(&self, op: BinaryOp, lhs: &ArrayData, rhs: &ArrayData) -> Result<ArrayData> {
        self.record(op.to_string());
        array::binary(op, lhs, rhs)
    }

    fn unary(&self, op: UnaryOp, data: &ArrayData) -> Result<ArrayData> {
        self.record(op.to_string());
        array::unary(op, data)
    }

    fn reduce(&self, op: ReduceOp, data: &ArrayData, axis: usize) -> Result<ArrayData> {
        self.record(op.to_string());
        array::reduce(op, data, axis)
    }

    fn take(&self, data: &ArrayData, indices: &ArrayD<i64>, axis: usize) -> Result<ArrayData> {
        self.record("take");
        array::take(data, indices, axis)
    }

    fn concatenate(&self, arrays: &[ArrayData], axis: usize) -> Result<ArrayData> {
        self.record("concatenate");
        array::concatenate(arrays, axis)
    }

    fn broadcast_to(&self, data: &ArrayData, shape: &[usize]) -> Result<ArrayData> {
        self.record("broadcast_to");
        array::broadcast_to(data, shape)
    }

    fn nonzero(&self, data: &ArrayData) -> Result<Vec<Vec<usize>>> {
        self.record("nonzero");
        Ok(array::nonzero(data))
    }

    fn select_where(&self, cond: &ArrayData, x: &ArrayData, y: &ArrayData) -> Result<ArrayData> {
        self.record("where");
        array::select_where(cond, x, y)
    }

    fn slice(&self, data: &ArrayData, slices: &[AxisSlice]) -> Result<ArrayData> {
        self.record("slice");
        array::slice(data, slices)
    }

    fn supports_inplace(&self) -> bool {
        false
    }

    fn assign(&self, _target: &mut ArrayData, _slices: &[AxisSlice], _value: &ArrayData) -> Result<()> {
        Err(FieldError::unsupported("the traced backend does not support in-place assignment"))
    }
}

/// Shared host backend.
pub fn cpu() -> BackendRef {
    static CPU: OnceLock<BackendRef> = OnceLock::new();
    CPU.get_or_init(|| Arc::new(CpuBackend)).clone()
}

/// Resolves a backend kind to its descriptor. A kind without a runtime in this build
/// is a configuration error.
pub fn select(kind: BackendKind) -> Result<BackendRef> {
    debug!(backend = %kind, "selecting array backend");
    match kind {
        BackendKind::Cpu => Ok(cpu()),
        BackendKind::Traced => Ok(Arc::new(TracedBackend::default())),
        BackendKind::Gpu => Err(FieldError::BackendUnavailable(kind)),
    }
}

/// All backends must agree, fields living on different backends are never mixed.
pub fn common_backend<'a>(backends: impl IntoIterator<Item = &'a BackendRef>) -> Result<Option<BackendRef>> {
    let mut common: Option<&BackendRef> = None;
    for b in backends {
        match common {
            Some(c) if c.kind() != b.kind() => return Err(FieldError::BackendMismatch(c.kind(), b.kind())),
            Some(_) => {}
            None => common = Some(b),
        }
    }
    Ok(common.cloned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn gpu_is_a_configuration_error() {
        let err = select(BackendKind::Gpu).unwrap_err();
        assert!(matches!(err, FieldError::BackendUnavailable(BackendKind::Gpu)));
        assert_eq!(select(BackendKind::Cpu).unwrap().kind(), BackendKind::Cpu);
        assert_eq!("traced".parse::<BackendKind>().unwrap(), BackendKind::Traced);
    }

    #[test]
    fn traced_records_ops() {
        let traced = TracedBackend::default();
        let a: ArrayData = array![1, 2].into_dyn().into();
        traced.binary(BinaryOp::Add, &a, &a).unwrap();
        traced.reduce(ReduceOp::Sum, &a, 0).unwrap();
        assert_eq!(traced.recorded(), vec!["add".to_string(), "sum".to_string()]);

        let mut target = a.clone();
        let err = traced.assign(&mut target, &[], &a).unwrap_err();
        assert!(matches!(err, FieldError::Unsupported(_)));
    }

    #[test]
    fn mismatched_backends() {
        let cpu = cpu();
        let traced: BackendRef = Arc::new(TracedBackend::default());
        assert!(common_backend([&cpu, &cpu]).unwrap().is_some());
        assert!(matches!(
            common_backend([&cpu, &traced]),
            Err(FieldError::BackendMismatch(BackendKind::Cpu, BackendKind::Traced))
        ));
        assert!(common_backend([]).unwrap().is_none());
    }
}
