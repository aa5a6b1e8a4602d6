//! Offset providers describe the mesh a program runs on: named neighbour tables and
//! cartesian shifts that offsets and neighbour reductions look up by name.

use std::collections::HashMap;
use std::sync::Arc;

use ndarray::Array2;

use crate::backend::BackendRef;
use crate::config::DEFAULT_SKIP_VALUE;
use crate::connectivity::{CartesianConnectivity, Connectivity, ConnectivityField};
use crate::domain::{Dimension, Domain};
use crate::error::{FieldError, Result};

/// Dense `(rows, max_neighbors)` table of neighbour indices. Row `r` lists the
/// neighbours of position `r` of the origin axis, missing ones hold the skip value.
#[derive(Clone, Debug, PartialEq)]
pub struct NeighborTable {
    pub table: Array2<i64>,
    pub origin_axis: Dimension,
    pub neighbor_axis: Dimension,
    pub skip_value: i64,
}

impl NeighborTable {
    pub fn new(table: Array2<i64>, origin_axis: Dimension, neighbor_axis: Dimension) -> NeighborTable {
        NeighborTable { table, origin_axis, neighbor_axis, skip_value: DEFAULT_SKIP_VALUE }
    }

    pub fn with_skip_value(mut self, skip_value: i64) -> NeighborTable {
        self.skip_value = skip_value;
        self
    }

    pub fn max_neighbors(&self) -> usize {
        self.table.ncols()
    }

    pub fn rows(&self) -> usize {
        self.table.nrows()
    }

    pub fn has_skip_values(&self) -> bool {
        self.table.iter().any(|&v| v == self.skip_value)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum OffsetDefinition {
    Neighbors(NeighborTable),
    /// Shift of `offset` along `dim`.
    Cartesian { dim: Dimension, offset: isize },
}

impl From<NeighborTable> for OffsetDefinition {
    fn from(t: NeighborTable) -> Self {
        OffsetDefinition::Neighbors(t)
    }
}

#[derive(Clone, Debug, Default)]
pub struct OffsetProvider {
    offsets: HashMap<String, OffsetDefinition>,
}

impl OffsetProvider {
    pub fn new() -> OffsetProvider {
        OffsetProvider::default()
    }

    pub fn with(mut self, name: impl Into<String>, definition: impl Into<OffsetDefinition>) -> OffsetProvider {
        self.insert(name, definition);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, definition: impl Into<OffsetDefinition>) {
        self.offsets.insert(name.into(), definition.into());
    }

    pub fn get(&self, name: &str) -> Option<&OffsetDefinition> {
        self.offsets.get(name)
    }

    /// Neighbour table registered under `name`.
    pub fn neighbor_table(&self, name: &str) -> Result<&NeighborTable> {
        match self.offsets.get(name) {
            Some(OffsetDefinition::Neighbors(t)) => Ok(t),
            Some(OffsetDefinition::Cartesian { .. }) => {
                Err(FieldError::dims(format!("offset '{}' is cartesian, not a neighbour table", name)))
            }
            None => Err(FieldError::dims(format!("no neighbour table for '{}' in the offset provider", name))),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.offsets.keys().map(String::as_str)
    }
}

/// A named offset applied to fields of the `source` dimension. `target` lists the
/// dimensions of the result, origin axis first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldOffset {
    pub value: String,
    pub source: Dimension,
    pub target: Vec<Dimension>,
}

impl FieldOffset {
    pub fn new(value: impl Into<String>, source: Dimension, target: Vec<Dimension>) -> FieldOffset {
        FieldOffset { value: value.into(), source, target }
    }

    /// Connectivity the provider defines for this offset.
    pub fn as_connectivity(&self, provider: &OffsetProvider, backend: &BackendRef) -> Result<Box<dyn Connectivity>> {
        let definition = provider
            .get(&self.value)
            .ok_or_else(|| FieldError::dims(format!("offset '{}' is not in the offset provider", self.value)))?;
        match definition {
            OffsetDefinition::Cartesian { dim, offset } => {
                if dim != &self.source {
                    return Err(FieldError::dims(format!(
                        "offset '{}' shifts '{}' but is applied to '{}'",
                        self.value, dim, self.source
                    )));
                }
                Ok(Box::new(CartesianConnectivity::new(dim.clone(), *offset)))
            }
            OffsetDefinition::Neighbors(t) => {
                let (origin, local) = match self.target.as_slice() {
                    [origin, local] => (origin, local),
                    _ => {
                        return Err(FieldError::dims(format!(
                            "offset '{}' over a neighbour table needs an origin and a neighbour dimension",
                            self.value
                        )))
                    }
                };
                let domain = Domain::new([
                    origin.range(0..t.rows() as isize),
                    local.range(0..t.max_neighbors() as isize),
                ])?;
                let connectivity = ConnectivityField::from_array(
                    backend,
                    t.table.clone().into_dyn(),
                    self.source.clone(),
                    domain,
                    Some(t.skip_value),
                    None,
                )?;
                Ok(Box::new(connectivity))
            }
        }
    }
}

/// Read-only state a builtin runs with.
#[derive(Clone, Debug, Default)]
pub struct ExecContext {
    pub offset_provider: Arc<OffsetProvider>,
}

impl ExecContext {
    pub fn new(offset_provider: OffsetProvider) -> ExecContext {
        ExecContext { offset_provider: Arc::new(offset_provider) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::cpu;
    use crate::field::Field;
    use ndarray::array;

    fn v() -> Dimension {
        Dimension::horizontal("V")
    }

    fn e() -> Dimension {
        Dimension::horizontal("E")
    }

    fn e2v() -> Dimension {
        Dimension::local("E2V")
    }

    fn provider() -> OffsetProvider {
        OffsetProvider::new()
            .with("E2V", NeighborTable::new(array![[0, 1], [1, 2], [2, -1]], e(), e2v()))
            .with("Vshift", OffsetDefinition::Cartesian { dim: v(), offset: 1 })
    }

    #[test]
    fn table_lookup() {
        let p = provider();
        let t = p.neighbor_table("E2V").unwrap();
        assert_eq!((t.rows(), t.max_neighbors(), t.skip_value), (3, 2, -1));
        assert!(t.has_skip_values());
        assert!(matches!(p.neighbor_table("Vshift"), Err(FieldError::DimensionMismatch(_))));
        assert!(matches!(p.neighbor_table("C2E"), Err(FieldError::DimensionMismatch(_))));
        assert_eq!(p.names().count(), 2);
    }

    #[test]
    fn remap_through_neighbor_offset() {
        let p = provider();
        let f = Field::from_array(&cpu(), array![1.0, 2.0, 3.0].into_dyn(), Domain::from(v().range(0..3)), None).unwrap();
        let offset = FieldOffset::new("E2V", v(), vec![e(), e2v()]);
        let r = f.remap_offset(&offset, &p).unwrap();
        assert_eq!(r.domain(), &Domain::new([e().range(0..3), e2v().range(0..2)]).unwrap());
        assert_eq!(r.to_vec::<f64>(), vec![1.0, 2.0, 2.0, 3.0, 3.0, 3.0]);
    }

    #[test]
    fn remap_through_cartesian_offset() {
        let p = provider();
        let f = Field::from_array(&cpu(), array![1, 2, 3].into_dyn(), Domain::from(v().range(0..3)), None).unwrap();
        let r = f.remap_offset(&FieldOffset::new("Vshift", v(), vec![v()]), &p).unwrap();
        assert_eq!(r.domain(), &Domain::from(v().range(-1..2)));
        assert!(r.shares_buffer(&f));

        let wrong = FieldOffset::new("Vshift", e(), vec![e()]);
        assert!(matches!(wrong.as_connectivity(&p, &cpu()), Err(FieldError::DimensionMismatch(_))));
        let missing = FieldOffset::new("V2E", v(), vec![v()]);
        assert!(matches!(missing.as_connectivity(&p, &cpu()), Err(FieldError::DimensionMismatch(_))));
    }

    #[test]
    fn context_shares_provider() {
        let ctx = ExecContext::new(provider());
        let copy = ctx.clone();
        assert!(Arc::ptr_eq(&ctx.offset_provider, &copy.offset_provider));
        assert!(ExecContext::default().offset_provider.get("E2V").is_none());
    }
}
