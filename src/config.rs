use anyhow::{Context, Result};
use ndarray::Array2;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::backend::{self, BackendKind, BackendRef};
use crate::connectivity::ConnectivityField;
use crate::domain::Dimension;
use crate::error;
use crate::field::Field;
use crate::offset::NeighborTable;

/// Memoized queries kept per connectivity.
pub const DEFAULT_CONNECTIVITY_CACHE_CAPACITY: usize = 64;
/// Neighbour table entry meaning "no neighbour".
pub const DEFAULT_SKIP_VALUE: i64 = -1;

/// RON round trip for anything serde can handle.
pub trait Config: Send + Sync {
    fn config(&self) -> Result<String>;
    fn load_config(&mut self, config: &str) -> Result<()>;
}

impl<T: Serialize + DeserializeOwned + Send + Sync> Config for T {
    fn config(&self) -> Result<String> {
        ron::to_string(self).context("failed to serialize config")
    }
    fn load_config(&mut self, config: &str) -> Result<()> {
        *self = ron::from_str(config).context(format!("failed to load config {}", config))?;
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldConfig {
    pub backend: BackendKind,
    /// 0 disables connectivity memoization.
    pub connectivity_cache_capacity: usize,
    pub default_skip_value: i64,
}

impl Default for FieldConfig {
    fn default() -> Self {
        FieldConfig {
            backend: BackendKind::default(),
            connectivity_cache_capacity: DEFAULT_CONNECTIVITY_CACHE_CAPACITY,
            default_skip_value: DEFAULT_SKIP_VALUE,
        }
    }
}

impl FieldConfig {
    /// Backend descriptor of the configured kind. A kind with no runtime available is
    /// a configuration error.
    pub fn backend(&self) -> Result<BackendRef> {
        backend::select(self.backend).with_context(|| format!("cannot use the '{}' backend", self.backend))
    }

    /// Connectivity with the configured skip value and memo capacity.
    pub fn connectivity(&self, field: Field, codomain: Dimension) -> error::Result<ConnectivityField> {
        let c = ConnectivityField::from_field(field, codomain, Some(self.default_skip_value))?;
        Ok(c.with_cache_capacity(self.connectivity_cache_capacity))
    }

    pub fn neighbor_table(&self, table: Array2<i64>, origin_axis: Dimension, neighbor_axis: Dimension) -> NeighborTable {
        NeighborTable::new(table, origin_axis, neighbor_axis).with_skip_value(self.default_skip_value)
    }
}
