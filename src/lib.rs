pub mod array;
pub mod backend;
pub mod builtins;
pub mod concat;
pub mod config;
pub mod connectivity;
pub mod domain;
pub mod error;
pub mod field;
pub mod offset;

pub use array::{ArrayData, DType, Scalar};
pub use backend::{ArrayBackend, BackendKind, BackendRef};
pub use builtins::{Arg, BuiltinRegistry};
pub use concat::concat_where;
pub use config::{Config, FieldConfig};
pub use connectivity::{CartesianConnectivity, Connectivity, ConnectivityField, ConnectivityKind};
pub use domain::{Dimension, DimensionKind, Domain, NamedRange, UnitRange};
pub use error::{FieldError, Result};
pub use field::{Field, Operand};
pub use offset::{ExecContext, FieldOffset, NeighborTable, OffsetProvider};
