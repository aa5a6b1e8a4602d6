use std::fmt;

use thiserror::Error;

use crate::backend::BackendKind;
use crate::domain::Domain;

pub type Result<T> = std::result::Result<T, FieldError>;

#[derive(Debug, Error)]
pub enum FieldError {
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("dtype mismatch: expected {expected}, found {found}")]
    DTypeMismatch { expected: String, found: String },

    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("incompatible 'Domain' in assignment: source domain = '{value}', target domain = '{target}'")]
    DomainMismatch { value: Domain, target: Domain },

    #[error("index '{index}' out of bounds for dimension '{dim}' of domain '{domain}'")]
    IndexOutOfBounds { domain: Domain, index: String, dim: String },

    #[error("operation requires a finite range: {0}")]
    InfiniteRange(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("non-contiguous domain: {0}")]
    NonContiguousDomain(String),

    #[error("backend '{0}' is not available in this build")]
    BackendUnavailable(BackendKind),

    #[error("cannot combine fields living on backends '{0}' and '{1}'")]
    BackendMismatch(BackendKind, BackendKind),

    #[error("builtin '{0}' is not registered")]
    UnknownBuiltin(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl FieldError {
    pub fn shape(msg: impl Into<String>) -> Self {
        FieldError::ShapeMismatch(msg.into())
    }

    pub fn dims(msg: impl Into<String>) -> Self {
        FieldError::DimensionMismatch(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        FieldError::Unsupported(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        FieldError::InvalidArgument(msg.into())
    }
}

/// Position of a construct in the user's DSL source.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub filename: String,
    pub line: usize,
    pub column: usize,
}

impl SourceLocation {
    pub fn new(filename: impl Into<String>, line: usize, column: usize) -> Self {
        SourceLocation { filename: filename.into(), line, column }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.filename, self.line, self.column)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DslErrorKind {
    MissingParameterAnnotation { param: String },
    InvalidParameterAnnotation { param: String, annotation: String },
    Message(String),
}

/// Errors raised by the program/function front-end that produces the typed syntax
/// tree this crate executes. They always carry the offending source location.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{location}: {kind}")]
pub struct DslError {
    pub location: SourceLocation,
    pub kind: DslErrorKind,
}

impl DslError {
    pub fn new(location: SourceLocation, msg: impl Into<String>) -> Self {
        DslError { location, kind: DslErrorKind::Message(msg.into()) }
    }

    pub fn missing_annotation(location: SourceLocation, param: impl Into<String>) -> Self {
        DslError { location, kind: DslErrorKind::MissingParameterAnnotation { param: param.into() } }
    }

    pub fn invalid_annotation(
        location: SourceLocation,
        param: impl Into<String>,
        annotation: impl Into<String>,
    ) -> Self {
        DslError {
            location,
            kind: DslErrorKind::InvalidParameterAnnotation {
                param: param.into(),
                annotation: annotation.into(),
            },
        }
    }
}

impl fmt::Display for DslErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DslErrorKind::MissingParameterAnnotation { param } => {
                write!(f, "missing type annotation for parameter '{}'", param)
            }
            DslErrorKind::InvalidParameterAnnotation { param, annotation } => {
                write!(f, "parameter '{}' has invalid type annotation '{}'", param, annotation)
            }
            DslErrorKind::Message(msg) => write!(f, "{}", msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dsl_error_display() {
        let loc = SourceLocation::new("stencils.py", 12, 4);
        let err = DslError::missing_annotation(loc.clone(), "inp");
        assert_eq!(err.to_string(), "stencils.py:12:4: missing type annotation for parameter 'inp'");

        let err = DslError::new(loc, "Unary operators are only applicable to literals.");
        assert_eq!(err.to_string(), "stencils.py:12:4: Unary operators are only applicable to literals.");
    }

    #[test]
    fn invalid_annotation_display() {
        let err = DslError::invalid_annotation(SourceLocation::new("p.py", 1, 0), "out", "int");
        assert!(err.to_string().contains("parameter 'out' has invalid type annotation 'int'"));
    }
}
