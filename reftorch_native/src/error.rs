use thiserror::Error;

pub type NativeResult<T> = Result<T, NativeError>;

/// Failure reported by a tensor backend.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NativeError {
    /// Operand dimensions are incompatible with the requested operation.
    #[error("shape mismatch: {0}")]
    Shape(String),

    #[error("allocation of {requested} elements exceeds limit of {limit}")]
    Exhausted { requested: usize, limit: usize },

    #[error("{op} is not supported by the {backend} backend")]
    Unsupported {
        backend: &'static str,
        op: &'static str,
    },

    #[error("io error on {path}: {message}")]
    Io { path: String, message: String },

    #[error("{0}")]
    Fault(String),
}

impl NativeError {
    pub fn shape(msg: impl Into<String>) -> Self {
        NativeError::Shape(msg.into())
    }

    pub fn io(path: &std::path::Path, err: impl std::fmt::Display) -> Self {
        NativeError::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<ndarray::ShapeError> for NativeError {
    fn from(err: ndarray::ShapeError) -> Self {
        NativeError::Shape(err.to_string())
    }
}
