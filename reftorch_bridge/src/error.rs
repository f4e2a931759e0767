use reftorch_native::NativeError;
use thiserror::Error;

use crate::catalogue::OperandKind;
use crate::handle::Handle;
use crate::node::NodeTag;

pub type BridgeResult<T> = Result<T, BridgeError>;

/// What the extractor saw where an operand was expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Found {
    Tag(NodeTag),
    End,
}

impl std::fmt::Display for Found {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Found::Tag(tag) => write!(f, "{}", tag),
            Found::End => f.write_str("end of arguments"),
        }
    }
}

/// What the extractor wanted at a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expected {
    Operand(OperandKind),
    ListElement,
    CloseBracket,
    End,
}

impl std::fmt::Display for Expected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expected::Operand(kind) => write!(f, "{}", kind),
            Expected::ListElement => f.write_str("number inside list"),
            Expected::CloseBracket => f.write_str("closing bracket"),
            Expected::End => f.write_str("end of arguments"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    #[error("type mismatch at node {position}: expected {expected}, found {found}")]
    TypeMismatch {
        position: usize,
        expected: Expected,
        found: Found,
    },

    #[error("unknown handle {0}")]
    UnknownHandle(Handle),

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("native fault: {0}")]
    NativeFault(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("no operation named '{0}'")]
    UnknownOperation(String),

    #[error("span {start}..{end} is outside a view field of {len} nodes")]
    InvalidSpan { start: usize, end: usize, len: usize },
}

impl From<NativeError> for BridgeError {
    fn from(err: NativeError) -> Self {
        match err {
            NativeError::Shape(msg) => BridgeError::ShapeMismatch(msg),
            NativeError::Exhausted { .. } => BridgeError::ResourceExhausted(err.to_string()),
            NativeError::Unsupported { .. } | NativeError::Io { .. } | NativeError::Fault(_) => {
                BridgeError::NativeFault(err.to_string())
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value: {0}")]
    Invalid(String),

    #[error("backend '{0}' is not compiled in; rebuild with the matching feature")]
    BackendUnavailable(String),

    #[error(transparent)]
    Native(#[from] NativeError),
}
