//! Native tensor backends behind the RefTorch handle bridge.
//!
//! The bridge only ever talks to a [`Backend`]. The default build ships the
//! `ndarray` reference backend; enabling the `torch` feature adds libtorch.

pub mod backend;
pub mod cpu;
pub mod error;
pub mod format;
#[cfg(feature = "torch")]
pub mod torch;

pub use backend::{Backend, BackendKind, BinaryOp, ReduceOp, ScalarOp, UnaryOp};
pub use cpu::{CpuBackend, CpuTensor, DEFAULT_MAX_ELEMENTS};
pub use error::{NativeError, NativeResult};
#[cfg(feature = "torch")]
pub use torch::TorchBackend;
