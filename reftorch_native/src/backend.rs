use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{NativeError, NativeResult};
use crate::format;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Cpu,
    Torch,
}

impl BackendKind {
    pub fn name(self) -> &'static str {
        match self {
            BackendKind::Cpu => "cpu",
            BackendKind::Torch => "torch",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpu" | "ndarray" => Ok(BackendKind::Cpu),
            "torch" | "libtorch" => Ok(BackendKind::Torch),
            other => Err(format!("unknown backend '{}'", other)),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Maximum,
    Minimum,
}

impl BinaryOp {
    pub fn apply(self, a: f32, b: f32) -> f32 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Maximum => a.max(b),
            BinaryOp::Minimum => a.min(b),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Abs,
    Exp,
    Log,
    Sqrt,
    Tanh,
    Relu,
    Sigmoid,
    Silu,
    Gelu,
    Sin,
    Cos,
}

impl UnaryOp {
    pub fn apply(self, x: f32) -> f32 {
        match self {
            UnaryOp::Neg => -x,
            UnaryOp::Abs => x.abs(),
            UnaryOp::Exp => x.exp(),
            UnaryOp::Log => x.ln(),
            UnaryOp::Sqrt => x.sqrt(),
            UnaryOp::Tanh => x.tanh(),
            UnaryOp::Relu => x.max(0.0),
            UnaryOp::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            UnaryOp::Silu => x / (1.0 + (-x).exp()),
            // tanh approximation, matches torch's gelu(approximate="tanh")
            UnaryOp::Gelu => {
                let c = (2.0f32 / std::f32::consts::PI).sqrt();
                0.5 * x * (1.0 + (c * (x + 0.044715 * x * x * x)).tanh())
            }
            UnaryOp::Sin => x.sin(),
            UnaryOp::Cos => x.cos(),
        }
    }
}

/// Tensor-with-scalar operations.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ScalarOp {
    Add,
    Mul,
    Pow,
}

impl ScalarOp {
    pub fn apply(self, x: f32, s: f32) -> f32 {
        match self {
            ScalarOp::Add => x + s,
            ScalarOp::Mul => x * s,
            ScalarOp::Pow => x.powf(s),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReduceOp {
    Sum,
    Mean,
    Max,
    Min,
}

/// The native-library seam. Every fallible call reports a [`NativeError`];
/// implementations must not rely on panics to signal bad operands.
pub trait Backend {
    type Tensor;

    fn kind(&self) -> BackendKind;

    // creation
    fn zeros(&mut self, shape: &[usize]) -> NativeResult<Self::Tensor>;
    fn ones(&mut self, shape: &[usize]) -> NativeResult<Self::Tensor>;
    fn full(&mut self, shape: &[usize], value: f32) -> NativeResult<Self::Tensor>;
    fn rand(&mut self, shape: &[usize]) -> NativeResult<Self::Tensor>;
    fn randn(&mut self, shape: &[usize]) -> NativeResult<Self::Tensor>;
    fn arange(&mut self, start: f32, end: f32, step: f32) -> NativeResult<Self::Tensor>;
    fn eye(&mut self, n: usize) -> NativeResult<Self::Tensor>;
    fn from_vec(&mut self, shape: &[usize], data: Vec<f32>) -> NativeResult<Self::Tensor>;
    /// `n x n` additive attention mask: 0 on and below the diagonal, -inf above.
    fn causal_mask(&mut self, n: usize) -> NativeResult<Self::Tensor>;

    // inspection
    fn shape(&self, t: &Self::Tensor) -> Vec<usize>;
    fn to_vec(&self, t: &Self::Tensor) -> NativeResult<Vec<f32>>;
    fn item(&self, t: &Self::Tensor) -> NativeResult<f32>;
    fn duplicate(&self, t: &Self::Tensor) -> NativeResult<Self::Tensor>;

    // elementwise
    fn binary(&self, op: BinaryOp, a: &Self::Tensor, b: &Self::Tensor)
        -> NativeResult<Self::Tensor>;
    fn unary(&self, op: UnaryOp, a: &Self::Tensor) -> NativeResult<Self::Tensor>;
    fn scalar(&self, op: ScalarOp, a: &Self::Tensor, s: f32) -> NativeResult<Self::Tensor>;
    fn clamp(&self, a: &Self::Tensor, min: f32, max: f32) -> NativeResult<Self::Tensor>;
    fn matmul(&self, a: &Self::Tensor, b: &Self::Tensor) -> NativeResult<Self::Tensor>;

    // reductions
    fn reduce(
        &self,
        op: ReduceOp,
        a: &Self::Tensor,
        axis: Option<usize>,
    ) -> NativeResult<Self::Tensor>;
    fn argmax(&self, a: &Self::Tensor, axis: usize) -> NativeResult<Self::Tensor>;

    // shape manipulation
    fn reshape(&self, a: &Self::Tensor, shape: &[usize]) -> NativeResult<Self::Tensor>;
    fn transpose(&self, a: &Self::Tensor, d0: usize, d1: usize) -> NativeResult<Self::Tensor>;
    fn concat(&self, parts: &[&Self::Tensor], axis: usize) -> NativeResult<Self::Tensor>;
    fn narrow(
        &self,
        a: &Self::Tensor,
        axis: usize,
        start: usize,
        len: usize,
    ) -> NativeResult<Self::Tensor>;
    fn unsqueeze(&self, a: &Self::Tensor, axis: usize) -> NativeResult<Self::Tensor>;
    /// Repeats every slice along `axis` `repeats` times in place, so `[a, b]`
    /// becomes `[a, a, b, b]`.
    fn repeat_interleave(
        &self,
        a: &Self::Tensor,
        repeats: usize,
        axis: usize,
    ) -> NativeResult<Self::Tensor>;

    // neural
    fn softmax(&self, a: &Self::Tensor, axis: usize) -> NativeResult<Self::Tensor>;
    fn log_softmax(&self, a: &Self::Tensor, axis: usize) -> NativeResult<Self::Tensor>;
    fn rms_norm(&self, x: &Self::Tensor, w: &Self::Tensor, eps: f32)
        -> NativeResult<Self::Tensor>;
    fn embedding(&self, w: &Self::Tensor, ids: &Self::Tensor) -> NativeResult<Self::Tensor>;

    // losses, reduced to 0-d tensors
    fn mse_loss(&self, a: &Self::Tensor, b: &Self::Tensor) -> NativeResult<Self::Tensor>;
    fn cross_entropy(
        &self,
        logits: &Self::Tensor,
        targets: &Self::Tensor,
    ) -> NativeResult<Self::Tensor>;

    // comparison
    fn equal(&self, a: &Self::Tensor, b: &Self::Tensor) -> NativeResult<bool>;
    fn allclose(&self, a: &Self::Tensor, b: &Self::Tensor, atol: f32) -> NativeResult<bool>;

    // in-place training ops
    fn sgd_step(&self, param: &mut Self::Tensor, grad: &Self::Tensor, lr: f32)
        -> NativeResult<()>;
    fn fill(&self, t: &mut Self::Tensor, value: f32) -> NativeResult<()>;

    // autograd
    fn set_requires_grad(&self, t: &mut Self::Tensor) -> NativeResult<()>;
    fn backward(&self, t: &Self::Tensor) -> NativeResult<()>;
    fn grad(&self, t: &Self::Tensor) -> NativeResult<Self::Tensor>;

    // the backend's own serialization format
    fn save_native(&self, t: &Self::Tensor, path: &Path) -> NativeResult<()>;
    fn load_native(&mut self, path: &Path) -> NativeResult<Self::Tensor>;

    fn save_binary(&self, t: &Self::Tensor, path: &Path) -> NativeResult<()> {
        let data = self.to_vec(t)?;
        format::write_binary(path, &self.shape(t), &data)
    }

    fn load_binary(&mut self, path: &Path) -> NativeResult<Self::Tensor> {
        let (shape, data) = format::read_binary(path)?;
        self.from_vec(&shape, data)
    }

    fn save_text(&self, t: &Self::Tensor, path: &Path) -> NativeResult<()> {
        let data = self.to_vec(t)?;
        format::write_text(path, &self.shape(t), &data)
    }

    fn load_text(&mut self, path: &Path) -> NativeResult<Self::Tensor> {
        let (shape, data) = format::read_text(path)?;
        self.from_vec(&shape, data)
    }
}

pub(crate) fn check_axis(axis: usize, ndim: usize, what: &str) -> NativeResult<()> {
    if axis < ndim {
        Ok(())
    } else {
        Err(NativeError::shape(format!(
            "{} axis {} out of range for rank {}",
            what, axis, ndim
        )))
    }
}
