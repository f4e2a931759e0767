//! Every operation the engine can call, with its operand signature and the
//! fixed-point scale of each scalar crossing the boundary.

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use reftorch_native::{BinaryOp, ReduceOp, ScalarOp, UnaryOp};
use serde::Serialize;

use crate::fixed::Scale;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperandKind {
    Int,
    Real(Scale),
    /// Zero or one number; final operand only.
    OptInt,
    Handle,
    IntList,
    RealList(Scale),
    HandleList,
    /// Characters running to the end of the span; final operand only.
    Path,
}

impl OperandKind {
    /// Kinds that consume a variable number of trailing nodes.
    pub fn must_be_last(self) -> bool {
        matches!(self, OperandKind::OptInt | OperandKind::Path)
    }
}

impl fmt::Display for OperandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperandKind::Int => f.write_str("integer"),
            OperandKind::Real(scale) => write!(f, "real {}", scale),
            OperandKind::OptInt => f.write_str("optional integer"),
            OperandKind::Handle => f.write_str("handle"),
            OperandKind::IntList => f.write_str("integer list"),
            OperandKind::RealList(scale) => write!(f, "real list {}", scale),
            OperandKind::HandleList => f.write_str("handle list"),
            OperandKind::Path => f.write_str("path"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Returns {
    Handle,
    Int,
    Real(Scale),
    IntList,
    RealList(Scale),
    Nothing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    Creation,
    Elementwise,
    Reduction,
    Shape,
    Comparison,
    Neural,
    Loss,
    Training,
    Io,
    Utility,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// Whatever the active backend writes natively.
    Native,
    Binary,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Zeros,
    Ones,
    Full,
    Rand,
    Randn,
    Arange,
    Eye,
    FromList,
    Scalar,
    Binary(BinaryOp),
    MatMul,
    Unary(UnaryOp),
    WithScalar(ScalarOp),
    Clamp,
    Reduce(ReduceOp),
    ArgMax,
    Reshape,
    Transpose,
    Cat,
    Narrow,
    Unsqueeze,
    RepeatInterleave,
    Shape,
    Numel,
    Dim,
    Equal,
    AllClose,
    Softmax,
    LogSoftmax,
    RmsNorm,
    Embedding,
    Linear,
    CausalMask,
    MseLoss,
    CrossEntropy,
    SgdStep,
    Fill,
    RequiresGrad,
    Backward,
    Grad,
    Save(FileFormat),
    Load(FileFormat),
    Item,
    ToList,
    Clone,
    Free,
    FreeAll,
    LiveCount,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpSpec {
    pub name: &'static str,
    pub family: Family,
    #[serde(skip)]
    pub code: OpCode,
    pub operands: &'static [OperandKind],
    pub returns: Returns,
    pub doc: &'static str,
}

const fn op(
    name: &'static str,
    family: Family,
    code: OpCode,
    operands: &'static [OperandKind],
    returns: Returns,
    doc: &'static str,
) -> OpSpec {
    OpSpec {
        name,
        family,
        code,
        operands,
        returns,
        doc,
    }
}

use Family as F;
use OperandKind as K;

const MILLI: Scale = Scale::Milli;
const MICRO: Scale = Scale::Micro;

const H: &[K] = &[K::Handle];
const HH: &[K] = &[K::Handle, K::Handle];
const H_AXIS: &[K] = &[K::Handle, K::Int];
const H_OPT_AXIS: &[K] = &[K::Handle, K::OptInt];
const H_MILLI: &[K] = &[K::Handle, K::Real(MILLI)];
const DIMS: &[K] = &[K::IntList];
const PATH: &[K] = &[K::Path];
const H_PATH: &[K] = &[K::Handle, K::Path];
const NONE: &[K] = &[];

pub static CATALOGUE: &[OpSpec] = &[
    // creation
    op("TZeros", F::Creation, OpCode::Zeros, DIMS, Returns::Handle, "zero-filled tensor of the given dims"),
    op("TOnes", F::Creation, OpCode::Ones, DIMS, Returns::Handle, "one-filled tensor"),
    op("TFull", F::Creation, OpCode::Full, &[K::IntList, K::Real(MILLI)], Returns::Handle, "tensor filled with a value"),
    op("TRand", F::Creation, OpCode::Rand, DIMS, Returns::Handle, "uniform samples in [0, 1)"),
    op("TRandn", F::Creation, OpCode::Randn, DIMS, Returns::Handle, "standard normal samples"),
    op("TArange", F::Creation, OpCode::Arange, &[K::Real(MILLI), K::Real(MILLI), K::Real(MILLI)], Returns::Handle, "start end step, end exclusive"),
    op("TEye", F::Creation, OpCode::Eye, &[K::Int], Returns::Handle, "n x n identity"),
    op("TFromList", F::Creation, OpCode::FromList, &[K::IntList, K::RealList(MILLI)], Returns::Handle, "dims then row-major values"),
    op("TScalar", F::Creation, OpCode::Scalar, &[K::Real(MILLI)], Returns::Handle, "0-d tensor"),
    // elementwise
    op("TAdd", F::Elementwise, OpCode::Binary(BinaryOp::Add), HH, Returns::Handle, "a + b, broadcasting"),
    op("TSub", F::Elementwise, OpCode::Binary(BinaryOp::Sub), HH, Returns::Handle, "a - b, broadcasting"),
    op("TMul", F::Elementwise, OpCode::Binary(BinaryOp::Mul), HH, Returns::Handle, "a * b, broadcasting"),
    op("TDiv", F::Elementwise, OpCode::Binary(BinaryOp::Div), HH, Returns::Handle, "a / b, broadcasting"),
    op("TMaximum", F::Elementwise, OpCode::Binary(BinaryOp::Maximum), HH, Returns::Handle, "elementwise max"),
    op("TMinimum", F::Elementwise, OpCode::Binary(BinaryOp::Minimum), HH, Returns::Handle, "elementwise min"),
    op("TMatMul", F::Elementwise, OpCode::MatMul, HH, Returns::Handle, "matrix product"),
    op("TNeg", F::Elementwise, OpCode::Unary(UnaryOp::Neg), H, Returns::Handle, ""),
    op("TAbs", F::Elementwise, OpCode::Unary(UnaryOp::Abs), H, Returns::Handle, ""),
    op("TExp", F::Elementwise, OpCode::Unary(UnaryOp::Exp), H, Returns::Handle, ""),
    op("TLog", F::Elementwise, OpCode::Unary(UnaryOp::Log), H, Returns::Handle, "natural log"),
    op("TSqrt", F::Elementwise, OpCode::Unary(UnaryOp::Sqrt), H, Returns::Handle, ""),
    op("TTanh", F::Elementwise, OpCode::Unary(UnaryOp::Tanh), H, Returns::Handle, ""),
    op("TRelu", F::Elementwise, OpCode::Unary(UnaryOp::Relu), H, Returns::Handle, ""),
    op("TSigmoid", F::Elementwise, OpCode::Unary(UnaryOp::Sigmoid), H, Returns::Handle, ""),
    op("TSilu", F::Elementwise, OpCode::Unary(UnaryOp::Silu), H, Returns::Handle, ""),
    op("TGelu", F::Elementwise, OpCode::Unary(UnaryOp::Gelu), H, Returns::Handle, "tanh approximation"),
    op("TSin", F::Elementwise, OpCode::Unary(UnaryOp::Sin), H, Returns::Handle, ""),
    op("TCos", F::Elementwise, OpCode::Unary(UnaryOp::Cos), H, Returns::Handle, ""),
    op("TAddScalar", F::Elementwise, OpCode::WithScalar(ScalarOp::Add), H_MILLI, Returns::Handle, "t + value"),
    op("TMulScalar", F::Elementwise, OpCode::WithScalar(ScalarOp::Mul), H_MILLI, Returns::Handle, "t * value"),
    op("TPow", F::Elementwise, OpCode::WithScalar(ScalarOp::Pow), H_MILLI, Returns::Handle, "t ^ exponent"),
    op("TClamp", F::Elementwise, OpCode::Clamp, &[K::Handle, K::Real(MILLI), K::Real(MILLI)], Returns::Handle, "clamp to [min, max]"),
    // reductions
    op("TSum", F::Reduction, OpCode::Reduce(ReduceOp::Sum), H_OPT_AXIS, Returns::Handle, "over one axis, or everything"),
    op("TMean", F::Reduction, OpCode::Reduce(ReduceOp::Mean), H_OPT_AXIS, Returns::Handle, ""),
    op("TMax", F::Reduction, OpCode::Reduce(ReduceOp::Max), H_OPT_AXIS, Returns::Handle, ""),
    op("TMin", F::Reduction, OpCode::Reduce(ReduceOp::Min), H_OPT_AXIS, Returns::Handle, ""),
    op("TArgMax", F::Reduction, OpCode::ArgMax, H_AXIS, Returns::Handle, "indices stored as reals"),
    // shape
    op("TReshape", F::Shape, OpCode::Reshape, &[K::Handle, K::IntList], Returns::Handle, ""),
    op("TTranspose", F::Shape, OpCode::Transpose, &[K::Handle, K::Int, K::Int], Returns::Handle, "swap two axes"),
    op("TCat", F::Shape, OpCode::Cat, &[K::HandleList, K::Int], Returns::Handle, "concatenate along an axis"),
    op("TNarrow", F::Shape, OpCode::Narrow, &[K::Handle, K::Int, K::Int, K::Int], Returns::Handle, "axis start len"),
    op("TUnsqueeze", F::Shape, OpCode::Unsqueeze, H_AXIS, Returns::Handle, ""),
    op("TRepeatInterleave", F::Shape, OpCode::RepeatInterleave, &[K::Handle, K::Int, K::Int], Returns::Handle, "repeats axis, each slice repeated in place"),
    op("TShape", F::Shape, OpCode::Shape, H, Returns::IntList, "one number per dim"),
    op("TNumel", F::Shape, OpCode::Numel, H, Returns::Int, ""),
    op("TDim", F::Shape, OpCode::Dim, H, Returns::Int, "rank"),
    // comparison
    op("TEqual", F::Comparison, OpCode::Equal, HH, Returns::Int, "1 when shapes and values match exactly"),
    op("TAllClose", F::Comparison, OpCode::AllClose, &[K::Handle, K::Handle, K::Real(MICRO)], Returns::Int, "1 when every |a - b| <= atol"),
    // neural
    op("TSoftmax", F::Neural, OpCode::Softmax, H_AXIS, Returns::Handle, ""),
    op("TLogSoftmax", F::Neural, OpCode::LogSoftmax, H_AXIS, Returns::Handle, ""),
    op("TRmsNorm", F::Neural, OpCode::RmsNorm, &[K::Handle, K::Handle, K::Real(MICRO)], Returns::Handle, "x weight eps"),
    op("TEmbedding", F::Neural, OpCode::Embedding, HH, Returns::Handle, "weight ids"),
    op("TLinear", F::Neural, OpCode::Linear, HH, Returns::Handle, "x weight, computes x . weight^T"),
    op("TCausalMask", F::Neural, OpCode::CausalMask, &[K::Int], Returns::Handle, "n x n additive mask, -inf above the diagonal"),
    // losses
    op("TMseLoss", F::Loss, OpCode::MseLoss, HH, Returns::Handle, "mean squared error, 0-d"),
    op("TCrossEntropy", F::Loss, OpCode::CrossEntropy, HH, Returns::Handle, "logits class-targets, 0-d"),
    // training
    op("TSgdStep", F::Training, OpCode::SgdStep, &[K::Handle, K::Handle, K::Real(MILLI)], Returns::Nothing, "param -= lr * grad, in place"),
    op("TFill", F::Training, OpCode::Fill, H_MILLI, Returns::Nothing, "in place"),
    op("TRequiresGrad", F::Training, OpCode::RequiresGrad, H, Returns::Nothing, "in place"),
    op("TBackward", F::Training, OpCode::Backward, H, Returns::Nothing, ""),
    op("TGrad", F::Training, OpCode::Grad, H, Returns::Handle, "accumulated gradient"),
    // io
    op("TSave", F::Io, OpCode::Save(FileFormat::Native), H_PATH, Returns::Nothing, "backend format"),
    op("TLoad", F::Io, OpCode::Load(FileFormat::Native), PATH, Returns::Handle, "backend format"),
    op("TSaveBinary", F::Io, OpCode::Save(FileFormat::Binary), H_PATH, Returns::Nothing, "i64 ndim, i64 dims, f32 data, little-endian"),
    op("TLoadBinary", F::Io, OpCode::Load(FileFormat::Binary), PATH, Returns::Handle, ""),
    op("TSaveText", F::Io, OpCode::Save(FileFormat::Text), H_PATH, Returns::Nothing, "shape header, one row per line"),
    op("TLoadText", F::Io, OpCode::Load(FileFormat::Text), PATH, Returns::Handle, ""),
    // utility
    op("TItem", F::Utility, OpCode::Item, H, Returns::Real(MILLI), "single-element tensor to a real"),
    op("TToList", F::Utility, OpCode::ToList, H, Returns::RealList(MILLI), "flattened, row-major"),
    op("TClone", F::Utility, OpCode::Clone, H, Returns::Handle, "deep copy"),
    op("TFree", F::Utility, OpCode::Free, H, Returns::Nothing, ""),
    op("TFreeAll", F::Utility, OpCode::FreeAll, NONE, Returns::Int, "number of handles released"),
    op("TLiveCount", F::Utility, OpCode::LiveCount, NONE, Returns::Int, ""),
];

static INDEX: Lazy<HashMap<&'static str, &'static OpSpec>> =
    Lazy::new(|| CATALOGUE.iter().map(|spec| (spec.name, spec)).collect());

pub fn lookup(name: &str) -> Option<&'static OpSpec> {
    INDEX.get(name).copied()
}

pub fn catalogue_json() -> serde_json::Result<String> {
    serde_json::to_string(CATALOGUE)
}
