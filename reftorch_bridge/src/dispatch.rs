//! The invocation pipeline: extract, dispatch to the backend, contain
//! faults, write back.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use reftorch_native::Backend;
use tracing::{debug, instrument, trace, warn};

use crate::catalogue::{self, FileFormat, OpCode, OpSpec, Returns};
use crate::error::{BridgeError, BridgeResult};
use crate::extract::{extract, Args};
use crate::handle::{Handle, HandleTable};
use crate::node::{render, Node};
use crate::view::{Span, ViewField};
use crate::writer::{write_result, Output, Signal};

/// Where an invocation stopped. The three terminal phases are
/// `ExtractFailed`, `NativeFailed` and `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Extracting,
    ExtractFailed,
    Extracted,
    Dispatching,
    NativeFailed,
    Computed,
    Writing,
    Done,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub phase: Phase,
    pub signal: Signal,
    pub error: Option<BridgeError>,
}

impl Invocation {
    fn done() -> Self {
        Self {
            phase: Phase::Done,
            signal: Signal::Proceed,
            error: None,
        }
    }

    fn failed(phase: Phase, error: BridgeError) -> Self {
        debug!(?phase, %error, "search alternative");
        Self {
            phase,
            signal: Signal::SearchAlternative,
            error: Some(error),
        }
    }

    pub fn is_proceed(&self) -> bool {
        self.signal == Signal::Proceed
    }
}

fn enter(phase: Phase) {
    trace!(?phase, "invocation phase");
}

/// What a native operation produced, before it is checked against the
/// declared return kind.
enum Value<T> {
    Tensor(T),
    Int(i64),
    Ints(Vec<i64>),
    Real(f64),
    Reals(Vec<f64>),
    Unit,
}

/// A handle table bound to one backend.
pub struct Bridge<B: Backend> {
    backend: B,
    table: HandleTable<B::Tensor>,
}

impl<B: Backend> fmt::Debug for Bridge<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("backend", &self.backend.kind())
            .field("live", &self.table.len())
            .finish()
    }
}

impl<B: Backend + Default> Default for Bridge<B> {
    fn default() -> Self {
        Self::new(B::default())
    }
}

impl<B: Backend> Bridge<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            table: HandleTable::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn table(&self) -> &HandleTable<B::Tensor> {
        &self.table
    }

    pub fn live_count(&self) -> usize {
        self.table.len()
    }

    pub fn tensor(&self, handle: Handle) -> BridgeResult<&B::Tensor> {
        self.table.resolve(handle)
    }

    /// Runs `name` over `span` of `field`. On success the span is replaced by
    /// the result; on any failure `field` is left exactly as it was.
    #[instrument(skip(self, field, span), fields(start = span.start, end = span.end))]
    pub fn invoke(&mut self, name: &str, field: &mut ViewField, span: Span) -> Invocation {
        enter(Phase::Idle);
        let spec = match catalogue::lookup(name) {
            Some(spec) => spec,
            None => {
                return Invocation::failed(
                    Phase::ExtractFailed,
                    BridgeError::UnknownOperation(name.to_string()),
                )
            }
        };

        enter(Phase::Extracting);
        let extracted = field.get(span).and_then(|nodes| {
            trace!(call = %render(nodes), "arguments");
            extract(nodes, span.start, spec.operands, &self.table)
        });
        let args = match extracted {
            Ok(args) => args,
            Err(err) => return Invocation::failed(Phase::ExtractFailed, err),
        };
        enter(Phase::Extracted);

        enter(Phase::Dispatching);
        let nodes = match self.run(spec, args).and_then(|out| out.to_nodes()) {
            Ok(nodes) => nodes,
            Err(err) => return Invocation::failed(Phase::NativeFailed, err),
        };
        enter(Phase::Computed);

        enter(Phase::Writing);
        write_result(field, span, &nodes);
        Invocation::done()
    }

    /// Runs `name` over a standalone argument sequence and returns the
    /// decoded result instead of rewriting anything.
    pub fn call(&mut self, name: &str, args: &[Node]) -> BridgeResult<Output> {
        let spec = catalogue::lookup(name)
            .ok_or_else(|| BridgeError::UnknownOperation(name.to_string()))?;
        let args = extract(args, 0, spec.operands, &self.table)?;
        self.run(spec, args)
    }

    fn run(&mut self, spec: &'static OpSpec, args: Args) -> BridgeResult<Output> {
        let value = contain(spec.name, || self.execute(spec.code, args))?;
        self.finish(spec, value)
    }

    fn finish(&mut self, spec: &OpSpec, value: Value<B::Tensor>) -> BridgeResult<Output> {
        let out = match (spec.returns, value) {
            (Returns::Handle, Value::Tensor(t)) => Output::Handle(self.table.allocate(t)),
            (Returns::Int, Value::Int(n)) => Output::Int(n),
            (Returns::IntList, Value::Ints(v)) => Output::IntList(v),
            (Returns::Real(scale), Value::Real(v)) => Output::Real(v, scale),
            (Returns::RealList(scale), Value::Reals(v)) => Output::RealList(v, scale),
            (Returns::Nothing, Value::Unit) => Output::Nothing,
            (declared, _) => {
                return Err(BridgeError::NativeFault(format!(
                    "{} produced a result that is not {:?}",
                    spec.name, declared
                )))
            }
        };
        Ok(out)
    }

    fn execute(&mut self, code: OpCode, mut args: Args) -> BridgeResult<Value<B::Tensor>> {
        let b = &mut self.backend;
        let table = &mut self.table;
        let value = match code {
            OpCode::Zeros => Value::Tensor(b.zeros(&dims(&args.int_list()?)?)?),
            OpCode::Ones => Value::Tensor(b.ones(&dims(&args.int_list()?)?)?),
            OpCode::Full => {
                let shape = dims(&args.int_list()?)?;
                Value::Tensor(b.full(&shape, args.real()? as f32)?)
            }
            OpCode::Rand => Value::Tensor(b.rand(&dims(&args.int_list()?)?)?),
            OpCode::Randn => Value::Tensor(b.randn(&dims(&args.int_list()?)?)?),
            OpCode::Arange => {
                let start = args.real()? as f32;
                let end = args.real()? as f32;
                let step = args.real()? as f32;
                Value::Tensor(b.arange(start, end, step)?)
            }
            OpCode::Eye => Value::Tensor(b.eye(index(args.int()?, "size")?)?),
            OpCode::FromList => {
                let shape = dims(&args.int_list()?)?;
                let data = args.real_list()?.into_iter().map(|v| v as f32).collect();
                Value::Tensor(b.from_vec(&shape, data)?)
            }
            OpCode::Scalar => Value::Tensor(b.from_vec(&[], vec![args.real()? as f32])?),

            OpCode::Binary(op) => {
                let (x, y) = (table.resolve(args.handle()?)?, table.resolve(args.handle()?)?);
                Value::Tensor(b.binary(op, x, y)?)
            }
            OpCode::MatMul => {
                let (x, y) = (table.resolve(args.handle()?)?, table.resolve(args.handle()?)?);
                Value::Tensor(b.matmul(x, y)?)
            }
            OpCode::Unary(op) => Value::Tensor(b.unary(op, table.resolve(args.handle()?)?)?),
            OpCode::WithScalar(op) => {
                let x = table.resolve(args.handle()?)?;
                Value::Tensor(b.scalar(op, x, args.real()? as f32)?)
            }
            OpCode::Clamp => {
                let x = table.resolve(args.handle()?)?;
                let (lo, hi) = (args.real()? as f32, args.real()? as f32);
                if lo > hi {
                    return Err(BridgeError::ShapeMismatch(format!(
                        "clamp bounds are reversed: {} > {}",
                        lo, hi
                    )));
                }
                Value::Tensor(b.clamp(x, lo, hi)?)
            }

            OpCode::Reduce(op) => {
                let x = table.resolve(args.handle()?)?;
                let axis = args.opt_int()?.map(|a| index(a, "axis")).transpose()?;
                Value::Tensor(b.reduce(op, x, axis)?)
            }
            OpCode::ArgMax => {
                let x = table.resolve(args.handle()?)?;
                Value::Tensor(b.argmax(x, index(args.int()?, "axis")?)?)
            }

            OpCode::Reshape => {
                let x = table.resolve(args.handle()?)?;
                Value::Tensor(b.reshape(x, &dims(&args.int_list()?)?)?)
            }
            OpCode::Transpose => {
                let x = table.resolve(args.handle()?)?;
                let d0 = index(args.int()?, "axis")?;
                let d1 = index(args.int()?, "axis")?;
                Value::Tensor(b.transpose(x, d0, d1)?)
            }
            OpCode::Cat => {
                let parts = args
                    .handle_list()?
                    .into_iter()
                    .map(|h| table.resolve(h))
                    .collect::<BridgeResult<Vec<_>>>()?;
                Value::Tensor(b.concat(&parts, index(args.int()?, "axis")?)?)
            }
            OpCode::Narrow => {
                let x = table.resolve(args.handle()?)?;
                let axis = index(args.int()?, "axis")?;
                let start = index(args.int()?, "start")?;
                let len = index(args.int()?, "length")?;
                Value::Tensor(b.narrow(x, axis, start, len)?)
            }
            OpCode::Unsqueeze => {
                let x = table.resolve(args.handle()?)?;
                Value::Tensor(b.unsqueeze(x, index(args.int()?, "axis")?)?)
            }
            OpCode::RepeatInterleave => {
                let x = table.resolve(args.handle()?)?;
                let repeats = index(args.int()?, "repeats")?;
                Value::Tensor(b.repeat_interleave(x, repeats, index(args.int()?, "axis")?)?)
            }
            OpCode::Shape => {
                let shape = b.shape(table.resolve(args.handle()?)?);
                Value::Ints(shape.into_iter().map(count).collect::<BridgeResult<_>>()?)
            }
            OpCode::Numel => {
                let shape = b.shape(table.resolve(args.handle()?)?);
                Value::Int(count(shape.iter().product())?)
            }
            OpCode::Dim => Value::Int(count(b.shape(table.resolve(args.handle()?)?).len())?),

            OpCode::Equal => {
                let (x, y) = (table.resolve(args.handle()?)?, table.resolve(args.handle()?)?);
                Value::Int(b.equal(x, y)? as i64)
            }
            OpCode::AllClose => {
                let (x, y) = (table.resolve(args.handle()?)?, table.resolve(args.handle()?)?);
                Value::Int(b.allclose(x, y, args.real()? as f32)? as i64)
            }

            OpCode::Softmax => {
                let x = table.resolve(args.handle()?)?;
                Value::Tensor(b.softmax(x, index(args.int()?, "axis")?)?)
            }
            OpCode::LogSoftmax => {
                let x = table.resolve(args.handle()?)?;
                Value::Tensor(b.log_softmax(x, index(args.int()?, "axis")?)?)
            }
            OpCode::RmsNorm => {
                let (x, w) = (table.resolve(args.handle()?)?, table.resolve(args.handle()?)?);
                Value::Tensor(b.rms_norm(x, w, args.real()? as f32)?)
            }
            OpCode::Embedding => {
                let (w, ids) = (table.resolve(args.handle()?)?, table.resolve(args.handle()?)?);
                Value::Tensor(b.embedding(w, ids)?)
            }
            OpCode::Linear => {
                let (x, w) = (table.resolve(args.handle()?)?, table.resolve(args.handle()?)?);
                let rank = b.shape(w).len();
                if rank != 2 {
                    return Err(BridgeError::ShapeMismatch(format!(
                        "linear weight must be 2-d, got rank {}",
                        rank
                    )));
                }
                let wt = b.transpose(w, 0, 1)?;
                Value::Tensor(b.matmul(x, &wt)?)
            }
            OpCode::CausalMask => Value::Tensor(b.causal_mask(index(args.int()?, "size")?)?),

            OpCode::MseLoss => {
                let (x, y) = (table.resolve(args.handle()?)?, table.resolve(args.handle()?)?);
                Value::Tensor(b.mse_loss(x, y)?)
            }
            OpCode::CrossEntropy => {
                let (x, y) = (table.resolve(args.handle()?)?, table.resolve(args.handle()?)?);
                Value::Tensor(b.cross_entropy(x, y)?)
            }

            OpCode::SgdStep => {
                let param = args.handle()?;
                // copied so param and grad may be the same handle
                let grad = b.duplicate(table.resolve(args.handle()?)?)?;
                let lr = args.real()? as f32;
                b.sgd_step(table.resolve_mut(param)?, &grad, lr)?;
                Value::Unit
            }
            OpCode::Fill => {
                let t = table.resolve_mut(args.handle()?)?;
                b.fill(t, args.real()? as f32)?;
                Value::Unit
            }
            OpCode::RequiresGrad => {
                b.set_requires_grad(table.resolve_mut(args.handle()?)?)?;
                Value::Unit
            }
            OpCode::Backward => {
                b.backward(table.resolve(args.handle()?)?)?;
                Value::Unit
            }
            OpCode::Grad => Value::Tensor(b.grad(table.resolve(args.handle()?)?)?),

            OpCode::Save(format) => {
                let t = table.resolve(args.handle()?)?;
                let path = args.path()?;
                save(&*b, t, &path, format)?;
                debug!(path = %path.display(), ?format, "saved tensor");
                Value::Unit
            }
            OpCode::Load(format) => {
                let path = args.path()?;
                let t = match format {
                    FileFormat::Native => b.load_native(&path)?,
                    FileFormat::Binary => b.load_binary(&path)?,
                    FileFormat::Text => b.load_text(&path)?,
                };
                Value::Tensor(t)
            }

            OpCode::Item => Value::Real(b.item(table.resolve(args.handle()?)?)? as f64),
            OpCode::ToList => {
                let data = b.to_vec(table.resolve(args.handle()?)?)?;
                Value::Reals(data.into_iter().map(f64::from).collect())
            }
            OpCode::Clone => Value::Tensor(b.duplicate(table.resolve(args.handle()?)?)?),
            OpCode::Free => {
                table.release(args.handle()?)?;
                Value::Unit
            }
            OpCode::FreeAll => Value::Int(count(table.release_all())?),
            OpCode::LiveCount => Value::Int(count(table.len())?),
        };
        Ok(value)
    }
}

fn save<B: Backend>(b: &B, t: &B::Tensor, path: &Path, format: FileFormat) -> BridgeResult<()> {
    match format {
        FileFormat::Native => b.save_native(t, path)?,
        FileFormat::Binary => b.save_binary(t, path)?,
        FileFormat::Text => b.save_text(t, path)?,
    }
    Ok(())
}

fn index(raw: i64, what: &str) -> BridgeResult<usize> {
    usize::try_from(raw)
        .map_err(|_| BridgeError::ShapeMismatch(format!("{} must be non-negative, got {}", what, raw)))
}

fn dims(raw: &[i64]) -> BridgeResult<Vec<usize>> {
    raw.iter().map(|&d| index(d, "dimension")).collect()
}

fn count(n: usize) -> BridgeResult<i64> {
    i64::try_from(n).map_err(|_| BridgeError::NativeFault(format!("{} does not fit a number node", n)))
}

/// Runs `f`, turning a panic into `NativeFault`.
fn contain<T>(op: &str, f: impl FnOnce() -> BridgeResult<T>) -> BridgeResult<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let msg = panic_message(payload.as_ref());
            warn!(op, panic = %msg, "native panic contained");
            Err(BridgeError::NativeFault(format!("panic in {}: {}", op, msg)))
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic without message".to_string()
    }
}
