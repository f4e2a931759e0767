//! libtorch backend via `tch`.

use std::path::Path;

use tch::{Device, Kind, Reduction, TchError, Tensor};
use tracing::debug;

use crate::backend::{check_axis, Backend, BackendKind, BinaryOp, ReduceOp, ScalarOp, UnaryOp};
use crate::error::{NativeError, NativeResult};

pub struct TorchBackend {
    device: Device,
}

impl std::fmt::Debug for TorchBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TorchBackend")
            .field("device", &self.device)
            .finish()
    }
}

pub fn parse_device(spec: &str) -> NativeResult<Device> {
    if spec == "cpu" {
        return Ok(Device::Cpu);
    }
    if let Some(rest) = spec.strip_prefix("cuda:") {
        let idx: usize = rest
            .parse()
            .map_err(|_| NativeError::Fault(format!("invalid cuda device index '{}'", rest)))?;
        return Ok(Device::Cuda(idx));
    }
    if spec == "cuda" {
        return Ok(Device::Cuda(0));
    }
    Err(NativeError::Fault(format!("unknown device spec '{}'", spec)))
}

fn classify(err: TchError) -> NativeError {
    let msg = err.to_string();
    let lower = msg.to_lowercase();
    if lower.contains("out of memory") {
        NativeError::Exhausted {
            requested: 0,
            limit: 0,
        }
    } else if lower.contains("shape")
        || lower.contains("size mismatch")
        || lower.contains("dimension")
        || lower.contains("must match the size")
    {
        NativeError::Shape(msg)
    } else {
        NativeError::Fault(msg)
    }
}

trait IntoNative<T> {
    fn native(self) -> NativeResult<T>;
}

impl<T> IntoNative<T> for Result<T, TchError> {
    fn native(self) -> NativeResult<T> {
        self.map_err(classify)
    }
}

fn dims(shape: &[usize]) -> Vec<i64> {
    shape.iter().map(|&d| d as i64).collect()
}

fn axis(ax: usize) -> i64 {
    ax as i64
}

impl TorchBackend {
    pub fn new(device_spec: &str, seed: u64) -> NativeResult<Self> {
        let device = parse_device(device_spec)?;
        tch::manual_seed(seed as i64);
        debug!(?device, seed, "torch backend ready");
        Ok(Self { device })
    }

    fn options(&self) -> (Kind, Device) {
        (Kind::Float, self.device)
    }
}

impl Backend for TorchBackend {
    type Tensor = Tensor;

    fn kind(&self) -> BackendKind {
        BackendKind::Torch
    }

    fn zeros(&mut self, shape: &[usize]) -> NativeResult<Tensor> {
        Tensor::f_zeros(dims(shape).as_slice(), self.options()).native()
    }

    fn ones(&mut self, shape: &[usize]) -> NativeResult<Tensor> {
        Tensor::f_ones(dims(shape).as_slice(), self.options()).native()
    }

    fn full(&mut self, shape: &[usize], value: f32) -> NativeResult<Tensor> {
        Tensor::f_full(dims(shape).as_slice(), value as f64, self.options()).native()
    }

    fn rand(&mut self, shape: &[usize]) -> NativeResult<Tensor> {
        Tensor::f_rand(dims(shape).as_slice(), self.options()).native()
    }

    fn randn(&mut self, shape: &[usize]) -> NativeResult<Tensor> {
        Tensor::f_randn(dims(shape).as_slice(), self.options()).native()
    }

    fn arange(&mut self, start: f32, end: f32, step: f32) -> NativeResult<Tensor> {
        Tensor::f_arange_start_step(start as f64, end as f64, step as f64, self.options()).native()
    }

    fn eye(&mut self, n: usize) -> NativeResult<Tensor> {
        Tensor::f_eye(n as i64, self.options()).native()
    }

    fn from_vec(&mut self, shape: &[usize], data: Vec<f32>) -> NativeResult<Tensor> {
        Tensor::f_from_slice(&data)
            .and_then(|t| t.f_reshape(dims(shape).as_slice()))
            .and_then(|t| t.f_to_device(self.device))
            .native()
    }

    fn causal_mask(&mut self, n: usize) -> NativeResult<Tensor> {
        let n = n as i64;
        Tensor::f_full([n, n].as_slice(), f64::NEG_INFINITY, self.options())
            .and_then(|t| t.f_triu(1))
            .native()
    }

    fn shape(&self, t: &Tensor) -> Vec<usize> {
        t.size().into_iter().map(|d| d.max(0) as usize).collect()
    }

    fn to_vec(&self, t: &Tensor) -> NativeResult<Vec<f32>> {
        let flat = t
            .f_to_kind(Kind::Float)
            .and_then(|t| t.f_to_device(Device::Cpu))
            .and_then(|t| t.f_reshape([-1]))
            .native()?;
        Vec::<f32>::try_from(&flat).native()
    }

    fn item(&self, t: &Tensor) -> NativeResult<f32> {
        if t.numel() != 1 {
            return Err(NativeError::shape(format!(
                "item needs a single element, tensor has shape {:?}",
                t.size()
            )));
        }
        t.f_double_value(&[]).map(|v| v as f32).native()
    }

    fn duplicate(&self, t: &Tensor) -> NativeResult<Tensor> {
        Ok(t.detach().copy())
    }

    fn binary(&self, op: BinaryOp, a: &Tensor, b: &Tensor) -> NativeResult<Tensor> {
        match op {
            BinaryOp::Add => a.f_add(b),
            BinaryOp::Sub => a.f_sub(b),
            BinaryOp::Mul => a.f_mul(b),
            BinaryOp::Div => a.f_div(b),
            BinaryOp::Maximum => a.f_maximum(b),
            BinaryOp::Minimum => a.f_minimum(b),
        }
        .native()
    }

    fn unary(&self, op: UnaryOp, a: &Tensor) -> NativeResult<Tensor> {
        match op {
            UnaryOp::Neg => a.f_neg(),
            UnaryOp::Abs => a.f_abs(),
            UnaryOp::Exp => a.f_exp(),
            UnaryOp::Log => a.f_log(),
            UnaryOp::Sqrt => a.f_sqrt(),
            UnaryOp::Tanh => a.f_tanh(),
            UnaryOp::Relu => a.f_relu(),
            UnaryOp::Sigmoid => a.f_sigmoid(),
            UnaryOp::Silu => a.f_silu(),
            UnaryOp::Gelu => a.f_gelu("tanh"),
            UnaryOp::Sin => a.f_sin(),
            UnaryOp::Cos => a.f_cos(),
        }
        .native()
    }

    fn scalar(&self, op: ScalarOp, a: &Tensor, s: f32) -> NativeResult<Tensor> {
        let s = Tensor::from(s).to_device(self.device);
        match op {
            ScalarOp::Add => a.f_add(&s),
            ScalarOp::Mul => a.f_mul(&s),
            ScalarOp::Pow => a.f_pow(&s),
        }
        .native()
    }

    fn clamp(&self, a: &Tensor, min: f32, max: f32) -> NativeResult<Tensor> {
        a.f_clamp(min as f64, max as f64).native()
    }

    fn matmul(&self, a: &Tensor, b: &Tensor) -> NativeResult<Tensor> {
        a.f_matmul(b).native()
    }

    fn reduce(&self, op: ReduceOp, a: &Tensor, ax: Option<usize>) -> NativeResult<Tensor> {
        let Some(ax) = ax else {
            return match op {
                ReduceOp::Sum => a.f_sum(Kind::Float),
                ReduceOp::Mean => a.f_mean(Kind::Float),
                ReduceOp::Max => a.f_max(),
                ReduceOp::Min => a.f_min(),
            }
            .native();
        };
        check_axis(ax, a.dim(), "reduction")?;
        let dims = [axis(ax)];
        match op {
            ReduceOp::Sum => a.f_sum_dim_intlist(Some(dims.as_slice()), false, Kind::Float),
            ReduceOp::Mean => a.f_mean_dim(Some(dims.as_slice()), false, Kind::Float),
            ReduceOp::Max => a.f_amax(dims.as_slice(), false),
            ReduceOp::Min => a.f_amin(dims.as_slice(), false),
        }
        .native()
    }

    fn argmax(&self, a: &Tensor, ax: usize) -> NativeResult<Tensor> {
        check_axis(ax, a.dim(), "argmax")?;
        a.f_argmax(Some(axis(ax)), false)
            .and_then(|t| t.f_to_kind(Kind::Float))
            .native()
    }

    fn reshape(&self, a: &Tensor, shape: &[usize]) -> NativeResult<Tensor> {
        a.f_reshape(dims(shape).as_slice()).native()
    }

    fn transpose(&self, a: &Tensor, d0: usize, d1: usize) -> NativeResult<Tensor> {
        check_axis(d0, a.dim(), "transpose")?;
        check_axis(d1, a.dim(), "transpose")?;
        a.f_transpose(axis(d0), axis(d1))
            .and_then(|t| t.f_contiguous())
            .native()
    }

    fn concat(&self, parts: &[&Tensor], ax: usize) -> NativeResult<Tensor> {
        if parts.is_empty() {
            return Err(NativeError::shape("concat needs at least one tensor"));
        }
        Tensor::f_cat(parts, axis(ax)).native()
    }

    fn narrow(&self, a: &Tensor, ax: usize, start: usize, len: usize) -> NativeResult<Tensor> {
        check_axis(ax, a.dim(), "narrow")?;
        a.f_narrow(axis(ax), start as i64, len as i64)
            .and_then(|t| t.f_contiguous())
            .native()
    }

    fn unsqueeze(&self, a: &Tensor, ax: usize) -> NativeResult<Tensor> {
        check_axis(ax, a.dim() + 1, "unsqueeze")?;
        a.f_unsqueeze(axis(ax)).native()
    }

    fn repeat_interleave(&self, a: &Tensor, repeats: usize, ax: usize) -> NativeResult<Tensor> {
        check_axis(ax, a.dim(), "repeat_interleave")?;
        a.f_repeat_interleave_self_int(repeats as i64, Some(axis(ax)), None::<i64>)
            .native()
    }

    fn softmax(&self, a: &Tensor, ax: usize) -> NativeResult<Tensor> {
        check_axis(ax, a.dim(), "softmax")?;
        a.f_softmax(axis(ax), Kind::Float).native()
    }

    fn log_softmax(&self, a: &Tensor, ax: usize) -> NativeResult<Tensor> {
        check_axis(ax, a.dim(), "log_softmax")?;
        a.f_log_softmax(axis(ax), Kind::Float).native()
    }

    fn rms_norm(&self, x: &Tensor, w: &Tensor, eps: f32) -> NativeResult<Tensor> {
        let ms = x
            .f_pow_tensor_scalar(2)
            .and_then(|t| t.f_mean_dim(Some([-1i64].as_slice()), true, Kind::Float))
            .native()?;
        let denom = ms.f_add_scalar(eps as f64).and_then(|t| t.f_rsqrt()).native()?;
        x.f_mul(&denom).and_then(|t| t.f_mul(w)).native()
    }

    fn embedding(&self, w: &Tensor, ids: &Tensor) -> NativeResult<Tensor> {
        let ids = ids.f_to_kind(Kind::Int64).native()?;
        Tensor::f_embedding(w, &ids, -1, false, false).native()
    }

    fn mse_loss(&self, a: &Tensor, b: &Tensor) -> NativeResult<Tensor> {
        if a.size() != b.size() {
            return Err(NativeError::shape(format!(
                "mse_loss expects equal shapes, got {:?} and {:?}",
                a.size(),
                b.size()
            )));
        }
        a.f_mse_loss(b, Reduction::Mean).native()
    }

    fn cross_entropy(&self, logits: &Tensor, targets: &Tensor) -> NativeResult<Tensor> {
        let targets = targets.f_to_kind(Kind::Int64).native()?;
        logits.f_cross_entropy_for_logits(&targets).native()
    }

    fn equal(&self, a: &Tensor, b: &Tensor) -> NativeResult<bool> {
        if a.size() != b.size() {
            return Ok(false);
        }
        a.f_equal(b).native()
    }

    fn allclose(&self, a: &Tensor, b: &Tensor, atol: f32) -> NativeResult<bool> {
        if a.size() != b.size() {
            return Ok(false);
        }
        a.f_allclose(b, 0.0, atol as f64, false).native()
    }

    fn sgd_step(&self, param: &mut Tensor, grad: &Tensor, lr: f32) -> NativeResult<()> {
        if param.size() != grad.size() {
            return Err(NativeError::shape(format!(
                "sgd_step expects equal shapes, got {:?} and {:?}",
                param.size(),
                grad.size()
            )));
        }
        tch::no_grad(|| {
            let delta = grad.f_mul_scalar(lr as f64)?;
            param.f_sub_(&delta).map(|_| ())
        })
        .native()
    }

    fn fill(&self, t: &mut Tensor, value: f32) -> NativeResult<()> {
        tch::no_grad(|| t.f_fill_(value as f64).map(|_| ())).native()
    }

    fn set_requires_grad(&self, t: &mut Tensor) -> NativeResult<()> {
        if !t.requires_grad() {
            *t = t.set_requires_grad(true);
        }
        Ok(())
    }

    fn backward(&self, t: &Tensor) -> NativeResult<()> {
        if t.numel() != 1 {
            return Err(NativeError::shape("backward needs a scalar loss"));
        }
        t.f_backward().native()
    }

    fn grad(&self, t: &Tensor) -> NativeResult<Tensor> {
        let g = t.grad();
        if g.defined() {
            Ok(g.detach().copy())
        } else {
            Err(NativeError::Fault("tensor has no gradient".to_string()))
        }
    }

    fn save_native(&self, t: &Tensor, path: &Path) -> NativeResult<()> {
        t.f_save(path).native()
    }

    fn load_native(&mut self, path: &Path) -> NativeResult<Tensor> {
        Tensor::f_load(path)
            .and_then(|t| t.f_to_device(self.device))
            .native()
    }
}
