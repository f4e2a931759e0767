//! Reference backend on top of `ndarray`.
//!
//! Every operand check happens before ndarray is asked to do anything, so bad
//! shapes come back as [`NativeError::Shape`] instead of a panic.

use std::path::Path;

use ndarray::{concatenate, Array2, ArrayD, ArrayViewD, Axis, Ix1, Ix2, IxDyn, Slice, Zip};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::backend::{check_axis, Backend, BackendKind, BinaryOp, ReduceOp, ScalarOp, UnaryOp};
use crate::error::{NativeError, NativeResult};
use crate::format::{self, numel};

pub type CpuTensor = ArrayD<f32>;

pub const DEFAULT_MAX_ELEMENTS: usize = 1 << 28;

#[derive(Debug)]
pub struct CpuBackend {
    rng: StdRng,
    max_elements: usize,
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new(0, DEFAULT_MAX_ELEMENTS)
    }
}

impl CpuBackend {
    pub fn new(seed: u64, max_elements: usize) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            max_elements,
        }
    }

    pub fn max_elements(&self) -> usize {
        self.max_elements
    }

    fn admit(&self, shape: &[usize]) -> NativeResult<()> {
        let requested = numel(shape).unwrap_or(usize::MAX);
        if requested > self.max_elements {
            debug!(requested, limit = self.max_elements, "cpu allocation refused");
            return Err(NativeError::Exhausted {
                requested,
                limit: self.max_elements,
            });
        }
        Ok(())
    }

    fn standard_normal(&mut self) -> f32 {
        // Box-Muller; 1 - u keeps ln away from zero.
        let u1: f32 = 1.0 - self.rng.gen::<f32>();
        let u2: f32 = self.rng.gen::<f32>();
        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f32::consts::PI * u2).cos()
    }
}

fn broadcast_shape(a: &[usize], b: &[usize]) -> NativeResult<Vec<usize>> {
    let rank = a.len().max(b.len());
    let mut out = vec![0usize; rank];
    for i in 0..rank {
        let da = if i + a.len() >= rank { a[i + a.len() - rank] } else { 1 };
        let db = if i + b.len() >= rank { b[i + b.len() - rank] } else { 1 };
        out[i] = match (da, db) {
            (x, y) if x == y => x,
            (1, y) => y,
            (x, 1) => x,
            _ => {
                return Err(NativeError::shape(format!(
                    "cannot broadcast {:?} with {:?}",
                    a, b
                )))
            }
        };
    }
    Ok(out)
}

fn broadcast_pair<'a>(
    a: &'a CpuTensor,
    b: &'a CpuTensor,
    shape: &[usize],
) -> NativeResult<(ArrayViewD<'a, f32>, ArrayViewD<'a, f32>)> {
    let av = a
        .broadcast(IxDyn(shape))
        .ok_or_else(|| NativeError::shape(format!("cannot broadcast {:?}", a.shape())))?;
    let bv = b
        .broadcast(IxDyn(shape))
        .ok_or_else(|| NativeError::shape(format!("cannot broadcast {:?}", b.shape())))?;
    Ok((av, bv))
}

fn same_shape(a: &CpuTensor, b: &CpuTensor, what: &str) -> NativeResult<()> {
    if a.shape() == b.shape() {
        Ok(())
    } else {
        Err(NativeError::shape(format!(
            "{} expects equal shapes, got {:?} and {:?}",
            what,
            a.shape(),
            b.shape()
        )))
    }
}

fn scalar_tensor(v: f32) -> CpuTensor {
    ArrayD::from_elem(IxDyn(&[]), v)
}

fn index_of(v: f32, bound: usize, what: &str) -> NativeResult<usize> {
    if v.is_finite() && v >= 0.0 && v.fract() == 0.0 && (v as usize) < bound {
        Ok(v as usize)
    } else {
        Err(NativeError::shape(format!(
            "{} index {} out of range 0..{}",
            what, v, bound
        )))
    }
}

impl Backend for CpuBackend {
    type Tensor = CpuTensor;

    fn kind(&self) -> BackendKind {
        BackendKind::Cpu
    }

    fn zeros(&mut self, shape: &[usize]) -> NativeResult<CpuTensor> {
        self.admit(shape)?;
        Ok(ArrayD::zeros(IxDyn(shape)))
    }

    fn ones(&mut self, shape: &[usize]) -> NativeResult<CpuTensor> {
        self.admit(shape)?;
        Ok(ArrayD::ones(IxDyn(shape)))
    }

    fn full(&mut self, shape: &[usize], value: f32) -> NativeResult<CpuTensor> {
        self.admit(shape)?;
        Ok(ArrayD::from_elem(IxDyn(shape), value))
    }

    fn rand(&mut self, shape: &[usize]) -> NativeResult<CpuTensor> {
        self.admit(shape)?;
        let rng = &mut self.rng;
        Ok(ArrayD::from_shape_simple_fn(IxDyn(shape), || rng.gen::<f32>()))
    }

    fn randn(&mut self, shape: &[usize]) -> NativeResult<CpuTensor> {
        self.admit(shape)?;
        let count = numel(shape).unwrap_or(0);
        let data: Vec<f32> = (0..count).map(|_| self.standard_normal()).collect();
        Ok(ArrayD::from_shape_vec(IxDyn(shape), data)?)
    }

    fn arange(&mut self, start: f32, end: f32, step: f32) -> NativeResult<CpuTensor> {
        if step == 0.0 || !step.is_finite() || !start.is_finite() || !end.is_finite() {
            return Err(NativeError::shape(format!(
                "arange({}, {}, {}) has no finite extent",
                start, end, step
            )));
        }
        let count = ((end - start) / step).ceil().max(0.0) as usize;
        self.admit(&[count])?;
        let data = (0..count).map(|i| start + i as f32 * step).collect();
        Ok(ArrayD::from_shape_vec(IxDyn(&[count]), data)?)
    }

    fn eye(&mut self, n: usize) -> NativeResult<CpuTensor> {
        self.admit(&[n, n])?;
        Ok(Array2::<f32>::eye(n).into_dyn())
    }

    fn from_vec(&mut self, shape: &[usize], data: Vec<f32>) -> NativeResult<CpuTensor> {
        self.admit(shape)?;
        Ok(ArrayD::from_shape_vec(IxDyn(shape), data)?)
    }

    fn causal_mask(&mut self, n: usize) -> NativeResult<CpuTensor> {
        self.admit(&[n, n])?;
        let mask = Array2::from_shape_fn((n, n), |(row, col)| {
            if col > row {
                f32::NEG_INFINITY
            } else {
                0.0
            }
        });
        Ok(mask.into_dyn())
    }

    fn shape(&self, t: &CpuTensor) -> Vec<usize> {
        t.shape().to_vec()
    }

    fn to_vec(&self, t: &CpuTensor) -> NativeResult<Vec<f32>> {
        Ok(t.iter().copied().collect())
    }

    fn item(&self, t: &CpuTensor) -> NativeResult<f32> {
        if t.len() != 1 {
            return Err(NativeError::shape(format!(
                "item needs a single element, tensor has shape {:?}",
                t.shape()
            )));
        }
        t.iter()
            .next()
            .copied()
            .ok_or_else(|| NativeError::Fault("empty tensor".to_string()))
    }

    fn duplicate(&self, t: &CpuTensor) -> NativeResult<CpuTensor> {
        Ok(t.clone())
    }

    fn binary(&self, op: BinaryOp, a: &CpuTensor, b: &CpuTensor) -> NativeResult<CpuTensor> {
        let shape = broadcast_shape(a.shape(), b.shape())?;
        self.admit(&shape)?;
        let (av, bv) = broadcast_pair(a, b, &shape)?;
        Ok(Zip::from(av).and(bv).map_collect(|&x, &y| op.apply(x, y)))
    }

    fn unary(&self, op: UnaryOp, a: &CpuTensor) -> NativeResult<CpuTensor> {
        Ok(a.mapv(|x| op.apply(x)))
    }

    fn scalar(&self, op: ScalarOp, a: &CpuTensor, s: f32) -> NativeResult<CpuTensor> {
        Ok(a.mapv(|x| op.apply(x, s)))
    }

    fn clamp(&self, a: &CpuTensor, min: f32, max: f32) -> NativeResult<CpuTensor> {
        if min > max {
            return Err(NativeError::Fault(format!(
                "clamp bounds reversed: {} > {}",
                min, max
            )));
        }
        Ok(a.mapv(|x| x.clamp(min, max)))
    }

    fn matmul(&self, a: &CpuTensor, b: &CpuTensor) -> NativeResult<CpuTensor> {
        let a2 = a.view().into_dimensionality::<Ix2>()?;
        let b2 = b.view().into_dimensionality::<Ix2>()?;
        if a2.ncols() != b2.nrows() {
            return Err(NativeError::shape(format!(
                "matmul {:?} x {:?}",
                a.shape(),
                b.shape()
            )));
        }
        self.admit(&[a2.nrows(), b2.ncols()])?;
        Ok(a2.dot(&b2).into_dyn())
    }

    fn reduce(&self, op: ReduceOp, a: &CpuTensor, axis: Option<usize>) -> NativeResult<CpuTensor> {
        let Some(ax) = axis else {
            if a.is_empty() && op != ReduceOp::Sum {
                return Err(NativeError::shape("reduction over an empty tensor"));
            }
            let v = match op {
                ReduceOp::Sum => a.sum(),
                ReduceOp::Mean => a.sum() / a.len() as f32,
                ReduceOp::Max => a.fold(f32::NEG_INFINITY, |m, &x| m.max(x)),
                ReduceOp::Min => a.fold(f32::INFINITY, |m, &x| m.min(x)),
            };
            return Ok(scalar_tensor(v));
        };
        check_axis(ax, a.ndim(), "reduction")?;
        if a.shape()[ax] == 0 && op != ReduceOp::Sum {
            return Err(NativeError::shape("reduction over an empty axis"));
        }
        let axis = Axis(ax);
        Ok(match op {
            ReduceOp::Sum => a.sum_axis(axis),
            ReduceOp::Mean => a.sum_axis(axis) / a.shape()[ax] as f32,
            ReduceOp::Max => a.fold_axis(axis, f32::NEG_INFINITY, |m, &x| m.max(x)),
            ReduceOp::Min => a.fold_axis(axis, f32::INFINITY, |m, &x| m.min(x)),
        })
    }

    fn argmax(&self, a: &CpuTensor, axis: usize) -> NativeResult<CpuTensor> {
        check_axis(axis, a.ndim(), "argmax")?;
        if a.shape()[axis] == 0 {
            return Err(NativeError::shape("argmax over an empty axis"));
        }
        Ok(a.map_axis(Axis(axis), |lane| {
            let mut best = 0usize;
            let mut best_v = f32::NEG_INFINITY;
            for (i, &v) in lane.iter().enumerate() {
                if v > best_v {
                    best = i;
                    best_v = v;
                }
            }
            best as f32
        }))
    }

    fn reshape(&self, a: &CpuTensor, shape: &[usize]) -> NativeResult<CpuTensor> {
        let data: Vec<f32> = a.iter().copied().collect();
        Ok(ArrayD::from_shape_vec(IxDyn(shape), data)?)
    }

    fn transpose(&self, a: &CpuTensor, d0: usize, d1: usize) -> NativeResult<CpuTensor> {
        check_axis(d0, a.ndim(), "transpose")?;
        check_axis(d1, a.ndim(), "transpose")?;
        let mut out = a.clone();
        out.swap_axes(d0, d1);
        Ok(out.as_standard_layout().into_owned())
    }

    fn concat(&self, parts: &[&CpuTensor], axis: usize) -> NativeResult<CpuTensor> {
        let first = parts
            .first()
            .ok_or_else(|| NativeError::shape("concat needs at least one tensor"))?;
        check_axis(axis, first.ndim(), "concat")?;
        if let Some(bad) = parts.iter().find(|p| p.ndim() != first.ndim()) {
            return Err(NativeError::shape(format!(
                "concat rank mismatch: {:?} vs {:?}",
                first.shape(),
                bad.shape()
            )));
        }
        let mut shape = first.shape().to_vec();
        shape[axis] = parts
            .iter()
            .try_fold(0usize, |total, p| total.checked_add(p.shape()[axis]))
            .ok_or_else(|| NativeError::shape("concat length overflows"))?;
        self.admit(&shape)?;
        let views: Vec<ArrayViewD<'_, f32>> = parts.iter().map(|p| p.view()).collect();
        Ok(concatenate(Axis(axis), &views)?)
    }

    fn narrow(&self, a: &CpuTensor, axis: usize, start: usize, len: usize) -> NativeResult<CpuTensor> {
        check_axis(axis, a.ndim(), "narrow")?;
        let end = start
            .checked_add(len)
            .filter(|&e| e <= a.shape()[axis])
            .ok_or_else(|| {
                NativeError::shape(format!(
                    "narrow {}..+{} exceeds dimension {}",
                    start,
                    len,
                    a.shape()[axis]
                ))
            })?;
        Ok(a.slice_axis(Axis(axis), Slice::from(start..end)).to_owned())
    }

    fn unsqueeze(&self, a: &CpuTensor, axis: usize) -> NativeResult<CpuTensor> {
        check_axis(axis, a.ndim() + 1, "unsqueeze")?;
        Ok(a.clone().insert_axis(Axis(axis)))
    }

    fn repeat_interleave(
        &self,
        a: &CpuTensor,
        repeats: usize,
        axis: usize,
    ) -> NativeResult<CpuTensor> {
        check_axis(axis, a.ndim(), "repeat_interleave")?;
        let mut shape = a.shape().to_vec();
        shape[axis] = shape[axis]
            .checked_mul(repeats)
            .ok_or_else(|| NativeError::shape("repeat_interleave length overflows"))?;
        self.admit(&shape)?;
        if shape[axis] == 0 {
            return Ok(ArrayD::zeros(IxDyn(&shape)));
        }
        let picks: Vec<usize> = (0..a.shape()[axis])
            .flat_map(|i| std::iter::repeat(i).take(repeats))
            .collect();
        Ok(a.select(Axis(axis), &picks))
    }

    fn softmax(&self, a: &CpuTensor, axis: usize) -> NativeResult<CpuTensor> {
        check_axis(axis, a.ndim(), "softmax")?;
        let mut out = a.clone();
        for mut lane in out.lanes_mut(Axis(axis)) {
            let m = lane.fold(f32::NEG_INFINITY, |m, &x| m.max(x));
            lane.mapv_inplace(|x| (x - m).exp());
            let s = lane.sum();
            lane.mapv_inplace(|x| x / s);
        }
        Ok(out)
    }

    fn log_softmax(&self, a: &CpuTensor, axis: usize) -> NativeResult<CpuTensor> {
        check_axis(axis, a.ndim(), "log_softmax")?;
        let mut out = a.clone();
        for mut lane in out.lanes_mut(Axis(axis)) {
            let m = lane.fold(f32::NEG_INFINITY, |m, &x| m.max(x));
            let lse = m + lane.fold(0.0, |acc, &x| acc + (x - m).exp()).ln();
            lane.mapv_inplace(|x| x - lse);
        }
        Ok(out)
    }

    fn rms_norm(&self, x: &CpuTensor, w: &CpuTensor, eps: f32) -> NativeResult<CpuTensor> {
        let last = x
            .ndim()
            .checked_sub(1)
            .ok_or_else(|| NativeError::shape("rms_norm needs at least one dimension"))?;
        let w1 = w.view().into_dimensionality::<Ix1>()?;
        if w1.len() != x.shape()[last] {
            return Err(NativeError::shape(format!(
                "rms_norm weight {:?} does not match last dimension of {:?}",
                w.shape(),
                x.shape()
            )));
        }
        let mut out = x.clone();
        for mut lane in out.lanes_mut(Axis(last)) {
            let n = lane.len().max(1) as f32;
            let ms = lane.fold(0.0, |acc, &v| acc + v * v) / n;
            let scale = 1.0 / (ms + eps).sqrt();
            for (v, g) in lane.iter_mut().zip(w1.iter()) {
                *v = *v * scale * g;
            }
        }
        Ok(out)
    }

    fn embedding(&self, w: &CpuTensor, ids: &CpuTensor) -> NativeResult<CpuTensor> {
        let table = w.view().into_dimensionality::<Ix2>()?;
        let (vocab, width) = table.dim();
        let mut shape = ids.shape().to_vec();
        shape.push(width);
        self.admit(&shape)?;
        let mut data = Vec::with_capacity(ids.len() * width);
        for &id in ids.iter() {
            let row = index_of(id, vocab, "embedding")?;
            data.extend(table.row(row).iter().copied());
        }
        Ok(ArrayD::from_shape_vec(IxDyn(&shape), data)?)
    }

    fn mse_loss(&self, a: &CpuTensor, b: &CpuTensor) -> NativeResult<CpuTensor> {
        same_shape(a, b, "mse_loss")?;
        if a.is_empty() {
            return Err(NativeError::shape("mse_loss over empty tensors"));
        }
        let total: f32 = a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum();
        Ok(scalar_tensor(total / a.len() as f32))
    }

    fn cross_entropy(&self, logits: &CpuTensor, targets: &CpuTensor) -> NativeResult<CpuTensor> {
        let l2 = logits.view().into_dimensionality::<Ix2>()?;
        let t1 = targets.view().into_dimensionality::<Ix1>()?;
        let (rows, classes) = l2.dim();
        if rows == 0 || t1.len() != rows {
            return Err(NativeError::shape(format!(
                "cross_entropy logits {:?} vs targets {:?}",
                logits.shape(),
                targets.shape()
            )));
        }
        let mut total = 0.0f32;
        for (row, &t) in l2.rows().into_iter().zip(t1.iter()) {
            let class = index_of(t, classes, "target")?;
            let m = row.fold(f32::NEG_INFINITY, |m, &x| m.max(x));
            let lse = m + row.fold(0.0, |acc, &x| acc + (x - m).exp()).ln();
            total += lse - row[class];
        }
        Ok(scalar_tensor(total / rows as f32))
    }

    fn equal(&self, a: &CpuTensor, b: &CpuTensor) -> NativeResult<bool> {
        Ok(a == b)
    }

    fn allclose(&self, a: &CpuTensor, b: &CpuTensor, atol: f32) -> NativeResult<bool> {
        if a.shape() != b.shape() {
            return Ok(false);
        }
        Ok(a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() <= atol))
    }

    fn sgd_step(&self, param: &mut CpuTensor, grad: &CpuTensor, lr: f32) -> NativeResult<()> {
        same_shape(param, grad, "sgd_step")?;
        param.zip_mut_with(grad, |p, &g| *p -= lr * g);
        Ok(())
    }

    fn fill(&self, t: &mut CpuTensor, value: f32) -> NativeResult<()> {
        t.fill(value);
        Ok(())
    }

    fn set_requires_grad(&self, _t: &mut CpuTensor) -> NativeResult<()> {
        Err(NativeError::Unsupported {
            backend: "cpu",
            op: "requires_grad",
        })
    }

    fn backward(&self, _t: &CpuTensor) -> NativeResult<()> {
        Err(NativeError::Unsupported {
            backend: "cpu",
            op: "backward",
        })
    }

    fn grad(&self, _t: &CpuTensor) -> NativeResult<CpuTensor> {
        Err(NativeError::Unsupported {
            backend: "cpu",
            op: "grad",
        })
    }

    fn save_native(&self, t: &CpuTensor, path: &Path) -> NativeResult<()> {
        self.save_binary(t, path)
    }

    fn load_native(&mut self, path: &Path) -> NativeResult<CpuTensor> {
        let (shape, data) = format::read_binary(path)?;
        self.from_vec(&shape, data)
    }
}

#[cfg(test)]
mod tests {
    use super::broadcast_shape;

    #[test]
    fn broadcast_shape_follows_trailing_alignment() {
        assert_eq!(broadcast_shape(&[2, 3], &[3]).unwrap(), vec![2, 3]);
        assert_eq!(broadcast_shape(&[4, 1], &[1, 5]).unwrap(), vec![4, 5]);
        assert_eq!(broadcast_shape(&[], &[2]).unwrap(), vec![2]);
        assert!(broadcast_shape(&[2, 3], &[2]).is_err());
    }
}
