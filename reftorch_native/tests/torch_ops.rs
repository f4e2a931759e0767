#![cfg(feature = "torch")]

use reftorch_native::{Backend, BinaryOp, NativeError, ReduceOp, TorchBackend};

#[test]
fn torch_backend_adds_and_reduces() {
    let mut b = TorchBackend::new("cpu", 0).expect("torch backend");
    let x = b.from_vec(&[2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
    let y = b.ones(&[2, 2]).unwrap();
    let s = b.binary(BinaryOp::Add, &x, &y).unwrap();
    assert_eq!(b.to_vec(&s).unwrap(), vec![2.0, 3.0, 4.0, 5.0]);
    let total = b.reduce(ReduceOp::Sum, &s, None).unwrap();
    assert_eq!(b.item(&total).unwrap(), 14.0);
}

#[test]
fn torch_shape_errors_are_typed() {
    let mut b = TorchBackend::new("cpu", 0).expect("torch backend");
    let x = b.zeros(&[2, 3]).unwrap();
    let y = b.zeros(&[4, 5]).unwrap();
    let err = b.matmul(&x, &y).unwrap_err();
    assert!(!matches!(err, NativeError::Unsupported { .. }));
}

#[test]
fn torch_autograd_produces_gradient() {
    let mut b = TorchBackend::new("cpu", 0).expect("torch backend");
    let mut w = b.from_vec(&[2], vec![1.0, 2.0]).unwrap();
    b.set_requires_grad(&mut w).unwrap();
    let sq = b.binary(BinaryOp::Mul, &w, &w).unwrap();
    let loss = b.reduce(ReduceOp::Sum, &sq, None).unwrap();
    b.backward(&loss).unwrap();
    let g = b.grad(&w).unwrap();
    assert_eq!(b.to_vec(&g).unwrap(), vec![2.0, 4.0]);
}

#[test]
fn torch_attention_helpers_match_cpu_layout() {
    let mut b = TorchBackend::new("cpu", 0).expect("torch backend");
    let kv = b.from_vec(&[1, 2, 1], vec![1.0, 2.0]).unwrap();
    let grouped = b.repeat_interleave(&kv, 2, 1).unwrap();
    assert_eq!(b.to_vec(&grouped).unwrap(), vec![1.0, 1.0, 2.0, 2.0]);

    let mask = b.causal_mask(2).unwrap();
    assert_eq!(
        b.to_vec(&mask).unwrap(),
        vec![0.0, f32::NEG_INFINITY, 0.0, 0.0]
    );
}
