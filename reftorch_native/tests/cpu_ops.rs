use reftorch_native::{
    Backend, BinaryOp, CpuBackend, NativeError, ReduceOp, ScalarOp, UnaryOp,
};

fn backend() -> CpuBackend {
    CpuBackend::new(7, 1 << 20)
}

#[test]
fn creation_respects_shape_and_fill() {
    let mut b = backend();
    let z = b.zeros(&[2, 3]).expect("zeros");
    assert_eq!(b.shape(&z), vec![2, 3]);
    assert!(b.to_vec(&z).unwrap().iter().all(|&v| v == 0.0));

    let f = b.full(&[4], 2.5).expect("full");
    assert_eq!(b.to_vec(&f).unwrap(), vec![2.5; 4]);

    let e = b.eye(3).expect("eye");
    assert_eq!(
        b.to_vec(&e).unwrap(),
        vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]
    );

    let r = b.arange(0.0, 1.0, 0.25).expect("arange");
    assert_eq!(b.to_vec(&r).unwrap(), vec![0.0, 0.25, 0.5, 0.75]);
}

#[test]
fn random_tensors_are_seeded() {
    let mut a = backend();
    let mut c = backend();
    let x = a.randn(&[8]).unwrap();
    let y = c.randn(&[8]).unwrap();
    assert_eq!(a.to_vec(&x).unwrap(), c.to_vec(&y).unwrap());
    let u = a.rand(&[64]).unwrap();
    assert!(a.to_vec(&u).unwrap().iter().all(|&v| (0.0..1.0).contains(&v)));
}

#[test]
fn oversize_allocation_is_exhausted() {
    let mut b = CpuBackend::new(0, 100);
    let err = b.zeros(&[11, 10]).unwrap_err();
    assert_eq!(
        err,
        NativeError::Exhausted {
            requested: 110,
            limit: 100
        }
    );
    let err = b.ones(&[usize::MAX, 2]).unwrap_err();
    assert!(matches!(err, NativeError::Exhausted { .. }));
}

#[test]
fn binary_ops_broadcast_and_reject_mismatch() {
    let mut b = backend();
    let m = b.from_vec(&[2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
    let row = b.from_vec(&[2], vec![10.0, 20.0]).unwrap();
    let sum = b.binary(BinaryOp::Add, &m, &row).unwrap();
    assert_eq!(b.to_vec(&sum).unwrap(), vec![11.0, 22.0, 13.0, 24.0]);

    let bad = b.from_vec(&[3], vec![1.0, 1.0, 1.0]).unwrap();
    let err = b.binary(BinaryOp::Mul, &m, &bad).unwrap_err();
    assert!(matches!(err, NativeError::Shape(_)));
}

#[test]
fn unary_and_scalar_ops() {
    let mut b = backend();
    let x = b.from_vec(&[3], vec![-1.0, 0.0, 2.0]).unwrap();
    let relu = b.unary(UnaryOp::Relu, &x).unwrap();
    assert_eq!(b.to_vec(&relu).unwrap(), vec![0.0, 0.0, 2.0]);
    let sq = b.scalar(ScalarOp::Pow, &x, 2.0).unwrap();
    assert_eq!(b.to_vec(&sq).unwrap(), vec![1.0, 0.0, 4.0]);
    let clamped = b.clamp(&x, -0.5, 1.0).unwrap();
    assert_eq!(b.to_vec(&clamped).unwrap(), vec![-0.5, 0.0, 1.0]);
}

#[test]
fn matmul_checks_inner_dimension() {
    let mut b = backend();
    let a = b.from_vec(&[2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
    let i = b.eye(3).unwrap();
    let out = b.matmul(&a, &i).unwrap();
    assert_eq!(b.to_vec(&out).unwrap(), b.to_vec(&a).unwrap());
    let err = b.matmul(&a, &a).unwrap_err();
    assert!(matches!(err, NativeError::Shape(_)));
}

#[test]
fn reductions_with_and_without_axis() {
    let mut b = backend();
    let x = b.from_vec(&[2, 3], vec![1.0, 5.0, 3.0, 4.0, 2.0, 6.0]).unwrap();
    let total = b.reduce(ReduceOp::Sum, &x, None).unwrap();
    assert_eq!(b.item(&total).unwrap(), 21.0);
    let rows = b.reduce(ReduceOp::Max, &x, Some(1)).unwrap();
    assert_eq!(b.to_vec(&rows).unwrap(), vec![5.0, 6.0]);
    let cols = b.reduce(ReduceOp::Mean, &x, Some(0)).unwrap();
    assert_eq!(b.to_vec(&cols).unwrap(), vec![2.5, 3.5, 4.5]);
    let idx = b.argmax(&x, 1).unwrap();
    assert_eq!(b.to_vec(&idx).unwrap(), vec![1.0, 2.0]);
    assert!(b.reduce(ReduceOp::Sum, &x, Some(2)).is_err());
}

#[test]
fn shape_manipulation() {
    let mut b = backend();
    let x = b.arange(0.0, 6.0, 1.0).unwrap();
    let m = b.reshape(&x, &[2, 3]).unwrap();
    let t = b.transpose(&m, 0, 1).unwrap();
    assert_eq!(b.shape(&t), vec![3, 2]);
    assert_eq!(b.to_vec(&t).unwrap(), vec![0.0, 3.0, 1.0, 4.0, 2.0, 5.0]);

    let cat = b.concat(&[&m, &m], 0).unwrap();
    assert_eq!(b.shape(&cat), vec![4, 3]);

    let cols = b.narrow(&m, 1, 1, 2).unwrap();
    assert_eq!(b.to_vec(&cols).unwrap(), vec![1.0, 2.0, 4.0, 5.0]);
    assert!(b.narrow(&m, 1, 2, 2).is_err());

    let u = b.unsqueeze(&x, 0).unwrap();
    assert_eq!(b.shape(&u), vec![1, 6]);
    assert!(b.reshape(&x, &[4, 2]).is_err());
}

#[test]
fn softmax_rows_sum_to_one() {
    let mut b = backend();
    let x = b.from_vec(&[2, 3], vec![1.0, 2.0, 3.0, 0.0, 0.0, 0.0]).unwrap();
    let s = b.softmax(&x, 1).unwrap();
    let sums = b.reduce(ReduceOp::Sum, &s, Some(1)).unwrap();
    for v in b.to_vec(&sums).unwrap() {
        assert!((v - 1.0).abs() < 1e-6);
    }
    let ls = b.log_softmax(&x, 1).unwrap();
    let back = b.unary(UnaryOp::Exp, &ls).unwrap();
    assert!(b.allclose(&back, &s, 1e-6).unwrap());
}

#[test]
fn rms_norm_scales_by_weight() {
    let mut b = backend();
    let x = b.from_vec(&[1, 2], vec![3.0, 4.0]).unwrap();
    let w = b.from_vec(&[2], vec![1.0, 2.0]).unwrap();
    let y = b.rms_norm(&x, &w, 0.0).unwrap();
    let rms = (12.5f32).sqrt();
    let expected = b.from_vec(&[1, 2], vec![3.0 / rms, 8.0 / rms]).unwrap();
    assert!(b.allclose(&y, &expected, 1e-6).unwrap());
    let bad = b.from_vec(&[3], vec![1.0; 3]).unwrap();
    assert!(b.rms_norm(&x, &bad, 1e-6).is_err());
}

#[test]
fn embedding_gathers_rows() {
    let mut b = backend();
    let w = b.from_vec(&[3, 2], vec![0.0, 0.1, 1.0, 1.1, 2.0, 2.1]).unwrap();
    let ids = b.from_vec(&[2], vec![2.0, 0.0]).unwrap();
    let e = b.embedding(&w, &ids).unwrap();
    assert_eq!(b.shape(&e), vec![2, 2]);
    assert_eq!(b.to_vec(&e).unwrap(), vec![2.0, 2.1, 0.0, 0.1]);
    let oob = b.from_vec(&[1], vec![3.0]).unwrap();
    assert!(matches!(b.embedding(&w, &oob), Err(NativeError::Shape(_))));
}

#[test]
fn losses_reduce_to_scalars() {
    let mut b = backend();
    let a = b.from_vec(&[2], vec![1.0, 3.0]).unwrap();
    let c = b.from_vec(&[2], vec![2.0, 1.0]).unwrap();
    let mse = b.mse_loss(&a, &c).unwrap();
    assert_eq!(b.item(&mse).unwrap(), 2.5);

    let logits = b.from_vec(&[1, 2], vec![0.0, 0.0]).unwrap();
    let target = b.from_vec(&[1], vec![1.0]).unwrap();
    let ce = b.cross_entropy(&logits, &target).unwrap();
    assert!((b.item(&ce).unwrap() - std::f32::consts::LN_2).abs() < 1e-6);
}

#[test]
fn sgd_step_updates_in_place() {
    let mut b = backend();
    let mut p = b.from_vec(&[2], vec![1.0, 1.0]).unwrap();
    let g = b.from_vec(&[2], vec![0.5, -0.5]).unwrap();
    b.sgd_step(&mut p, &g, 0.5).unwrap();
    assert_eq!(b.to_vec(&p).unwrap(), vec![0.75, 1.25]);
    let wrong = b.zeros(&[3]).unwrap();
    assert!(b.sgd_step(&mut p, &wrong, 0.1).is_err());
    b.fill(&mut p, 0.0).unwrap();
    assert_eq!(b.to_vec(&p).unwrap(), vec![0.0, 0.0]);
}

#[test]
fn autograd_is_unsupported_on_cpu() {
    let mut b = backend();
    let mut t = b.zeros(&[1]).unwrap();
    assert!(matches!(
        b.set_requires_grad(&mut t),
        Err(NativeError::Unsupported { .. })
    ));
    assert!(matches!(b.backward(&t), Err(NativeError::Unsupported { .. })));
}

#[test]
fn derived_results_respect_the_element_cap() {
    let mut b = CpuBackend::new(0, 100);
    let col = b.zeros(&[100, 1]).unwrap();
    let row = b.zeros(&[1, 100]).unwrap();

    let err = b.binary(BinaryOp::Add, &col, &row).unwrap_err();
    assert_eq!(
        err,
        NativeError::Exhausted {
            requested: 10_000,
            limit: 100
        }
    );
    assert!(matches!(
        b.matmul(&col, &row),
        Err(NativeError::Exhausted { requested: 10_000, .. })
    ));
    assert!(matches!(
        b.concat(&[&col, &col], 0),
        Err(NativeError::Exhausted { requested: 200, .. })
    ));

    let table = b.zeros(&[2, 50]).unwrap();
    let ids = b.zeros(&[3]).unwrap();
    assert!(matches!(
        b.embedding(&table, &ids),
        Err(NativeError::Exhausted { requested: 150, .. })
    ));
    assert!(matches!(
        b.repeat_interleave(&col, 2, 1),
        Err(NativeError::Exhausted { requested: 200, .. })
    ));
    assert!(matches!(b.causal_mask(11), Err(NativeError::Exhausted { .. })));

    // within the cap these still succeed
    let small = b.binary(BinaryOp::Add, &row, &row).unwrap();
    assert_eq!(b.shape(&small), vec![1, 100]);
}

#[test]
fn repeat_interleave_duplicates_each_slice_in_place() {
    let mut b = backend();
    let kv = b.from_vec(&[1, 2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
    let grouped = b.repeat_interleave(&kv, 2, 1).unwrap();
    assert_eq!(b.shape(&grouped), vec![1, 4, 2]);
    assert_eq!(
        b.to_vec(&grouped).unwrap(),
        vec![1.0, 2.0, 1.0, 2.0, 3.0, 4.0, 3.0, 4.0]
    );

    let none = b.repeat_interleave(&kv, 0, 2).unwrap();
    assert_eq!(b.shape(&none), vec![1, 2, 0]);
    assert!(matches!(
        b.repeat_interleave(&kv, 2, 3),
        Err(NativeError::Shape(_))
    ));
}

#[test]
fn causal_mask_blocks_future_positions() {
    let mut b = backend();
    let mask = b.causal_mask(3).unwrap();
    assert_eq!(b.shape(&mask), vec![3, 3]);
    let inf = f32::NEG_INFINITY;
    assert_eq!(
        b.to_vec(&mask).unwrap(),
        vec![0.0, inf, inf, 0.0, 0.0, inf, 0.0, 0.0, 0.0]
    );

    let scores = b.zeros(&[3, 3]).unwrap();
    let masked = b.binary(BinaryOp::Add, &scores, &mask).unwrap();
    let probs = b.to_vec(&b.softmax(&masked, 1).unwrap()).unwrap();
    assert_eq!(&probs[..3], &[1.0, 0.0, 0.0]);
    assert_eq!(&probs[3..6], &[0.5, 0.5, 0.0]);
}
