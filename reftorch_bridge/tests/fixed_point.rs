use reftorch_bridge::fixed::{decode, encode};
use reftorch_bridge::Scale;

#[test]
fn factors() {
    assert_eq!(Scale::Unit.factor(), 1);
    assert_eq!(Scale::Milli.factor(), 1_000);
    assert_eq!(Scale::Micro.factor(), 1_000_000);
}

#[test]
fn round_trip_stays_within_one_step() {
    let values = [0.0, 1.5, -2.25, 3.14159, -0.0004, 1234.5678, -98765.4321];
    for scale in [Scale::Unit, Scale::Milli, Scale::Micro] {
        let step = 1.0 / scale.factor() as f64;
        for &v in &values {
            let raw = encode(v, scale).expect("representable");
            let back = decode(raw, scale);
            assert!(
                (back - v).abs() <= step / 2.0 + 1e-12,
                "{} at {} came back as {}",
                v,
                scale,
                back
            );
        }
    }
}

#[test]
fn sign_and_zero_survive() {
    assert_eq!(encode(-1.0, Scale::Milli), Some(-1000));
    assert_eq!(encode(0.0, Scale::Micro), Some(0));
    assert_eq!(encode(-0.0, Scale::Micro), Some(0));
    assert_eq!(decode(-2500, Scale::Milli), -2.5);
    assert_eq!(decode(15, Scale::Micro), 1.5e-5);
}

#[test]
fn non_finite_cannot_cross() {
    assert_eq!(encode(f64::NEG_INFINITY, Scale::Milli), None);
    assert_eq!(encode(f64::NAN, Scale::Unit), None);
}
