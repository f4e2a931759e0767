//! Fixed-point encoding for reals crossing into the engine, which only has
//! integers.

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scale {
    /// 1x: integers, counts, axes, booleans.
    Unit,
    /// 1000x: ordinary reals.
    Milli,
    /// 1 000 000x: tolerances and epsilons.
    Micro,
}

impl Scale {
    pub fn factor(self) -> i64 {
        match self {
            Scale::Unit => 1,
            Scale::Milli => 1_000,
            Scale::Micro => 1_000_000,
        }
    }
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.factor())
    }
}

/// Rounds `value * factor` to the nearest integer. `None` when the value is
/// not finite or does not fit an `i64`.
pub fn encode(value: f64, scale: Scale) -> Option<i64> {
    if !value.is_finite() {
        return None;
    }
    let scaled = (value * scale.factor() as f64).round();
    // i64::MAX as f64 rounds up to 2^63, which is already out of range
    if scaled >= -(i64::MIN as f64) || scaled < i64::MIN as f64 {
        return None;
    }
    Some(scaled as i64)
}

pub fn decode(raw: i64, scale: Scale) -> f64 {
    raw as f64 / scale.factor() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_rejects_unrepresentable() {
        assert_eq!(encode(f64::NAN, Scale::Milli), None);
        assert_eq!(encode(f64::INFINITY, Scale::Unit), None);
        assert_eq!(encode(1e300, Scale::Micro), None);
        assert_eq!(encode(-9.3e18, Scale::Unit), None);
    }

    #[test]
    fn encode_rounds_to_nearest() {
        assert_eq!(encode(0.0016, Scale::Milli), Some(2));
        assert_eq!(encode(-0.0016, Scale::Milli), Some(-2));
        assert_eq!(encode(2.4999, Scale::Unit), Some(2));
    }
}
