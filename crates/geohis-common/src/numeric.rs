//! Significant-figure rounding for persisted output.
//!
//! Results are written with 6 significant figures for SI values, 4 for
//! frequency ratios and 3 for weights. The `sigN` functions plug into
//! `#[serde(serialize_with = ...)]`.

use serde::Serializer;

/// Round `x` to `digits` significant figures. Zero and non-finite values
/// pass through unchanged.
pub fn round_sig(x: f64, digits: u32) -> f64 {
    if x == 0.0 || !x.is_finite() || digits == 0 {
        return x;
    }
    let exponent = x.abs().log10().floor() as i32;
    let shift = digits as i32 - 1 - exponent;
    let rounded = if shift >= 0 {
        let factor = 10f64.powi(shift);
        (x * factor).round() / factor
    } else {
        let factor = 10f64.powi(-shift);
        (x / factor).round() * factor
    };
    if rounded.is_finite() {
        rounded
    } else {
        x
    }
}

pub fn sig3<S: Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(round_sig(*v, 3))
}

pub fn sig4<S: Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(round_sig(*v, 4))
}

pub fn sig6<S: Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(round_sig(*v, 6))
}

pub fn sig4_opt<S: Serializer>(v: &Option<f64>, s: S) -> Result<S::Ok, S::Error> {
    match v {
        Some(x) => s.serialize_some(&round_sig(*x, 4)),
        None => s.serialize_none(),
    }
}

pub fn sig6_opt<S: Serializer>(v: &Option<f64>, s: S) -> Result<S::Ok, S::Error> {
    match v {
        Some(x) => s.serialize_some(&round_sig(*x, 6)),
        None => s.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_sig() {
        assert_eq!(round_sig(0.297_835, 3), 0.298);
        assert_eq!(round_sig(1.909_090_9, 4), 1.909);
        assert_eq!(round_sig(49.999_999_9, 6), 50.0);
        assert_eq!(round_sig(123_456.7, 3), 123_000.0);
        assert_eq!(round_sig(-0.012_345, 2), -0.012);
        assert_eq!(round_sig(0.0, 6), 0.0);
        assert!(round_sig(f64::NAN, 3).is_nan());
    }

    #[test]
    fn test_serialize_with() {
        #[derive(serde::Serialize)]
        struct Row {
            #[serde(serialize_with = "sig3")]
            w: f64,
            #[serde(serialize_with = "sig6_opt")]
            si: Option<f64>,
        }
        let json = serde_json::to_string(&Row {
            w: 0.157_894,
            si: Some(42.123_456_7),
        })
        .unwrap();
        assert_eq!(json, r#"{"w":0.158,"si":42.1235}"#);
    }
}
