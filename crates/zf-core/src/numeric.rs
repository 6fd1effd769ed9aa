use crate::CoreError;

/// Floating point type used throughout system
pub type Real = f64;

pub fn ensure_finite(v: Real, what: &'static str) -> Result<Real, CoreError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(CoreError::NonFinite { what, value: v })
    }
}

/// Arithmetic mean of two values, the default `average` for median filters.
pub fn mean(a: &Real, b: &Real) -> Real {
    (a + b) / 2.0
}

/// `v` as a share of full power: clamped to `0.0..=1.0`, NaN reads as zero.
pub fn fraction(v: Real) -> Real {
    if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_finite_detects_nan() {
        let err = ensure_finite(Real::NAN, "test").unwrap_err();
        let msg = format!("{err}");
        assert!(msg.contains("Non-finite"));
        assert_eq!(ensure_finite(21.5, "test").unwrap(), 21.5);
    }

    #[test]
    fn mean_of_two() {
        assert_eq!(mean(&2.0, &4.0), 3.0);
    }

    #[test]
    fn fraction_edges() {
        assert_eq!(fraction(Real::NAN), 0.0);
        assert_eq!(fraction(Real::INFINITY), 1.0);
        assert_eq!(fraction(-0.5), 0.0);
        assert_eq!(fraction(0.25), 0.25);
    }
}
