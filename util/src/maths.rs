//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

/// Clamp a value between a minimum and a maximum.
pub fn clamp<T>(value: &T, min: &T, max: &T) -> T
where
    T: Float,
{
    let mut ret = *value;

    if ret > *max {
        ret = *max
    }
    if ret < *min {
        ret = *min
    }

    ret
}

/// Wrap an angle into the open interval `(-2pi, 2pi)`.
///
/// Angles are allowed to accumulate a full turn in either direction before
/// being wrapped, so the result is congruent to the input modulo `2pi` but a
/// single correction per full turn is applied rather than a renormalisation
/// onto `[-pi, pi]`. This keeps the body yaw continuous within one turn.
pub fn wrap_2pi<T>(angle: T) -> T
where
    T: Float,
{
    let tau_t = T::from(std::f64::consts::TAU).unwrap();

    let mut ret = angle;

    while ret > tau_t {
        ret = ret - tau_t;
    }
    while ret < -tau_t {
        ret = ret + tau_t;
    }

    ret
}

#[cfg(test)]
mod test {
    use super::*;

    const TAU: f64 = std::f64::consts::TAU;

    #[test]
    fn test_clamp() {
        assert_eq!(clamp(&0.5f64, &-1f64, &1f64), 0.5);
        assert_eq!(clamp(&1.5f64, &-1f64, &1f64), 1.0);
        assert_eq!(clamp(&-1.5f64, &-1f64, &1f64), -1.0);
    }

    #[test]
    fn test_wrap_2pi() {
        // Values inside the interval pass through untouched
        assert_eq!(wrap_2pi(0f64), 0f64);
        assert_eq!(wrap_2pi(1f64), 1f64);
        assert_eq!(wrap_2pi(-TAU + 0.1), -TAU + 0.1);

        // One full turn removed per wrap
        assert!((wrap_2pi(TAU + 1f64) - 1f64).abs() < 1e-12);
        assert!((wrap_2pi(-TAU - 1f64) + 1f64).abs() < 1e-12);

        // Many turns accumulate down into the interval
        let wrapped = wrap_2pi(5.5 * TAU);
        assert!(wrapped > -TAU && wrapped < TAU);
        assert!((wrapped - 0.5 * TAU).abs() < 1e-9);
    }
}
