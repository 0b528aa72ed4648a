//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

/// Linearly interpolate between `a` and `b`, with `t = 0` giving `a` and `t = 1` giving `b`.
pub fn lerp<T>(a: T, b: T, t: T) -> T
where
    T: Float
{
    a + (b - a) * t
}

pub fn clamp<T>(value: &T, min: &T, max: &T) -> T 
where
    T: Float
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

/// Get the signed shortest angular distance from `a` to `b`, in degrees.
///
/// The result is in the range [-180, 180), so that `a + get_ang_dist_deg(a, b)` is equivalent to
/// `b` modulo 360.
pub fn get_ang_dist_deg<T>(a: T, b: T) -> T
where
    T: Float
{
    let half_turn: T = T::from(180.0).unwrap();
    let full_turn: T = T::from(360.0).unwrap();

    rem_euclid(b - a + half_turn, full_turn) - half_turn
}

/// Wrap an angle in degrees into the range [0, 360).
pub fn wrap_deg<T>(value: T) -> T
where
    T: Float
{
    let full_turn: T = T::from(360.0).unwrap();
    let r = rem_euclid(value, full_turn);

    // Round-off can leave exactly one full turn behind
    if r >= full_turn { r - full_turn } else { r }
}

/// Calculates the least nonnegative remainder of `lhs (mod rhs)`.
/// 
/// This function is taken from the std library as num is missing it.
///
/// In particular, the return value `r` satisfies `0.0 <= r < rhs.abs()` in
/// most cases. However, due to a floating point round-off error it can
/// result in `r == rhs.abs()`, violating the mathematical definition, if
/// `self` is much smaller than `rhs.abs()` in magnitude and `self < 0.0`.
/// This result is not an element of the function's codomain, but it is the
/// closest floating point number in the real numbers and thus fulfills the
/// property `self == self.div_euclid(rhs) * rhs + self.rem_euclid(rhs)`
/// approximatively.
pub fn rem_euclid<T>(lhs: T, rhs: T) -> T
where
    T: Float
{
    let r = lhs % rhs;
    if r < T::zero() { r + rhs.abs() } else { r }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_get_ang_dist_deg() {
        assert_eq!(get_ang_dist_deg(0f64, 90f64), 90f64);
        assert_eq!(get_ang_dist_deg(90f64, 0f64), -90f64);
        assert_eq!(get_ang_dist_deg(350f64, 10f64), 20f64);
        assert_eq!(get_ang_dist_deg(10f64, 350f64), -20f64);
        assert_eq!(get_ang_dist_deg(0f64, 360f64), 0f64);
        assert_eq!(get_ang_dist_deg(270f64, 0f64), 90f64);

        // Half turns land on the closed end of the range
        assert_eq!(get_ang_dist_deg(0f64, 180f64), -180f64);
    }

    #[test]
    fn test_wrap_deg() {
        assert_eq!(wrap_deg(-90f64), 270f64);
        assert_eq!(wrap_deg(450f64), 90f64);
        assert_eq!(wrap_deg(0f64), 0f64);
    }

    #[test]
    fn test_lerp_and_clamp() {
        assert_eq!(lerp(2f64, 4f64, 0.25), 2.5);
        assert_eq!(clamp(&5f64, &0f64, &1f64), 1f64);
    }
}
