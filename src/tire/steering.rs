// ==============================================================================
// steering.rs — SPEED-SENSITIVE STEERING AUTHORITY
// ------------------------------------------------------------------------------
// authority(speed) = max(min_steer, max_steer * (1 - speed / speed_cap))
//
// - full lock at standstill
// - linear fade with speed
// - never below min_steer (reached at, and held past, the speed where the
//   linear fade crosses it; at the latest speed_cap)
// ==============================================================================

use rapier3d::na::{UnitQuaternion, Vector3};
use rapier3d::prelude::Real;

/// Largest steering angle (radians) allowed at `speed` (m/s, sign ignored).
pub fn steering_authority(speed: Real, max_steer: Real, min_steer: Real, speed_cap: Real) -> Real {
    let speed = if speed.is_finite() { speed.abs() } else { speed_cap };
    if speed_cap <= 0.0 || speed >= speed_cap {
        return min_steer;
    }
    (max_steer * (1.0 - speed / speed_cap)).max(min_steer)
}

/// Rotation of a wheel about its local up axis (the negated suspension
/// direction) by `angle`.
pub fn steer_rotation(up_local: &Vector3<Real>, angle: Real) -> UnitQuaternion<Real> {
    match up_local.try_normalize(1e-6) {
        Some(up) => UnitQuaternion::from_scaled_axis(up * angle),
        None => UnitQuaternion::identity(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn full_authority_at_rest() {
        assert_relative_eq!(steering_authority(0.0, 0.6, 0.18, 60.0), 0.6);
    }

    #[test]
    fn floor_at_and_above_cap() {
        assert_relative_eq!(steering_authority(60.0, 0.6, 0.18, 60.0), 0.18);
        assert_relative_eq!(steering_authority(500.0, 0.6, 0.18, 60.0), 0.18);
    }

    #[test]
    fn reverse_speed_uses_magnitude() {
        assert_relative_eq!(
            steering_authority(-15.0, 0.6, 0.18, 60.0),
            steering_authority(15.0, 0.6, 0.18, 60.0)
        );
    }

    #[test]
    fn never_increases_with_speed() {
        let mut last = steering_authority(0.0, 0.6, 0.18, 60.0);
        for i in 1..=700 {
            let a = steering_authority(i as Real * 0.1, 0.6, 0.18, 60.0);
            assert!(a <= last + 1e-7);
            last = a;
        }
    }

    #[test]
    fn steer_rotation_turns_forward_left() {
        let q = steer_rotation(&Vector3::y(), 0.5);
        let fwd = q * Vector3::new(-1.0, 0.0, 0.0);
        // forward is -X, left is +Z
        assert!(fwd.z > 0.0);
    }
}
