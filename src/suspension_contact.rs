// ==============================================================================
// suspension_contact.rs — RAYCAST SUSPENSION + CONTACT MEASUREMENT
// ------------------------------------------------------------------------------
// Per wheel, per step:
// - probe_wheel(): cast from the world-space connection point along the
//   suspension direction, up to rest + max_travel + radius. A hit yields
//     suspension_length = hit_distance - radius, clamped to rest ± travel
//     relative_velocity = (n · v_contact) / -(n · dir)
//   with 1 / -(n · dir) clipped to 10 for grazing contacts (n · dir >= -0.1).
//   No hit (or a degenerate one) leaves the wheel AIRBORNE at rest length.
// - compute_suspension_force(): spring + damper scaled by chassis mass,
//       F = m * (k * (rest - len) * clip - c * v_rel)
//   c = compression damping while closing, relaxation damping while opening,
//   clamped to [0, max_suspension_force]. Airborne wheels give exactly 0.
//
// Notes:
// - This file does NOT apply impulses. It only measures contact data.
// ==============================================================================

use rapier3d::prelude::*;

use crate::physics::PhysicsWorld;
use crate::tire::kinematics::point_velocity;
use crate::vehicle::WheelConfig;

const GRAZING_DOT: Real = -0.1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SuspensionContact {
    pub in_contact: bool,
    pub ground: Option<RigidBodyHandle>,

    // geometry
    pub hit_point: Point<Real>,
    pub ground_normal: Vector<Real>,

    // suspension state
    pub suspension_length: Real,
    pub relative_velocity: Real,          // along the suspension, + = opening
    pub clipped_inv_contact_dot: Real,
}

impl SuspensionContact {
    /// Wheel hanging free at rest length, normal facing back up the ray.
    pub fn airborne(wheel: &WheelConfig, origin: Point<Real>, direction: Vector<Real>) -> Self {
        Self {
            in_contact: false,
            ground: None,
            hit_point: origin + direction * (wheel.suspension_rest_length + wheel.radius),
            ground_normal: -direction,
            suspension_length: wheel.suspension_rest_length,
            relative_velocity: 0.0,
            clipped_inv_contact_dot: 1.0,
        }
    }

    pub fn compression(&self, wheel: &WheelConfig) -> Real {
        if self.in_contact {
            wheel.suspension_rest_length - self.suspension_length
        } else {
            0.0
        }
    }
}

/// Longest distance a wheel ray may reach from its connection point.
#[inline]
pub fn ray_length(wheel: &WheelConfig) -> Real {
    wheel.suspension_rest_length + wheel.max_suspension_travel + wheel.radius
}

pub fn probe_wheel(
    world: &PhysicsWorld,
    chassis: RigidBodyHandle,
    origin: Point<Real>,
    direction: Vector<Real>,
    wheel: &WheelConfig,
) -> SuspensionContact {
    let airborne = SuspensionContact::airborne(wheel, origin, direction);

    let Some(body) = world.body(chassis) else {
        return airborne;
    };
    let Some(hit) = world.cast_ray(origin, direction, ray_length(wheel), Some(chassis)) else {
        return airborne;
    };
    let normal = hit.normal;
    if !normal.iter().all(|c| c.is_finite()) || normal.norm_squared() < 1e-6 {
        return airborne;
    }

    let min_len = (wheel.suspension_rest_length - wheel.max_suspension_travel).max(0.0);
    let max_len = wheel.suspension_rest_length + wheel.max_suspension_travel;
    let suspension_length = (hit.distance - wheel.radius).clamp(min_len, max_len);

    let denominator = normal.dot(&direction);
    let v_contact = point_velocity(body, &hit.point);
    let projected = normal.dot(&v_contact);

    let (relative_velocity, clipped_inv_contact_dot) = if denominator >= GRAZING_DOT {
        (0.0, 1.0 / -GRAZING_DOT)
    } else {
        let inv = -1.0 / denominator;
        (projected * inv, inv)
    };

    if !suspension_length.is_finite() || !relative_velocity.is_finite() {
        return airborne;
    }

    SuspensionContact {
        in_contact: true,
        ground: Some(hit.body),
        hit_point: hit.point,
        ground_normal: normal,
        suspension_length,
        relative_velocity,
        clipped_inv_contact_dot,
    }
}

pub(crate) fn compute_suspension_force(contact: &SuspensionContact, wheel: &WheelConfig, chassis_mass: Real) -> Real {
    if !contact.in_contact {
        return 0.0;
    }

    let spring = wheel.suspension_stiffness
        * (wheel.suspension_rest_length - contact.suspension_length)
        * contact.clipped_inv_contact_dot;

    let damping = if contact.relative_velocity < 0.0 {
        wheel.damping_compression
    } else {
        wheel.damping_relaxation
    };

    let force = (spring - damping * contact.relative_velocity) * chassis_mass;
    if !force.is_finite() {
        return 0.0;
    }
    force.clamp(0.0, wheel.max_suspension_force)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn resting(len: Real, rel_vel: Real) -> SuspensionContact {
        SuspensionContact {
            in_contact: true,
            ground: None,
            hit_point: Point::origin(),
            ground_normal: vector![0.0, 1.0, 0.0],
            suspension_length: len,
            relative_velocity: rel_vel,
            clipped_inv_contact_dot: 1.0,
        }
    }

    #[test]
    fn airborne_wheel_gives_zero_force() {
        let wheel = WheelConfig::default();
        let c = SuspensionContact::airborne(&wheel, Point::origin(), vector![0.0, -1.0, 0.0]);
        assert_eq!(compute_suspension_force(&c, &wheel, 1000.0), 0.0);
        assert_eq!(c.compression(&wheel), 0.0);
    }

    #[test]
    fn spring_force_scales_with_mass_and_compression() {
        let wheel = WheelConfig::default();
        let len = wheel.suspension_rest_length - 0.05;
        let f = compute_suspension_force(&resting(len, 0.0), &wheel, 1000.0);
        assert_relative_eq!(f, wheel.suspension_stiffness * 0.05 * 1000.0, epsilon = 1e-2);
    }

    #[test]
    fn compression_damping_adds_force_while_closing() {
        let wheel = WheelConfig::default();
        let len = wheel.suspension_rest_length - 0.05;
        let still = compute_suspension_force(&resting(len, 0.0), &wheel, 1000.0);
        let closing = compute_suspension_force(&resting(len, -0.5), &wheel, 1000.0);
        assert_relative_eq!(closing - still, wheel.damping_compression * 0.5 * 1000.0, epsilon = 1e-1);
    }

    #[test]
    fn force_never_pulls_and_respects_cap() {
        let wheel = WheelConfig { max_suspension_force: 100.0, ..WheelConfig::default() };
        let extended = resting(wheel.suspension_rest_length + 0.1, 0.0);
        assert_eq!(compute_suspension_force(&extended, &wheel, 1000.0), 0.0);
        let crushed = resting(0.0, 0.0);
        assert_eq!(compute_suspension_force(&crushed, &wheel, 1000.0), 100.0);
    }

    #[test]
    fn nan_state_yields_zero() {
        let wheel = WheelConfig::default();
        let c = resting(Real::NAN, 0.0);
        assert_eq!(compute_suspension_force(&c, &wheel, 1000.0), 0.0);
    }
}
