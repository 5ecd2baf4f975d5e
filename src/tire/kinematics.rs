// ==============================================================================
// kinematics.rs — CONTACT POINT KINEMATICS (WORLD SPACE)
// ------------------------------------------------------------------------------
// Small helpers shared by the suspension and friction passes:
// - point_velocity(): v(p) = v_com + ω × (p - com), zero for fixed bodies
// - impulse_denominator(): 1/m + n·((I⁻¹ (r × n)) × r), the effective inverse
//   mass of a body along `n` at world point `p`
// - wheel_basis(): axle projected onto the contact plane + forward = n × axle
// ==============================================================================

use rapier3d::prelude::{Point, Real, RigidBody, Vector};

/// World-space velocity of an arbitrary point rigidly attached to the body.
#[inline]
pub fn point_velocity(body: &RigidBody, p: &Point<Real>) -> Vector<Real> {
    if body.is_dynamic() {
        body.velocity_at_point(p)
    } else {
        Vector::zeros()
    }
}

/// Inverse of the world inertia tensor applied to `v`.
#[inline]
fn inv_inertia_mul(body: &RigidBody, v: Vector<Real>) -> Vector<Real> {
    let sqrt = body.mass_properties().effective_world_inv_inertia_sqrt;
    sqrt * (sqrt * v)
}

#[inline]
pub fn inv_mass(body: &RigidBody) -> Real {
    if !body.is_dynamic() {
        return 0.0;
    }
    let m = body.mass();
    if m > Real::EPSILON { 1.0 / m } else { 0.0 }
}

/// Effective inverse mass seen by an impulse along `n` at world point `p`.
pub fn impulse_denominator(body: &RigidBody, p: &Point<Real>, n: &Vector<Real>) -> Real {
    if !body.is_dynamic() {
        return 0.0;
    }
    let r = p - body.center_of_mass();
    let angular = inv_inertia_mul(body, r.cross(n)).cross(&r);
    inv_mass(body) + n.dot(&angular)
}

#[inline]
pub fn safe_normalize(v: Vector<Real>) -> Option<Vector<Real>> {
    let n = v.norm();
    if n.is_finite() && n > 1e-6 { Some(v / n) } else { None }
}

/// (axle, forward) on the contact plane. None when the axle is parallel to
/// the ground normal (wheel lying on its side).
pub fn wheel_basis(axle_world: &Vector<Real>, normal: &Vector<Real>) -> Option<(Vector<Real>, Vector<Real>)> {
    let axle = safe_normalize(axle_world - normal * axle_world.dot(normal))?;
    let forward = safe_normalize(normal.cross(&axle))?;
    Some((axle, forward))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rapier3d::prelude::vector;

    #[test]
    fn basis_on_flat_ground() {
        let up = vector![0.0, 1.0, 0.0];
        let (axle, forward) = wheel_basis(&vector![0.0, 0.0, -1.0], &up).unwrap();
        assert_relative_eq!(axle, vector![0.0, 0.0, -1.0], epsilon = 1e-6);
        assert_relative_eq!(forward, vector![-1.0, 0.0, 0.0], epsilon = 1e-6);
    }

    #[test]
    fn basis_drops_normal_component_of_axle() {
        let up = vector![0.0, 1.0, 0.0];
        let (axle, forward) = wheel_basis(&vector![0.0, 0.3, -1.0], &up).unwrap();
        assert_relative_eq!(axle.y, 0.0, epsilon = 1e-6);
        assert_relative_eq!(forward.dot(&up), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn basis_degenerates_when_axle_is_vertical() {
        let up = vector![0.0, 1.0, 0.0];
        assert!(wheel_basis(&up, &up).is_none());
    }
}
