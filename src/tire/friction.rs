// ==============================================================================
// friction.rs — WHEEL FRICTION IMPULSES (SIDE + ROLLING, SKID SCALING)
// ------------------------------------------------------------------------------
// One pass over all wheels, after suspension forces are known:
//
// 1) side impulse: bilateral constraint along the contact-plane axle,
//       j_side = -0.2 * v_rel · axle / (1/m_chassis + 1/m_ground)
// 2) rolling impulse along forward = n × axle:
//       j_roll = clamp(-v_rel · fwd / (D_chassis + D_ground), ±brake·dt)
//              + engine·dt
//    so a brake alone can at most cancel the contact velocity.
// 3) friction budget per wheel: suspension_force · dt · friction_slip.
//    Demand = |(0.5·j_roll, j_side)|. When demand / budget passes the wheel's
//    sliding threshold the wheel is SLIDING and, if any wheel slides, every
//    wheel with side grip is scaled by its skid factor.
//
// Nothing here touches the world; the vehicle applies the impulses.
// ==============================================================================

use rapier3d::prelude::{Point, Real, RigidBody, RigidBodyHandle, RigidBodySet, Vector};

use crate::tire::kinematics::{impulse_denominator, inv_mass, point_velocity, wheel_basis};

const SIDE_CONTACT_DAMPING: Real = 0.2;
const FORWARD_FACTOR: Real = 0.5;
const SIDE_FACTOR: Real = 1.0;

/// Per-wheel inputs gathered after the suspension pass.
#[derive(Debug, Clone, Copy)]
pub struct FrictionInput {
    pub in_contact: bool,
    pub ground: Option<RigidBodyHandle>,
    pub point: Point<Real>,
    pub normal: Vector<Real>,
    pub axle_world: Vector<Real>,   // steered axle, not yet projected
    pub suspension_force: Real,
    pub engine_force: Real,
    pub brake_force: Real,
    pub friction_slip: Real,
    pub sliding_threshold: Real,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelFriction {
    pub axle: Vector<Real>,
    pub forward: Vector<Real>,
    pub side_impulse: Real,
    pub forward_impulse: Real,
    pub skid: Real,          // 1 = full grip
    pub sliding: bool,
}

impl Default for WheelFriction {
    fn default() -> Self {
        Self {
            axle: Vector::zeros(),
            forward: Vector::zeros(),
            side_impulse: 0.0,
            forward_impulse: 0.0,
            skid: 1.0,
            sliding: false,
        }
    }
}

fn relative_velocity(chassis: &RigidBody, ground: Option<&RigidBody>, p: &Point<Real>) -> Vector<Real> {
    let v_ground = ground.map(|g| point_velocity(g, p)).unwrap_or_else(Vector::zeros);
    point_velocity(chassis, p) - v_ground
}

fn side_impulse(chassis: &RigidBody, ground: Option<&RigidBody>, p: &Point<Real>, axle: &Vector<Real>) -> Real {
    let inv = inv_mass(chassis) + ground.map(inv_mass).unwrap_or(0.0);
    if inv <= Real::EPSILON {
        return 0.0;
    }
    let rel_vel = axle.dot(&relative_velocity(chassis, ground, p));
    -SIDE_CONTACT_DAMPING * rel_vel / inv
}

fn rolling_impulse(
    chassis: &RigidBody,
    ground: Option<&RigidBody>,
    p: &Point<Real>,
    forward: &Vector<Real>,
    max_impulse: Real,
) -> Real {
    let denom = impulse_denominator(chassis, p, forward)
        + ground.map(|g| impulse_denominator(g, p, forward)).unwrap_or(0.0);
    if denom <= Real::EPSILON {
        return 0.0;
    }
    let v_rel = forward.dot(&relative_velocity(chassis, ground, p));
    (-v_rel / denom).clamp(-max_impulse, max_impulse)
}

/// Side and forward impulses for every wheel, with skid scaling applied.
pub fn solve_friction(chassis: &RigidBody, bodies: &RigidBodySet, inputs: &[FrictionInput], dt: Real) -> Vec<WheelFriction> {
    let mut out = vec![WheelFriction::default(); inputs.len()];
    let mut any_sliding = false;

    for (w, input) in out.iter_mut().zip(inputs) {
        if !input.in_contact {
            continue;
        }
        let Some((axle, forward)) = wheel_basis(&input.axle_world, &input.normal) else {
            continue;
        };
        let ground = input.ground.and_then(|h| bodies.get(h));

        w.axle = axle;
        w.forward = forward;
        w.side_impulse = side_impulse(chassis, ground, &input.point, &axle) * SIDE_FACTOR;

        let brake_cap = input.brake_force.abs() * dt;
        let mut rolling = if brake_cap > 0.0 {
            rolling_impulse(chassis, ground, &input.point, &forward, brake_cap)
        } else {
            0.0
        };
        rolling += input.engine_force * dt;
        w.forward_impulse = rolling;

        let budget = input.suspension_force * dt * input.friction_slip;
        let x = w.forward_impulse * FORWARD_FACTOR;
        let y = w.side_impulse * SIDE_FACTOR;
        let demand = (x * x + y * y).sqrt();

        if budget > Real::EPSILON {
            let ratio = demand / budget;
            if ratio > input.sliding_threshold {
                w.sliding = true;
                w.skid = (1.0 / ratio).min(1.0);
            }
        } else if demand > 0.0 {
            w.sliding = true;
            w.skid = 0.0;
        }
        any_sliding |= w.sliding;
    }

    if any_sliding {
        for w in out.iter_mut() {
            if w.side_impulse != 0.0 && w.skid < 1.0 {
                w.forward_impulse *= w.skid;
                w.side_impulse *= w.skid;
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use crate::body::{BodyDesc, ShapeDesc, ShapePart};
    use crate::config::WorldConfig;
    use crate::physics::PhysicsWorld;
    use rapier3d::prelude::*;

    fn chassis_set(linvel: Vector<Real>) -> (RigidBodySet, RigidBodyHandle) {
        let config = WorldConfig { gravity: [0.0; 3], ..WorldConfig::default() };
        let mut world = PhysicsWorld::new(&config);
        let desc = BodyDesc::dynamic(
            1000.0,
            vec![ShapePart::centered(ShapeDesc::Box { half_extents: [0.75, 0.125, 0.375] })],
        )
        .never_sleep();
        let h = world.insert_body(&desc, Isometry::identity());
        world.step_fixed(1.0 / 60.0);
        if let Some(body) = world.bodies.get_mut(h) {
            body.set_linvel(linvel, true);
        }
        (world.bodies, h)
    }

    fn input(engine: Real, brake: Real) -> FrictionInput {
        FrictionInput {
            in_contact: true,
            ground: None,
            point: point![0.0, -0.3, 0.0],
            normal: vector![0.0, 1.0, 0.0],
            axle_world: vector![0.0, 0.0, -1.0],
            suspension_force: 2500.0,
            engine_force: engine,
            brake_force: brake,
            friction_slip: 5.5,
            sliding_threshold: 1.0,
        }
    }

    #[test]
    fn airborne_wheel_has_no_friction() {
        let (bodies, h) = chassis_set(Vector::zeros());
        let mut i = input(1000.0, 0.0);
        i.in_contact = false;
        let out = solve_friction(&bodies[h], &bodies, &[i], 1.0 / 60.0);
        assert_eq!(out[0], WheelFriction::default());
    }

    #[test]
    fn engine_only_gives_engine_impulse() {
        let (bodies, h) = chassis_set(Vector::zeros());
        let dt = 1.0 / 60.0;
        let out = solve_friction(&bodies[h], &bodies, &[input(600.0, 0.0)], dt);
        assert_relative_eq!(out[0].forward_impulse, 600.0 * dt, epsilon = 1e-4);
        assert!(!out[0].sliding);
    }

    #[test]
    fn brake_opposes_motion_and_never_exceeds_cap() {
        // forward is -X, chassis rolling forward
        let (bodies, h) = chassis_set(vector![-5.0, 0.0, 0.0]);
        let dt = 1.0 / 60.0;
        let out = solve_friction(&bodies[h], &bodies, &[input(0.0, 600.0)], dt);
        // impulse points backwards along forward, magnitude capped at brake * dt
        assert!(out[0].forward_impulse < 0.0);
        assert_relative_eq!(out[0].forward_impulse, -600.0 * dt, epsilon = 1e-4);
    }

    #[test]
    fn brake_cannot_reverse_a_slow_wheel() {
        let (bodies, h) = chassis_set(vector![-0.01, 0.0, 0.0]);
        let dt = 1.0 / 60.0;
        let out = solve_friction(&bodies[h], &bodies, &[input(0.0, 1.0e6)], dt);
        // at most the impulse that cancels 0.01 m/s on 1000 kg, never past it
        assert!(out[0].forward_impulse <= 0.0);
        assert!(out[0].forward_impulse >= -0.01 * 1000.0 - 1e-3);
    }

    #[test]
    fn sideways_slide_marks_wheel_sliding() {
        let (bodies, h) = chassis_set(vector![0.0, 0.0, 20.0]);
        let mut i = input(0.0, 0.0);
        i.suspension_force = 100.0;
        let out = solve_friction(&bodies[h], &bodies, &[i], 1.0 / 60.0);
        assert!(out[0].sliding);
        assert!(out[0].skid < 1.0);
    }
}
