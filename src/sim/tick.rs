//! Fixed timestep simulation tick
//!
//! Advances a roll deterministically: same world, same seed, same steps,
//! same result.

use super::collision;
use super::settle::{self, SettleEvent};
use super::state::CollisionWorld;
use crate::integrate_rotation;
use crate::settings::Settings;

/// Slack when comparing accumulated time against the timeout
const TIME_EPSILON: f32 = 1e-4;

/// Advance the world by one fixed timestep
pub fn tick(world: &mut CollisionWorld, settings: &Settings, dt: f32) -> Vec<SettleEvent> {
    let mut events = Vec::new();
    world.steps += 1;
    world.time += dt;

    // Gravity
    let gravity = world.gravity;
    for body in world.bodies.iter_mut().filter(|b| !b.is_locked()) {
        body.linear_velocity += gravity * dt;
    }

    // Contacts
    let mut manifolds = collision::find_contacts(world);
    for body in world.bodies.iter_mut() {
        body.grounded = false;
    }
    for m in manifolds.iter().filter(|m| m.ground) {
        world.bodies[m.a].grounded = true;
    }

    // Impulses
    collision::prepare(&mut manifolds, &world.bodies, world.material.restitution);
    for _ in 0..world.solver_iterations {
        collision::solve_velocities(&mut manifolds, &mut world.bodies);
    }

    // Damping, with rolling resistance on the ground
    let material = world.material;
    for body in world.bodies.iter_mut().filter(|b| !b.is_locked()) {
        body.linear_velocity *= (1.0 - material.linear_damping * dt).max(0.0);
        let angular_damping = if body.grounded {
            material.angular_damping + material.rolling_damping
        } else {
            material.angular_damping
        };
        body.angular_velocity *= (1.0 - angular_damping * dt).max(0.0);
    }

    collision::correct_positions(&manifolds, &mut world.bodies);

    // Integrate
    for body in world.bodies.iter_mut().filter(|b| !b.is_locked()) {
        body.pose.position += body.linear_velocity * dt;
        body.pose.orientation = integrate_rotation(body.pose.orientation, body.angular_velocity, dt);
    }

    // Settlement
    let time = world.time;
    for (index, body) in world.bodies.iter_mut().enumerate() {
        settle::update(body, index, settings, &mut world.rng, dt, time, &mut events);
    }

    if time + TIME_EPSILON >= settings.max_duration && !world.all_locked() {
        settle::force_lock_all(&mut world.bodies, time, &mut events);
    }

    events
}
