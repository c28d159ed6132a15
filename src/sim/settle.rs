//! Settlement detection
//!
//! Each unlocked die runs `Airborne → PreSettle → Settling → Locked` once per
//! step, after the physics update. Two escape hatches keep every roll finite:
//! - an instability guard that unsticks a die balanced on an edge or vertex
//!   with one small random impulse
//! - a hard timeout that force-locks whatever is still moving

use std::f32::consts::TAU;

use glam::{Quat, Vec3};
use rand::Rng;
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use super::state::{DieInstance, DieState};
use crate::dice::DieSpec;
use crate::settings::Settings;
use crate::{alignment_angle, tangent_basis};

/// Shortest and longest orientation lookahead when choosing a face
const MIN_LOOKAHEAD: f32 = 0.4;
const MAX_LOOKAHEAD: f32 = 1.2;

/// Something the settlement detector wants the caller to know about
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SettleEvent {
    /// A target face was chosen
    Committed { die: usize, face: usize, value: u32 },
    /// A die came to rest on an edge or vertex and was nudged
    UnstableRestDetected { die: usize, best_alignment: f32 },
    /// A die came to rest and has a final value
    Locked { die: usize, value: u32, time: f32 },
    /// The roll ran out of time and the die was locked where it was
    SimulationTimeout { die: usize, value: u32 },
}

/// Two best face alignments for an orientation
fn top_two(spec: &DieSpec, orientation: Quat) -> (usize, f32, f32) {
    let mut best = (0, f32::NEG_INFINITY);
    let mut second = f32::NEG_INFINITY;
    for (face, a) in spec.alignments(orientation).into_iter().enumerate() {
        if a > best.1 {
            second = best.1;
            best = (face, a);
        } else if a > second {
            second = a;
        }
    }
    (best.0, best.1, second)
}

/// Whether an orientation reads unambiguously.
///
/// Unstable when the two best faces are within the tie angle of each other or
/// the best face lies outside the stability cone.
pub fn is_stable(spec: &DieSpec, orientation: Quat, settings: &Settings) -> bool {
    let (_, best, second) = top_two(spec, orientation);
    let tied = alignment_angle(second) - alignment_angle(best) < settings.tie_angle();
    !tied && best >= settings.stability_alignment()
}

/// Orientation after spinning at the current angular velocity for `t` seconds
pub fn predict_orientation(orientation: Quat, angular_velocity: Vec3, t: f32) -> Quat {
    (Quat::from_scaled_axis(angular_velocity * t) * orientation).normalize()
}

/// Lookahead scaled with angular speed
fn lookahead(angular_speed: f32, settings: &Settings) -> f32 {
    (MIN_LOOKAHEAD + 0.8 * angular_speed / settings.angular_speed_threshold)
        .clamp(MIN_LOOKAHEAD, MAX_LOOKAHEAD)
}

/// One bounded random kick, mostly rolling about a horizontal axis
pub fn nudge(body: &mut DieInstance, rng: &mut Pcg32, settings: &Settings) {
    let direction = Vec3::new(
        rng.random_range(-1.0f32..1.0),
        rng.random_range(0.2f32..1.0),
        rng.random_range(-1.0f32..1.0),
    )
    .normalize_or_zero();
    let strength: f32 = rng.random_range(0.5..1.0);
    let push = direction * strength * settings.nudge_linear;

    let heading: f32 = rng.random_range(0.0..TAU);
    let tilt: f32 = rng.random_range(-0.2..0.2);
    let axis = Vec3::new(heading.cos(), tilt, heading.sin()).normalize();
    let rate: f32 = rng.random_range(0.5..1.0);
    let spin = axis * rate * settings.nudge_angular;

    body.linear_velocity += push;
    body.angular_velocity += spin;
}

fn lock(body: &mut DieInstance, index: usize, time: f32) -> u32 {
    let (face, _) = body.spec.best_face(body.pose.orientation);
    let value = body.spec.value_of(face);
    if let Some(committed) = body.committed_face.filter(|&c| c != face) {
        log::debug!("die {index} came to rest on face {face} instead of committed face {committed}");
    }
    body.freeze();
    body.state = DieState::Locked { value };
    body.settle_time = Some(time);
    log::debug!(
        "die {index} ({}) locked on {} at {time:.2}s",
        body.spec.die_type,
        body.spec.label(value)
    );
    value
}

fn commit(body: &mut DieInstance, index: usize, face: usize, events: &mut Vec<SettleEvent>) {
    body.committed_face = Some(face);
    body.state = DieState::Settling { target_face: face };
    body.lock_time = 0.0;
    body.settling_time = 0.0;
    let value = body.spec.value_of(face);
    log::debug!("die {index} ({}) committed to face {face} ({value})", body.spec.die_type);
    events.push(SettleEvent::Committed {
        die: index,
        face,
        value,
    });
}

/// Advance one die's settlement state by `dt`
pub fn update(
    body: &mut DieInstance,
    index: usize,
    settings: &Settings,
    rng: &mut Pcg32,
    dt: f32,
    time: f32,
    events: &mut Vec<SettleEvent>,
) {
    if body.is_locked() {
        return;
    }

    let speed = body.linear_velocity.length();
    let angular_speed = body.angular_velocity.length();
    let calm = speed < settings.speed_threshold && angular_speed < settings.angular_speed_threshold;
    body.calm_time = if calm { body.calm_time + dt } else { 0.0 };
    let still = speed < settings.still_linear_epsilon
        && angular_speed < settings.still_angular_epsilon;
    body.still_time = if still { body.still_time + dt } else { 0.0 };

    // Instability guard
    if body.still_time >= settings.still_dwell
        && !body.nudged
        && !is_stable(&body.spec, body.pose.orientation, settings)
    {
        let (_, best_alignment) = body.spec.best_face(body.pose.orientation);
        nudge(body, rng, settings);
        body.nudged = true;
        if body.committed_face.is_none() {
            body.state = DieState::Airborne;
        }
        body.calm_time = 0.0;
        body.still_time = 0.0;
        body.lock_time = 0.0;
        body.settling_time = 0.0;
        log::info!(
            "die {index} ({}) resting on an edge, nudged (alignment {best_alignment:.3})",
            body.spec.die_type
        );
        events.push(SettleEvent::UnstableRestDetected {
            die: index,
            best_alignment,
        });
        return;
    }

    match body.state {
        DieState::Airborne => {
            if body.calm_time >= settings.settle_trigger_time {
                body.state = DieState::PreSettle;
                log::debug!("die {index} ({}) pre-settle at {time:.2}s", body.spec.die_type);
            }
        }
        DieState::PreSettle => {
            if !calm {
                body.state = DieState::Airborne;
                return;
            }
            let predicted = predict_orientation(
                body.pose.orientation,
                body.angular_velocity,
                lookahead(angular_speed, settings),
            );
            // Hold an ambiguous prediction while the guard can still fire
            if body.nudged || is_stable(&body.spec, predicted, settings) {
                let (face, _) = body.spec.best_face(predicted);
                commit(body, index, face, events);
            }
        }
        DieState::Settling { target_face } => {
            settle_toward(body, target_face, settings, calm, dt);
            if body.lock_time >= settings.lock_dwell {
                let value = lock(body, index, time);
                events.push(SettleEvent::Locked {
                    die: index,
                    value,
                    time,
                });
            }
        }
        DieState::Locked { .. } => {}
    }
}

/// Damp, steer toward the committed face and track the lock window.
///
/// The die counts as resting, and locks on whatever face shows, when
/// - the committed face is within the lock alignment and the die is slow
/// - it lies flush on a support facet and is still
/// - the correction window has run out and it is still on a stable pose
fn settle_toward(body: &mut DieInstance, target_face: usize, settings: &Settings, calm: bool, dt: f32) {
    body.linear_velocity *= (1.0 - settings.settle_linear_damping * dt).max(0.0);
    body.angular_velocity *= (1.0 - settings.settle_angular_damping * dt).max(0.0);
    body.settling_time += dt;

    let rest_axis = body.spec.rest_axis();
    let normal = body.pose.orientation * body.spec.face_normals[target_face];
    let alignment = normal.dot(rest_axis);
    let aligned = alignment >= settings.lock_alignment(body.spec.hull.rest_alignment);
    let flush = body.spec.hull.floor_alignment(body.pose.orientation) >= settings.flush_alignment();
    let expired = body.settling_time >= settings.correction_window;

    // A flush die is held by its facet, so steering it only feeds the contacts
    if calm && !aligned && !flush && !expired {
        let axis = normal
            .cross(rest_axis)
            .try_normalize()
            .unwrap_or_else(|| tangent_basis(rest_axis).0);
        let accel = (settings.correction_gain * alignment_angle(alignment)).min(settings.max_correction);
        body.angular_velocity += axis * accel * dt;
    }

    let speed = body.linear_velocity.length();
    let angular_speed = body.angular_velocity.length();
    let slow = speed < settings.lock_epsilon && angular_speed < settings.lock_epsilon;
    let still = speed < settings.still_linear_epsilon && angular_speed < settings.still_angular_epsilon;
    let resting = (aligned && slow)
        || (flush && still)
        || (expired
            && still
            && (body.nudged || is_stable(&body.spec, body.pose.orientation, settings)));
    body.lock_time = if resting { body.lock_time + dt } else { 0.0 };
}

/// Lock every die still moving and flag it as timed out
pub fn force_lock_all(bodies: &mut [DieInstance], time: f32, events: &mut Vec<SettleEvent>) {
    for (index, body) in bodies.iter_mut().enumerate() {
        if body.is_locked() {
            continue;
        }
        body.timed_out = true;
        let value = lock(body, index, time);
        log::warn!(
            "die {index} ({}) timed out after {time:.2}s, locked on {}",
            body.spec.die_type,
            body.spec.label(value)
        );
        events.push(SettleEvent::SimulationTimeout { die: index, value });
    }
}
