//! Dice Physics - polyhedral dice rolling and face-value resolution
//!
//! Core modules:
//! - `dice`: Die geometry, face numbering, collision hulls, per-type registry
//! - `sim`: Deterministic rigid-body world and settlement state machine
//! - `reconcile`: Physics vs. externally supplied value policies
//! - `roll`: Roll requests, outcomes and the frame-stepped driver
//! - `settings`: Caller-supplied tuning

pub mod dice;
pub mod error;
pub mod reconcile;
pub mod roll;
pub mod settings;
pub mod sim;

pub use dice::{DieRegistry, DieSpec, DieType};
pub use error::{DiceError, DiceResult};
pub use reconcile::{Divergence, ReconcilePolicy};
pub use roll::{
    DiceSimulation, DieRequest, RollDiagnostics, RollOutcome, RollProgress, RollRequest,
    ThrowMode, ThrowParams,
};
pub use settings::{Arena, Settings};

use glam::{Quat, Vec3};

/// Simulation configuration constants
pub mod consts {
    /// Fixed simulation timestep (60 Hz)
    pub const SIM_DT: f32 = 1.0 / 60.0;
    /// Maximum substeps per frame to prevent spiral of death
    pub const MAX_SUBSTEPS: u32 = 8;
    /// Largest frame delta accepted by the frame driver
    pub const MAX_FRAME_DT: f32 = 0.1;

    /// Vertices closer than this to a surface already generate contacts
    pub const CONTACT_MARGIN: f32 = 0.01;
    /// Penetration tolerated before positional correction kicks in
    pub const PENETRATION_SLOP: f32 = 0.005;
    /// Fraction of the remaining penetration removed per step
    pub const POSITION_CORRECTION: f32 = 0.8;
    /// Closing speed below which contacts do not bounce
    pub const BOUNCE_THRESHOLD: f32 = 1.0;

    /// Face-value sort: normals whose y differ by less than this share a level
    pub const LEVEL_TOLERANCE: f32 = 0.3;
}

/// Azimuth of a direction around the Y axis, `atan2(z, x)` in (-π, π]
#[inline]
pub fn azimuth(v: Vec3) -> f32 {
    // -0.0 + 0.0 is +0.0, so a negative-zero z still maps to π
    (v.z + 0.0).atan2(v.x)
}

/// Angle in radians for an alignment (cosine), clamped to the valid domain
#[inline]
pub fn alignment_angle(alignment: f32) -> f32 {
    alignment.clamp(-1.0, 1.0).acos()
}

/// Advance an orientation by an angular velocity over `dt`.
///
/// `q' = normalize(q + dt/2 · ω q)` with `ω` as a pure quaternion.
#[inline]
pub fn integrate_rotation(rotation: Quat, angular_velocity: Vec3, dt: f32) -> Quat {
    let omega = Quat::from_xyzw(angular_velocity.x, angular_velocity.y, angular_velocity.z, 0.0);
    let dq = omega * rotation;
    let half_dt = 0.5 * dt;
    Quat::from_xyzw(
        rotation.x + dq.x * half_dt,
        rotation.y + dq.y * half_dt,
        rotation.z + dq.z * half_dt,
        rotation.w + dq.w * half_dt,
    )
    .normalize()
}

/// Two unit vectors orthogonal to `n` and to each other
pub fn tangent_basis(n: Vec3) -> (Vec3, Vec3) {
    let helper = if n.x.abs() < 0.57 { Vec3::X } else { Vec3::Y };
    let t1 = n.cross(helper).normalize();
    let t2 = n.cross(t1);
    (t1, t2)
}
