//! Simulation settings
//!
//! Every tuning value a caller may change, loaded from JSON. Missing fields
//! fall back to the defaults below.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DiceError, DiceResult};
use crate::reconcile::ReconcilePolicy;

/// Margin kept below a hull's worst rest alignment when deriving the lock threshold
const LOCK_MARGIN: f32 = 0.01;

/// Box the dice are thrown into, centred on the origin with the floor at y = 0
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Arena {
    /// Wall distance from the centre along X
    pub half_width: f32,
    /// Wall distance from the centre along Z
    pub half_depth: f32,
    /// Ceiling height
    pub ceiling: f32,
}

impl Default for Arena {
    fn default() -> Self {
        Self {
            half_width: 6.0,
            half_depth: 4.0,
            ceiling: 12.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // === Throw ===
    /// Multiplier on the base throw speed
    pub throw_force: f32,
    /// Multiplier on the base spin rate
    pub spin_intensity: f32,

    // === Dice ===
    /// Circumradius of every die
    pub die_radius: f32,
    pub die_mass: f32,

    // === World ===
    /// Downward acceleration
    pub gravity: f32,
    pub restitution: f32,
    pub ground_friction: f32,
    pub wall_friction: f32,
    pub die_friction: f32,
    /// Per-second velocity decay applied to every body
    pub linear_damping: f32,
    pub angular_damping: f32,
    /// Extra per-second angular decay while touching the ground
    pub rolling_damping: f32,
    pub solver_iterations: u32,
    pub arena: Arena,

    // === Settlement ===
    /// Below this linear speed a die counts as calm
    pub speed_threshold: f32,
    /// Below this angular speed a die counts as calm
    pub angular_speed_threshold: f32,
    /// Calm time before a face is committed
    pub settle_trigger_time: f32,
    /// Near-zero speeds watched by the instability guard
    pub still_linear_epsilon: f32,
    pub still_angular_epsilon: f32,
    pub still_dwell: f32,
    /// Two best faces closer than this count as an edge balance
    pub tie_angle_deg: f32,
    /// Best face further than this from the rest axis counts as unstable
    pub stability_cone_deg: f32,
    /// Alignment needed to lock, before hull adjustment
    pub lock_angle_deg: f32,
    pub lock_epsilon: f32,
    pub lock_dwell: f32,
    /// Extra damping while settling
    pub settle_linear_damping: f32,
    pub settle_angular_damping: f32,
    /// Corrective angular acceleration per radian of error
    pub correction_gain: f32,
    pub max_correction: f32,
    /// Settling time after which no more correction is applied and a die at
    /// rest locks wherever it lies
    pub correction_window: f32,
    /// Lowest facet within this angle of straight down counts as lying flush
    pub flush_angle_deg: f32,
    /// Bounds of the single unstick impulse
    pub nudge_linear: f32,
    pub nudge_angular: f32,
    /// Simulated seconds before unlocked dice are force-locked
    pub max_duration: f32,

    // === Results ===
    pub policy: ReconcilePolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            throw_force: 1.0,
            spin_intensity: 1.0,

            die_radius: 1.0,
            die_mass: 1.0,

            gravity: 30.0,
            restitution: 0.3,
            ground_friction: 0.6,
            wall_friction: 0.2,
            die_friction: 0.35,
            linear_damping: 0.1,
            angular_damping: 0.1,
            rolling_damping: 2.0,
            solver_iterations: 10,
            arena: Arena::default(),

            speed_threshold: 0.6,
            angular_speed_threshold: 1.5,
            settle_trigger_time: 0.15,
            still_linear_epsilon: 0.15,
            still_angular_epsilon: 0.3,
            still_dwell: 0.15,
            tie_angle_deg: 10.0,
            stability_cone_deg: 30.0,
            lock_angle_deg: 8.0,
            lock_epsilon: 0.02,
            lock_dwell: 0.1,
            settle_linear_damping: 6.0,
            settle_angular_damping: 8.0,
            correction_gain: 20.0,
            max_correction: 40.0,
            correction_window: 1.0,
            flush_angle_deg: 2.0,
            nudge_linear: 1.0,
            nudge_angular: 3.0,
            max_duration: 8.0,

            policy: ReconcilePolicy::PhysicsAuthoritative,
        }
    }
}

impl Settings {
    /// Reject values the simulation cannot run with
    pub fn validate(&self) -> DiceResult<()> {
        let positive = [
            ("throw_force", self.throw_force),
            ("die_radius", self.die_radius),
            ("die_mass", self.die_mass),
            ("gravity", self.gravity),
            ("arena.half_width", self.arena.half_width),
            ("arena.half_depth", self.arena.half_depth),
            ("arena.ceiling", self.arena.ceiling),
            ("speed_threshold", self.speed_threshold),
            ("angular_speed_threshold", self.angular_speed_threshold),
            ("settle_trigger_time", self.settle_trigger_time),
            ("still_linear_epsilon", self.still_linear_epsilon),
            ("still_angular_epsilon", self.still_angular_epsilon),
            ("still_dwell", self.still_dwell),
            ("tie_angle_deg", self.tie_angle_deg),
            ("stability_cone_deg", self.stability_cone_deg),
            ("lock_angle_deg", self.lock_angle_deg),
            ("lock_epsilon", self.lock_epsilon),
            ("lock_dwell", self.lock_dwell),
            ("correction_window", self.correction_window),
            ("flush_angle_deg", self.flush_angle_deg),
            ("max_duration", self.max_duration),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(DiceError::InvalidConfig(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }

        let non_negative = [
            ("spin_intensity", self.spin_intensity),
            ("restitution", self.restitution),
            ("ground_friction", self.ground_friction),
            ("wall_friction", self.wall_friction),
            ("die_friction", self.die_friction),
            ("linear_damping", self.linear_damping),
            ("angular_damping", self.angular_damping),
            ("rolling_damping", self.rolling_damping),
            ("settle_linear_damping", self.settle_linear_damping),
            ("settle_angular_damping", self.settle_angular_damping),
            ("correction_gain", self.correction_gain),
            ("max_correction", self.max_correction),
            ("nudge_linear", self.nudge_linear),
            ("nudge_angular", self.nudge_angular),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(DiceError::InvalidConfig(format!(
                    "{name} must be zero or positive, got {value}"
                )));
            }
        }

        if self.restitution > 1.0 {
            return Err(DiceError::InvalidConfig(format!(
                "restitution must not exceed 1, got {}",
                self.restitution
            )));
        }
        if self.solver_iterations == 0 {
            return Err(DiceError::InvalidConfig(
                "solver_iterations must be at least 1".to_string(),
            ));
        }
        if self.stability_cone_deg >= 90.0
            || self.lock_angle_deg >= 90.0
            || self.flush_angle_deg >= 90.0
        {
            return Err(DiceError::InvalidConfig(
                "angles must stay below 90 degrees".to_string(),
            ));
        }
        let min_extent = self.arena.half_width.min(self.arena.half_depth);
        if min_extent < 2.0 * self.die_radius || self.arena.ceiling < 4.0 * self.die_radius {
            return Err(DiceError::InvalidConfig(format!(
                "arena {:?} is too small for dice of radius {}",
                self.arena, self.die_radius
            )));
        }
        Ok(())
    }

    /// Parse and validate settings from JSON
    pub fn from_json(json: &str) -> DiceResult<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_json(&self) -> DiceResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load settings from a JSON file
    pub fn load(path: &Path) -> DiceResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            DiceError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        let settings = Self::from_json(&json)?;
        log::info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Alignment a die with the given hull rest alignment must reach to lock.
    ///
    /// Hulls that rest flush use the lock angle as is; hulls whose best rest
    /// falls short of it lock just below their own rest alignment.
    pub fn lock_alignment(&self, rest_alignment: f32) -> f32 {
        let lock = self.lock_angle_deg.to_radians().cos();
        if rest_alignment >= lock {
            lock
        } else {
            rest_alignment - LOCK_MARGIN
        }
    }

    /// Alignment with straight down at which a support facet lies flush
    pub fn flush_alignment(&self) -> f32 {
        self.flush_angle_deg.to_radians().cos()
    }

    /// Smallest alignment still inside the stability cone
    pub fn stability_alignment(&self) -> f32 {
        self.stability_cone_deg.to_radians().cos()
    }

    pub fn tie_angle(&self) -> f32 {
        self.tie_angle_deg.to_radians()
    }
}
