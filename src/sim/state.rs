//! World state and body types
//!
//! Everything a running roll owns lives here. A world is created per roll and
//! dropped as a whole when the roll ends, is cancelled or is replaced.

use std::sync::Arc;

use glam::{Quat, Vec3};
use rand::SeedableRng;
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use crate::dice::DieSpec;
use crate::settings::{Arena, Settings};

/// Settlement phase of a die
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DieState {
    /// Tumbling, or calm for too short a time
    Airborne,
    /// Calm long enough; the target face is chosen next step
    PreSettle,
    /// Guided toward a committed face
    Settling { target_face: usize },
    /// Frozen with a final value
    Locked { value: u32 },
}

/// Position and orientation of a body
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    pub orientation: Quat,
}

impl Pose {
    pub fn new(position: Vec3, orientation: Quat) -> Self {
        Self {
            position,
            orientation,
        }
    }

    /// Body-space point to world space
    #[inline]
    pub fn to_world(&self, local: Vec3) -> Vec3 {
        self.position + self.orientation * local
    }

    /// World-space point to body space
    #[inline]
    pub fn to_local(&self, world: Vec3) -> Vec3 {
        self.orientation.inverse() * (world - self.position)
    }
}

/// A die in flight or at rest
#[derive(Debug, Clone)]
pub struct DieInstance {
    pub id: u32,
    pub spec: Arc<DieSpec>,
    pub pose: Pose,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
    pub mass: f32,
    /// Zero once locked
    pub inv_mass: f32,
    /// Isotropic, zero once locked
    pub inv_inertia: f32,
    pub state: DieState,
    /// Face chosen on entering settlement, at most once per roll
    pub committed_face: Option<usize>,
    /// The single unstick impulse has been spent
    pub nudged: bool,
    /// Locked by the roll timeout rather than by coming to rest
    pub timed_out: bool,
    /// Simulated time at which the die locked
    pub settle_time: Option<f32>,
    /// Time spent continuously below the calm thresholds
    pub calm_time: f32,
    /// Time spent continuously near zero velocity
    pub still_time: f32,
    /// Time spent continuously inside the lock window
    pub lock_time: f32,
    /// Time spent in `Settling`, which bounds the corrective phase
    pub settling_time: f32,
    /// Touched the ground during the last step
    pub grounded: bool,
}

impl DieInstance {
    pub fn new(id: u32, spec: Arc<DieSpec>, mass: f32, pose: Pose) -> Self {
        let inertia = mass * spec.hull.inertia_per_mass;
        Self {
            id,
            spec,
            pose,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            mass,
            inv_mass: 1.0 / mass,
            inv_inertia: 1.0 / inertia,
            state: DieState::Airborne,
            committed_face: None,
            nudged: false,
            timed_out: false,
            settle_time: None,
            calm_time: 0.0,
            still_time: 0.0,
            lock_time: 0.0,
            settling_time: 0.0,
            grounded: false,
        }
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        matches!(self.state, DieState::Locked { .. })
    }

    /// Final value, once locked
    pub fn result_value(&self) -> Option<u32> {
        match self.state {
            DieState::Locked { value } => Some(value),
            _ => None,
        }
    }

    /// Stop moving and stop responding to impulses
    pub fn freeze(&mut self) {
        self.linear_velocity = Vec3::ZERO;
        self.angular_velocity = Vec3::ZERO;
        self.inv_mass = 0.0;
        self.inv_inertia = 0.0;
    }

    /// Hull vertices in world space
    pub fn world_vertices(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.spec.hull.vertices.iter().map(|&v| self.pose.to_world(v))
    }

    #[inline]
    pub fn bounding_radius(&self) -> f32 {
        self.spec.hull.bounding_radius
    }

    /// Velocity of a world-space point attached to the body
    #[inline]
    pub fn point_velocity(&self, point: Vec3) -> Vec3 {
        self.linear_velocity + self.angular_velocity.cross(point - self.pose.position)
    }
}

/// Which static surface a boundary is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundaryKind {
    Ground,
    Wall,
    Ceiling,
}

/// Static plane `normal · p = offset` with `normal` pointing into the arena
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Boundary {
    pub kind: BoundaryKind,
    pub normal: Vec3,
    pub offset: f32,
}

impl Boundary {
    /// Positive inside the arena
    #[inline]
    pub fn distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) - self.offset
    }
}

/// Ground, four walls and a ceiling around the arena
pub fn arena_boundaries(arena: &Arena) -> Vec<Boundary> {
    let wall = |normal: Vec3, extent: f32| Boundary {
        kind: BoundaryKind::Wall,
        normal,
        offset: -extent,
    };
    vec![
        Boundary {
            kind: BoundaryKind::Ground,
            normal: Vec3::Y,
            offset: 0.0,
        },
        wall(Vec3::X, arena.half_width),
        wall(Vec3::NEG_X, arena.half_width),
        wall(Vec3::Z, arena.half_depth),
        wall(Vec3::NEG_Z, arena.half_depth),
        Boundary {
            kind: BoundaryKind::Ceiling,
            normal: Vec3::NEG_Y,
            offset: -arena.ceiling,
        },
    ]
}

/// Contact response coefficients
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub restitution: f32,
    pub ground_friction: f32,
    pub wall_friction: f32,
    pub die_friction: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub rolling_damping: f32,
}

impl Material {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            restitution: settings.restitution,
            ground_friction: settings.ground_friction,
            wall_friction: settings.wall_friction,
            die_friction: settings.die_friction,
            linear_damping: settings.linear_damping,
            angular_damping: settings.angular_damping,
            rolling_damping: settings.rolling_damping,
        }
    }

    pub fn boundary_friction(&self, kind: BoundaryKind) -> f32 {
        match kind {
            BoundaryKind::Ground => self.ground_friction,
            BoundaryKind::Wall | BoundaryKind::Ceiling => self.wall_friction,
        }
    }
}

/// Everything simulated during one roll
#[derive(Debug, Clone)]
pub struct CollisionWorld {
    /// Dice in request order
    pub bodies: Vec<DieInstance>,
    pub boundaries: Vec<Boundary>,
    pub gravity: Vec3,
    pub material: Material,
    pub solver_iterations: u32,
    /// Simulated seconds since the roll started
    pub time: f32,
    pub steps: u64,
    /// Seed the RNG was created from
    pub seed: u64,
    pub rng: Pcg32,
    next_id: u32,
}

impl CollisionWorld {
    pub fn new(settings: &Settings, seed: u64) -> Self {
        Self {
            bodies: Vec::new(),
            boundaries: arena_boundaries(&settings.arena),
            gravity: Vec3::new(0.0, -settings.gravity, 0.0),
            material: Material::from_settings(settings),
            solver_iterations: settings.solver_iterations,
            time: 0.0,
            steps: 0,
            seed,
            rng: Pcg32::seed_from_u64(seed),
            next_id: 1,
        }
    }

    /// Add a die and return its index
    pub fn spawn(
        &mut self,
        spec: Arc<DieSpec>,
        mass: f32,
        pose: Pose,
        linear_velocity: Vec3,
        angular_velocity: Vec3,
    ) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        let mut body = DieInstance::new(id, spec, mass, pose);
        body.linear_velocity = linear_velocity;
        body.angular_velocity = angular_velocity;
        self.bodies.push(body);
        self.bodies.len() - 1
    }

    pub fn all_locked(&self) -> bool {
        self.bodies.iter().all(DieInstance::is_locked)
    }
}
