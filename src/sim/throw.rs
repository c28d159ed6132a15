//! Initial poses for a roll
//!
//! Animated rolls throw every die from the arena's negative-X side toward the
//! centre with random orientation and spin. Instant rolls place each die at
//! rest on the facet that shows a chosen face.

use std::f32::consts::TAU;
use std::sync::Arc;

use glam::{Quat, Vec2, Vec3};
use rand::Rng;
use rand_pcg::Pcg32;

use super::state::{CollisionWorld, Pose};
use crate::dice::DieSpec;
use crate::settings::Settings;

/// Throw speed at unit force
pub const BASE_THROW_SPEED: f32 = 8.0;
/// Spin rate at unit spin, rad/s
pub const BASE_SPIN: f32 = 12.0;
/// Gap between spawn slots, in die radii
const SLOT_SPACING: f32 = 2.5;

/// Uniformly distributed rotation
pub fn random_orientation(rng: &mut Pcg32) -> Quat {
    let u1: f32 = rng.random();
    let u2: f32 = rng.random::<f32>() * TAU;
    let u3: f32 = rng.random::<f32>() * TAU;
    let a = (1.0 - u1).sqrt();
    let b = u1.sqrt();
    Quat::from_xyzw(a * u2.sin(), a * u2.cos(), b * u3.sin(), b * u3.cos()).normalize()
}

/// Pose lying on the support facet that shows `face` best, touching the floor
pub fn resting_pose(spec: &DieSpec, face: usize, xz: Vec2, yaw: f32) -> Pose {
    let plane = spec
        .hull
        .resting_plane(spec.face_normals[face], spec.rest_axis());
    let tilt = Quat::from_rotation_arc(plane.normal, Vec3::NEG_Y);
    let orientation = (Quat::from_rotation_y(yaw) * tilt).normalize();
    let height = spec.hull.support_height(orientation);
    Pose::new(Vec3::new(xz.x, height, xz.y), orientation)
}

/// Spawn slots: columns along X, rows along Z, stacked layers along Y
#[derive(Debug, Clone, Copy)]
struct SlotGrid {
    spacing: f32,
    cols: usize,
    rows: usize,
    layers: usize,
}

impl SlotGrid {
    fn new(settings: &Settings) -> Self {
        let r = settings.die_radius;
        let arena = settings.arena;
        let spacing = SLOT_SPACING * r;
        let fit = |extent: f32| (extent / spacing).floor().max(0.0) as usize + 1;
        Self {
            spacing,
            cols: fit(2.0 * arena.half_width - 3.0 * r),
            rows: fit(2.0 * arena.half_depth - 3.0 * r),
            layers: fit(arena.ceiling - 5.0 * r),
        }
    }

    fn per_layer(&self) -> usize {
        self.cols * self.rows
    }
}

/// Most dice the arena can spawn without overlapping
pub fn capacity(settings: &Settings) -> usize {
    let grid = SlotGrid::new(settings);
    grid.per_layer() * grid.layers
}

/// Throw positions filled from the negative-X wall inward
fn throw_slots(count: usize, settings: &Settings) -> Vec<Vec3> {
    let r = settings.die_radius;
    let arena = settings.arena;
    let grid = SlotGrid::new(settings);
    let s = grid.spacing;

    (0..count)
        .map(|i| {
            let layer = i / grid.per_layer();
            let k = i % grid.per_layer();
            let (col, row) = (k / grid.rows, k % grid.rows);
            let col_start = layer * grid.per_layer() + col * grid.rows;
            let in_col = (count - col_start).min(grid.rows);
            let x = -arena.half_width + 1.5 * r + col as f32 * s;
            let z = (row as f32 - (in_col as f32 - 1.0) / 2.0) * s;
            let stagger = if row % 2 == 1 { 0.5 * r } else { 0.0 };
            let y = (3.0 * r + layer as f32 * s + stagger).min(arena.ceiling - 1.5 * r);
            Vec3::new(x, y, z)
        })
        .collect()
}

/// Resting positions on a floor grid centred in the arena, with the lift
/// for dice beyond the first layer
fn grid_slots(count: usize, settings: &Settings) -> Vec<(Vec2, f32)> {
    let grid = SlotGrid::new(settings);
    let s = grid.spacing;

    (0..count)
        .map(|i| {
            let layer = i / grid.per_layer();
            let k = i % grid.per_layer();
            let (row, col) = (k / grid.cols, k % grid.cols);
            let in_layer = (count - layer * grid.per_layer()).min(grid.per_layer());
            let used_cols = in_layer.min(grid.cols);
            let used_rows = in_layer.div_ceil(grid.cols);
            let x = (col as f32 - (used_cols as f32 - 1.0) / 2.0) * s;
            let z = (row as f32 - (used_rows as f32 - 1.0) / 2.0) * s;
            (Vec2::new(x, z), layer as f32 * s)
        })
        .collect()
}

/// Spawn tumbling dice
pub fn spawn_animated(
    world: &mut CollisionWorld,
    specs: &[Arc<DieSpec>],
    settings: &Settings,
    force: f32,
    spin: f32,
) {
    let speed = BASE_THROW_SPEED * settings.throw_force * force;
    let spin_rate = BASE_SPIN * settings.spin_intensity * spin;

    for (spec, position) in specs.iter().zip(throw_slots(specs.len(), settings)) {
        let orientation = random_orientation(&mut world.rng);
        let toward_centre = Vec3::new(-position.x, 0.0, -position.z * 0.5).normalize_or(Vec3::X);
        let direction = (toward_centre + Vec3::new(0.0, 0.15, 0.0)).normalize();
        let jitter: f32 = world.rng.random_range(0.85..1.15);
        let velocity = direction * speed * jitter;

        let axis = random_orientation(&mut world.rng) * Vec3::X;
        let rate: f32 = world.rng.random_range(0.6..1.0);
        let angular_velocity = axis * spin_rate * rate;

        world.spawn(
            Arc::clone(spec),
            settings.die_mass,
            Pose::new(position, orientation),
            velocity,
            angular_velocity,
        );
    }
}

/// Spawn dice already at rest. `faces` holds the face each die should show,
/// or `None` for a random face.
pub fn spawn_instant(
    world: &mut CollisionWorld,
    specs: &[Arc<DieSpec>],
    faces: &[Option<usize>],
    settings: &Settings,
) {
    for (i, (spec, (xz, lift))) in specs
        .iter()
        .zip(grid_slots(specs.len(), settings))
        .enumerate()
    {
        let face = match faces.get(i).copied().flatten() {
            Some(face) => face,
            None => world.rng.random_range(0..spec.face_count),
        };
        let yaw: f32 = world.rng.random_range(0.0..TAU);
        let mut pose = resting_pose(spec, face, xz, yaw);
        pose.position.y += lift;
        world.spawn(Arc::clone(spec), settings.die_mass, pose, Vec3::ZERO, Vec3::ZERO);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dice::DieType;
    use rand::SeedableRng;

    fn spec(die_type: DieType) -> Arc<DieSpec> {
        Arc::new(DieSpec::build(die_type, 1.0).unwrap())
    }

    #[test]
    fn test_resting_pose_shows_face() {
        for die_type in DieType::ALL {
            let spec = spec(die_type);
            for face in 0..spec.face_count {
                let pose = resting_pose(&spec, face, Vec2::new(1.0, -1.0), 0.7);
                assert_eq!(spec.best_face(pose.orientation).0, face, "{die_type} face {face}");
                let lowest = spec
                    .hull
                    .vertices
                    .iter()
                    .map(|&v| pose.to_world(v).y)
                    .fold(f32::INFINITY, f32::min);
                assert!(lowest.abs() < 1e-4);
            }
        }
    }

    #[test]
    fn test_random_orientation_is_unit() {
        let mut rng = Pcg32::seed_from_u64(5);
        for _ in 0..50 {
            assert!((random_orientation(&mut rng).length() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_throw_slots_stay_inside_arena() {
        let settings = Settings::default();
        let arena = settings.arena;
        for p in throw_slots(20, &settings) {
            assert!(p.x.abs() < arena.half_width - settings.die_radius);
            assert!(p.z.abs() < arena.half_depth);
            assert!(p.y > settings.die_radius && p.y < arena.ceiling);
        }
    }

    #[test]
    fn test_capacity_fills_default_arena() {
        let settings = Settings::default();
        assert_eq!(capacity(&settings), 36);
        let slots = throw_slots(36, &settings);
        for i in 0..slots.len() {
            for j in (i + 1)..slots.len() {
                assert!(slots[i].distance(slots[j]) >= 2.0 * settings.die_radius);
            }
        }
    }

    #[test]
    fn test_animated_spawn_moves_toward_centre() {
        let settings = Settings::default();
        let mut world = CollisionWorld::new(&settings, 11);
        let specs = vec![spec(DieType::D6), spec(DieType::D20)];
        spawn_animated(&mut world, &specs, &settings, 1.0, 1.0);
        assert_eq!(world.bodies.len(), 2);
        for body in &world.bodies {
            assert!(body.linear_velocity.x > 0.0);
            assert!(body.angular_velocity.length() > 0.0);
        }
    }

    #[test]
    fn test_instant_spawn_separates_dice() {
        let settings = Settings::default();
        let mut world = CollisionWorld::new(&settings, 11);
        let specs = vec![spec(DieType::D6); 4];
        spawn_instant(&mut world, &specs, &[Some(0), None, Some(2), None], &settings);
        assert_eq!(world.bodies.len(), 4);
        assert_eq!(world.bodies[0].spec.best_face(world.bodies[0].pose.orientation).0, 0);
        for i in 0..4 {
            for j in (i + 1)..4 {
                let d = world.bodies[i].pose.position.distance(world.bodies[j].pose.position);
                assert!(d >= 2.0 * settings.die_radius);
            }
        }
    }
}
