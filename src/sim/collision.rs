//! Contact generation and response for convex dice
//!
//! Contacts are hull vertices touching a boundary plane or sitting inside
//! another die's support planes, plus the middle of any hull edge that crosses
//! another die with both ends outside it. Response is a sequential-impulse solver with
//! accumulated normal and two-axis friction impulses, followed by a split
//! positional correction per manifold.

use glam::Vec3;

use super::state::{Boundary, BoundaryKind, CollisionWorld, DieInstance};
use crate::consts::{BOUNCE_THRESHOLD, CONTACT_MARGIN, PENETRATION_SLOP, POSITION_CORRECTION};
use crate::tangent_basis;

/// A single contact point
#[derive(Debug, Clone)]
pub struct Contact {
    pub point: Vec3,
    /// Unit normal pushing body `a` away from `b` (or from the boundary)
    pub normal: Vec3,
    /// Overlap depth, negative while still inside the contact margin
    pub penetration: f32,
    r_a: Vec3,
    r_b: Vec3,
    tangents: [Vec3; 2],
    normal_mass: f32,
    tangent_mass: [f32; 2],
    bounce: f32,
    normal_impulse: f32,
    tangent_impulse: [f32; 2],
}

impl Contact {
    pub fn new(point: Vec3, normal: Vec3, penetration: f32) -> Self {
        Self {
            point,
            normal,
            penetration,
            r_a: Vec3::ZERO,
            r_b: Vec3::ZERO,
            tangents: [Vec3::ZERO; 2],
            normal_mass: 0.0,
            tangent_mass: [0.0; 2],
            bounce: 0.0,
            normal_impulse: 0.0,
            tangent_impulse: [0.0; 2],
        }
    }

    /// Accumulated normal impulse from the last solve
    pub fn normal_impulse(&self) -> f32 {
        self.normal_impulse
    }
}

/// Contacts between one die and one other die or boundary
#[derive(Debug, Clone)]
pub struct Manifold {
    pub a: usize,
    /// `None` for a static boundary
    pub b: Option<usize>,
    pub friction: f32,
    /// Contact with the ground plane
    pub ground: bool,
    pub contacts: Vec<Contact>,
}

impl Manifold {
    pub fn max_penetration(&self) -> f32 {
        self.contacts
            .iter()
            .map(|c| c.penetration)
            .fold(f32::NEG_INFINITY, f32::max)
    }
}

/// Vertices of `body` within the contact margin of a boundary
pub fn boundary_manifold(
    index: usize,
    body: &DieInstance,
    boundary: &Boundary,
    friction: f32,
) -> Option<Manifold> {
    if boundary.distance(body.pose.position) > body.bounding_radius() + CONTACT_MARGIN {
        return None;
    }
    let contacts: Vec<Contact> = body
        .world_vertices()
        .filter_map(|p| {
            let d = boundary.distance(p);
            (d < CONTACT_MARGIN).then(|| Contact::new(p, boundary.normal, -d))
        })
        .collect();
    if contacts.is_empty() {
        return None;
    }
    Some(Manifold {
        a: index,
        b: None,
        friction,
        ground: boundary.kind == BoundaryKind::Ground,
        contacts,
    })
}

/// Edges of `edges_of` passing through `solid` with both ends outside it.
/// Edges with an end inside are already caught as vertex contacts.
fn edge_contacts(edges_of: &DieInstance, solid: &DieInstance, flip: bool, contacts: &mut Vec<Contact>) {
    let hull = &solid.spec.hull;
    let corners = &edges_of.spec.hull.vertices;
    for &(i, j) in &edges_of.spec.hull.edges {
        let p0 = solid.pose.to_local(edges_of.pose.to_world(corners[i]));
        let p1 = solid.pose.to_local(edges_of.pose.to_world(corners[j]));
        if hull.signed_distance(p0).0 < CONTACT_MARGIN || hull.signed_distance(p1).0 < CONTACT_MARGIN {
            continue;
        }
        let Some((enter, exit)) = hull.clip_segment(p0, p1) else {
            continue;
        };
        let mid = p0.lerp(p1, 0.5 * (enter + exit));
        let (d, plane) = hull.signed_distance(mid);
        if d >= 0.0 {
            continue;
        }
        let normal = solid.pose.orientation * hull.planes[plane].normal;
        let normal = if flip { -normal } else { normal };
        contacts.push(Contact::new(solid.pose.to_world(mid), normal, -d));
    }
}

/// Vertices of either die inside the other's support planes, then crossing edges
pub fn die_manifold(bodies: &[DieInstance], a: usize, b: usize, friction: f32) -> Option<Manifold> {
    let (body_a, body_b) = (&bodies[a], &bodies[b]);
    let reach = body_a.bounding_radius() + body_b.bounding_radius() + CONTACT_MARGIN;
    if body_a.pose.position.distance_squared(body_b.pose.position) > reach * reach {
        return None;
    }

    let mut contacts = Vec::new();
    for p in body_a.world_vertices() {
        let (d, plane) = body_b.spec.hull.signed_distance(body_b.pose.to_local(p));
        if d < CONTACT_MARGIN {
            let normal = body_b.pose.orientation * body_b.spec.hull.planes[plane].normal;
            contacts.push(Contact::new(p, normal, -d));
        }
    }
    for p in body_b.world_vertices() {
        let (d, plane) = body_a.spec.hull.signed_distance(body_a.pose.to_local(p));
        if d < CONTACT_MARGIN {
            let normal = -(body_a.pose.orientation * body_a.spec.hull.planes[plane].normal);
            contacts.push(Contact::new(p, normal, -d));
        }
    }
    edge_contacts(body_a, body_b, false, &mut contacts);
    edge_contacts(body_b, body_a, true, &mut contacts);
    if contacts.is_empty() {
        return None;
    }
    Some(Manifold {
        a,
        b: Some(b),
        friction,
        ground: false,
        contacts,
    })
}

/// All manifolds for the current poses, in stable body order
pub fn find_contacts(world: &CollisionWorld) -> Vec<Manifold> {
    let mut manifolds = Vec::new();
    let material = &world.material;

    for (i, body) in world.bodies.iter().enumerate() {
        if body.is_locked() {
            continue;
        }
        for boundary in &world.boundaries {
            let friction = material.boundary_friction(boundary.kind);
            if let Some(m) = boundary_manifold(i, body, boundary, friction) {
                manifolds.push(m);
            }
        }
    }

    let n = world.bodies.len();
    for i in 0..n {
        for j in (i + 1)..n {
            if world.bodies[i].is_locked() && world.bodies[j].is_locked() {
                continue;
            }
            if let Some(m) = die_manifold(&world.bodies, i, j, material.die_friction) {
                manifolds.push(m);
            }
        }
    }
    manifolds
}

fn effective_mass(a: &DieInstance, b: Option<&DieInstance>, r_a: Vec3, r_b: Vec3, dir: Vec3) -> f32 {
    let mut k = a.inv_mass + a.inv_inertia * r_a.cross(dir).length_squared();
    if let Some(b) = b {
        k += b.inv_mass + b.inv_inertia * r_b.cross(dir).length_squared();
    }
    if k > f32::EPSILON { 1.0 / k } else { 0.0 }
}

fn relative_velocity(bodies: &[DieInstance], m: &Manifold, c: &Contact) -> Vec3 {
    let a = &bodies[m.a];
    let mut v = a.linear_velocity + a.angular_velocity.cross(c.r_a);
    if let Some(b) = m.b {
        let b = &bodies[b];
        v -= b.linear_velocity + b.angular_velocity.cross(c.r_b);
    }
    v
}

fn apply_impulse(bodies: &mut [DieInstance], a: usize, b: Option<usize>, r_a: Vec3, r_b: Vec3, impulse: Vec3) {
    let body = &mut bodies[a];
    body.linear_velocity += impulse * body.inv_mass;
    body.angular_velocity += r_a.cross(impulse) * body.inv_inertia;
    if let Some(b) = b {
        let body = &mut bodies[b];
        body.linear_velocity -= impulse * body.inv_mass;
        body.angular_velocity -= r_b.cross(impulse) * body.inv_inertia;
    }
}

/// Lever arms, effective masses and bounce targets for the coming solve
pub fn prepare(manifolds: &mut [Manifold], bodies: &[DieInstance], restitution: f32) {
    for m in manifolds.iter_mut() {
        let a = &bodies[m.a];
        let b = m.b.map(|j| &bodies[j]);
        for c in m.contacts.iter_mut() {
            c.r_a = c.point - a.pose.position;
            c.r_b = b.map_or(Vec3::ZERO, |b| c.point - b.pose.position);
            let (t1, t2) = tangent_basis(c.normal);
            c.tangents = [t1, t2];
            c.normal_mass = effective_mass(a, b, c.r_a, c.r_b, c.normal);
            c.tangent_mass = [
                effective_mass(a, b, c.r_a, c.r_b, t1),
                effective_mass(a, b, c.r_a, c.r_b, t2),
            ];
        }
        for i in 0..m.contacts.len() {
            let vn = relative_velocity(bodies, m, &m.contacts[i]).dot(m.contacts[i].normal);
            m.contacts[i].bounce = if vn < -BOUNCE_THRESHOLD {
                -restitution * vn
            } else {
                0.0
            };
        }
    }
}

/// One sequential-impulse pass over every contact
pub fn solve_velocities(manifolds: &mut [Manifold], bodies: &mut [DieInstance]) {
    for m in manifolds.iter_mut() {
        for i in 0..m.contacts.len() {
            // Normal
            let vn = relative_velocity(bodies, m, &m.contacts[i]).dot(m.contacts[i].normal);
            let c = &mut m.contacts[i];
            let lambda = (c.bounce - vn) * c.normal_mass;
            let accumulated = (c.normal_impulse + lambda).max(0.0);
            let delta = accumulated - c.normal_impulse;
            c.normal_impulse = accumulated;
            let (r_a, r_b, normal) = (c.r_a, c.r_b, c.normal);
            apply_impulse(bodies, m.a, m.b, r_a, r_b, normal * delta);

            // Friction, bounded by the accumulated normal impulse
            let max_friction = m.friction * m.contacts[i].normal_impulse;
            for k in 0..2 {
                let tangent = m.contacts[i].tangents[k];
                let vt = relative_velocity(bodies, m, &m.contacts[i]).dot(tangent);
                let c = &mut m.contacts[i];
                let lambda = -vt * c.tangent_mass[k];
                let accumulated = (c.tangent_impulse[k] + lambda).clamp(-max_friction, max_friction);
                let delta = accumulated - c.tangent_impulse[k];
                c.tangent_impulse[k] = accumulated;
                apply_impulse(bodies, m.a, m.b, r_a, r_b, tangent * delta);
            }
        }
    }
}

/// Push overlapping bodies apart along each manifold's deepest contact,
/// split by inverse mass
pub fn correct_positions(manifolds: &[Manifold], bodies: &mut [DieInstance]) {
    for m in manifolds {
        let Some(deepest) = m
            .contacts
            .iter()
            .max_by(|x, y| x.penetration.total_cmp(&y.penetration))
        else {
            continue;
        };
        if deepest.penetration <= PENETRATION_SLOP {
            continue;
        }
        let inv_a = bodies[m.a].inv_mass;
        let inv_b = m.b.map_or(0.0, |b| bodies[b].inv_mass);
        let inv_total = inv_a + inv_b;
        if inv_total <= 0.0 {
            continue;
        }
        let push = deepest.normal * (deepest.penetration - PENETRATION_SLOP) * POSITION_CORRECTION;
        bodies[m.a].pose.position += push * (inv_a / inv_total);
        if let Some(b) = m.b {
            bodies[b].pose.position -= push * (inv_b / inv_total);
        }
    }
}
