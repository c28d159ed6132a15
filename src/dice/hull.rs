//! Convex collision shapes
//!
//! A die collides with its real corners and edges rather than a bounding
//! sphere, so it can come to rest on a genuine face. The hull keeps:
//! - the visual vertices, used for every contact query
//! - hull faces, one per visual face, with normals recomputed from the hull
//!   and matched back to the visual numbering by nearest normal
//! - support planes, the true facets of the vertex set, used as the solid for
//!   die-die overlap and to find the facets a die can rest on
//! - hull edges, the vertex pairs shared by two support planes, used to catch
//!   dice crossing edge to edge with no corner inside the other

use glam::{Quat, Vec3};

use super::{DieType, Polyhedron};
use crate::error::{DiceError, DiceResult};

/// Minimum alignment between a hull face and its visual counterpart
const FACE_MATCH_DOT: f32 = 0.9;

/// A hull face and the visual face it corresponds to
#[derive(Debug, Clone)]
pub struct HullFace {
    pub vertices: Vec<usize>,
    /// Outward unit normal computed from the hull vertices
    pub normal: Vec3,
    /// Index into `DieSpec::face_normals`
    pub visual_face: usize,
}

/// Plane `normal · p = offset` with every hull vertex on the inner side
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SupportPlane {
    pub normal: Vec3,
    pub offset: f32,
}

impl SupportPlane {
    /// Positive outside the plane
    #[inline]
    pub fn distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) - self.offset
    }
}

/// Collision shape and mass properties of one die type, in body space
#[derive(Debug, Clone)]
pub struct ConvexHull {
    pub vertices: Vec<Vec3>,
    pub faces: Vec<HullFace>,
    pub planes: Vec<SupportPlane>,
    /// Vertex index pairs along which two support planes meet
    pub edges: Vec<(usize, usize)>,
    pub bounding_radius: f32,
    pub volume: f32,
    /// Isotropic moment of inertia divided by mass
    pub inertia_per_mass: f32,
    /// Worst best-face alignment over every facet the die can rest on
    pub rest_alignment: f32,
}

impl ConvexHull {
    pub fn build(die_type: DieType, poly: &Polyhedron, face_normals: &[Vec3]) -> DiceResult<Self> {
        let degenerate = |reason: String| DiceError::DegenerateGeometry {
            die: die_type,
            reason,
        };

        let mut faces = Vec::with_capacity(poly.faces.len());
        for (face, corners) in poly.faces.iter().enumerate() {
            let normal = poly
                .newell_normal(face)
                .try_normalize()
                .ok_or_else(|| degenerate(format!("hull face {face} has zero area")))?;
            let normal = if normal.dot(poly.face_centroid(face)) < 0.0 {
                -normal
            } else {
                normal
            };
            faces.push(HullFace {
                vertices: corners.clone(),
                normal,
                visual_face: face,
            });
        }
        match_visual_faces(&mut faces, face_normals).map_err(degenerate)?;

        let planes = support_planes(&poly.vertices);
        if planes.len() < 4 {
            return Err(degenerate(format!("only {} support planes", planes.len())));
        }

        let edges = hull_edges(&poly.vertices, &planes);

        let (volume, inertia_per_mass) = mass_properties(poly);
        if !volume.is_finite() || volume <= f32::EPSILON {
            return Err(degenerate("hull has no volume".to_string()));
        }

        let bounding_radius = poly
            .vertices
            .iter()
            .map(|v| v.length())
            .fold(0.0, f32::max);
        let rest_alignment = worst_rest_alignment(&planes, face_normals, die_type.rest_axis());

        Ok(Self {
            vertices: poly.vertices.clone(),
            faces,
            planes,
            edges,
            bounding_radius,
            volume,
            inertia_per_mass,
            rest_alignment,
        })
    }

    /// Signed distance of a body-space point to the hull surface (negative
    /// inside) and the plane that attains it
    pub fn signed_distance(&self, point: Vec3) -> (f32, usize) {
        self.planes
            .iter()
            .enumerate()
            .map(|(i, p)| (p.distance(point), i))
            .fold((f32::NEG_INFINITY, 0), |best, cur| {
                if cur.0 > best.0 { cur } else { best }
            })
    }

    /// Parameter range of the body-space segment `p0 → p1` lying inside the
    /// hull, or `None` when it misses
    pub fn clip_segment(&self, p0: Vec3, p1: Vec3) -> Option<(f32, f32)> {
        let (mut enter, mut exit) = (0.0f32, 1.0f32);
        for plane in &self.planes {
            let d0 = plane.distance(p0);
            let d1 = plane.distance(p1);
            if d0 > 0.0 && d1 > 0.0 {
                return None;
            }
            if d0 > 0.0 {
                enter = enter.max(d0 / (d0 - d1));
            } else if d1 > 0.0 {
                exit = exit.min(d0 / (d0 - d1));
            }
            if enter >= exit {
                return None;
            }
        }
        Some((enter, exit))
    }

    /// Support plane to rest on so that `face_normal` shows best
    pub fn resting_plane(&self, face_normal: Vec3, rest_axis: Vec3) -> SupportPlane {
        let score = |p: &SupportPlane| face_normal.dot(body_rest_direction(p.normal, rest_axis));
        self.planes
            .iter()
            .copied()
            .fold(None, |best: Option<SupportPlane>, p| match best {
                Some(b) if score(&b) >= score(&p) => Some(b),
                _ => Some(p),
            })
            .unwrap_or(SupportPlane {
                normal: -rest_axis,
                offset: self.bounding_radius,
            })
    }

    /// How squarely the rotated hull lies on its lowest support facet, as the
    /// cosine between that facet's normal and straight down
    pub fn floor_alignment(&self, orientation: Quat) -> f32 {
        self.planes
            .iter()
            .map(|p| -(orientation * p.normal).y)
            .fold(-1.0, f32::max)
    }

    /// Height of the centre above a floor the rotated hull is touching
    pub fn support_height(&self, orientation: Quat) -> f32 {
        self.vertices
            .iter()
            .map(|&v| -(orientation * v).y)
            .fold(f32::NEG_INFINITY, f32::max)
    }
}

/// Body-space direction of the rest axis while lying on a support plane.
///
/// Lying on the plane puts its normal straight down, so an up-reading die
/// shows the opposite direction and a down-reading die shows the plane itself.
pub fn body_rest_direction(plane_normal: Vec3, rest_axis: Vec3) -> Vec3 {
    if rest_axis.y >= 0.0 {
        -plane_normal
    } else {
        plane_normal
    }
}

fn match_visual_faces(faces: &mut [HullFace], face_normals: &[Vec3]) -> Result<(), String> {
    if faces.len() != face_normals.len() {
        return Err(format!(
            "{} hull faces for {} visual faces",
            faces.len(),
            face_normals.len()
        ));
    }
    let mut claimed = vec![false; face_normals.len()];
    for (i, face) in faces.iter_mut().enumerate() {
        let (nearest, dot) = face_normals
            .iter()
            .enumerate()
            .map(|(j, n)| (j, n.dot(face.normal)))
            .fold((0, f32::NEG_INFINITY), |best, cur| {
                if cur.1 > best.1 { cur } else { best }
            });
        if dot < FACE_MATCH_DOT {
            return Err(format!("hull face {i} has no visual face nearby (best {dot:.3})"));
        }
        if claimed[nearest] {
            return Err(format!("visual face {nearest} matched twice"));
        }
        claimed[nearest] = true;
        face.visual_face = nearest;
    }
    Ok(())
}

/// Facets of the convex hull of `vertices`, coplanar triples merged
fn support_planes(vertices: &[Vec3]) -> Vec<SupportPlane> {
    let scale = vertices.iter().map(|v| v.length()).fold(f32::EPSILON, f32::max);
    let tolerance = 1e-4 * scale;
    let n = vertices.len();
    let mut planes: Vec<SupportPlane> = Vec::new();

    for i in 0..n {
        for j in (i + 1)..n {
            for k in (j + 1)..n {
                let a = vertices[i];
                let Some(mut normal) = (vertices[j] - a).cross(vertices[k] - a).try_normalize()
                else {
                    continue;
                };
                let mut offset = normal.dot(a);
                if offset < 0.0 {
                    normal = -normal;
                    offset = -offset;
                }
                if vertices.iter().any(|v| normal.dot(*v) > offset + tolerance) {
                    continue;
                }
                if planes.iter().any(|p| p.normal.dot(normal) > 1.0 - 1e-4) {
                    continue;
                }
                planes.push(SupportPlane { normal, offset });
            }
        }
    }
    planes
}

/// Vertex pairs lying together on at least two support planes
fn hull_edges(vertices: &[Vec3], planes: &[SupportPlane]) -> Vec<(usize, usize)> {
    let scale = vertices.iter().map(|v| v.length()).fold(f32::EPSILON, f32::max);
    let tolerance = 1e-4 * scale;
    let on_plane = |p: &SupportPlane, v: Vec3| p.distance(v).abs() <= tolerance;

    let mut edges = Vec::new();
    for i in 0..vertices.len() {
        for j in (i + 1)..vertices.len() {
            let shared = planes
                .iter()
                .filter(|p| on_plane(p, vertices[i]) && on_plane(p, vertices[j]))
                .count();
            if shared >= 2 {
                edges.push((i, j));
            }
        }
    }
    edges
}

/// Volume and isotropic inertia per unit mass from fan tetrahedra at the origin
fn mass_properties(poly: &Polyhedron) -> (f32, f32) {
    let mut volume = 0.0;
    let mut second_moment = 0.0;
    for corners in &poly.faces {
        let a = poly.vertices[corners[0]];
        for pair in corners[1..].windows(2) {
            let b = poly.vertices[pair[0]];
            let c = poly.vertices[pair[1]];
            let v = (a.dot(b.cross(c)) / 6.0).abs();
            volume += v;
            // ∫|r|² over the tetrahedron (0, a, b, c)
            second_moment += v / 10.0
                * (a.length_squared()
                    + b.length_squared()
                    + c.length_squared()
                    + a.dot(b)
                    + b.dot(c)
                    + c.dot(a));
        }
    }
    let inertia_per_mass = if volume > 0.0 {
        2.0 / 3.0 * second_moment / volume
    } else {
        0.0
    };
    (volume, inertia_per_mass)
}

fn worst_rest_alignment(planes: &[SupportPlane], face_normals: &[Vec3], rest_axis: Vec3) -> f32 {
    planes
        .iter()
        .map(|p| {
            let dir = body_rest_direction(p.normal, rest_axis);
            face_normals
                .iter()
                .map(|n| n.dot(dir))
                .fold(f32::NEG_INFINITY, f32::max)
        })
        .fold(1.0, f32::min)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dice::geometry::{build_polyhedron, face_normals};

    fn hull(die_type: DieType) -> (ConvexHull, Vec<Vec3>) {
        let poly = build_polyhedron(die_type, 1.0);
        let normals = face_normals(die_type, &poly);
        (ConvexHull::build(die_type, &poly, &normals).unwrap(), normals)
    }

    #[test]
    fn test_support_plane_counts() {
        let expected = [
            (DieType::D4, 4),
            (DieType::D6, 6),
            (DieType::D8, 8),
            (DieType::D12, 12),
            (DieType::D20, 20),
            // Non-planar kites split into 5 + 5 apex facets and 10 band facets
            (DieType::D10, 20),
        ];
        for (die_type, count) in expected {
            assert_eq!(hull(die_type).0.planes.len(), count, "{die_type}");
        }
    }

    #[test]
    fn test_d20_hull_normals_match_visual_normals() {
        let (hull, normals) = hull(DieType::D20);
        assert_eq!(hull.faces.len(), 20);
        for face in &hull.faces {
            assert!(face.normal.dot(normals[face.visual_face]) > 0.9999);
        }
        let mut matched: Vec<usize> = hull.faces.iter().map(|f| f.visual_face).collect();
        matched.sort_unstable();
        assert_eq!(matched, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_d10_hull_faces_are_kites() {
        let (hull, normals) = hull(DieType::D10);
        assert_eq!(hull.faces.len(), 10);
        for face in &hull.faces {
            assert_eq!(face.vertices.len(), 4);
            assert!(face.normal.dot(normals[face.visual_face]) > FACE_MATCH_DOT);
        }
    }

    #[test]
    fn test_rest_alignment() {
        for die_type in [DieType::D4, DieType::D6, DieType::D8, DieType::D12, DieType::D20] {
            assert!(hull(die_type).0.rest_alignment > 0.9999, "{die_type}");
        }
        // Kites never lie flush, but the best kite stays well inside 30 degrees
        let d10 = hull(DieType::D10).0.rest_alignment;
        assert!(d10 < 0.99);
        assert!(d10 > 30f32.to_radians().cos());
    }

    #[test]
    fn test_cube_inertia() {
        // Circumradius 1: side 2/√3, I/m = side² / 6 = 2/9
        let (hull, _) = hull(DieType::D6);
        assert!((hull.inertia_per_mass - 2.0 / 9.0).abs() < 1e-4);
        let side = 2.0 / 3f32.sqrt();
        assert!((hull.volume - side * side * side).abs() < 1e-4);
    }

    #[test]
    fn test_signed_distance() {
        let (hull, _) = hull(DieType::D6);
        let inradius = 1.0 / 3f32.sqrt();
        let (d, _) = hull.signed_distance(Vec3::ZERO);
        assert!((d + inradius).abs() < 1e-5);
        let (d, _) = hull.signed_distance(Vec3::new(0.0, 2.0, 0.0));
        assert!(d > 1.0);
        for v in &hull.vertices {
            assert!(hull.signed_distance(*v).0.abs() < 1e-4);
        }
    }

    #[test]
    fn test_resting_plane_is_opposite_face() {
        let (d8, normals) = hull(DieType::D8);
        for n in &normals {
            let plane = d8.resting_plane(*n, Vec3::Y);
            assert!(plane.normal.dot(-*n) > 0.9999);
        }
        let (d4, normals) = hull(DieType::D4);
        for n in &normals {
            let plane = d4.resting_plane(*n, Vec3::NEG_Y);
            assert!(plane.normal.dot(*n) > 0.9999);
        }
    }

    #[test]
    fn test_edge_counts() {
        // Euler: E = V + F - 2, with the d10 counted over its 20 triangular facets
        let expected = [
            (DieType::D4, 6),
            (DieType::D6, 12),
            (DieType::D8, 12),
            (DieType::D10, 30),
            (DieType::D12, 30),
            (DieType::D20, 30),
        ];
        for (die_type, count) in expected {
            assert_eq!(hull(die_type).0.edges.len(), count, "{die_type}");
        }
    }

    #[test]
    fn test_clip_segment() {
        let (d6, _) = hull(DieType::D6);
        let h = 1.0 / 3f32.sqrt();
        let (enter, exit) = d6
            .clip_segment(Vec3::new(-2.0, 0.0, 0.0), Vec3::new(2.0, 0.0, 0.0))
            .unwrap();
        assert!((enter - (2.0 - h) / 4.0).abs() < 1e-5);
        assert!((exit - (2.0 + h) / 4.0).abs() < 1e-5);
        assert!(d6.clip_segment(Vec3::new(-2.0, 1.0, 0.0), Vec3::new(2.0, 1.0, 0.0)).is_none());
    }

    #[test]
    fn test_floor_alignment() {
        let (d6, _) = hull(DieType::D6);
        assert!((d6.floor_alignment(Quat::IDENTITY) - 1.0).abs() < 1e-5);
        let tilted = d6.floor_alignment(Quat::from_rotation_z(0.3));
        assert!((tilted - 0.3f32.cos()).abs() < 1e-5);
        let edge = d6.floor_alignment(Quat::from_rotation_z(std::f32::consts::FRAC_PI_4));
        assert!((edge - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-5);
    }

    #[test]
    fn test_support_height() {
        let (hull, _) = hull(DieType::D6);
        let inradius = 1.0 / 3f32.sqrt();
        assert!((hull.support_height(Quat::IDENTITY) - inradius).abs() < 1e-5);
        // Balanced on an edge the centre sits half a face diagonal up
        let edge = hull.support_height(Quat::from_rotation_z(std::f32::consts::FRAC_PI_4));
        assert!((edge - inradius * 2f32.sqrt()).abs() < 1e-5);
    }

    #[test]
    fn test_mismatched_face_count_is_degenerate() {
        let poly = build_polyhedron(DieType::D6, 1.0);
        let normals = face_normals(DieType::D6, &poly);
        assert!(matches!(
            ConvexHull::build(DieType::D6, &poly, &normals[..5]),
            Err(DiceError::DegenerateGeometry { .. })
        ));
    }
}
