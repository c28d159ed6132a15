//! Analytic die geometry
//!
//! Every solid is centred on the origin with all vertices at distance
//! `radius`. Faces are vertex index lists ordered counter-clockwise when seen
//! from outside.

use std::f32::consts::{PI, TAU};

use glam::Vec3;

use super::DieType;
use crate::error::{DiceError, DiceResult};

/// Vertices plus faces as index lists
#[derive(Debug, Clone)]
pub struct Polyhedron {
    pub vertices: Vec<Vec3>,
    pub faces: Vec<Vec<usize>>,
}

impl Polyhedron {
    /// Mean of a face's corners
    pub fn face_centroid(&self, face: usize) -> Vec3 {
        let corners = &self.faces[face];
        let sum: Vec3 = corners.iter().map(|&i| self.vertices[i]).sum();
        sum / corners.len() as f32
    }

    /// Area-weighted normal of a (possibly non-planar) face, not normalized
    pub fn newell_normal(&self, face: usize) -> Vec3 {
        let corners = &self.faces[face];
        let mut n = Vec3::ZERO;
        for (k, &i) in corners.iter().enumerate() {
            let a = self.vertices[i];
            let b = self.vertices[corners[(k + 1) % corners.len()]];
            n.x += (a.y - b.y) * (a.z + b.z);
            n.y += (a.z - b.z) * (a.x + b.x);
            n.z += (a.x - b.x) * (a.y + b.y);
        }
        n
    }

    /// Sort every face's corners counter-clockwise around its outward axis
    fn orient_faces(&mut self) {
        let vertices = &self.vertices;
        for corners in &mut self.faces {
            let center: Vec3 = corners.iter().map(|&i| vertices[i]).sum::<Vec3>() / corners.len() as f32;
            let axis = center.normalize();
            let u = (vertices[corners[0]] - center).reject_from_normalized(axis).normalize();
            let w = axis.cross(u);
            corners.sort_by(|&a, &b| {
                let da = vertices[a] - center;
                let db = vertices[b] - center;
                let ang_a = da.dot(w).atan2(da.dot(u));
                let ang_b = db.dot(w).atan2(db.dot(u));
                ang_a.total_cmp(&ang_b)
            });
        }
    }
}

/// Build the visual polyhedron for a die type
pub fn build_polyhedron(die_type: DieType, radius: f32) -> Polyhedron {
    let mut poly = match die_type {
        DieType::D4 => tetrahedron(),
        DieType::D6 => cube(),
        DieType::D8 => octahedron(),
        DieType::D10 | DieType::D100 => trapezohedron(),
        DieType::D12 => dodecahedron(),
        DieType::D20 => icosahedron(),
    };
    for v in &mut poly.vertices {
        *v = v.normalize() * radius;
    }
    poly.orient_faces();
    poly
}

/// Outward unit normal per face.
///
/// Kites of the trapezohedron are not planar, so their normal is the
/// direction of the corner average. Every other face uses the cross
/// product of two edges.
pub fn face_normals(die_type: DieType, poly: &Polyhedron) -> Vec<Vec3> {
    (0..poly.faces.len())
        .map(|face| {
            let centroid = poly.face_centroid(face);
            match die_type {
                DieType::D10 | DieType::D100 => centroid.normalize(),
                _ => {
                    let corners = &poly.faces[face];
                    let v0 = poly.vertices[corners[0]];
                    let n = (poly.vertices[corners[1]] - v0)
                        .cross(poly.vertices[corners[2]] - v0)
                        .normalize();
                    if n.dot(centroid) < 0.0 { -n } else { n }
                }
            }
        })
        .collect()
}

/// Check face count and normals before anything else uses them
pub fn validate(die_type: DieType, poly: &Polyhedron, normals: &[Vec3]) -> DiceResult<()> {
    let expected = die_type.face_count();
    if poly.faces.len() != expected || normals.len() != expected {
        return Err(DiceError::DegenerateGeometry {
            die: die_type,
            reason: format!(
                "expected {expected} faces, built {} faces with {} normals",
                poly.faces.len(),
                normals.len()
            ),
        });
    }
    if let Some(face) = normals
        .iter()
        .position(|n| !n.is_finite() || (n.length() - 1.0).abs() > 1e-5)
    {
        return Err(DiceError::DegenerateGeometry {
            die: die_type,
            reason: format!("face {face} has no usable normal"),
        });
    }
    Ok(())
}

fn tetrahedron() -> Polyhedron {
    let vertices = vec![
        Vec3::new(1.0, 1.0, 1.0),
        Vec3::new(1.0, -1.0, -1.0),
        Vec3::new(-1.0, 1.0, -1.0),
        Vec3::new(-1.0, -1.0, 1.0),
    ];
    let faces = vec![vec![0, 1, 2], vec![0, 1, 3], vec![0, 2, 3], vec![1, 2, 3]];
    Polyhedron { vertices, faces }
}

fn cube() -> Polyhedron {
    let mut vertices = Vec::with_capacity(8);
    for x in [-1.0, 1.0] {
        for y in [-1.0, 1.0] {
            for z in [-1.0, 1.0] {
                vertices.push(Vec3::new(x, y, z));
            }
        }
    }
    let mut faces = Vec::with_capacity(6);
    for axis in 0..3 {
        for sign in [-1.0, 1.0] {
            let face: Vec<usize> = (0..vertices.len())
                .filter(|&i| vertices[i][axis] == sign)
                .collect();
            faces.push(face);
        }
    }
    Polyhedron { vertices, faces }
}

fn octahedron() -> Polyhedron {
    let vertices = vec![Vec3::X, Vec3::NEG_X, Vec3::Y, Vec3::NEG_Y, Vec3::Z, Vec3::NEG_Z];
    let mut faces = Vec::with_capacity(8);
    for x in 0..2 {
        for y in 2..4 {
            for z in 4..6 {
                faces.push(vec![x, y, z]);
            }
        }
    }
    Polyhedron { vertices, faces }
}

fn icosahedron() -> Polyhedron {
    let phi = (1.0 + 5.0f32.sqrt()) / 2.0;
    let vertices = vec![
        Vec3::new(-1.0, phi, 0.0),
        Vec3::new(1.0, phi, 0.0),
        Vec3::new(-1.0, -phi, 0.0),
        Vec3::new(1.0, -phi, 0.0),
        Vec3::new(0.0, -1.0, phi),
        Vec3::new(0.0, 1.0, phi),
        Vec3::new(0.0, -1.0, -phi),
        Vec3::new(0.0, 1.0, -phi),
        Vec3::new(phi, 0.0, -1.0),
        Vec3::new(phi, 0.0, 1.0),
        Vec3::new(-phi, 0.0, -1.0),
        Vec3::new(-phi, 0.0, 1.0),
    ];

    // Edge length is 2; a face is any triple of mutually adjacent vertices
    let adjacent = |a: usize, b: usize| (vertices[a].distance_squared(vertices[b]) - 4.0).abs() < 0.01;
    let n = vertices.len();
    let mut faces = Vec::with_capacity(20);
    for i in 0..n {
        for j in (i + 1)..n {
            if !adjacent(i, j) {
                continue;
            }
            for k in (j + 1)..n {
                if adjacent(i, k) && adjacent(j, k) {
                    faces.push(vec![i, j, k]);
                }
            }
        }
    }
    Polyhedron { vertices, faces }
}

/// Dual of the icosahedron: one vertex per icosahedron face, one pentagon per
/// icosahedron vertex
fn dodecahedron() -> Polyhedron {
    let ico = icosahedron();
    let vertices: Vec<Vec3> = ico
        .faces
        .iter()
        .map(|f| f.iter().map(|&i| ico.vertices[i]).sum::<Vec3>() / 3.0)
        .collect();
    let faces = (0..ico.vertices.len())
        .map(|corner| {
            ico.faces
                .iter()
                .enumerate()
                .filter(|(_, f)| f.contains(&corner))
                .map(|(dual, _)| dual)
                .collect()
        })
        .collect();
    Polyhedron { vertices, faces }
}

/// Pentagonal trapezohedron.
///
/// Apexes at ±1 on Y, rings at `y = ±sin(π/10)` with radius `cos(π/10)`, the
/// lower ring turned 36° against the upper one. Vertex layout: 0 top apex,
/// 1 bottom apex, 2..7 upper ring, 7..12 lower ring.
fn trapezohedron() -> Polyhedron {
    let ring_y = (PI / 10.0).sin();
    let ring_r = (PI / 10.0).cos();
    let step = TAU / 5.0;

    let mut vertices = vec![Vec3::Y, Vec3::NEG_Y];
    for k in 0..5 {
        let theta = k as f32 * step;
        vertices.push(Vec3::new(ring_r * theta.cos(), ring_y, ring_r * theta.sin()));
    }
    for k in 0..5 {
        let theta = k as f32 * step + step / 2.0;
        vertices.push(Vec3::new(ring_r * theta.cos(), -ring_y, ring_r * theta.sin()));
    }

    let upper = |k: usize| 2 + k % 5;
    let lower = |k: usize| 7 + k % 5;
    let mut faces = Vec::with_capacity(10);
    for k in 0..5 {
        // Two triangles sharing the apex-to-opposite-ring diagonal
        faces.push(vec![0, upper(k), lower(k), upper(k + 1)]);
    }
    for k in 0..5 {
        faces.push(vec![1, lower(k), upper(k + 1), lower(k + 1)]);
    }
    Polyhedron { vertices, faces }
}
