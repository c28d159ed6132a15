//! Die definitions
//!
//! Everything here is built once per die type and never mutated afterwards:
//! - `geometry`: vertices, faces and face normals
//! - `faces`: printed value for each geometric face
//! - `hull`: convex collision shape and mass properties
//! - `registry`: the per-type cache owned by a simulation

pub mod faces;
pub mod geometry;
pub mod hull;
pub mod registry;

pub use geometry::Polyhedron;
pub use hull::{ConvexHull, HullFace, SupportPlane};
pub use registry::DieRegistry;

use std::fmt;
use std::str::FromStr;

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::{DiceError, DiceResult};

/// Supported die shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DieType {
    D4,
    D6,
    D8,
    D10,
    D12,
    D20,
    /// Percentile tens die: d10 geometry printed 00..90
    D100,
}

impl DieType {
    /// Every supported type, in registry order
    pub const ALL: [DieType; 7] = [
        DieType::D4,
        DieType::D6,
        DieType::D8,
        DieType::D10,
        DieType::D12,
        DieType::D20,
        DieType::D100,
    ];

    /// Position in [`DieType::ALL`]
    pub fn index(self) -> usize {
        match self {
            DieType::D4 => 0,
            DieType::D6 => 1,
            DieType::D8 => 2,
            DieType::D10 => 3,
            DieType::D12 => 4,
            DieType::D20 => 5,
            DieType::D100 => 6,
        }
    }

    /// Number of geometric faces
    pub fn face_count(self) -> usize {
        match self {
            DieType::D4 => 4,
            DieType::D6 => 6,
            DieType::D8 => 8,
            DieType::D10 | DieType::D100 => 10,
            DieType::D12 => 12,
            DieType::D20 => 20,
        }
    }

    /// Die type for a face count. Ten faces means a plain d10.
    pub fn from_face_count(faces: usize) -> DiceResult<Self> {
        match faces {
            4 => Ok(DieType::D4),
            6 => Ok(DieType::D6),
            8 => Ok(DieType::D8),
            10 => Ok(DieType::D10),
            12 => Ok(DieType::D12),
            20 => Ok(DieType::D20),
            n => Err(DiceError::InvalidDieSpec(format!(
                "unsupported face count {n}"
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DieType::D4 => "d4",
            DieType::D6 => "d6",
            DieType::D8 => "d8",
            DieType::D10 => "d10",
            DieType::D12 => "d12",
            DieType::D20 => "d20",
            DieType::D100 => "d100",
        }
    }

    /// World axis the showing face points along when at rest.
    ///
    /// A d4 has no upward face, so it reads the face pressed to the ground.
    pub fn rest_axis(self) -> Vec3 {
        match self {
            DieType::D4 => Vec3::NEG_Y,
            _ => Vec3::Y,
        }
    }

    /// Whether every face has a parallel opposite face
    pub fn has_opposite_faces(self) -> bool {
        !matches!(self, DieType::D4)
    }

    /// All printable values, ascending
    pub fn values(self) -> Vec<u32> {
        match self {
            DieType::D10 => (0..10).collect(),
            DieType::D100 => (0..10).map(|v| v * 10).collect(),
            other => (1..=other.face_count() as u32).collect(),
        }
    }

    /// Whether `value` is printed on some face
    pub fn is_valid_value(self, value: u32) -> bool {
        match self {
            DieType::D10 => value < 10,
            DieType::D100 => value < 100 && value % 10 == 0,
            other => (1..=other.face_count() as u32).contains(&value),
        }
    }
}

impl fmt::Display for DieType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for DieType {
    type Err = DiceError;

    /// Accepts `d20`, `D20`, `20` and `d%`/`%` for percentile
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        let digits = lower.strip_prefix('d').unwrap_or(&lower);
        match digits {
            "%" | "100" => Ok(DieType::D100),
            _ => {
                let faces: usize = digits
                    .parse()
                    .map_err(|_| DiceError::InvalidDieSpec(format!("unknown die '{s}'")))?;
                DieType::from_face_count(faces)
            }
        }
    }
}

/// Immutable description of one die type
#[derive(Debug, Clone)]
pub struct DieSpec {
    pub die_type: DieType,
    pub face_count: usize,
    /// Circumradius in world units
    pub radius: f32,
    /// Outward unit normals in body space, indexed by face
    pub face_normals: Vec<Vec3>,
    /// Printed value, indexed by face
    pub face_to_value: Vec<u32>,
    /// Visual geometry the normals were derived from
    pub geometry: Polyhedron,
    /// Collision shape
    pub hull: ConvexHull,
}

impl DieSpec {
    /// Build geometry, numbering and hull for a die type.
    ///
    /// Fails before anything is simulated if the radius is unusable or the
    /// construction does not produce one unit normal per face.
    pub fn build(die_type: DieType, radius: f32) -> DiceResult<Self> {
        if !radius.is_finite() || radius <= 0.0 {
            return Err(DiceError::InvalidDieSpec(format!(
                "radius must be positive, got {radius}"
            )));
        }

        let geometry = geometry::build_polyhedron(die_type, radius);
        let face_normals = geometry::face_normals(die_type, &geometry);
        geometry::validate(die_type, &geometry, &face_normals)?;

        let face_to_value = faces::assign_values(die_type, &face_normals);
        let hull = ConvexHull::build(die_type, &geometry, &face_normals)?;

        log::debug!(
            "built {}: {} faces, {} support planes, rest alignment {:.3}",
            die_type,
            face_normals.len(),
            hull.planes.len(),
            hull.rest_alignment
        );

        Ok(Self {
            die_type,
            face_count: die_type.face_count(),
            radius,
            face_normals,
            face_to_value,
            geometry,
            hull,
        })
    }

    /// Printed value of a face
    #[inline]
    pub fn value_of(&self, face: usize) -> u32 {
        self.face_to_value[face]
    }

    /// Face carrying a printed value
    pub fn face_of(&self, value: u32) -> Option<usize> {
        self.face_to_value.iter().position(|&v| v == value)
    }

    /// Printed label (`00` for the percentile zero)
    pub fn label(&self, value: u32) -> String {
        match self.die_type {
            DieType::D100 if value == 0 => "00".to_string(),
            _ => value.to_string(),
        }
    }

    #[inline]
    pub fn rest_axis(&self) -> Vec3 {
        self.die_type.rest_axis()
    }

    /// Alignment (cosine) of every face with the rest axis for an orientation
    pub fn alignments(&self, orientation: Quat) -> Vec<f32> {
        let axis = self.rest_axis();
        self.face_normals
            .iter()
            .map(|&n| (orientation * n).dot(axis))
            .collect()
    }

    /// Best-aligned face and its alignment
    pub fn best_face(&self, orientation: Quat) -> (usize, f32) {
        self.alignments(orientation)
            .into_iter()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |best, (i, a)| {
                if a > best.1 { (i, a) } else { best }
            })
    }

    /// Value showing for an orientation
    pub fn read_value(&self, orientation: Quat) -> u32 {
        self.value_of(self.best_face(orientation).0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_die_types() {
        assert_eq!("d20".parse::<DieType>().unwrap(), DieType::D20);
        assert_eq!("D6".parse::<DieType>().unwrap(), DieType::D6);
        assert_eq!("12".parse::<DieType>().unwrap(), DieType::D12);
        assert_eq!("d%".parse::<DieType>().unwrap(), DieType::D100);
        assert_eq!("d100".parse::<DieType>().unwrap(), DieType::D100);
        assert!(matches!(
            "d7".parse::<DieType>(),
            Err(DiceError::InvalidDieSpec(_))
        ));
        assert!("dx".parse::<DieType>().is_err());
    }

    #[test]
    fn test_from_face_count_rejects_unsupported() {
        assert!(DieType::from_face_count(3).is_err());
        assert!(DieType::from_face_count(100).is_err());
        assert_eq!(DieType::from_face_count(10).unwrap(), DieType::D10);
    }

    #[test]
    fn test_value_sets() {
        assert_eq!(DieType::D6.values(), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(DieType::D10.values(), (0..10).collect::<Vec<_>>());
        assert_eq!(DieType::D100.values()[9], 90);
        assert!(DieType::D100.is_valid_value(40));
        assert!(!DieType::D100.is_valid_value(45));
        assert!(!DieType::D20.is_valid_value(0));
        assert!(DieType::D10.is_valid_value(0));
    }

    #[test]
    fn test_build_rejects_bad_radius() {
        for radius in [0.0, -1.0, f32::NAN, f32::INFINITY] {
            assert!(matches!(
                DieSpec::build(DieType::D6, radius),
                Err(DiceError::InvalidDieSpec(_))
            ));
        }
    }

    #[test]
    fn test_every_type_has_unit_normals_per_face() {
        for die_type in DieType::ALL {
            let spec = DieSpec::build(die_type, 1.0).unwrap();
            assert_eq!(spec.face_normals.len(), die_type.face_count());
            assert_eq!(spec.face_to_value.len(), spec.face_count);
            for n in &spec.face_normals {
                assert!((n.length() - 1.0).abs() < 1e-6, "{die_type}: {n:?}");
            }
        }
    }

    #[test]
    fn test_read_value_identity_orientation() {
        let spec = DieSpec::build(DieType::D6, 1.0).unwrap();
        let (face, alignment) = spec.best_face(Quat::IDENTITY);
        assert!(alignment > 0.999);
        assert_eq!(spec.read_value(Quat::IDENTITY), spec.value_of(face));
    }

    #[test]
    fn test_percentile_label() {
        let spec = DieSpec::build(DieType::D100, 1.0).unwrap();
        assert_eq!(spec.label(0), "00");
        assert_eq!(spec.label(70), "70");
    }
}
