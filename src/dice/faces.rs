//! Face value mapping
//!
//! Printed numbers come from the face normals alone, never from the order in
//! which faces were constructed:
//! 1. Sort faces by `normal.y` descending. Faces within
//!    [`LEVEL_TOLERANCE`](crate::consts::LEVEL_TOLERANCE) of a level's first
//!    face share that level, and a level is ordered by ascending
//!    `atan2(normal.z, normal.x)`.
//! 2. Walk that order handing out ranks from the front. On a die where every
//!    face has an antipode, the antipode takes the mirrored rank from the
//!    back, so opposite faces always sum to `faces + 1`.
//! 3. Turn ranks into printed values (d10 prints 0..9, d100 prints 00..90).

use glam::Vec3;

use super::DieType;
use crate::azimuth;
use crate::consts::LEVEL_TOLERANCE;

/// Alignment below which two normals count as antipodal
const ANTIPODE_DOT: f32 = -0.999;

/// Face indices in documented sort order
pub fn sorted_faces(normals: &[Vec3]) -> Vec<usize> {
    let mut by_height: Vec<usize> = (0..normals.len()).collect();
    by_height.sort_by(|&a, &b| normals[b].y.total_cmp(&normals[a].y).then(a.cmp(&b)));

    let mut order = Vec::with_capacity(normals.len());
    let mut level: Vec<usize> = Vec::new();
    let mut level_top = f32::INFINITY;

    let flush = |level: &mut Vec<usize>, order: &mut Vec<usize>| {
        level.sort_by(|&a, &b| {
            azimuth(normals[a])
                .total_cmp(&azimuth(normals[b]))
                .then(a.cmp(&b))
        });
        order.append(level);
    };

    for face in by_height {
        if !level.is_empty() && level_top - normals[face].y >= LEVEL_TOLERANCE {
            flush(&mut level, &mut order);
        }
        if level.is_empty() {
            level_top = normals[face].y;
        }
        level.push(face);
    }
    flush(&mut level, &mut order);
    order
}

/// Face whose normal points the opposite way, if any
pub fn antipode(normals: &[Vec3], face: usize) -> Option<usize> {
    let n = normals[face];
    normals
        .iter()
        .enumerate()
        .filter(|&(i, _)| i != face)
        .map(|(i, m)| (i, n.dot(*m)))
        .filter(|&(_, dot)| dot < ANTIPODE_DOT)
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(i, _)| i)
}

/// Whether antipodes pair every face with exactly one other face
fn is_point_symmetric(normals: &[Vec3]) -> bool {
    (0..normals.len()).all(|face| {
        antipode(normals, face).is_some_and(|opp| antipode(normals, opp) == Some(face))
    })
}

/// Rank (0-based) of every face, indexed by face
pub fn face_ranks(normals: &[Vec3]) -> Vec<usize> {
    let count = normals.len();
    let symmetric = is_point_symmetric(normals);
    let mut ranks: Vec<Option<usize>> = vec![None; count];
    let mut front = 0;
    let mut back = count;

    for face in sorted_faces(normals) {
        if ranks[face].is_some() {
            continue;
        }
        ranks[face] = Some(front);
        front += 1;
        if symmetric {
            if let Some(opp) = antipode(normals, face) {
                back -= 1;
                ranks[opp] = Some(back);
            }
        }
    }

    ranks
        .into_iter()
        .enumerate()
        .map(|(face, rank)| rank.unwrap_or(face))
        .collect()
}

/// Printed value for a rank
pub fn value_for_rank(die_type: DieType, rank: usize) -> u32 {
    let rank = rank as u32;
    match die_type {
        DieType::D10 => (rank + 1) % 10,
        DieType::D100 => ((rank + 1) % 10) * 10,
        _ => rank + 1,
    }
}

/// Printed value of every face, indexed by face
pub fn assign_values(die_type: DieType, normals: &[Vec3]) -> Vec<u32> {
    face_ranks(normals)
        .into_iter()
        .map(|rank| value_for_rank(die_type, rank))
        .collect()
}

/// Value used for opposite-face sums: a d10's 0 counts as 10
pub fn pip_value(die_type: DieType, value: u32) -> u32 {
    match die_type {
        DieType::D10 if value == 0 => 10,
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dice::geometry::{build_polyhedron, face_normals};
    use proptest::prelude::*;

    fn normals(die_type: DieType) -> Vec<Vec3> {
        face_normals(die_type, &build_polyhedron(die_type, 1.0))
    }

    #[test]
    fn test_sorted_faces_is_permutation() {
        for die_type in DieType::ALL {
            let mut order = sorted_faces(&normals(die_type));
            order.sort_unstable();
            assert_eq!(order, (0..die_type.face_count()).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_sorted_faces_heights_descend_between_levels() {
        let n = normals(DieType::D20);
        let order = sorted_faces(&n);
        for pair in order.windows(2) {
            // Later faces may only be higher inside the same tolerance band
            assert!(n[pair[1]].y < n[pair[0]].y + LEVEL_TOLERANCE);
        }
        let highest = n.iter().map(|v| v.y).fold(f32::MIN, f32::max);
        assert!(highest - n[order[0]].y < LEVEL_TOLERANCE);
    }

    #[test]
    fn test_d6_top_face_is_one() {
        let n = normals(DieType::D6);
        let values = assign_values(DieType::D6, &n);
        let top = n.iter().position(|v| v.y > 0.99).unwrap();
        let bottom = n.iter().position(|v| v.y < -0.99).unwrap();
        assert_eq!(values[top], 1);
        assert_eq!(values[bottom], 6);
    }

    #[test]
    fn test_values_are_a_permutation_of_the_value_set() {
        for die_type in DieType::ALL {
            let mut values = assign_values(die_type, &normals(die_type));
            values.sort_unstable();
            assert_eq!(values, die_type.values(), "{die_type}");
        }
    }

    #[test]
    fn test_opposite_faces_are_complementary() {
        for die_type in [DieType::D6, DieType::D8, DieType::D10, DieType::D12, DieType::D20] {
            let n = normals(die_type);
            let values = assign_values(die_type, &n);
            let target = die_type.face_count() as u32 + 1;
            for face in 0..n.len() {
                let opp = antipode(&n, face).expect("every face has an antipode");
                assert!((n[face] + n[opp]).length() < 1e-4);
                assert_eq!(
                    pip_value(die_type, values[face]) + pip_value(die_type, values[opp]),
                    target,
                    "{die_type}: faces {face} and {opp}"
                );
            }
        }
    }

    #[test]
    fn test_d4_has_no_antipodes() {
        let n = normals(DieType::D4);
        assert!((0..4).all(|f| antipode(&n, f).is_none()));
        // Plain sequential numbering in sort order
        let order = sorted_faces(&n);
        let values = assign_values(DieType::D4, &n);
        for (rank, face) in order.into_iter().enumerate() {
            assert_eq!(values[face], rank as u32 + 1);
        }
    }

    #[test]
    fn test_d10_numbering_follows_sort_order() {
        let n = normals(DieType::D10);
        let values = assign_values(DieType::D10, &n);
        let order = sorted_faces(&n);
        // Upper hemisphere reads 1..5 in documented order
        let upper: Vec<u32> = order[..5].iter().map(|&f| values[f]).collect();
        assert_eq!(upper, vec![1, 2, 3, 4, 5]);
        assert!(order[..5].iter().all(|&f| n[f].y > 0.0));
    }

    #[test]
    fn test_d100_matches_d10_tens() {
        let n = normals(DieType::D10);
        let d10 = assign_values(DieType::D10, &n);
        let d100 = assign_values(DieType::D100, &n);
        for (a, b) in d10.iter().zip(&d100) {
            assert_eq!(a * 10, *b);
        }
    }

    #[test]
    fn test_d100_double_zero_sits_opposite_ten() {
        let n = normals(DieType::D100);
        let values = assign_values(DieType::D100, &n);
        let first = sorted_faces(&n)[0];
        assert_eq!(values[first], 10);
        let opp = antipode(&n, first).unwrap();
        assert_eq!(values[opp], 0);
        assert_eq!(face_ranks(&n)[opp], 9);
    }

    #[test]
    fn test_level_ties_break_by_azimuth() {
        let n = vec![
            Vec3::new(-1.0, 0.1, 0.0).normalize(),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 0.2, 1.0).normalize(),
            Vec3::Y,
        ];
        // Y first, then the band sorted by azimuth: 0 (x), π/2 (z), π (-x)
        assert_eq!(sorted_faces(&n), vec![3, 1, 2, 0]);
    }

    proptest! {
        #[test]
        fn prop_mapping_is_pure(die in 0usize..7) {
            let die_type = DieType::ALL[die];
            let n = normals(die_type);
            prop_assert_eq!(assign_values(die_type, &n), assign_values(die_type, &n));
            let rebuilt = normals(die_type);
            prop_assert_eq!(assign_values(die_type, &n), assign_values(die_type, &rebuilt));
        }
    }
}
