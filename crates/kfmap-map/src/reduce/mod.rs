//! Parallel accumulation of photometric normal equations.

pub(crate) mod panorama;
pub(crate) mod pose_graph;

use nalgebra::{DMatrix, DVector};

use crate::error::MapError;
use crate::keyframe::Keyframe;

/// Maximum angle between two keyframes for them to form an overlapping pair.
pub(crate) const MAX_PAIR_ANGLE: f32 = std::f32::consts::FRAC_PI_6;

/// Maximum distance between two keyframe centers for a pose-graph pair, in
/// meters.
pub(crate) const MAX_PAIR_DISTANCE: f32 = 0.5;

/// Constant damping added to the diagonal of the normal equations. The
/// panorama system has a global rotation gauge freedom, so the undamped
/// matrix is singular.
const DAMPING: f32 = 1e-3;

/// Rays with a smaller z component in the target camera are behind it.
pub(crate) const Z_EPS: f32 = 1e-6;

/// Accumulated Gauss-Newton normal equations `Jᵀ J x = Jᵀ e`.
pub(crate) struct NormalEquations {
    pub jtj: DMatrix<f32>,
    pub jte: DVector<f32>,
}

impl NormalEquations {
    /// A zeroed system of the given dimension.
    pub fn zeros(dim: usize) -> Self {
        Self {
            jtj: DMatrix::zeros(dim, dim),
            jte: DVector::zeros(dim),
        }
    }

    /// Sum another system into this one.
    pub fn merge(mut self, other: Self) -> Self {
        self.jtj += other.jtj;
        self.jte += other.jte;
        self
    }

    /// Accumulate one residual observation.
    ///
    /// `blocks` holds `(row_offset, gradient)` pairs, one per state block the
    /// residual touches. Addition is the only operation, so observations can
    /// be accumulated in any order.
    pub fn add_observation(&mut self, blocks: &[(usize, &[f32])], residual: f32) {
        for &(row_a, grad_a) in blocks {
            for &(row_b, grad_b) in blocks {
                for (a, &ga) in grad_a.iter().enumerate() {
                    for (b, &gb) in grad_b.iter().enumerate() {
                        self.jtj[(row_a + a, row_b + b)] += ga * gb;
                    }
                }
            }
            for (a, &ga) in grad_a.iter().enumerate() {
                self.jte[row_a + a] += ga * residual;
            }
        }
    }
}

/// Solve the damped system for the Gauss-Newton update `-(JᵀJ + λI)⁻¹ Jᵀe`.
pub(crate) fn solve_update(
    mut jtj: DMatrix<f32>,
    jte: DVector<f32>,
) -> Result<DVector<f32>, MapError> {
    for i in 0..jtj.nrows() {
        jtj[(i, i)] += DAMPING;
    }
    let chol = jtj.cholesky().ok_or(MapError::DegenerateSystem)?;
    Ok(-chol.solve(&jte))
}

/// All ordered keyframe pairs that look in a similar direction.
///
/// A pair qualifies when the angle between the camera orientations is below
/// `max_angle` and, if given, the distance between the camera centers is
/// below `max_distance`.
pub(crate) fn overlapping_pairs(
    frames: &[Keyframe],
    max_angle: f32,
    max_distance: Option<f32>,
) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    for i in 0..frames.len() {
        for j in 0..frames.len() {
            if i == j {
                continue;
            }
            let angle = frames[i]
                .pose()
                .rotation
                .angular_distance(&frames[j].pose().rotation);
            if angle >= max_angle {
                continue;
            }
            if let Some(max_distance) = max_distance {
                let distance =
                    (frames[i].pose().translation - frames[j].pose().translation).length();
                if distance >= max_distance {
                    continue;
                }
            }
            pairs.push((i, j));
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::rotated_frame;
    use approx::assert_relative_eq;
    use glam::Vec3;

    #[test]
    fn add_observation_is_symmetric() {
        let mut system = NormalEquations::zeros(6);
        let ga = [1.0, 2.0, 3.0];
        let gb = [-1.0, 0.5, 0.0];
        system.add_observation(&[(0, &ga), (3, &gb)], 2.0);

        for a in 0..6 {
            for b in 0..6 {
                assert_relative_eq!(system.jtj[(a, b)], system.jtj[(b, a)]);
            }
        }
        assert_relative_eq!(system.jtj[(0, 0)], 1.0);
        assert_relative_eq!(system.jtj[(0, 3)], -1.0);
        assert_relative_eq!(system.jte[1], 4.0);
        assert_relative_eq!(system.jte[4], 1.0);
    }

    #[test]
    fn merge_sums_systems() {
        let mut a = NormalEquations::zeros(2);
        let mut b = NormalEquations::zeros(2);
        a.add_observation(&[(0, &[1.0, 0.0])], 1.0);
        b.add_observation(&[(0, &[0.0, 2.0])], -1.0);

        let merged = a.merge(b);
        assert_relative_eq!(merged.jtj[(0, 0)], 1.0);
        assert_relative_eq!(merged.jtj[(1, 1)], 4.0);
        assert_relative_eq!(merged.jte[0], 1.0);
        assert_relative_eq!(merged.jte[1], -2.0);
    }

    #[test]
    fn solve_update_handles_singular_system() {
        // rank deficient without damping
        let mut system = NormalEquations::zeros(2);
        system.add_observation(&[(0, &[1.0, 1.0])], 1.0);
        let update = solve_update(system.jtj, system.jte).unwrap();
        assert!(update.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn pairs_respect_angle_threshold() {
        let frames = vec![
            rotated_frame(Vec3::ZERO, Vec3::ZERO),
            rotated_frame(Vec3::new(0.0, 0.2, 0.0), Vec3::ZERO),
            rotated_frame(Vec3::new(0.0, 1.2, 0.0), Vec3::ZERO),
        ];
        let pairs = overlapping_pairs(&frames, MAX_PAIR_ANGLE, None);
        assert!(pairs.contains(&(0, 1)));
        assert!(pairs.contains(&(1, 0)));
        assert!(!pairs.iter().any(|&(i, j)| i == 2 || j == 2));
    }

    #[test]
    fn pairs_respect_distance_threshold() {
        let frames = vec![
            rotated_frame(Vec3::ZERO, Vec3::ZERO),
            rotated_frame(Vec3::ZERO, Vec3::new(0.3, 0.0, 0.0)),
            rotated_frame(Vec3::ZERO, Vec3::new(2.0, 0.0, 0.0)),
        ];
        let pairs = overlapping_pairs(&frames, MAX_PAIR_ANGLE, Some(MAX_PAIR_DISTANCE));
        assert!(pairs.contains(&(0, 1)));
        assert!(!pairs.iter().any(|&(i, j)| i == 2 || j == 2));

        let unconstrained = overlapping_pairs(&frames, MAX_PAIR_ANGLE, None);
        assert_eq!(unconstrained.len(), 6);
    }
}
