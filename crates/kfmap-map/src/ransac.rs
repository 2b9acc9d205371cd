use glam::{Mat3, Vec3};
use kfmap_lie::{SE3, SO3};
use nalgebra::{Matrix3, Vector3};
use rand::Rng;

use crate::error::MapError;

/// Parameters of the robust rigid alignment estimator.
#[derive(Debug, Clone, Copy)]
pub struct RansacParams {
    /// Number of sampling iterations.
    pub num_iterations: usize,
    /// Squared euclidean distance below which a correspondence is an inlier,
    /// in square meters.
    pub distance2_threshold: f32,
    /// Minimum size of the consensus set for the estimate to be accepted.
    pub min_inliers: usize,
}

impl Default for RansacParams {
    fn default() -> Self {
        Self {
            num_iterations: 5000,
            distance2_threshold: 0.03 * 0.03,
            min_inliers: 20,
        }
    }
}

/// Fit the rigid transform mapping `src` onto `dst` in the least squares
/// sense.
///
/// Uses the SVD of the centered covariance with a determinant correction so
/// the result is always a proper rotation. Both slices must have the same
/// nonzero length.
pub fn fit_rigid_transform(src: &[Vec3], dst: &[Vec3]) -> SE3 {
    debug_assert_eq!(src.len(), dst.len());
    debug_assert!(!src.is_empty());

    let inv_n = 1.0 / src.len() as f32;
    let src_centroid = src.iter().copied().sum::<Vec3>() * inv_n;
    let dst_centroid = dst.iter().copied().sum::<Vec3>() * inv_n;

    let mut cov = Matrix3::<f32>::zeros();
    for (s, d) in src.iter().zip(dst.iter()) {
        let sc = *s - src_centroid;
        let dc = *d - dst_centroid;
        cov += Vector3::new(sc.x, sc.y, sc.z) * Vector3::new(dc.x, dc.y, dc.z).transpose();
    }

    let svd = cov.svd(true, true);
    let u = svd.u.unwrap_or_else(Matrix3::identity);
    let mut v = svd.v_t.unwrap_or_else(Matrix3::identity).transpose();

    let mut rotation = v * u.transpose();
    if rotation.determinant() < 0.0 {
        v.column_mut(2).neg_mut();
        rotation = v * u.transpose();
    }

    let rot_mat = Mat3::from_cols(
        Vec3::new(rotation[(0, 0)], rotation[(1, 0)], rotation[(2, 0)]),
        Vec3::new(rotation[(0, 1)], rotation[(1, 1)], rotation[(2, 1)]),
        Vec3::new(rotation[(0, 2)], rotation[(1, 2)], rotation[(2, 2)]),
    );
    let rotation = SO3::from_matrix(&rot_mat);
    let translation = dst_centroid - rotation * src_centroid;

    SE3::new(rotation, translation)
}

/// Estimate the rigid transform between two point sets with RANSAC.
///
/// `matches` holds `(i, j)` index pairs into `src_points` and `dst_points`.
/// Each iteration fits a candidate transform to three distinct
/// correspondences and scores it by the size of its consensus set; the best
/// candidate is refit on all of its inliers.
///
/// # Arguments
///
/// * `src_points` - Points in the source frame.
/// * `dst_points` - Points in the destination frame.
/// * `matches` - Correspondence index pairs.
/// * `params` - Estimator parameters.
/// * `rng` - Random source driving the sampling.
///
/// # Returns
///
/// The estimated transform and a per-correspondence inlier mask.
pub fn estimate_transform_ransac(
    src_points: &[Vec3],
    dst_points: &[Vec3],
    matches: &[(usize, usize)],
    params: &RansacParams,
    rng: &mut impl Rng,
) -> Result<(SE3, Vec<bool>), MapError> {
    if matches.len() < params.min_inliers {
        return Err(MapError::NotEnoughCorrespondences {
            required: params.min_inliers,
            actual: matches.len(),
        });
    }

    let src: Vec<Vec3> = matches.iter().map(|&(i, _)| src_points[i]).collect();
    let dst: Vec<Vec3> = matches.iter().map(|&(_, j)| dst_points[j]).collect();

    let mut best_transform = SE3::IDENTITY;
    let mut best_inliers = 0usize;

    for _ in 0..params.num_iterations {
        let (a, b, c) = loop {
            let a = rng.random_range(0..matches.len());
            let b = rng.random_range(0..matches.len());
            let c = rng.random_range(0..matches.len());
            if a != b && a != c && b != c {
                break (a, b, c);
            }
        };

        let sample_src = [src[a], src[b], src[c]];
        let sample_dst = [dst[a], dst[b], dst[c]];
        let candidate = fit_rigid_transform(&sample_src, &sample_dst);

        let num_inliers = src
            .iter()
            .zip(dst.iter())
            .filter(|&(s, d)| (candidate * *s - *d).length_squared() < params.distance2_threshold)
            .count();

        // strictly greater, so earlier candidates win ties
        if num_inliers > best_inliers {
            best_inliers = num_inliers;
            best_transform = candidate;
        }
    }

    if best_inliers < params.min_inliers {
        return Err(MapError::NotEnoughInliers {
            required: params.min_inliers,
            actual: best_inliers,
        });
    }

    let inlier_mask: Vec<bool> = src
        .iter()
        .zip(dst.iter())
        .map(|(s, d)| (best_transform * *s - *d).length_squared() < params.distance2_threshold)
        .collect();

    let inlier_src: Vec<Vec3> = src
        .iter()
        .zip(inlier_mask.iter())
        .filter_map(|(s, &keep)| keep.then_some(*s))
        .collect();
    let inlier_dst: Vec<Vec3> = dst
        .iter()
        .zip(inlier_mask.iter())
        .filter_map(|(d, &keep)| keep.then_some(*d))
        .collect();

    log::debug!(
        "ransac: {} inliers of {} correspondences",
        inlier_src.len(),
        matches.len()
    );

    Ok((fit_rigid_transform(&inlier_src, &inlier_dst), inlier_mask))
}
