//! Full 6-dof photometric pose refinement using depth.
//!
//! The state is one se(3) increment per keyframe, with the first frame held
//! fixed as the gauge reference. Valid depth pixels of one frame are lifted
//! to world space and reprojected into the other, so translation is
//! observable unlike in the rotation-only variant.

use glam::Vec3;
use kfmap_imgproc::interpolation::bilinear_sample;
use kfmap_lie::SE3;
use rayon::prelude::*;

use crate::error::MapError;
use crate::keyframe::Keyframe;
use crate::reduce::{
    overlapping_pairs, solve_update, NormalEquations, MAX_PAIR_ANGLE, MAX_PAIR_DISTANCE, Z_EPS,
};

/// Run one Gauss-Newton step at the given pyramid level.
///
/// Returns the largest absolute state increment. The first frame is never
/// updated.
pub(crate) fn step(frames: &mut [Keyframe], level: usize) -> Result<f32, MapError> {
    let pairs = overlapping_pairs(frames, MAX_PAIR_ANGLE, Some(MAX_PAIR_DISTANCE));
    if pairs.is_empty() {
        return Err(MapError::NoOverlappingPairs);
    }

    let num_frames = frames.len();
    let system = build_system(frames, &pairs, level);

    // drop the first frame's rows and columns before solving
    let dim = 6 * (num_frames - 1);
    let jtj = system.jtj.view((6, 6), (dim, dim)).into_owned();
    let jte = system.jte.rows(6, dim).into_owned();
    let update = solve_update(jtj, jte)?;
    let max_update = update.amax();
    log::debug!("pose graph step at level {level}: max update {max_update}");

    for i in 1..num_frames {
        let base = 6 * (i - 1);
        let upsilon = Vec3::new(update[base], update[base + 1], update[base + 2]);
        let omega = Vec3::new(update[base + 3], update[base + 4], update[base + 5]);
        frames[i].pose = SE3::exp(upsilon, omega) * frames[i].pose;
    }

    Ok(max_update)
}

/// Accumulate the normal equations over all pairs in parallel.
pub(crate) fn build_system(
    frames: &[Keyframe],
    pairs: &[(usize, usize)],
    level: usize,
) -> NormalEquations {
    let dim = 6 * frames.len();
    pairs
        .par_iter()
        .fold(
            || NormalEquations::zeros(dim),
            |mut acc, &(i, j)| {
                accumulate_pair(frames, &mut acc, i, j, level);
                acc
            },
        )
        .reduce(|| NormalEquations::zeros(dim), NormalEquations::merge)
}

/// Accumulate the residuals of reprojecting frame `j` depth into frame `i`.
fn accumulate_pair(
    frames: &[Keyframe],
    acc: &mut NormalEquations,
    i: usize,
    j: usize,
    level: usize,
) {
    let frame_i = &frames[i];
    let frame_j = &frames[j];
    let gray_i = frame_i.intensity(level);
    let gray_j = frame_j.intensity(level);
    let depth_j = frame_j.depth(level);
    let k_i = frame_i.intrinsics(level);
    let k_j = frame_j.intrinsics(level);

    let pose_j = *frame_j.pose();
    let pose_i_inv = frame_i.pose().inverse();
    let rot_i = frame_i.pose().rotation;

    let cols_i = gray_i.cols();
    let rows_i = gray_i.rows();
    let max_u = (cols_i - 2) as f32;
    let max_v = (rows_i - 2) as f32;

    for v in 0..depth_j.rows() {
        for u in 0..depth_j.cols() {
            let d = depth_j.pixel(u, v, 0);
            if d == 0 {
                continue;
            }
            let world = pose_j * k_j.backproject(u as f32, v as f32, d);
            let q = pose_i_inv * world;
            if q.z < Z_EPS {
                continue;
            }
            let inv_z = 1.0 / q.z;
            let u_i = k_i.f * q.x * inv_z + k_i.cx;
            let v_i = k_i.f * q.y * inv_z + k_i.cy;
            // keep the central-difference taps inside the image
            if u_i < 1.0 || v_i < 1.0 || u_i > max_u || v_i > max_v {
                continue;
            }

            let residual = bilinear_sample(gray_i, u_i, v_i) - gray_j.pixel(u, v, 0);
            let gx = 0.5 * (bilinear_sample(gray_i, u_i + 1.0, v_i)
                - bilinear_sample(gray_i, u_i - 1.0, v_i));
            let gy = 0.5 * (bilinear_sample(gray_i, u_i, v_i + 1.0)
                - bilinear_sample(gray_i, u_i, v_i - 1.0));

            // image gradient chained through the projection
            let a = Vec3::new(
                gx * k_i.f * inv_z,
                gy * k_i.f * inv_z,
                -(gx * q.x + gy * q.y) * k_i.f * inv_z * inv_z,
            );

            let c = rot_i * a;
            let wc = world.cross(c);
            let grad_j = [c.x, c.y, c.z, wc.x, wc.y, wc.z];
            let grad_i = [-c.x, -c.y, -c.z, -wc.x, -wc.y, -wc.z];

            acc.add_observation(&[(6 * i, &grad_i), (6 * j, &grad_j)], residual);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{constant_depth, test_intrinsics, textured_rgb};
    use approx::assert_relative_eq;
    use kfmap_lie::SO3;

    fn translated_frame(translation: Vec3) -> Keyframe {
        Keyframe::new(
            textured_rgb(64, 48),
            constant_depth(64, 48, 1000),
            SE3::new(SO3::IDENTITY, translation),
            test_intrinsics(),
        )
        .unwrap()
    }

    #[test]
    fn no_pairs_is_an_error() {
        let mut frames = vec![
            translated_frame(Vec3::ZERO),
            translated_frame(Vec3::new(10.0, 0.0, 0.0)),
        ];
        let res = step(&mut frames, 0);
        assert!(matches!(res, Err(MapError::NoOverlappingPairs)));
    }

    #[test]
    fn first_frame_stays_fixed() {
        let mut frames = vec![
            translated_frame(Vec3::ZERO),
            translated_frame(Vec3::new(0.1, 0.0, 0.0)),
            translated_frame(Vec3::new(0.2, 0.0, 0.0)),
        ];
        let before = *frames[0].pose();

        let max_update = step(&mut frames, 0).unwrap();
        assert!(max_update.is_finite());

        let after = frames[0].pose();
        assert_eq!(before.rotation.q, after.rotation.q);
        assert_eq!(before.translation, after.translation);
    }

    #[test]
    fn aligned_frames_need_no_update() {
        // both frames observe the same world surface from the same pose, so
        // every residual is zero and the update vanishes
        let mut frames = vec![translated_frame(Vec3::ZERO), translated_frame(Vec3::ZERO)];
        let max_update = step(&mut frames, 0).unwrap();
        assert_relative_eq!(max_update, 0.0, epsilon = 1e-4);
    }

    #[test]
    fn build_system_is_order_invariant() {
        let frames = vec![
            translated_frame(Vec3::ZERO),
            translated_frame(Vec3::new(0.05, 0.0, 0.0)),
            translated_frame(Vec3::new(0.0, 0.05, 0.0)),
        ];
        let pairs = overlapping_pairs(&frames, MAX_PAIR_ANGLE, Some(MAX_PAIR_DISTANCE));
        let mut reversed = pairs.clone();
        reversed.reverse();

        let forward = build_system(&frames, &pairs, 1);
        let backward = build_system(&frames, &reversed, 1);

        for a in 0..forward.jtj.nrows() {
            for b in 0..forward.jtj.ncols() {
                assert_relative_eq!(
                    forward.jtj[(a, b)],
                    backward.jtj[(a, b)],
                    epsilon = 1e-3,
                    max_relative = 1e-3
                );
            }
            assert_relative_eq!(
                forward.jte[a],
                backward.jte[a],
                epsilon = 1e-3,
                max_relative = 1e-3
            );
        }
    }
}
