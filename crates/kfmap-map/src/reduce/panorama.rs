//! Rotation-only photometric refinement with shared intrinsics.
//!
//! The state is one rotation increment per keyframe plus a shared log-space
//! intrinsics increment at the tail, `3N + 3` parameters in total. All
//! translations are pinned to the first frame, so the refined map is a pure
//! panorama.

use glam::Vec3;
use kfmap_imgproc::interpolation::bilinear_sample;
use kfmap_lie::SO3;
use rayon::prelude::*;

use crate::error::MapError;
use crate::keyframe::Keyframe;
use crate::reduce::{
    overlapping_pairs, solve_update, NormalEquations, MAX_PAIR_ANGLE, Z_EPS,
};

/// Run one Gauss-Newton step at the given pyramid level.
///
/// Returns the largest absolute state increment, which callers use as a
/// convergence measure.
pub(crate) fn step(frames: &mut [Keyframe], level: usize) -> Result<f32, MapError> {
    let pairs = overlapping_pairs(frames, MAX_PAIR_ANGLE, None);
    if pairs.is_empty() {
        return Err(MapError::NoOverlappingPairs);
    }

    let num_frames = frames.len();
    let system = build_system(frames, &pairs, level);
    let update = solve_update(system.jtj, system.jte)?;
    let max_update = update.amax();
    log::debug!("panorama step at level {level}: max update {max_update}");

    let intrinsics_update = Vec3::new(
        update[3 * num_frames],
        update[3 * num_frames + 1],
        update[3 * num_frames + 2],
    );
    let anchor_translation = frames[0].pose.translation;

    for (i, frame) in frames.iter_mut().enumerate() {
        let omega = Vec3::new(update[3 * i], update[3 * i + 1], update[3 * i + 2]);
        frame.pose.rotation = SO3::exp(omega) * frame.pose.rotation;
        frame.pose.translation = anchor_translation;
        frame.intrinsics.exp_update(intrinsics_update);
    }

    Ok(max_update)
}

/// Accumulate the normal equations over all pairs in parallel.
pub(crate) fn build_system(
    frames: &[Keyframe],
    pairs: &[(usize, usize)],
    level: usize,
) -> NormalEquations {
    let dim = 3 * frames.len() + 3;
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

/// Accumulate the residuals of warping frame `i` into frame `j`.
fn accumulate_pair(
    frames: &[Keyframe],
    acc: &mut NormalEquations,
    i: usize,
    j: usize,
    level: usize,
) {
    let num_frames = frames.len();
    let frame_i = &frames[i];
    let frame_j = &frames[j];
    let gray_i = frame_i.intensity(level);
    let gray_j = frame_j.intensity(level);
    let k_i = frame_i.intrinsics(level);
    let k_j = frame_j.intrinsics(level);

    let rot_i = frame_i.pose.rotation.to_matrix();
    let rot_j_inv = frame_j.pose.rotation.inverse().to_matrix();
    let rot_j_inv_i = rot_j_inv * rot_i;

    let cols = gray_i.cols();
    let rows = gray_i.rows();
    let max_u = (cols - 2) as f32;
    let max_v = (rows - 2) as f32;

    for v in 0..rows {
        for u in 0..cols {
            let ray = Vec3::new((u as f32 - k_i.cx) / k_i.f, (v as f32 - k_i.cy) / k_i.f, 1.0);
            let world = rot_i * ray;
            let p = rot_j_inv * world;
            if p.z < Z_EPS {
                continue;
            }
            let inv_z = 1.0 / p.z;
            let u_j = k_j.f * p.x * inv_z + k_j.cx;
            let v_j = k_j.f * p.y * inv_z + k_j.cy;
            // keep the central-difference taps inside the image
            if u_j < 1.0 || v_j < 1.0 || u_j > max_u || v_j > max_v {
                continue;
            }

            let residual = bilinear_sample(gray_j, u_j, v_j) - gray_i.pixel(u, v, 0);
            let gx = 0.5 * (bilinear_sample(gray_j, u_j + 1.0, v_j)
                - bilinear_sample(gray_j, u_j - 1.0, v_j));
            let gy = 0.5 * (bilinear_sample(gray_j, u_j, v_j + 1.0)
                - bilinear_sample(gray_j, u_j, v_j - 1.0));

            // image gradient chained through the projection
            let a = Vec3::new(
                gx * k_j.f * inv_z,
                gy * k_j.f * inv_z,
                -(gx * p.x + gy * p.y) * k_j.f * inv_z * inv_z,
            );

            let m = rot_j_inv * SO3::hat(world);
            let grad_j = m.transpose() * a;
            let grad_i = -grad_j;

            // shared intrinsics: projection side plus back-projection side
            let proj_side = Vec3::new(
                (gx * p.x + gy * p.y) * k_j.f * inv_z,
                gx * k_j.cx,
                gy * k_j.cy,
            );
            let back_f = rot_j_inv_i * Vec3::new(-ray.x, -ray.y, 0.0);
            let back_cx = rot_j_inv_i * Vec3::new(-k_i.cx / k_i.f, 0.0, 0.0);
            let back_cy = rot_j_inv_i * Vec3::new(0.0, -k_i.cy / k_i.f, 0.0);
            let grad_k = proj_side + Vec3::new(a.dot(back_f), a.dot(back_cx), a.dot(back_cy));

            let grad_i = grad_i.to_array();
            let grad_j = grad_j.to_array();
            let grad_k = grad_k.to_array();
            acc.add_observation(
                &[(3 * i, &grad_i), (3 * j, &grad_j), (3 * num_frames, &grad_k)],
                residual,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{rotated_frame, test_intrinsics};
    use approx::assert_relative_eq;
    use kfmap_lie::SO3;

    fn relative_rotation_error(frames: &[Keyframe], truth: &[SO3]) -> f32 {
        let mut worst = 0.0f32;
        for k in 1..frames.len() {
            let rel_est = frames[k].pose.rotation * frames[0].pose.rotation.inverse();
            let rel_truth = truth[k] * truth[0].inverse();
            let err = (rel_est * rel_truth.inverse()).log().length();
            worst = worst.max(err);
        }
        worst
    }

    #[test]
    fn no_pairs_is_an_error() {
        // frames looking in opposite directions never pair up
        let mut frames = vec![
            rotated_frame(Vec3::ZERO, Vec3::ZERO),
            rotated_frame(Vec3::new(0.0, std::f32::consts::PI, 0.0), Vec3::ZERO),
        ];
        let res = step(&mut frames, 0);
        assert!(matches!(res, Err(MapError::NoOverlappingPairs)));
    }

    #[test]
    fn build_system_is_order_invariant() {
        let frames = vec![
            rotated_frame(Vec3::ZERO, Vec3::ZERO),
            rotated_frame(Vec3::new(0.0, 0.15, 0.0), Vec3::ZERO),
            rotated_frame(Vec3::new(0.0, -0.15, 0.0), Vec3::ZERO),
        ];
        let pairs = overlapping_pairs(&frames, MAX_PAIR_ANGLE, None);
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

    #[test]
    fn step_pins_translations_to_first_frame() {
        let anchor = Vec3::new(0.1, -0.2, 0.3);
        let mut frames = vec![
            rotated_frame(Vec3::ZERO, anchor),
            rotated_frame(Vec3::new(0.0, 0.1, 0.0), Vec3::new(5.0, 5.0, 5.0)),
        ];
        step(&mut frames, 0).unwrap();
        for frame in &frames {
            assert_relative_eq!(frame.pose.translation.x, anchor.x);
            assert_relative_eq!(frame.pose.translation.y, anchor.y);
            assert_relative_eq!(frame.pose.translation.z, anchor.z);
        }
    }

    #[test]
    fn refinement_reduces_rotation_error() {
        let truth = vec![
            SO3::exp(Vec3::ZERO),
            SO3::exp(Vec3::new(0.0, 0.15, 0.0)),
            SO3::exp(Vec3::new(0.0, -0.15, 0.0)),
        ];
        let mut frames = vec![
            rotated_frame(Vec3::ZERO, Vec3::ZERO),
            rotated_frame(Vec3::new(0.0, 0.15, 0.0), Vec3::ZERO),
            rotated_frame(Vec3::new(0.0, -0.15, 0.0), Vec3::ZERO),
        ];
        // perturb the stored poses away from the rendered viewpoints
        frames[1].pose.rotation = SO3::exp(Vec3::new(0.02, 0.0, -0.015)) * frames[1].pose.rotation;
        frames[2].pose.rotation = SO3::exp(Vec3::new(-0.015, 0.02, 0.0)) * frames[2].pose.rotation;

        let initial_error = relative_rotation_error(&frames, &truth);
        assert!(initial_error > 0.01);

        for _ in 0..30 {
            let max_update = step(&mut frames, 0).unwrap();
            if max_update < 1e-4 {
                break;
            }
        }

        let final_error = relative_rotation_error(&frames, &truth);
        assert!(
            final_error < initial_error,
            "error grew from {initial_error} to {final_error}"
        );
        assert!(final_error < 0.015, "final error {final_error}");

        // the shared intrinsics must stay close to the rendering camera
        let truth_k = test_intrinsics();
        let refined_k = frames[0].intrinsics(0);
        assert_relative_eq!(refined_k.f, truth_k.f, max_relative = 0.05);
        assert_relative_eq!(refined_k.cx, truth_k.cx, max_relative = 0.05);
        assert_relative_eq!(refined_k.cy, truth_k.cy, max_relative = 0.05);
    }
}
