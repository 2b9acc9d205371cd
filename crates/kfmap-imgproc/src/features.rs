use kfmap_image::{Image, ImageError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

/// Number of bytes in a binary descriptor.
pub const DESCRIPTOR_SIZE: usize = 32;

/// Half extent of the descriptor sampling patch.
const PATCH_RADIUS: i32 = 15;

/// Seed for the fixed BRIEF sampling pattern. Descriptors are only comparable
/// when computed from the same pattern, so it never changes at runtime.
const PATTERN_SEED: u64 = 0x5eed_b41f;

/// A detected keypoint with its detector response.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyPoint {
    /// Column of the keypoint in pixels.
    pub x: usize,
    /// Row of the keypoint in pixels.
    pub y: usize,
    /// Detector response at the keypoint.
    pub response: f32,
}

/// Compute the Hessian response of an image.
///
/// The response is the determinant of the Hessian matrix of second
/// derivatives, evaluated per pixel. Border pixels are left at zero.
///
/// # Arguments
///
/// * `src` - The source image with shape (H, W).
/// * `dst` - The destination image with shape (H, W).
pub fn hessian_response(src: &Image<f32, 1>, dst: &mut Image<f32, 1>) -> Result<(), ImageError> {
    if src.size() != dst.size() {
        return Err(ImageError::InvalidImageSize(
            src.cols(),
            src.rows(),
            dst.cols(),
            dst.rows(),
        ));
    }

    let src_data = src.as_slice();
    let cols = src.cols();
    let rows = src.rows();

    dst.as_slice_mut()
        .par_chunks_exact_mut(cols)
        .enumerate()
        .for_each(|(row_idx, row_chunk)| {
            if row_idx == 0 || row_idx == rows - 1 {
                return;
            }

            let row_offset = row_idx * cols;

            row_chunk
                .iter_mut()
                .enumerate()
                .for_each(|(col_idx, dst_pixel)| {
                    if col_idx == 0 || col_idx == cols - 1 {
                        return;
                    }

                    let current_idx = row_offset + col_idx;
                    let prev_row_idx = current_idx - cols;
                    let next_row_idx = current_idx + cols;

                    let v11 = src_data[prev_row_idx - 1];
                    let v12 = src_data[prev_row_idx];
                    let v13 = src_data[prev_row_idx + 1];
                    let v21 = src_data[current_idx - 1];
                    let v22 = src_data[current_idx];
                    let v23 = src_data[current_idx + 1];
                    let v31 = src_data[next_row_idx - 1];
                    let v32 = src_data[next_row_idx];
                    let v33 = src_data[next_row_idx + 1];

                    let dxx = v21 - 2.0 * v22 + v23;
                    let dyy = v12 - 2.0 * v22 + v32;
                    let dxy = 0.25 * (v31 - v11 - v33 + v13);

                    *dst_pixel = dxx * dyy - dxy * dxy;
                });
        });

    Ok(())
}

/// Detect blob keypoints as local maxima of the Hessian response.
///
/// A pixel is a keypoint when its response exceeds `threshold` and is not
/// smaller than any of its 8 neighbors. Keypoints are returned strongest
/// first.
///
/// # Arguments
///
/// * `src` - The source grayscale image.
/// * `threshold` - Minimum Hessian response for a keypoint.
pub fn detect_hessian_keypoints(
    src: &Image<f32, 1>,
    threshold: f32,
) -> Result<Vec<KeyPoint>, ImageError> {
    let mut response = Image::<f32, 1>::from_size_val(src.size(), 0.0)?;
    hessian_response(src, &mut response)?;

    let cols = src.cols();
    let rows = src.rows();
    let data = response.as_slice();

    let mut keypoints: Vec<KeyPoint> = (1..rows.saturating_sub(1))
        .into_par_iter()
        .flat_map(|y| {
            let mut row_keypoints = Vec::new();
            for x in 1..cols - 1 {
                let idx = y * cols + x;
                let r = data[idx];
                if r <= threshold {
                    continue;
                }
                let is_max = data[idx - cols - 1] <= r
                    && data[idx - cols] <= r
                    && data[idx - cols + 1] <= r
                    && data[idx - 1] <= r
                    && data[idx + 1] <= r
                    && data[idx + cols - 1] <= r
                    && data[idx + cols] <= r
                    && data[idx + cols + 1] <= r;
                if is_max {
                    row_keypoints.push(KeyPoint { x, y, response: r });
                }
            }
            row_keypoints
        })
        .collect();

    keypoints.sort_by(|a, b| b.response.total_cmp(&a.response));

    Ok(keypoints)
}

/// Generate the fixed BRIEF point-pair sampling pattern.
fn brief_pattern() -> Vec<(i32, i32, i32, i32)> {
    let mut rng = StdRng::seed_from_u64(PATTERN_SEED);
    (0..DESCRIPTOR_SIZE * 8)
        .map(|_| {
            (
                rng.random_range(-PATCH_RADIUS..=PATCH_RADIUS),
                rng.random_range(-PATCH_RADIUS..=PATCH_RADIUS),
                rng.random_range(-PATCH_RADIUS..=PATCH_RADIUS),
                rng.random_range(-PATCH_RADIUS..=PATCH_RADIUS),
            )
        })
        .collect()
}

/// Compute BRIEF binary descriptors for a set of keypoints.
///
/// Each descriptor bit is an intensity comparison between a fixed pair of
/// offsets around the keypoint; sampling coordinates are clamped to the
/// image. The source should be a smoothed grayscale image.
///
/// # Arguments
///
/// * `src` - The smoothed source grayscale image.
/// * `keypoints` - The keypoints to describe.
pub fn compute_brief_descriptors(
    src: &Image<f32, 1>,
    keypoints: &[KeyPoint],
) -> Vec<[u8; DESCRIPTOR_SIZE]> {
    let pattern = brief_pattern();
    let cols = src.cols() as i32;
    let rows = src.rows() as i32;
    let data = src.as_slice();

    let sample = |x: i32, y: i32| -> f32 {
        let xc = x.clamp(0, cols - 1);
        let yc = y.clamp(0, rows - 1);
        data[(yc * cols + xc) as usize]
    };

    keypoints
        .par_iter()
        .map(|kp| {
            let (x, y) = (kp.x as i32, kp.y as i32);
            let mut desc = [0u8; DESCRIPTOR_SIZE];
            for (bit, &(x0, y0, x1, y1)) in pattern.iter().enumerate() {
                if sample(x + x0, y + y0) < sample(x + x1, y + y1) {
                    desc[bit / 8] |= 1 << (bit % 8);
                }
            }
            desc
        })
        .collect()
}

/// Hamming distance between two fixed-size byte descriptors.
#[inline]
fn hamming_distance(a: &[u8], b: &[u8]) -> u32 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| (x ^ y).count_ones())
        .sum()
}

/// Match binary descriptors using brute-force Hamming distance.
///
/// For each descriptor in `descriptors1`, finds the nearest neighbor in
/// `descriptors2` and keeps only mutual nearest neighbors.
///
/// # Arguments
///
/// * `descriptors1` - First set of binary descriptors (query).
/// * `descriptors2` - Second set of binary descriptors (train).
///
/// # Returns
///
/// Vector of `(i, j)` index pairs into `descriptors1` and `descriptors2`.
pub fn match_descriptors(
    descriptors1: &[[u8; DESCRIPTOR_SIZE]],
    descriptors2: &[[u8; DESCRIPTOR_SIZE]],
) -> Vec<(usize, usize)> {
    let m = descriptors1.len();
    let n = descriptors2.len();
    if m == 0 || n == 0 {
        return vec![];
    }

    // Forward pass: for each desc1[i], the best match in desc2.
    let mut fwd_best_j = vec![0usize; m];
    let mut fwd_best_dist = vec![u32::MAX; m];
    for (i, d1) in descriptors1.iter().enumerate() {
        for (j, d2) in descriptors2.iter().enumerate() {
            let dist = hamming_distance(d1, d2);
            if dist < fwd_best_dist[i] {
                fwd_best_dist[i] = dist;
                fwd_best_j[i] = j;
            }
        }
    }

    // Reverse pass for the cross-check.
    let mut rev_best_i = vec![0usize; n];
    let mut rev_best_dist = vec![u32::MAX; n];
    for (i, d1) in descriptors1.iter().enumerate() {
        for (j, d2) in descriptors2.iter().enumerate() {
            let dist = hamming_distance(d1, d2);
            if dist < rev_best_dist[j] {
                rev_best_dist[j] = dist;
                rev_best_i[j] = i;
            }
        }
    }

    (0..m)
        .filter(|&i| rev_best_i[fwd_best_j[i]] == i)
        .map(|i| (i, fwd_best_j[i]))
        .collect()
}
