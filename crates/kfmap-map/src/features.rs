use glam::Vec3;
use kfmap_image::Image;
use kfmap_imgproc::color::gray_from_rgb;
use kfmap_imgproc::features::{
    compute_brief_descriptors, detect_hessian_keypoints, KeyPoint, DESCRIPTOR_SIZE,
};
use kfmap_imgproc::filter::gaussian_blur;

use crate::error::MapError;
use crate::keyframe::Intrinsics;

/// Initial Hessian response threshold for the blob detector.
const INITIAL_THRESHOLD: f32 = 400.0;

/// Minimum keypoint count before the threshold is relaxed.
const MIN_KEYPOINTS: usize = 300;

/// Maximum number of keypoints kept per frame.
const MAX_KEYPOINTS: usize = 400;

/// Maximum number of threshold relaxation rounds.
const MAX_RELAX_ROUNDS: usize = 5;

/// Sparse features of one frame: 2d keypoints, their back-projected 3d
/// positions in the camera frame, and binary descriptors.
///
/// The three vectors are parallel; only keypoints with a valid depth
/// measurement survive the pipeline.
#[derive(Debug, Clone)]
pub struct FrameFeatures {
    /// Detected keypoints in pixel coordinates.
    pub keypoints: Vec<KeyPoint>,
    /// Keypoint positions in the camera frame, in meters.
    pub points3d: Vec<Vec3>,
    /// Binary descriptors, one per keypoint.
    pub descriptors: Vec<[u8; DESCRIPTOR_SIZE]>,
}

/// Extract sparse features from a posed rgb-d frame.
///
/// The rgb image is converted to grayscale and smoothed, blob keypoints are
/// detected with an adaptive Hessian threshold, keypoints without a depth
/// measurement are dropped, and the survivors are back-projected and
/// described.
///
/// # Arguments
///
/// * `rgb` - The rgb image of the frame.
/// * `depth` - The depth image in millimeters, zero meaning invalid.
/// * `intrinsics` - The camera intrinsics at full resolution.
pub fn compute_features(
    rgb: &Image<u8, 3>,
    depth: &Image<u16, 1>,
    intrinsics: &Intrinsics,
) -> Result<FrameFeatures, MapError> {
    let mut gray = Image::<f32, 1>::from_size_val(rgb.size(), 0.0)?;
    gray_from_rgb(rgb, &mut gray)?;

    let mut smoothed = Image::<f32, 1>::from_size_val(gray.size(), 0.0)?;
    gaussian_blur(&gray, &mut smoothed, (3, 3), (3.0, 3.0))?;

    let mut threshold = INITIAL_THRESHOLD;
    let mut keypoints = detect_hessian_keypoints(&smoothed, threshold)?;
    for _ in 0..MAX_RELAX_ROUNDS {
        if keypoints.len() >= MIN_KEYPOINTS {
            break;
        }
        threshold /= 2.0;
        keypoints = detect_hessian_keypoints(&smoothed, threshold)?;
    }
    keypoints.truncate(MAX_KEYPOINTS);

    let mut valid = Vec::with_capacity(keypoints.len());
    let mut points3d = Vec::with_capacity(keypoints.len());
    for kp in keypoints {
        let d = depth.pixel(kp.x, kp.y, 0);
        if d == 0 {
            continue;
        }
        points3d.push(intrinsics.backproject(kp.x as f32, kp.y as f32, d));
        valid.push(kp);
    }

    let descriptors = compute_brief_descriptors(&smoothed, &valid);
    log::debug!(
        "extracted {} keypoints with depth (threshold {threshold})",
        valid.len()
    );

    Ok(FrameFeatures {
        keypoints: valid,
        points3d,
        descriptors,
    })
}
