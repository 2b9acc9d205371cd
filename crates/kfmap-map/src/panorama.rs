//! Spherical panorama compositing from posed keyframes.

use glam::{Mat3, Vec3};
use kfmap_image::{Image, ImageSize};
use kfmap_imgproc::interpolation::remap;

use crate::error::MapError;
use crate::keyframe::Keyframe;

/// Height of the composited panorama in pixels.
pub(crate) const PANORAMA_HEIGHT: usize = 512;

/// Width of the composited panorama in pixels.
pub(crate) const PANORAMA_WIDTH: usize = 1024;

/// Minimum z component of a projected ray for a pixel to map into a frame.
const MIN_RAY_Z: f32 = 0.01;

/// Composite all keyframes into an equirectangular intensity panorama.
///
/// Each output pixel is mapped to a viewing direction, projected into every
/// frame, and blended with a radial confidence weight that favors image
/// centers. Pixels no frame covers stay at zero.
pub(crate) fn render(frames: &[Keyframe]) -> Result<Image<f32, 1>, MapError> {
    let out_size = ImageSize {
        width: PANORAMA_WIDTH,
        height: PANORAMA_HEIGHT,
    };
    let mut intensity_sum = Image::<f32, 1>::from_size_val(out_size, 0.0)?;
    let mut weight_sum = Image::<f32, 1>::from_size_val(out_size, 0.0)?;

    if frames.is_empty() {
        return Ok(intensity_sum);
    }

    let frame_size = frames[0].intensity(0).size();
    let confidence = radial_confidence(frame_size)?;

    let out_cx = PANORAMA_WIDTH as f32 / 2.0;
    let out_cy = PANORAMA_HEIGHT as f32 / 2.0;
    let scale_x = 2.0 * std::f32::consts::PI / PANORAMA_WIDTH as f32;
    let scale_y = std::f32::consts::PI / PANORAMA_HEIGHT as f32;

    let mut map_x = Image::<f32, 1>::from_size_val(out_size, -1.0)?;
    let mut map_y = Image::<f32, 1>::from_size_val(out_size, -1.0)?;
    let mut warped_intensity = Image::<f32, 1>::from_size_val(out_size, 0.0)?;
    let mut warped_weight = Image::<f32, 1>::from_size_val(out_size, 0.0)?;

    for frame in frames {
        let k = frame.intrinsics(0);
        let k_mat = Mat3::from_cols(
            Vec3::new(k.f, 0.0, 0.0),
            Vec3::new(0.0, k.f, 0.0),
            Vec3::new(k.cx, k.cy, 1.0),
        );
        let homography = k_mat * frame.pose().rotation.inverse().to_matrix();

        for v in 0..PANORAMA_HEIGHT {
            let theta = (v as f32 - out_cy) * scale_y;
            for u in 0..PANORAMA_WIDTH {
                let phi = (u as f32 - out_cx) * scale_x;
                let dir = Vec3::new(
                    theta.cos() * phi.cos(),
                    -theta.cos() * phi.sin(),
                    -theta.sin(),
                );
                let projected = homography * dir;
                if projected.z > MIN_RAY_Z {
                    map_x.set_pixel(u, v, 0, projected.x / projected.z);
                    map_y.set_pixel(u, v, 0, projected.y / projected.z);
                } else {
                    map_x.set_pixel(u, v, 0, -1.0);
                    map_y.set_pixel(u, v, 0, -1.0);
                }
            }
        }

        let mut weighted = frame.intensity(0).clone();
        weighted
            .as_slice_mut()
            .iter_mut()
            .zip(confidence.as_slice().iter())
            .for_each(|(px, &w)| *px *= w);

        remap(&weighted, &mut warped_intensity, &map_x, &map_y)?;
        remap(&confidence, &mut warped_weight, &map_x, &map_y)?;

        intensity_sum
            .as_slice_mut()
            .iter_mut()
            .zip(warped_intensity.as_slice().iter())
            .for_each(|(acc, &px)| *acc += px);
        weight_sum
            .as_slice_mut()
            .iter_mut()
            .zip(warped_weight.as_slice().iter())
            .for_each(|(acc, &w)| *acc += w);
    }

    intensity_sum
        .as_slice_mut()
        .iter_mut()
        .zip(weight_sum.as_slice().iter())
        .for_each(|(px, &w)| {
            if w > 0.0 {
                *px /= w;
            }
        });

    Ok(intensity_sum)
}

/// A per-pixel confidence that decays quadratically with the distance from
/// the image center.
fn radial_confidence(size: ImageSize) -> Result<Image<f32, 1>, MapError> {
    let mut weight = Image::<f32, 1>::from_size_val(size, 0.0)?;
    let cx = size.width as f32 / 2.0;
    let cy = size.height as f32 / 2.0;
    let max_r2 = cy * cy;

    for v in 0..size.height {
        for u in 0..size.width {
            let du = u as f32 - cx;
            let dv = v as f32 - cy;
            let w = (1.0 - (du * du + dv * dv) / max_r2).max(0.0);
            weight.set_pixel(u, v, 0, w);
        }
    }

    Ok(weight)
}
