//! Synthetic frame builders shared by the crate tests.

use glam::Vec3;
use kfmap_image::{Image, ImageSize};
use kfmap_lie::{SE3, SO3};

use crate::keyframe::{Intrinsics, Keyframe, KeyframeRecord};

/// Intrinsics used by all synthetic frames (64x48, roughly 77 degree fov).
pub(crate) fn test_intrinsics() -> Intrinsics {
    Intrinsics::new(40.0, 32.0, 24.0)
}

/// A deterministic high frequency texture, equal in all three channels.
pub(crate) fn textured_rgb(width: usize, height: usize) -> Image<u8, 3> {
    let size = ImageSize { width, height };
    let mut img = Image::<u8, 3>::from_size_val(size, 0).unwrap();
    for y in 0..height {
        for x in 0..width {
            let val = (((x * 31 + y * 17) % 97) * 2) as u8;
            for ch in 0..3 {
                img.set_pixel(x, y, ch, val);
            }
        }
    }
    img
}

/// A constant depth image in millimeters.
pub(crate) fn constant_depth(width: usize, height: usize, depth_mm: u16) -> Image<u16, 1> {
    Image::<u16, 1>::from_size_val(ImageSize { width, height }, depth_mm).unwrap()
}

/// Intensity of the synthetic world in a given viewing direction.
///
/// Linear in the direction components, so photometric residuals are smooth
/// in the camera rotation.
pub(crate) fn world_intensity(dir: Vec3) -> f32 {
    0.5 + 0.25 * dir.x + 0.2 * dir.y
}

/// Render the synthetic world as seen by a camera with the given rotation.
pub(crate) fn render_world_rgb(
    rotation: &SO3,
    intrinsics: &Intrinsics,
    width: usize,
    height: usize,
) -> Image<u8, 3> {
    let size = ImageSize { width, height };
    let mut img = Image::<u8, 3>::from_size_val(size, 0).unwrap();
    for v in 0..height {
        for u in 0..width {
            let ray = Vec3::new(
                (u as f32 - intrinsics.cx) / intrinsics.f,
                (v as f32 - intrinsics.cy) / intrinsics.f,
                1.0,
            );
            let dir = (*rotation * ray).normalize();
            let val = (world_intensity(dir) * 255.0).round().clamp(0.0, 255.0) as u8;
            for ch in 0..3 {
                img.set_pixel(u, v, ch, val);
            }
        }
    }
    img
}

/// A keyframe looking at the synthetic world from the given rotation, with
/// constant depth of one meter.
pub(crate) fn rotated_frame(omega: Vec3, translation: Vec3) -> Keyframe {
    let intrinsics = test_intrinsics();
    let rotation = SO3::exp(omega);
    let rgb = render_world_rgb(&rotation, &intrinsics, 64, 48);
    let depth = constant_depth(64, 48, 1000);
    Keyframe::new(rgb, depth, SE3::new(rotation, translation), intrinsics).unwrap()
}

/// A raw record wrapping a textured frame, for map level tests.
pub(crate) fn textured_record(idx: u64, pose: SE3) -> KeyframeRecord {
    KeyframeRecord {
        idx,
        pose,
        intrinsics: test_intrinsics(),
        rgb: textured_rgb(64, 48),
        depth: constant_depth(64, 48, 1500),
    }
}
