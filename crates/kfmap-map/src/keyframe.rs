use glam::Vec3;
use kfmap_image::Image;
use kfmap_imgproc::color::gray_from_rgb;
use kfmap_imgproc::pyramid::{pyrdown, pyrdown_depth};
use kfmap_lie::SE3;

use crate::error::MapError;
use crate::pointcloud::PointCloud;

/// Number of levels in the intensity and depth pyramids.
pub const NUM_LEVELS: usize = 3;

/// Pinhole camera intrinsics with a single focal length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intrinsics {
    /// Focal length in pixels, shared by both axes.
    pub f: f32,
    /// Principal point column in pixels.
    pub cx: f32,
    /// Principal point row in pixels.
    pub cy: f32,
}

impl Intrinsics {
    /// Build intrinsics from a focal length and a principal point.
    pub fn new(f: f32, cx: f32, cy: f32) -> Self {
        Self { f, cx, cy }
    }

    /// The intrinsics scaled to a pyramid level.
    pub fn at_level(&self, level: usize) -> Self {
        let scale = 0.5f32.powi(level as i32);
        Self {
            f: self.f * scale,
            cx: self.cx * scale,
            cy: self.cy * scale,
        }
    }

    /// Back-project a pixel with a millimeter depth into the camera frame.
    ///
    /// Depth zero marks an invalid measurement and must be filtered by the
    /// caller.
    pub fn backproject(&self, u: f32, v: f32, depth_mm: u16) -> Vec3 {
        let z = depth_mm as f32 / 1000.0;
        Vec3::new((u - self.cx) * z / self.f, (v - self.cy) * z / self.f, z)
    }

    /// Apply a multiplicative update given as a log-space increment.
    pub(crate) fn exp_update(&mut self, delta: Vec3) {
        self.f *= delta.x.exp();
        self.cx *= delta.y.exp();
        self.cy *= delta.z.exp();
    }
}

/// A raw posed rgb-d measurement, as produced by a sensor driver.
#[derive(Debug, Clone)]
pub struct KeyframeRecord {
    /// Monotonic frame index assigned by the capture pipeline.
    pub idx: u64,
    /// Camera-to-world pose of the frame.
    pub pose: SE3,
    /// Camera intrinsics of the frame.
    pub intrinsics: Intrinsics,
    /// The rgb image.
    pub rgb: Image<u8, 3>,
    /// The depth image in millimeters, zero meaning invalid.
    pub depth: Image<u16, 1>,
}

/// A posed rgb-d frame with precomputed intensity and depth pyramids.
#[derive(Debug, Clone)]
pub struct Keyframe {
    rgb: Image<u8, 3>,
    intensity: Vec<Image<f32, 1>>,
    depth: Vec<Image<u16, 1>>,
    pub(crate) pose: SE3,
    pub(crate) intrinsics: Intrinsics,
}

impl Keyframe {
    /// Build a keyframe from raw images, a pose and intrinsics.
    ///
    /// The rgb and depth images must have the same size. The rgb image is
    /// converted to intensity in `[0, 1]` and downsampled into a pyramid of
    /// [`NUM_LEVELS`] levels; the depth pyramid uses nearest sampling so
    /// invalid zeros are never blended.
    pub fn new(
        rgb: Image<u8, 3>,
        depth: Image<u16, 1>,
        pose: SE3,
        intrinsics: Intrinsics,
    ) -> Result<Self, MapError> {
        if rgb.size() != depth.size() {
            return Err(kfmap_image::ImageError::InvalidImageSize(
                rgb.cols(),
                rgb.rows(),
                depth.cols(),
                depth.rows(),
            )
            .into());
        }

        let mut gray = Image::<f32, 1>::from_size_val(rgb.size(), 0.0)?;
        gray_from_rgb(&rgb, &mut gray)?;
        gray.as_slice_mut().iter_mut().for_each(|px| *px /= 255.0);

        let mut intensity = Vec::with_capacity(NUM_LEVELS);
        intensity.push(gray);
        let mut depth_pyramid = Vec::with_capacity(NUM_LEVELS);
        depth_pyramid.push(depth);

        for level in 1..NUM_LEVELS {
            intensity.push(pyrdown(&intensity[level - 1])?);
            depth_pyramid.push(pyrdown_depth(&depth_pyramid[level - 1])?);
        }

        Ok(Self {
            rgb,
            intensity,
            depth: depth_pyramid,
            pose,
            intrinsics,
        })
    }

    /// Build a keyframe from a raw sensor record.
    pub fn from_record(record: KeyframeRecord) -> Result<Self, MapError> {
        Self::new(record.rgb, record.depth, record.pose, record.intrinsics)
    }

    /// The original rgb image.
    pub fn rgb(&self) -> &Image<u8, 3> {
        &self.rgb
    }

    /// The intensity image at a pyramid level, values in `[0, 1]`.
    pub fn intensity(&self, level: usize) -> &Image<f32, 1> {
        &self.intensity[level]
    }

    /// The depth image at a pyramid level, in millimeters.
    pub fn depth(&self, level: usize) -> &Image<u16, 1> {
        &self.depth[level]
    }

    /// The camera-to-world pose.
    pub fn pose(&self) -> &SE3 {
        &self.pose
    }

    /// The intrinsics scaled to a pyramid level.
    pub fn intrinsics(&self, level: usize) -> Intrinsics {
        self.intrinsics.at_level(level)
    }

    /// Back-project every `step`-th valid depth pixel into a colored point
    /// cloud in world coordinates.
    pub fn pointcloud(&self, step: usize) -> PointCloud {
        let depth = &self.depth[0];
        let mut cloud = PointCloud::new();

        for v in (0..depth.rows()).step_by(step) {
            for u in (0..depth.cols()).step_by(step) {
                let d = depth.pixel(u, v, 0);
                if d == 0 {
                    continue;
                }
                let point = self.pose
                    * self
                        .intrinsics
                        .backproject(u as f32, v as f32, d);
                let color = [
                    self.rgb.pixel(u, v, 0),
                    self.rgb.pixel(u, v, 1),
                    self.rgb.pixel(u, v, 2),
                ];
                cloud.push(point.to_array(), color);
            }
        }

        cloud
    }
}
