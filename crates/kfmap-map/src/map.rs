use std::path::Path;

use kfmap_image::Image;
use kfmap_lie::SE3;
use rand::Rng;

use crate::error::MapError;
use crate::features::compute_features;
use crate::keyframe::{Keyframe, KeyframeRecord};
use crate::pointcloud::PointCloud;
use crate::ransac::{estimate_transform_ransac, RansacParams};
use crate::{panorama, reduce, storage};

/// Pixel stride used when sampling the map point cloud.
const POINTCLOUD_STEP: usize = 4;

/// A 3d map built from posed rgb-d keyframes.
///
/// The map owns its keyframes and offers photometric refinement of their
/// poses, alignment against other maps, panorama compositing and binary
/// persistence.
#[derive(Debug, Clone, Default)]
pub struct KeyframeMap {
    frames: Vec<Keyframe>,
    idx: Vec<u64>,
}

impl KeyframeMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keyframes in the map.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether the map holds no keyframes.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// The keyframes of the map.
    pub fn frames(&self) -> &[Keyframe] {
        &self.frames
    }

    /// The capture indices of the keyframes, parallel to [`Self::frames`].
    pub fn indices(&self) -> &[u64] {
        &self.idx
    }

    /// Append a raw sensor record to the map.
    pub fn add_frame(&mut self, record: KeyframeRecord) -> Result<(), MapError> {
        let idx = record.idx;
        self.frames.push(Keyframe::from_record(record)?);
        self.idx.push(idx);
        Ok(())
    }

    /// Remove all keyframes from the map.
    pub fn clear(&mut self) {
        self.frames.clear();
        self.idx.clear();
    }

    /// Run one 6-dof photometric refinement step at the given pyramid level.
    ///
    /// The first keyframe stays fixed. Returns the largest absolute state
    /// increment as a convergence measure.
    pub fn optimize(&mut self, level: usize) -> Result<f32, MapError> {
        reduce::pose_graph::step(&mut self.frames, level)
    }

    /// Run one rotation-only refinement step at the given pyramid level.
    ///
    /// All translations are pinned to the first keyframe and the shared
    /// intrinsics are refined along with the rotations.
    pub fn optimize_panorama(&mut self, level: usize) -> Result<f32, MapError> {
        reduce::panorama::step(&mut self.frames, level)
    }

    /// Estimate the transform mapping `other`'s world frame into this map's
    /// world frame.
    ///
    /// One keyframe is drawn from each map, sparse features are matched
    /// between them, and the camera-space alignment found by RANSAC is
    /// chained with both keyframe poses.
    pub fn find_transform(
        &self,
        other: &KeyframeMap,
        rng: &mut impl Rng,
    ) -> Result<SE3, MapError> {
        if self.frames.len() < 2 || other.frames.len() < 2 {
            return Err(MapError::NotEnoughFrames {
                required: 2,
                actual: self.frames.len().min(other.frames.len()),
            });
        }

        let i = rng.random_range(0..self.frames.len());
        let j = rng.random_range(0..other.frames.len());
        let frame_i = &self.frames[i];
        let frame_j = &other.frames[j];
        log::debug!("aligning other frame {j} against map frame {i}");

        let features_i = compute_features(frame_i.rgb(), frame_i.depth(0), &frame_i.intrinsics(0))?;
        let features_j = compute_features(frame_j.rgb(), frame_j.depth(0), &frame_j.intrinsics(0))?;

        let matches =
            kfmap_imgproc::features::match_descriptors(&features_j.descriptors, &features_i.descriptors);

        let (t_cam, _inliers) = estimate_transform_ransac(
            &features_j.points3d,
            &features_i.points3d,
            &matches,
            &RansacParams::default(),
            rng,
        )?;

        Ok(*frame_i.pose() * t_cam * frame_j.pose().inverse())
    }

    /// Move all keyframes of `other` into this map, transformed by `t`.
    pub fn merge(&mut self, other: &mut KeyframeMap, t: &SE3) {
        let frames = std::mem::take(&mut other.frames);
        let indices = std::mem::take(&mut other.idx);
        for (mut frame, idx) in frames.into_iter().zip(indices) {
            frame.pose = *t * frame.pose;
            self.frames.push(frame);
            self.idx.push(idx);
        }
    }

    /// Composite all keyframes into an equirectangular intensity panorama.
    pub fn get_panorama_image(&self) -> Result<Image<f32, 1>, MapError> {
        panorama::render(&self.frames)
    }

    /// The colored point cloud of the whole map in world coordinates.
    pub fn get_map_pointcloud(&self) -> PointCloud {
        let mut cloud = PointCloud::new();
        for frame in &self.frames {
            cloud.append(frame.pointcloud(POINTCLOUD_STEP));
        }
        cloud
    }

    /// Write the map to a directory, replacing any previous content.
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<(), MapError> {
        storage::save(&self.frames, dir.as_ref())
    }

    /// Load a map previously written by [`Self::save`].
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, MapError> {
        let frames = storage::load(dir.as_ref())?;
        let idx = (0..frames.len() as u64).collect();
        Ok(Self { frames, idx })
    }
}
