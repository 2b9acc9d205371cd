#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

mod error;

/// sparse feature extraction for keyframes.
pub mod features;

/// keyframe container and camera intrinsics.
pub mod keyframe;

/// the keyframe map and its high level operations.
pub mod map;

/// colored point clouds.
pub mod pointcloud;

/// robust rigid alignment of 3d correspondences.
pub mod ransac;

mod panorama;
mod reduce;
mod storage;

pub use crate::error::MapError;
pub use crate::keyframe::{Intrinsics, Keyframe, KeyframeRecord, NUM_LEVELS};
pub use crate::map::KeyframeMap;
pub use crate::pointcloud::PointCloud;

#[cfg(test)]
pub(crate) mod testing;
