//! Binary persistence of a keyframe map on disk.
//!
//! A map directory holds an `rgb/` and a `depth/` subdirectory with one PNG
//! per frame, plus a `positions.txt` file of fixed 40-byte records. Each
//! record is ten little-endian f32 values: the pose quaternion (x, y, z, w),
//! the translation, and the intrinsics (f, cx, cy).

use std::fs;
use std::io::Write;
use std::path::Path;

use glam::{Quat, Vec3};
use kfmap_io::png::{
    read_image_png_mono16, read_image_png_rgb8, write_image_png_mono16, write_image_png_rgb8,
};
use kfmap_lie::SE3;

use crate::error::MapError;
use crate::keyframe::{Intrinsics, Keyframe};

/// Size in bytes of one pose record.
const RECORD_SIZE: usize = 40;

/// Write all frames into `dir`, replacing any previous content.
pub(crate) fn save(frames: &[Keyframe], dir: &Path) -> Result<(), MapError> {
    if dir.exists() {
        fs::remove_dir_all(dir)?;
    }
    let rgb_dir = dir.join("rgb");
    let depth_dir = dir.join("depth");
    fs::create_dir_all(&rgb_dir)?;
    fs::create_dir_all(&depth_dir)?;

    for (i, frame) in frames.iter().enumerate() {
        write_image_png_rgb8(rgb_dir.join(format!("{i}.png")), frame.rgb())?;
        write_image_png_mono16(depth_dir.join(format!("{i}.png")), frame.depth(0))?;
    }

    let mut positions = fs::File::create(dir.join("positions.txt"))?;
    let mut buf = Vec::with_capacity(frames.len() * RECORD_SIZE);
    for frame in frames {
        let q = frame.pose().rotation.q;
        let t = frame.pose().translation;
        let k = frame.intrinsics(0);
        for val in [q.x, q.y, q.z, q.w, t.x, t.y, t.z, k.f, k.cx, k.cy] {
            buf.extend_from_slice(&val.to_le_bytes());
        }
    }
    positions.write_all(&buf)?;

    log::info!("saved {} keyframes to {}", frames.len(), dir.display());
    Ok(())
}

/// Load all frames from a map directory written by [`save`].
///
/// Trailing bytes that do not form a full record are ignored. Any missing or
/// corrupt image fails the whole load.
pub(crate) fn load(dir: &Path) -> Result<Vec<Keyframe>, MapError> {
    let buf = fs::read(dir.join("positions.txt"))?;
    let rgb_dir = dir.join("rgb");
    let depth_dir = dir.join("depth");

    let mut frames = Vec::with_capacity(buf.len() / RECORD_SIZE);
    for (i, record) in buf.chunks_exact(RECORD_SIZE).enumerate() {
        let vals: Vec<f32> = record
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        let pose = SE3::from_quaternion_translation(
            Quat::from_xyzw(vals[0], vals[1], vals[2], vals[3]),
            Vec3::new(vals[4], vals[5], vals[6]),
        );
        let intrinsics = Intrinsics::new(vals[7], vals[8], vals[9]);

        let rgb = read_image_png_rgb8(rgb_dir.join(format!("{i}.png")))?;
        let depth = read_image_png_mono16(depth_dir.join(format!("{i}.png")))?;
        frames.push(Keyframe::new(rgb, depth, pose, intrinsics)?);
    }

    log::info!("loaded {} keyframes from {}", frames.len(), dir.display());
    Ok(frames)
}
