use kfmap_image::{Image, ImageError};
use rayon::prelude::*;

/// Convert an RGB image to grayscale.
///
/// Uses the ITU-R BT.601 luma weights. The output keeps the 0..255 range of
/// the input as f32 values.
///
/// # Arguments
///
/// * `src` - The source RGB image with shape (H, W, 3).
/// * `dst` - The destination grayscale image with shape (H, W, 1).
pub fn gray_from_rgb(src: &Image<u8, 3>, dst: &mut Image<f32, 1>) -> Result<(), ImageError> {
    if src.size() != dst.size() {
        return Err(ImageError::InvalidImageSize(
            src.cols(),
            src.rows(),
            dst.cols(),
            dst.rows(),
        ));
    }

    let src_data = src.as_slice();

    dst.as_slice_mut()
        .par_iter_mut()
        .enumerate()
        .for_each(|(idx, gray_pixel)| {
            let r = src_data[idx * 3] as f32;
            let g = src_data[idx * 3 + 1] as f32;
            let b = src_data[idx * 3 + 2] as f32;
            *gray_pixel = 0.299 * r + 0.587 * g + 0.114 * b;
        });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kfmap_image::ImageSize;

    #[test]
    fn gray_from_rgb_weights() -> Result<(), ImageError> {
        let size = ImageSize {
            width: 2,
            height: 1,
        };
        let src = Image::<u8, 3>::new(size, vec![255, 0, 0, 0, 255, 0])?;
        let mut dst = Image::<f32, 1>::from_size_val(size, 0.0)?;
        gray_from_rgb(&src, &mut dst)?;

        assert!((dst.pixel(0, 0, 0) - 0.299 * 255.0).abs() < 1e-3);
        assert!((dst.pixel(1, 0, 0) - 0.587 * 255.0).abs() < 1e-3);
        Ok(())
    }

    #[test]
    fn gray_from_rgb_size_mismatch() {
        let src = Image::<u8, 3>::from_size_val([2, 2].into(), 0).unwrap();
        let mut dst = Image::<f32, 1>::from_size_val([3, 2].into(), 0.0).unwrap();
        assert!(gray_from_rgb(&src, &mut dst).is_err());
    }
}
