use kfmap_image::{Image, ImageError};
use rayon::prelude::*;

/// Sample a single-channel image at a fractional coordinate with bilinear
/// interpolation.
///
/// Coordinates outside the image return 0.0, so out-of-bounds samples act as
/// transparent.
///
/// # Arguments
///
/// * `image` - The input image container.
/// * `u` - The x coordinate of the pixel to interpolate.
/// * `v` - The y coordinate of the pixel to interpolate.
pub fn bilinear_sample(image: &Image<f32, 1>, u: f32, v: f32) -> f32 {
    let (rows, cols) = (image.rows(), image.cols());

    if u < 0.0 || v < 0.0 || u > (cols - 1) as f32 || v > (rows - 1) as f32 {
        return 0.0;
    }

    let iu0 = (u.trunc() as usize).min(cols - 1);
    let iv0 = (v.trunc() as usize).min(rows - 1);
    let iu1 = (iu0 + 1).min(cols - 1);
    let iv1 = (iv0 + 1).min(rows - 1);

    let frac_u = u.fract();
    let frac_v = v.fract();

    let data = image.as_slice();
    let p00 = data[iv0 * cols + iu0];
    let p01 = data[iv0 * cols + iu1];
    let p10 = data[iv1 * cols + iu0];
    let p11 = data[iv1 * cols + iu1];

    let top = p00 * (1.0 - frac_u) + p01 * frac_u;
    let bottom = p10 * (1.0 - frac_u) + p11 * frac_u;

    top * (1.0 - frac_v) + bottom * frac_v
}

/// Apply a generic geometric transformation to a single-channel image.
///
/// Each destination pixel is sampled bilinearly from the source at
/// `(map_x, map_y)`. Negative or out-of-bounds map coordinates produce 0.0
/// (transparent border).
///
/// # Arguments
///
/// * `src` - The input image container with shape (H, W).
/// * `dst` - The output image container, same shape as the maps.
/// * `map_x` - The x coordinates of the pixels to interpolate.
/// * `map_y` - The y coordinates of the pixels to interpolate.
pub fn remap(
    src: &Image<f32, 1>,
    dst: &mut Image<f32, 1>,
    map_x: &Image<f32, 1>,
    map_y: &Image<f32, 1>,
) -> Result<(), ImageError> {
    if map_x.size() != map_y.size() {
        return Err(ImageError::InvalidImageSize(
            map_x.cols(),
            map_x.rows(),
            map_y.cols(),
            map_y.rows(),
        ));
    }
    if dst.size() != map_x.size() {
        return Err(ImageError::InvalidImageSize(
            dst.cols(),
            dst.rows(),
            map_x.cols(),
            map_x.rows(),
        ));
    }

    let cols = dst.cols();
    let map_x_data = map_x.as_slice();
    let map_y_data = map_y.as_slice();

    dst.as_slice_mut()
        .par_chunks_exact_mut(cols)
        .enumerate()
        .for_each(|(row_idx, row_chunk)| {
            let row_offset = row_idx * cols;
            for (col_idx, dst_pixel) in row_chunk.iter_mut().enumerate() {
                let idx = row_offset + col_idx;
                *dst_pixel = bilinear_sample(src, map_x_data[idx], map_y_data[idx]);
            }
        });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use kfmap_image::ImageSize;

    #[test]
    fn bilinear_sample_midpoint() -> Result<(), ImageError> {
        let size = ImageSize {
            width: 2,
            height: 2,
        };
        let img = Image::<f32, 1>::new(size, vec![0.0, 1.0, 2.0, 3.0])?;
        assert_relative_eq!(bilinear_sample(&img, 0.5, 0.5), 1.5, epsilon = 1e-6);
        assert_relative_eq!(bilinear_sample(&img, 0.0, 0.0), 0.0, epsilon = 1e-6);
        assert_relative_eq!(bilinear_sample(&img, 1.0, 1.0), 3.0, epsilon = 1e-6);
        Ok(())
    }

    #[test]
    fn bilinear_sample_out_of_bounds_is_transparent() -> Result<(), ImageError> {
        let img = Image::<f32, 1>::from_size_val([2, 2].into(), 5.0)?;
        assert_eq!(bilinear_sample(&img, -1.0, 0.0), 0.0);
        assert_eq!(bilinear_sample(&img, 0.0, 7.0), 0.0);
        Ok(())
    }

    #[test]
    fn remap_identity() -> Result<(), ImageError> {
        let size = ImageSize {
            width: 3,
            height: 2,
        };
        let src = Image::<f32, 1>::new(size, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0])?;
        let mut map_x = Image::<f32, 1>::from_size_val(size, 0.0)?;
        let mut map_y = Image::<f32, 1>::from_size_val(size, 0.0)?;
        for v in 0..2 {
            for u in 0..3 {
                map_x.set_pixel(u, v, 0, u as f32);
                map_y.set_pixel(u, v, 0, v as f32);
            }
        }
        let mut dst = Image::<f32, 1>::from_size_val(size, 0.0)?;
        remap(&src, &mut dst, &map_x, &map_y)?;
        assert_eq!(dst.as_slice(), src.as_slice());
        Ok(())
    }
}
