use kfmap_image::{Image, ImageError, ImageSize};

use crate::filter::separable_filter;

fn pyramid_gaussian_kernel_1d() -> Vec<f32> {
    [1.0, 4.0, 6.0, 4.0, 1.0].iter().map(|&x| x / 16.0).collect()
}

/// Downsample an intensity image by a factor of two.
///
/// The image is smoothed with the standard 5-tap pyramid kernel before
/// decimation.
///
/// # Arguments
///
/// * `src` - The source image to be downsampled.
pub fn pyrdown(src: &Image<f32, 1>) -> Result<Image<f32, 1>, ImageError> {
    let kernel = pyramid_gaussian_kernel_1d();
    let mut blurred = Image::<f32, 1>::from_size_val(src.size(), 0.0)?;
    separable_filter(src, &mut blurred, &kernel, &kernel)?;

    let size = ImageSize {
        width: src.cols() / 2,
        height: src.rows() / 2,
    };
    let mut dst = Image::<f32, 1>::from_size_val(size, 0.0)?;
    for v in 0..size.height {
        for u in 0..size.width {
            dst.set_pixel(u, v, 0, blurred.pixel(u * 2, v * 2, 0));
        }
    }

    Ok(dst)
}

/// Downsample a depth image by a factor of two using nearest sampling.
///
/// Depth values are not blended across pixels: averaging would invent
/// surfaces at depth discontinuities, and zero means invalid.
///
/// # Arguments
///
/// * `src` - The source depth image to be downsampled.
pub fn pyrdown_depth(src: &Image<u16, 1>) -> Result<Image<u16, 1>, ImageError> {
    let size = ImageSize {
        width: src.cols() / 2,
        height: src.rows() / 2,
    };
    let mut dst = Image::<u16, 1>::from_size_val(size, 0)?;
    for v in 0..size.height {
        for u in 0..size.width {
            dst.set_pixel(u, v, 0, src.pixel(u * 2, v * 2, 0));
        }
    }

    Ok(dst)
}
