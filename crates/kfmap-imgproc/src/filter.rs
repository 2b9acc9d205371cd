use kfmap_image::{Image, ImageError};
use rayon::prelude::*;

/// Create a normalized 1d gaussian kernel.
///
/// # Arguments
///
/// * `kernel_size` - The size of the kernel.
/// * `sigma` - The standard deviation of the gaussian.
pub fn gaussian_kernel_1d(kernel_size: usize, sigma: f32) -> Vec<f32> {
    let mut kernel = Vec::with_capacity(kernel_size);
    let mean = (kernel_size - 1) as f32 / 2.0;
    let mut sum = 0.0;

    for i in 0..kernel_size {
        let x = i as f32 - mean;
        let val = (-0.5 * (x / sigma).powi(2)).exp();
        kernel.push(val);
        sum += val;
    }

    kernel.iter_mut().for_each(|k| *k /= sum);

    kernel
}

/// Apply a separable filter to a single-channel image.
///
/// Performs horizontal filtering followed by vertical filtering, with
/// replicated borders.
///
/// # Arguments
///
/// * `src` - The source image with shape (H, W).
/// * `dst` - The destination image with shape (H, W).
/// * `kernel_x` - The horizontal convolution kernel.
/// * `kernel_y` - The vertical convolution kernel.
pub fn separable_filter(
    src: &Image<f32, 1>,
    dst: &mut Image<f32, 1>,
    kernel_x: &[f32],
    kernel_y: &[f32],
) -> Result<(), ImageError> {
    if src.size() != dst.size() {
        return Err(ImageError::InvalidImageSize(
            src.cols(),
            src.rows(),
            dst.cols(),
            dst.rows(),
        ));
    }

    let (cols, rows) = (src.cols(), src.rows());
    let half_x = (kernel_x.len() / 2) as isize;
    let half_y = (kernel_y.len() / 2) as isize;

    let src_data = src.as_slice();

    // horizontal pass
    let mut tmp = vec![0.0f32; src_data.len()];
    tmp.par_chunks_exact_mut(cols)
        .enumerate()
        .for_each(|(v, row_chunk)| {
            let row_offset = v * cols;
            for (u, out) in row_chunk.iter_mut().enumerate() {
                let mut acc = 0.0;
                for (k, &w) in kernel_x.iter().enumerate() {
                    let uu = (u as isize + k as isize - half_x).clamp(0, cols as isize - 1);
                    acc += w * src_data[row_offset + uu as usize];
                }
                *out = acc;
            }
        });

    // vertical pass
    dst.as_slice_mut()
        .par_chunks_exact_mut(cols)
        .enumerate()
        .for_each(|(v, row_chunk)| {
            for (u, out) in row_chunk.iter_mut().enumerate() {
                let mut acc = 0.0;
                for (k, &w) in kernel_y.iter().enumerate() {
                    let vv = (v as isize + k as isize - half_y).clamp(0, rows as isize - 1);
                    acc += w * tmp[vv as usize * cols + u];
                }
                *out = acc;
            }
        });

    Ok(())
}

/// Blur an image using a gaussian filter.
///
/// # Arguments
///
/// * `src` - The source image with shape (H, W).
/// * `dst` - The destination image with shape (H, W).
/// * `kernel_size` - The size of the kernel (kernel_x, kernel_y).
/// * `sigma` - The standard deviation of the gaussian (sigma_x, sigma_y).
pub fn gaussian_blur(
    src: &Image<f32, 1>,
    dst: &mut Image<f32, 1>,
    kernel_size: (usize, usize),
    sigma: (f32, f32),
) -> Result<(), ImageError> {
    let kernel_x = gaussian_kernel_1d(kernel_size.0, sigma.0);
    let kernel_y = gaussian_kernel_1d(kernel_size.1, sigma.1);
    separable_filter(src, dst, &kernel_x, &kernel_y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use kfmap_image::ImageSize;

    #[test]
    fn gaussian_kernel_is_normalized() {
        let kernel = gaussian_kernel_1d(5, 1.5);
        let sum: f32 = kernel.iter().sum();
        assert_relative_eq!(sum, 1.0, epsilon = 1e-6);
        assert_eq!(kernel.len(), 5);
        // symmetric
        assert_relative_eq!(kernel[0], kernel[4], epsilon = 1e-6);
        assert_relative_eq!(kernel[1], kernel[3], epsilon = 1e-6);
    }

    #[test]
    fn blur_preserves_constant_image() -> Result<(), ImageError> {
        let size = ImageSize {
            width: 7,
            height: 5,
        };
        let src = Image::<f32, 1>::from_size_val(size, 3.0)?;
        let mut dst = Image::<f32, 1>::from_size_val(size, 0.0)?;
        gaussian_blur(&src, &mut dst, (3, 3), (3.0, 3.0))?;

        for &px in dst.as_slice() {
            assert!((px - 3.0).abs() < 1e-5);
        }
        Ok(())
    }
}
