use crate::error::ImageError;

/// Image size in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageSize {
    /// Width of the image in pixels.
    pub width: usize,
    /// Height of the image in pixels.
    pub height: usize,
}

impl std::fmt::Display for ImageSize {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "ImageSize {{ width: {}, height: {} }}",
            self.width, self.height
        )
    }
}

impl From<[usize; 2]> for ImageSize {
    fn from(size: [usize; 2]) -> Self {
        ImageSize {
            width: size[0],
            height: size[1],
        }
    }
}

/// An owned image with pixel data stored row-major with shape (H, W, C).
#[derive(Clone, Debug, PartialEq)]
pub struct Image<T, const C: usize> {
    size: ImageSize,
    data: Vec<T>,
}

impl<T, const C: usize> Image<T, C>
where
    T: Copy + Default,
{
    /// Create a new image from pixel data.
    ///
    /// # Arguments
    ///
    /// * `size` - The size of the image in pixels.
    /// * `data` - The pixel data, of length `H * W * C`.
    pub fn new(size: ImageSize, data: Vec<T>) -> Result<Self, ImageError> {
        let expected = size.width * size.height * C;
        if data.len() != expected {
            return Err(ImageError::InvalidChannelShape(data.len(), expected));
        }
        Ok(Self { size, data })
    }

    /// Create a new image filled with a constant value.
    pub fn from_size_val(size: ImageSize, val: T) -> Result<Self, ImageError> {
        Self::new(size, vec![val; size.width * size.height * C])
    }

    /// The size of the image in pixels.
    #[inline]
    pub fn size(&self) -> ImageSize {
        self.size
    }

    /// The number of image columns (width).
    #[inline]
    pub fn cols(&self) -> usize {
        self.size.width
    }

    /// The number of image rows (height).
    #[inline]
    pub fn rows(&self) -> usize {
        self.size.height
    }

    /// The raw pixel data.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// The raw pixel data, mutable.
    #[inline]
    pub fn as_slice_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Consume the image and return the pixel data.
    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    /// The pixel value at `(x, y)` for channel `ch`.
    ///
    /// PRECONDITION: `x < cols`, `y < rows` and `ch < C`.
    #[inline]
    pub fn pixel(&self, x: usize, y: usize, ch: usize) -> T {
        self.data[(y * self.size.width + x) * C + ch]
    }

    /// Set the pixel value at `(x, y)` for channel `ch`.
    ///
    /// PRECONDITION: `x < cols`, `y < rows` and `ch < C`.
    #[inline]
    pub fn set_pixel(&mut self, x: usize, y: usize, ch: usize, val: T) {
        self.data[(y * self.size.width + x) * C + ch] = val;
    }
}
