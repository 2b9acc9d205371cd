/// An error type for the image module.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ImageError {
    /// Error when the data length does not match the image size.
    #[error("Data length ({0}) does not match the image size ({1})")]
    InvalidChannelShape(usize, usize),

    /// Error when two images do not have matching sizes.
    #[error("Image sizes do not match: {0}x{1} vs {2}x{3}")]
    InvalidImageSize(usize, usize, usize, usize),
}
