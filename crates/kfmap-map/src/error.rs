/// An error type for the map module.
#[derive(thiserror::Error, Debug)]
pub enum MapError {
    /// Error when an operation needs more frames than the map holds.
    #[error("Not enough frames: required {required}, got {actual}")]
    NotEnoughFrames {
        /// Minimum number of frames the operation needs.
        required: usize,
        /// Number of frames actually available.
        actual: usize,
    },

    /// Error when too few correspondences are available for estimation.
    #[error("Not enough correspondences: required {required}, got {actual}")]
    NotEnoughCorrespondences {
        /// Minimum number of correspondences the estimator needs.
        required: usize,
        /// Number of correspondences actually available.
        actual: usize,
    },

    /// Error when the consensus set is below the acceptance threshold.
    #[error("Not enough inliers: required {required}, got {actual}")]
    NotEnoughInliers {
        /// Minimum size of the consensus set.
        required: usize,
        /// Size of the best consensus set found.
        actual: usize,
    },

    /// Error when no keyframe pair overlaps enough to optimize.
    #[error("No overlapping keyframe pairs")]
    NoOverlappingPairs,

    /// Error when the normal equations cannot be factorized.
    #[error("Normal equations are not positive definite")]
    DegenerateSystem,

    /// Error from the image module.
    #[error(transparent)]
    Image(#[from] kfmap_image::ImageError),

    /// Error from the io module.
    #[error(transparent)]
    Io(#[from] kfmap_io::IoError),

    /// Error to manipulate a file.
    #[error("Failed to manipulate the file. {0}")]
    File(#[from] std::io::Error),
}
