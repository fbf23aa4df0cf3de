use lasertag_image::{ImageError, ImageSize};

/// Failures of the constant velocity Kalman filter.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum KalmanError {
    /// The innovation covariance cannot be inverted.
    #[error("Innovation covariance is singular (det = {0})")]
    SingularInnovation(f32),

    /// The state or covariance contains NaN or infinite values.
    #[error("Filter state is not finite")]
    NonFinite,
}

/// An error type for the tracking engine.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum TrackingError {
    /// The vision backend cannot be used.
    #[error("Vision backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The engine was asked for frames of zero area.
    #[error("Invalid frame dimensions {0}")]
    InvalidDimensions(ImageSize),

    /// A frame was processed before `init` or after `dispose`.
    #[error("Tracker is not initialized")]
    NotInitialized,

    /// A frame does not have the dimensions given to `init`.
    #[error("Frame size mismatch: expected {expected}, got {actual}")]
    FrameSizeMismatch {
        /// The dimensions the buffers were allocated for.
        expected: ImageSize,
        /// The dimensions of the offending frame.
        actual: ImageSize,
    },

    /// A pipeline stage failed.
    #[error(transparent)]
    Image(#[from] ImageError),
}
