/// Kernel (structuring element) utilities.
pub mod kernels;
pub use kernels::Kernel;

/// Erosion, dilation, opening and closing.
pub mod ops;
pub use ops::{close, dilate, erode, open};
