#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// color transformations module.
pub mod color;

/// external contour extraction.
pub mod contours;

/// hue histograms and back-projection.
pub mod histogram;

/// mean-shift and CamShift window search.
pub mod meanshift;

/// spatial moments of polygons and probability windows.
pub mod moments;

/// binary morphology: kernels, erosion, dilation, opening and closing.
pub mod morphology;

/// sparse pyramidal optical flow.
pub mod optical_flow;

/// module containing parallization utilities.
pub mod parallel;

/// Pyramid operations
pub mod pyramid;

/// axis aligned rectangles.
pub mod rect;

/// operations to threshold images.
pub mod threshold;
