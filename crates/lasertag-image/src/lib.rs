#![deny(missing_docs)]
//! Image types used by the lasertag crates.

/// image representation for the tracking pipeline.
pub mod image;

/// Error types for the image module.
pub mod error;

pub use crate::error::ImageError;
pub use crate::image::{Image, ImageSize};
