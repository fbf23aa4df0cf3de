#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// the vision primitives the engine depends on.
pub mod backend;

/// blob selection from the segmentation mask.
pub mod blob;

/// engine configuration and merge patches.
pub mod config;

/// error types of the engine.
pub mod error;

/// observation fusion and stroke segmentation.
pub mod estimator;

/// optical flow fallback.
pub mod flow;

/// constant velocity Kalman filter.
pub mod kalman;

/// CamShift refinement.
pub mod refiner;

/// per-frame output of the engine.
pub mod result;

/// HSV color segmentation.
pub mod segmenter;

/// persistent tracking state.
pub mod state;

/// the tracking engine.
pub mod tracker;

pub use crate::backend::{NativeBackend, VisionBackend};
pub use crate::config::{TrackerConfig, TrackerConfigPatch};
pub use crate::error::{KalmanError, TrackingError};
pub use crate::result::{ObservationSource, TrackingResult};
pub use crate::state::TrackingState;
pub use crate::tracker::{FrameBuffers, PointTracker};
