use std::time::Duration;

use glam::Vec2;

/// Which stage produced the observation of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservationSource {
    /// Color blob detection.
    Color,
    /// Optical flow from the last position.
    Flow,
    /// Nothing was accepted this frame.
    None,
}

/// Per-frame snapshot of the engine's output.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingResult {
    /// Fused position, in pixels.
    pub position: Option<Vec2>,
    /// `position` divided by the frame dimensions.
    pub normalized_position: Option<Vec2>,
    /// Prediction while the point is briefly missing.
    pub predicted_position: Option<Vec2>,
    /// Fused velocity, in pixels per frame.
    pub velocity: Vec2,
    /// Whether a point is being tracked.
    pub is_tracking: bool,
    /// Whether this frame starts a new stroke.
    pub is_new_stroke: bool,
    /// Consecutive frames without an accepted observation.
    pub frames_since_last_detection: u32,
    /// Origin of this frame's accepted observation.
    pub source: ObservationSource,
    /// Wall-clock time spent in `process_frame`.
    pub processing_time: Duration,
}
