use glam::Vec2;

use crate::{flow::FlowPredictor, kalman::KalmanFilter, refiner::RegionRefiner};

/// Everything the engine remembers between frames.
///
/// Only the engine mutates it; the overlay renderer reads it through
/// `PointTracker::state`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackingState {
    /// Whether a point is being tracked.
    pub is_tracking: bool,
    /// The fused position.
    pub current_position: Option<Vec2>,
    /// The last accepted raw or flow observation of the current session.
    pub last_position: Option<Vec2>,
    /// Kalman prediction shown while the point is briefly missing.
    pub predicted_position: Option<Vec2>,
    /// The fused velocity, in pixels per frame.
    pub velocity: Vec2,
    /// Consecutive frames without an accepted observation.
    pub frames_since_last_detection: u32,
    /// Whether the last accepted observation started a new stroke.
    pub is_new_stroke: bool,
    /// Kalman filter of the current tracking session.
    pub kalman: Option<KalmanFilter>,
    /// CamShift refiner of the current tracking session.
    pub refiner: RegionRefiner,
    /// Optical flow fallback of the current tracking session.
    pub flow: FlowPredictor,
}

impl TrackingState {
    /// End the tracking session: forget the last observation, drop the filter
    /// and re-arm the subsystems.
    ///
    /// Without a last position the next detection is neither gated nor used
    /// as an optical flow seed.
    pub fn lose_track(&mut self) {
        self.is_tracking = false;
        self.last_position = None;
        self.predicted_position = None;
        self.kalman = None;
        self.refiner.reset();
        self.flow.reset();
    }
}
