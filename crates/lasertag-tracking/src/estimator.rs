use glam::Vec2;
use log::{debug, info, warn};

use crate::{config::TrackerConfig, kalman::KalmanFilter, state::TrackingState};

/// A candidate position for the current frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    /// The raw detection or flow point, in pixels.
    pub point: Vec2,
    /// The point after CamShift refinement, fused instead of `point` when set.
    pub refined: Option<Vec2>,
    /// Produced by optical flow, which already bounds the displacement.
    pub predicted: bool,
}

impl Observation {
    /// A color detection.
    pub fn detected(point: Vec2) -> Self {
        Self {
            point,
            refined: None,
            predicted: false,
        }
    }

    /// An optical flow prediction.
    pub fn predicted(point: Vec2) -> Self {
        Self {
            point,
            refined: None,
            predicted: true,
        }
    }

    /// Attach a refined position.
    pub fn with_refinement(self, refined: Vec2) -> Self {
        Self {
            refined: Some(refined),
            ..self
        }
    }
}

/// Fuses observations into the [`TrackingState`] and segments strokes.
pub struct StateEstimator<'a> {
    config: &'a TrackerConfig,
}

impl<'a> StateEstimator<'a> {
    /// Create an estimator reading the given configuration.
    pub fn new(config: &'a TrackerConfig) -> Self {
        Self { config }
    }

    /// Update `state` with this frame's observation, if any.
    ///
    /// Returns whether the observation was accepted. A rejected observation
    /// counts as a miss.
    pub fn update(&self, state: &mut TrackingState, observation: Option<Observation>) -> bool {
        // no previous position at all counts as an unbounded gap
        state.is_new_stroke = state.frames_since_last_detection > self.config.new_stroke_threshold
            || state.last_position.is_none();

        let accepted = observation.filter(|obs| self.admits(state, obs));
        match accepted {
            Some(obs) => {
                self.accept(state, &obs);
                true
            }
            None => {
                self.miss(state);
                false
            }
        }
    }

    /// Whether `obs` passes the displacement gate.
    ///
    /// Color detections further than `max_velocity` from the last position
    /// fail; flow points are already bounded and always pass.
    pub fn admits(&self, state: &TrackingState, obs: &Observation) -> bool {
        if obs.predicted {
            return true;
        }
        match state.last_position {
            Some(last) if last.distance(obs.point) > self.config.max_velocity => {
                debug!(
                    "rejected outlier at {}: {:.1}px from {}",
                    obs.point,
                    last.distance(obs.point),
                    last
                );
                false
            }
            _ => true,
        }
    }

    fn accept(&self, state: &mut TrackingState, obs: &Observation) {
        let config = self.config;
        let new_stroke = state.is_new_stroke;
        let point = obs.refined.unwrap_or(obs.point);

        let fused = if config.use_kalman {
            if new_stroke || state.kalman.is_none() {
                state.kalman = Some(KalmanFilter::new(
                    config.kalman_process_noise,
                    config.kalman_measurement_noise,
                ));
            }
            state.kalman.as_mut().and_then(|kf| match kf.step(point) {
                Ok(()) => Some((kf.position(), kf.velocity())),
                Err(err) => {
                    warn!("kalman update failed, smoothing this frame: {err}");
                    None
                }
            })
        } else {
            None
        };

        let (position, velocity) = fused.unwrap_or_else(|| self.smooth(state, point, new_stroke));

        if !state.is_tracking {
            info!("tracking started at {}", obs.point);
        }

        state.current_position = Some(position);
        state.velocity = velocity;
        state.last_position = Some(obs.point);
        state.predicted_position = None;
        state.is_tracking = true;
        state.frames_since_last_detection = 0;
    }

    fn smooth(&self, state: &TrackingState, point: Vec2, new_stroke: bool) -> (Vec2, Vec2) {
        match state.current_position {
            Some(prev) if !new_stroke => {
                let s = self.config.smoothing;
                let position = prev * s + point * (1.0 - s);
                (position, position - prev)
            }
            _ => (point, Vec2::ZERO),
        }
    }

    fn miss(&self, state: &mut TrackingState) {
        state.frames_since_last_detection = state.frames_since_last_detection.saturating_add(1);

        if state.frames_since_last_detection > self.config.new_stroke_threshold {
            if state.is_tracking {
                info!(
                    "tracking lost after {} missed frames",
                    state.frames_since_last_detection
                );
            }
            state.lose_track();
            return;
        }

        state.predicted_position = match state.kalman.as_mut() {
            Some(kf) if self.config.use_kalman => {
                kf.predict();
                Some(kf.position())
            }
            _ => None,
        };
    }
}
