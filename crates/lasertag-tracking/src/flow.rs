use glam::Vec2;
use lasertag_image::{Image, ImageSize};
use log::{debug, warn};

use crate::{backend::VisionBackend, config::TrackerConfig};

/// Propagates the last known position through optical flow when the color
/// detection fails.
///
/// A backend failure disables the predictor until [`FlowPredictor::reset`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowPredictor {
    disabled: bool,
}

impl FlowPredictor {
    /// Whether a backend failure turned the predictor off.
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Re-enable the predictor.
    pub fn reset(&mut self) {
        self.disabled = false;
    }

    /// Track `last` from `prev` to `curr`.
    ///
    /// The point is accepted only if the tracker converged, the residual is
    /// at most `flow_max_error`, the point is inside the frame and it moved by
    /// at most `max_velocity`.
    pub fn predict<B: VisionBackend>(
        &mut self,
        backend: &B,
        prev: &Image<u8, 1>,
        curr: &Image<u8, 1>,
        last: Vec2,
        config: &TrackerConfig,
    ) -> Option<Vec2> {
        if self.disabled {
            return None;
        }

        let track = match backend.track_point(prev, curr, last.to_array(), &config.lk_params()) {
            Ok(Some(track)) => track,
            Ok(None) => {
                debug!("optical flow lost the point at {last}");
                return None;
            }
            Err(err) => {
                warn!("optical flow disabled: {err}");
                self.disabled = true;
                return None;
            }
        };

        let point = Vec2::from_array(track.point);
        if track.error > config.flow_max_error {
            debug!("optical flow residual {:.2} too large", track.error);
            return None;
        }
        if !in_bounds(point, curr.size()) {
            debug!("optical flow point {point} left the frame");
            return None;
        }
        if point.distance(last) > config.max_velocity {
            debug!("optical flow point {point} moved too far from {last}");
            return None;
        }

        Some(point)
    }
}

fn in_bounds(p: Vec2, size: ImageSize) -> bool {
    p.is_finite() && p.x >= 0.0 && p.y >= 0.0 && p.x < size.width as f32 && p.y < size.height as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NativeBackend;
    use lasertag_image::ImageError;

    fn disc(cx: i32, cy: i32) -> Result<Image<u8, 1>, ImageError> {
        let mut img = Image::<u8, 1>::from_size_val(
            ImageSize {
                width: 80,
                height: 60,
            },
            0,
        )?;
        for y in 0..60 {
            for x in 0..80 {
                let (dx, dy) = (x - cx, y - cy);
                if dx * dx + dy * dy <= 64 {
                    img.set_pixel(x as usize, y as usize, 0, 200)?;
                }
            }
        }
        Ok(img)
    }

    #[test]
    fn test_predict_follows_translation() -> Result<(), ImageError> {
        let prev = disc(30, 30)?;
        let curr = disc(34, 28)?;

        let mut flow = FlowPredictor::default();
        let p = flow
            .predict(&NativeBackend, &prev, &curr, Vec2::new(30.0, 30.0), &TrackerConfig::default())
            .ok_or(ImageError::EmptyWindow)?;

        assert!(p.distance(Vec2::new(34.0, 28.0)) < 1.0, "{p}");
        Ok(())
    }

    #[test]
    fn test_predict_respects_max_velocity() -> Result<(), ImageError> {
        let prev = disc(30, 30)?;
        let curr = disc(34, 28)?;

        let config = TrackerConfig {
            max_velocity: 2.0,
            ..Default::default()
        };
        let mut flow = FlowPredictor::default();
        assert_eq!(
            flow.predict(&NativeBackend, &prev, &curr, Vec2::new(30.0, 30.0), &config),
            None
        );
        assert!(!flow.is_disabled());
        Ok(())
    }

    #[test]
    fn test_backend_error_disables() -> Result<(), ImageError> {
        let prev = disc(30, 30)?;
        let curr = Image::<u8, 1>::from_size_val(
            ImageSize {
                width: 10,
                height: 10,
            },
            0,
        )?;

        let mut flow = FlowPredictor::default();
        let config = TrackerConfig::default();
        assert_eq!(
            flow.predict(&NativeBackend, &prev, &curr, Vec2::new(30.0, 30.0), &config),
            None
        );
        assert!(flow.is_disabled());

        flow.reset();
        assert!(!flow.is_disabled());
        Ok(())
    }
}
