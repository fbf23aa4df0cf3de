use glam::Vec2;
use lasertag_image::Image;
use lasertag_imgproc::rect::Rect;
use log::{debug, warn};

use crate::{backend::VisionBackend, config::TrackerConfig};

/// CamShift refinement of color detections.
///
/// Every accepted detection re-seeds the search window from the blob's padded
/// bounding box. The hue histogram is learnt once, from the first detection of
/// a tracking session; later detections are blended with the centroid found
/// by CamShift on the histogram's back-projection. Any backend failure
/// disables the refiner until [`RegionRefiner::reset`], which the engine
/// calls on tracking loss.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionRefiner {
    window: Option<Rect>,
    histogram: Option<Vec<f32>>,
    disabled: bool,
}

impl RegionRefiner {
    /// The window CamShift converged to on the last refined frame, or the
    /// seeding window.
    pub fn window(&self) -> Option<Rect> {
        self.window
    }

    /// The learnt hue histogram.
    pub fn histogram(&self) -> Option<&[f32]> {
        self.histogram.as_deref()
    }

    /// Whether a failure turned the refiner off for this session.
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Forget the window and histogram and re-enable the refiner.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn disable(&mut self) {
        self.window = None;
        self.histogram = None;
        self.disabled = true;
    }

    /// Refine the accepted detection `raw` of a blob bounded by `bounding_rect`.
    ///
    /// The first call of a session only learns the histogram. Returns the
    /// blended position, or `None` when nothing was refined: while seeding,
    /// when disabled, or when the backend fails. `prob` receives the
    /// back-projection.
    #[allow(clippy::too_many_arguments)]
    pub fn refine<B: VisionBackend>(
        &mut self,
        backend: &B,
        hsv: &Image<u8, 3>,
        mask: &Image<u8, 1>,
        prob: &mut Image<u8, 1>,
        bounding_rect: Rect,
        raw: Vec2,
        config: &TrackerConfig,
    ) -> Option<Vec2> {
        if self.disabled {
            return None;
        }

        let window = bounding_rect
            .padded(config.refiner_padding)
            .clip(hsv.size());
        self.window = Some(window);

        let Some(hist) = self.histogram.as_deref() else {
            let mut hist = vec![0.0; config.refiner_hist_bins];
            match backend.hue_histogram(hsv, mask, window, &mut hist) {
                Ok(()) => {
                    debug!("region refiner seeded with window {window:?}");
                    self.histogram = Some(hist);
                }
                Err(err) => {
                    warn!("region refiner disabled while seeding: {err}");
                    self.disable();
                }
            }
            return None;
        };

        let result = backend
            .back_project(hsv, hist, prob)
            .and_then(|_| backend.cam_shift(prob, window, &config.term_criteria()));

        match result {
            Ok(found) => {
                self.window = Some(found.window);
                let refined = Vec2::from_array(found.center);
                Some(raw * (1.0 - config.refiner_blend) + refined * config.refiner_blend)
            }
            Err(err) => {
                warn!("region refiner disabled: {err}");
                self.disable();
                None
            }
        }
    }
}
