use lasertag_imgproc::{meanshift::TermCriteria, optical_flow::PyrLkParams};
use serde::{Deserialize, Serialize};

/// Tunable parameters of the tracking engine.
///
/// Serialized with camelCase keys, e.g. `{"hueMin": 40, "useKalman": true}`.
/// Values are not range checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackerConfig {
    /// Lower hue bound, in [0, 180).
    pub hue_min: u8,
    /// Upper hue bound, in [0, 180).
    pub hue_max: u8,
    /// Lower saturation bound.
    pub sat_min: u8,
    /// Upper saturation bound.
    pub sat_max: u8,
    /// Lower value bound.
    pub val_min: u8,
    /// Upper value bound.
    pub val_max: u8,
    /// Smallest accepted blob area, in pixels.
    pub min_blob_area: f64,
    /// Largest accepted blob area, in pixels.
    pub max_blob_area: f64,
    /// Weight of the previous position when smoothing without the Kalman filter.
    pub smoothing: f32,
    /// Missed frames after which tracking is lost and the next detection starts a new stroke.
    pub new_stroke_threshold: u32,
    /// Largest accepted displacement between two detections, in pixels per frame.
    pub max_velocity: f32,
    /// Fuse detections with the Kalman filter instead of exponential smoothing.
    pub use_kalman: bool,
    /// Fall back to optical flow when color detection fails.
    pub use_optical_flow: bool,
    /// Refine detections with CamShift.
    pub use_camshift: bool,

    /// Side of the elliptical structuring element used to clean the mask.
    pub morph_kernel_size: usize,
    /// Weight of the CamShift centroid in the refined position.
    pub refiner_blend: f32,
    /// Padding added around the blob's bounding box when seeding CamShift.
    pub refiner_padding: i32,
    /// Number of hue histogram bins.
    pub refiner_hist_bins: usize,
    /// Mean-shift iteration cap.
    pub refiner_max_iterations: usize,
    /// Mean-shift convergence threshold, in pixels.
    pub refiner_epsilon: f32,
    /// Diagonal of the Kalman process noise covariance.
    pub kalman_process_noise: f32,
    /// Diagonal of the Kalman measurement noise covariance.
    pub kalman_measurement_noise: f32,
    /// Side of the Lucas–Kanade integration window.
    pub flow_window_size: usize,
    /// Coarser pyramid levels used by Lucas–Kanade.
    pub flow_pyramid_levels: usize,
    /// Lucas–Kanade iterations per level.
    pub flow_max_iterations: usize,
    /// Lucas–Kanade convergence threshold, in pixels.
    pub flow_epsilon: f32,
    /// Minimum normalized eigenvalue of the gradient matrix.
    pub flow_min_eigen_threshold: f32,
    /// Largest accepted mean intensity residual of a tracked point.
    pub flow_max_error: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            hue_min: 40,
            hue_max: 80,
            sat_min: 100,
            sat_max: 255,
            val_min: 100,
            val_max: 255,
            min_blob_area: 10.0,
            max_blob_area: 5000.0,
            smoothing: 0.5,
            new_stroke_threshold: 5,
            max_velocity: 100.0,
            use_kalman: true,
            use_optical_flow: true,
            use_camshift: false,
            morph_kernel_size: 5,
            refiner_blend: 0.3,
            refiner_padding: 10,
            refiner_hist_bins: 16,
            refiner_max_iterations: 10,
            refiner_epsilon: 1.0,
            kalman_process_noise: 0.03,
            kalman_measurement_noise: 0.1,
            flow_window_size: 21,
            flow_pyramid_levels: 3,
            flow_max_iterations: 30,
            flow_epsilon: 0.01,
            flow_min_eigen_threshold: 1e-2,
            flow_max_error: 20.0,
        }
    }
}

impl TrackerConfig {
    /// Inclusive lower HSV bound.
    pub fn hsv_lower(&self) -> [u8; 3] {
        [self.hue_min, self.sat_min, self.val_min]
    }

    /// Inclusive upper HSV bound.
    pub fn hsv_upper(&self) -> [u8; 3] {
        [self.hue_max, self.sat_max, self.val_max]
    }

    /// Lucas–Kanade parameters.
    pub fn lk_params(&self) -> PyrLkParams {
        PyrLkParams {
            win_size: self.flow_window_size,
            max_level: self.flow_pyramid_levels,
            max_iterations: self.flow_max_iterations,
            epsilon: self.flow_epsilon,
            min_eigen_threshold: self.flow_min_eigen_threshold,
        }
    }

    /// Mean-shift stopping rule.
    pub fn term_criteria(&self) -> TermCriteria {
        TermCriteria {
            max_iterations: self.refiner_max_iterations,
            epsilon: self.refiner_epsilon,
        }
    }

    /// Overwrite the fields present in `patch`.
    pub fn apply(&mut self, patch: &TrackerConfigPatch) {
        macro_rules! merge {
            ($($field:ident),* $(,)?) => {
                $(
                    if let Some(value) = patch.$field {
                        self.$field = value;
                    }
                )*
            };
        }

        merge!(
            hue_min,
            hue_max,
            sat_min,
            sat_max,
            val_min,
            val_max,
            min_blob_area,
            max_blob_area,
            smoothing,
            new_stroke_threshold,
            max_velocity,
            use_kalman,
            use_optical_flow,
            use_camshift,
            morph_kernel_size,
            refiner_blend,
            refiner_padding,
            refiner_hist_bins,
            refiner_max_iterations,
            refiner_epsilon,
            kalman_process_noise,
            kalman_measurement_noise,
            flow_window_size,
            flow_pyramid_levels,
            flow_max_iterations,
            flow_epsilon,
            flow_min_eigen_threshold,
            flow_max_error,
        );
    }
}

/// A partial [`TrackerConfig`]; absent keys leave the current value untouched.
///
/// # Example
///
/// ```
/// use lasertag_tracking::{TrackerConfig, TrackerConfigPatch};
///
/// let mut config = TrackerConfig::default();
/// config.apply(&TrackerConfigPatch {
///     max_velocity: Some(20.0),
///     ..Default::default()
/// });
///
/// assert_eq!(config.max_velocity, 20.0);
/// assert_eq!(config.hue_min, 40);
/// ```
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackerConfigPatch {
    pub hue_min: Option<u8>,
    pub hue_max: Option<u8>,
    pub sat_min: Option<u8>,
    pub sat_max: Option<u8>,
    pub val_min: Option<u8>,
    pub val_max: Option<u8>,
    pub min_blob_area: Option<f64>,
    pub max_blob_area: Option<f64>,
    pub smoothing: Option<f32>,
    pub new_stroke_threshold: Option<u32>,
    pub max_velocity: Option<f32>,
    pub use_kalman: Option<bool>,
    pub use_optical_flow: Option<bool>,
    pub use_camshift: Option<bool>,
    pub morph_kernel_size: Option<usize>,
    pub refiner_blend: Option<f32>,
    pub refiner_padding: Option<i32>,
    pub refiner_hist_bins: Option<usize>,
    pub refiner_max_iterations: Option<usize>,
    pub refiner_epsilon: Option<f32>,
    pub kalman_process_noise: Option<f32>,
    pub kalman_measurement_noise: Option<f32>,
    pub flow_window_size: Option<usize>,
    pub flow_pyramid_levels: Option<usize>,
    pub flow_max_iterations: Option<usize>,
    pub flow_epsilon: Option<f32>,
    pub flow_min_eigen_threshold: Option<f32>,
    pub flow_max_error: Option<f32>,
}

impl TrackerConfigPatch {
    /// Whether the patch carries no keys at all.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_patch_is_noop() {
        let mut config = TrackerConfig {
            hue_min: 12,
            use_camshift: true,
            ..Default::default()
        };
        let before = config.clone();

        let patch = TrackerConfigPatch::default();
        assert!(patch.is_empty());
        config.apply(&patch);
        assert_eq!(config, before);
    }

    #[test]
    fn test_patch_overwrites_only_present_keys() -> Result<(), serde_json::Error> {
        let mut config = TrackerConfig::default();
        let patch: TrackerConfigPatch =
            serde_json::from_str(r#"{"hueMin": 100, "useKalman": false, "refinerBlend": 0.5}"#)?;
        config.apply(&patch);

        assert_eq!(config.hue_min, 100);
        assert!(!config.use_kalman);
        assert_eq!(config.refiner_blend, 0.5);
        assert_eq!(config.hue_max, 80);
        assert_eq!(config.max_velocity, 100.0);

        Ok(())
    }

    #[test]
    fn test_config_roundtrips_with_camel_case_keys() -> Result<(), serde_json::Error> {
        let json = serde_json::to_value(TrackerConfig::default())?;
        assert_eq!(json["newStrokeThreshold"], 5);
        assert_eq!(json["morphKernelSize"], 5);

        let partial: TrackerConfig = serde_json::from_str(r#"{"maxVelocity": 20.0}"#)?;
        assert_eq!(partial.max_velocity, 20.0);
        assert_eq!(partial.hue_min, 40);

        Ok(())
    }
}
