use std::time::{Duration, Instant};

use glam::Vec2;
use lasertag_image::{Image, ImageError, ImageSize};
use log::{info, warn};

use crate::{
    backend::VisionBackend,
    blob::{Blob, BlobSelector},
    config::{TrackerConfig, TrackerConfigPatch},
    error::TrackingError,
    estimator::{Observation, StateEstimator},
    result::{ObservationSource, TrackingResult},
    segmenter::{ColorSegmenter, SegmentationBuffers},
    state::TrackingState,
};

/// Working images of the engine, allocated once per resolution.
pub struct FrameBuffers {
    size: ImageSize,
    hsv: Image<u8, 3>,
    mask: Image<u8, 1>,
    mask_raw: Image<u8, 1>,
    mask_opened: Image<u8, 1>,
    gray_curr: Image<u8, 1>,
    gray_prev: Image<u8, 1>,
    has_gray_curr: bool,
    has_gray_prev: bool,
    back_projection: Image<u8, 1>,
}

impl FrameBuffers {
    /// Allocate every buffer for frames of `size`.
    pub fn new(size: ImageSize) -> Result<Self, ImageError> {
        let gray = Image::<u8, 1>::from_size_val(size, 0)?;
        Ok(Self {
            size,
            hsv: Image::from_size_val(size, 0)?,
            mask: gray.clone(),
            mask_raw: gray.clone(),
            mask_opened: gray.clone(),
            gray_curr: gray.clone(),
            gray_prev: gray.clone(),
            has_gray_curr: false,
            has_gray_prev: false,
            back_projection: gray,
        })
    }

    /// The frame size the buffers were allocated for.
    pub fn size(&self) -> ImageSize {
        self.size
    }

    /// The segmentation mask of the last processed frame.
    pub fn mask(&self) -> &Image<u8, 1> {
        &self.mask
    }

    // frame N-1 must become the previous image before frame N is converted
    fn advance_gray<B: VisionBackend>(
        &mut self,
        backend: &B,
        frame: &Image<u8, 3>,
    ) -> Result<(), ImageError> {
        std::mem::swap(&mut self.gray_prev, &mut self.gray_curr);
        self.has_gray_prev = self.has_gray_curr;
        self.has_gray_curr = false;

        backend.gray_from_rgb(frame, &mut self.gray_curr)?;
        self.has_gray_curr = true;
        Ok(())
    }

    fn invalidate_gray(&mut self) {
        self.has_gray_curr = false;
        self.has_gray_prev = false;
    }
}

/// The tracking engine.
///
/// Each frame runs segmentation, blob selection, the optical flow fallback,
/// the CamShift refinement and finally the state estimator, in that order.
///
/// # Example
///
/// ```
/// use lasertag_image::{Image, ImageSize};
/// use lasertag_tracking::{NativeBackend, PointTracker, TrackerConfig};
///
/// let mut tracker = PointTracker::new(NativeBackend, TrackerConfig::default());
/// tracker.init(64, 48).unwrap();
///
/// let frame = Image::<u8, 3>::from_size_val(ImageSize { width: 64, height: 48 }, 0).unwrap();
/// let result = tracker.process_frame(&frame).unwrap().unwrap();
/// assert!(!result.is_tracking);
/// ```
pub struct PointTracker<B: VisionBackend> {
    backend: B,
    config: TrackerConfig,
    segmenter: ColorSegmenter,
    buffers: Option<FrameBuffers>,
    state: TrackingState,
}

impl<B: VisionBackend> PointTracker<B> {
    /// Create an engine. It must be initialized before processing frames.
    pub fn new(backend: B, config: TrackerConfig) -> Self {
        let segmenter = ColorSegmenter::new(config.morph_kernel_size);
        Self {
            backend,
            config,
            segmenter,
            buffers: None,
            state: TrackingState::default(),
        }
    }

    /// Allocate the buffers for `width` x `height` frames and reset all state.
    ///
    /// This is the only way to change the resolution.
    ///
    /// # Errors
    ///
    /// [`TrackingError::BackendUnavailable`] if the backend probe fails, in
    /// which case the engine stays uninitialized.
    pub fn init(&mut self, width: usize, height: usize) -> Result<(), TrackingError> {
        self.buffers = None;
        self.state = TrackingState::default();

        self.backend.probe()?;

        let size = ImageSize { width, height };
        if size.area() == 0 {
            return Err(TrackingError::InvalidDimensions(size));
        }

        self.buffers = Some(FrameBuffers::new(size)?);
        self.segmenter = ColorSegmenter::new(self.config.morph_kernel_size);
        info!("tracker initialized for {size} frames");

        Ok(())
    }

    /// Whether buffers are allocated.
    pub fn is_initialized(&self) -> bool {
        self.buffers.is_some()
    }

    /// Process one frame.
    ///
    /// Returns `Ok(None)` when a pipeline stage fails; the failure is logged
    /// and the tracking state is left exactly as it was.
    ///
    /// # Errors
    ///
    /// [`TrackingError::NotInitialized`] before `init` or after `dispose`, and
    /// [`TrackingError::FrameSizeMismatch`] for frames of the wrong size.
    pub fn process_frame(
        &mut self,
        frame: &Image<u8, 3>,
    ) -> Result<Option<TrackingResult>, TrackingError> {
        let start = Instant::now();

        let Some(buffers) = self.buffers.as_mut() else {
            return Err(TrackingError::NotInitialized);
        };
        if frame.size() != buffers.size {
            return Err(TrackingError::FrameSizeMismatch {
                expected: buffers.size,
                actual: frame.size(),
            });
        }

        let blob = match detect(&self.backend, &self.segmenter, &self.config, buffers, frame) {
            Ok(blob) => blob,
            Err(err) => {
                warn!("frame dropped: {err}");
                return Ok(None);
            }
        };

        let estimator = StateEstimator::new(&self.config);
        let (observation, source) = observe(
            &self.backend,
            &self.config,
            &estimator,
            &mut self.state,
            buffers,
            blob,
        );
        let accepted = estimator.update(&mut self.state, observation);
        let source = if accepted {
            source
        } else {
            ObservationSource::None
        };

        Ok(Some(self.snapshot(source, start.elapsed())))
    }

    /// Merge `patch` into the configuration.
    pub fn set_params(&mut self, patch: &TrackerConfigPatch) {
        self.config.apply(patch);
        self.segmenter.update_kernel(self.config.morph_kernel_size);
    }

    /// The current configuration.
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// The tracking state.
    pub fn state(&self) -> &TrackingState {
        &self.state
    }

    /// The backend in use.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The last segmentation mask.
    pub fn mask(&self) -> Option<&Image<u8, 1>> {
        self.buffers.as_ref().map(FrameBuffers::mask)
    }

    /// The frame size given to `init`.
    pub fn size(&self) -> Option<ImageSize> {
        self.buffers.as_ref().map(FrameBuffers::size)
    }

    /// The current position divided by the frame dimensions.
    pub fn normalized_position(&self) -> Option<Vec2> {
        let size = self.size()?;
        let position = self.state.current_position?;
        Some(position / Vec2::new(size.width as f32, size.height as f32))
    }

    /// Release the buffers. Calling it again does nothing.
    pub fn dispose(&mut self) {
        if self.buffers.take().is_some() {
            info!("tracker disposed");
        }
        self.state = TrackingState::default();
    }

    fn snapshot(&self, source: ObservationSource, processing_time: Duration) -> TrackingResult {
        let state = &self.state;
        TrackingResult {
            position: state.current_position,
            normalized_position: self.normalized_position(),
            predicted_position: state.predicted_position,
            velocity: state.velocity,
            is_tracking: state.is_tracking,
            is_new_stroke: state.is_new_stroke,
            frames_since_last_detection: state.frames_since_last_detection,
            source,
            processing_time,
        }
    }
}

// fallible stages; they only touch the buffers
fn detect<B: VisionBackend>(
    backend: &B,
    segmenter: &ColorSegmenter,
    config: &TrackerConfig,
    buffers: &mut FrameBuffers,
    frame: &Image<u8, 3>,
) -> Result<Option<Blob>, ImageError> {
    segmenter.segment(
        backend,
        frame,
        config,
        SegmentationBuffers {
            hsv: &mut buffers.hsv,
            mask: &mut buffers.mask,
            raw: &mut buffers.mask_raw,
            opened: &mut buffers.mask_opened,
        },
    )?;

    if config.use_optical_flow {
        buffers.advance_gray(backend, frame)?;
    } else {
        buffers.invalidate_gray();
    }

    Ok(BlobSelector.select(backend, &buffers.mask, config))
}

// refinement only runs on detections the estimator will accept
fn observe<B: VisionBackend>(
    backend: &B,
    config: &TrackerConfig,
    estimator: &StateEstimator<'_>,
    state: &mut TrackingState,
    buffers: &mut FrameBuffers,
    blob: Option<Blob>,
) -> (Option<Observation>, ObservationSource) {
    if let Some(blob) = blob {
        let mut observation = Observation::detected(blob.centroid);

        if config.use_camshift && estimator.admits(state, &observation) {
            let refined = state.refiner.refine(
                backend,
                &buffers.hsv,
                &buffers.mask,
                &mut buffers.back_projection,
                blob.bounding_rect,
                blob.centroid,
                config,
            );
            if let Some(refined) = refined {
                observation = observation.with_refinement(refined);
            }
        }

        return (Some(observation), ObservationSource::Color);
    }

    if !config.use_optical_flow || !buffers.has_gray_prev {
        return (None, ObservationSource::None);
    }

    let predicted = state.last_position.and_then(|last| {
        state
            .flow
            .predict(backend, &buffers.gray_prev, &buffers.gray_curr, last, config)
    });

    match predicted {
        Some(point) => (Some(Observation::predicted(point)), ObservationSource::Flow),
        None => (None, ObservationSource::None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NativeBackend;
    use lasertag_imgproc::{
        contours::Contour,
        meanshift::{CamShiftResult, TermCriteria},
        moments::Moments,
        morphology::Kernel,
        optical_flow::{LkTrack, PyrLkParams},
        rect::Rect,
    };
    use std::cell::Cell;

    /// Delegates to the native backend with switchable faults.
    #[derive(Default)]
    struct FaultyBackend {
        unavailable: bool,
        fail_hsv: Cell<bool>,
    }

    impl VisionBackend for FaultyBackend {
        fn probe(&self) -> Result<(), TrackingError> {
            if self.unavailable {
                return Err(TrackingError::BackendUnavailable("not loaded".into()));
            }
            Ok(())
        }

        fn hsv_from_rgb(&self, src: &Image<u8, 3>, dst: &mut Image<u8, 3>) -> Result<(), ImageError> {
            if self.fail_hsv.get() {
                return Err(ImageError::CastError);
            }
            NativeBackend.hsv_from_rgb(src, dst)
        }

        fn gray_from_rgb(&self, src: &Image<u8, 3>, dst: &mut Image<u8, 1>) -> Result<(), ImageError> {
            NativeBackend.gray_from_rgb(src, dst)
        }

        fn in_range(
            &self,
            src: &Image<u8, 3>,
            dst: &mut Image<u8, 1>,
            lower: &[u8; 3],
            upper: &[u8; 3],
        ) -> Result<(), ImageError> {
            NativeBackend.in_range(src, dst, lower, upper)
        }

        fn open(
            &self,
            src: &Image<u8, 1>,
            dst: &mut Image<u8, 1>,
            tmp: &mut Image<u8, 1>,
            kernel: &Kernel,
        ) -> Result<(), ImageError> {
            NativeBackend.open(src, dst, tmp, kernel)
        }

        fn close(
            &self,
            src: &Image<u8, 1>,
            dst: &mut Image<u8, 1>,
            tmp: &mut Image<u8, 1>,
            kernel: &Kernel,
        ) -> Result<(), ImageError> {
            NativeBackend.close(src, dst, tmp, kernel)
        }

        fn find_external_contours(&self, mask: &Image<u8, 1>) -> Vec<Contour> {
            NativeBackend.find_external_contours(mask)
        }

        fn moments(&self, contour: &Contour) -> Moments {
            NativeBackend.moments(contour)
        }

        fn track_point(
            &self,
            prev: &Image<u8, 1>,
            next: &Image<u8, 1>,
            point: [f32; 2],
            params: &PyrLkParams,
        ) -> Result<Option<LkTrack>, ImageError> {
            NativeBackend.track_point(prev, next, point, params)
        }

        fn hue_histogram(
            &self,
            hsv: &Image<u8, 3>,
            mask: &Image<u8, 1>,
            roi: Rect,
            hist: &mut [f32],
        ) -> Result<(), ImageError> {
            NativeBackend.hue_histogram(hsv, mask, roi, hist)
        }

        fn back_project(
            &self,
            hsv: &Image<u8, 3>,
            hist: &[f32],
            dst: &mut Image<u8, 1>,
        ) -> Result<(), ImageError> {
            NativeBackend.back_project(hsv, hist, dst)
        }

        fn cam_shift(
            &self,
            prob: &Image<u8, 1>,
            window: Rect,
            criteria: &TermCriteria,
        ) -> Result<CamShiftResult, ImageError> {
            NativeBackend.cam_shift(prob, window, criteria)
        }
    }

    fn frame_with_dot(size: ImageSize, cx: i32, cy: i32) -> Result<Image<u8, 3>, ImageError> {
        let mut frame = Image::<u8, 3>::from_size_val(size, 0)?;
        for y in (cy - 6)..=(cy + 6) {
            for x in (cx - 6)..=(cx + 6) {
                if (x - cx).pow(2) + (y - cy).pow(2) <= 36 {
                    frame.set_pixel(x as usize, y as usize, 1, 255)?;
                }
            }
        }
        Ok(frame)
    }

    #[test]
    fn test_init_fails_without_backend() {
        let backend = FaultyBackend {
            unavailable: true,
            ..Default::default()
        };
        let mut tracker = PointTracker::new(backend, TrackerConfig::default());

        assert!(matches!(
            tracker.init(64, 48),
            Err(TrackingError::BackendUnavailable(_))
        ));
        assert!(!tracker.is_initialized());
    }

    #[test]
    fn test_lifecycle_errors() -> Result<(), TrackingError> {
        let mut tracker = PointTracker::new(NativeBackend, TrackerConfig::default());
        let size = ImageSize {
            width: 64,
            height: 48,
        };
        let frame = Image::<u8, 3>::from_size_val(size, 0)?;

        assert_eq!(tracker.process_frame(&frame), Err(TrackingError::NotInitialized));
        assert_eq!(
            tracker.init(0, 48),
            Err(TrackingError::InvalidDimensions(ImageSize {
                width: 0,
                height: 48
            }))
        );

        tracker.init(32, 32)?;
        assert_eq!(
            tracker.process_frame(&frame),
            Err(TrackingError::FrameSizeMismatch {
                expected: ImageSize {
                    width: 32,
                    height: 32
                },
                actual: size,
            })
        );

        tracker.init(64, 48)?;
        assert!(tracker.process_frame(&frame)?.is_some());

        tracker.dispose();
        tracker.dispose();
        assert!(tracker.mask().is_none());
        assert_eq!(tracker.process_frame(&frame), Err(TrackingError::NotInitialized));

        Ok(())
    }

    #[test]
    fn test_pipeline_error_leaves_state_untouched() -> Result<(), TrackingError> {
        let size = ImageSize {
            width: 64,
            height: 48,
        };
        let mut tracker = PointTracker::new(FaultyBackend::default(), TrackerConfig::default());
        tracker.init(size.width, size.height)?;

        let result = tracker.process_frame(&frame_with_dot(size, 30, 20)?)?;
        assert!(result.is_some_and(|r| r.is_tracking));
        let before = tracker.state().clone();

        tracker.backend().fail_hsv.set(true);
        let empty = Image::<u8, 3>::from_size_val(size, 0)?;
        for _ in 0..10 {
            assert_eq!(tracker.process_frame(&empty)?, None);
        }
        assert_eq!(tracker.state(), &before);
        assert!(tracker.state().is_tracking);

        Ok(())
    }

    #[test]
    fn test_normalized_position() -> Result<(), TrackingError> {
        let size = ImageSize {
            width: 64,
            height: 48,
        };
        let config = TrackerConfig {
            use_kalman: false,
            ..Default::default()
        };
        let mut tracker = PointTracker::new(NativeBackend, config);
        tracker.init(size.width, size.height)?;
        assert_eq!(tracker.normalized_position(), None);

        let result = tracker
            .process_frame(&frame_with_dot(size, 32, 12)?)?
            .ok_or(TrackingError::NotInitialized)?;
        assert_eq!(result.source, ObservationSource::Color);
        assert_eq!(tracker.normalized_position(), Some(Vec2::new(0.5, 0.25)));
        assert_eq!(result.normalized_position, Some(Vec2::new(0.5, 0.25)));

        Ok(())
    }

    #[test]
    fn test_rejected_detection_leaves_refiner_alone() -> Result<(), TrackingError> {
        let size = ImageSize {
            width: 160,
            height: 120,
        };
        let config = TrackerConfig {
            use_camshift: true,
            use_optical_flow: false,
            max_velocity: 20.0,
            ..Default::default()
        };
        let mut tracker = PointTracker::new(NativeBackend, config);
        tracker.init(size.width, size.height)?;

        tracker.process_frame(&frame_with_dot(size, 40, 40)?)?;
        tracker.process_frame(&frame_with_dot(size, 44, 40)?)?;
        let before = tracker.state().refiner.clone();
        assert!(before.histogram().is_some());

        let result = tracker
            .process_frame(&frame_with_dot(size, 120, 90)?)?
            .ok_or(TrackingError::NotInitialized)?;
        assert_eq!(result.source, ObservationSource::None);
        assert_eq!(tracker.state().refiner, before);

        Ok(())
    }

    #[test]
    fn test_set_params_rebuilds_kernel() -> Result<(), TrackingError> {
        let mut tracker = PointTracker::new(NativeBackend, TrackerConfig::default());
        tracker.set_params(&TrackerConfigPatch {
            morph_kernel_size: Some(3),
            ..Default::default()
        });
        assert_eq!(tracker.config().morph_kernel_size, 3);
        assert_eq!(tracker.segmenter.kernel().width(), 3);
        Ok(())
    }
}
