use lasertag_image::{Image, ImageError};
use lasertag_imgproc::{
    color,
    contours::{self, Contour},
    histogram,
    meanshift::{self, CamShiftResult, TermCriteria},
    moments::{self, Moments},
    morphology::{self, Kernel},
    optical_flow::{self, LkTrack, PyrLkParams},
    rect::Rect,
    threshold,
};

use crate::error::TrackingError;

/// The vision primitives the tracking engine is built on.
///
/// The engine receives its backend at construction and checks it with
/// [`VisionBackend::probe`] on every `init`, so a missing or broken backend
/// fails fast instead of surfacing mid-stream.
pub trait VisionBackend {
    /// Check that the backend can be used.
    fn probe(&self) -> Result<(), TrackingError>;

    /// Convert an RGB frame to HSV with hue in [0, 180).
    fn hsv_from_rgb(&self, src: &Image<u8, 3>, dst: &mut Image<u8, 3>) -> Result<(), ImageError>;

    /// Convert an RGB frame to grayscale.
    fn gray_from_rgb(&self, src: &Image<u8, 3>, dst: &mut Image<u8, 1>) -> Result<(), ImageError>;

    /// Inclusive per-channel range threshold producing a 0/255 mask.
    fn in_range(
        &self,
        src: &Image<u8, 3>,
        dst: &mut Image<u8, 1>,
        lower: &[u8; 3],
        upper: &[u8; 3],
    ) -> Result<(), ImageError>;

    /// Morphological opening.
    fn open(
        &self,
        src: &Image<u8, 1>,
        dst: &mut Image<u8, 1>,
        tmp: &mut Image<u8, 1>,
        kernel: &Kernel,
    ) -> Result<(), ImageError>;

    /// Morphological closing.
    fn close(
        &self,
        src: &Image<u8, 1>,
        dst: &mut Image<u8, 1>,
        tmp: &mut Image<u8, 1>,
        kernel: &Kernel,
    ) -> Result<(), ImageError>;

    /// Outer borders of the top level regions of a mask.
    fn find_external_contours(&self, mask: &Image<u8, 1>) -> Vec<Contour>;

    /// Moments of the area enclosed by a contour.
    fn moments(&self, contour: &Contour) -> Moments;

    /// Track one point from `prev` to `next` with pyramidal Lucas–Kanade.
    ///
    /// `Ok(None)` means the point could not be tracked.
    fn track_point(
        &self,
        prev: &Image<u8, 1>,
        next: &Image<u8, 1>,
        point: [f32; 2],
        params: &PyrLkParams,
    ) -> Result<Option<LkTrack>, ImageError>;

    /// Masked hue histogram over a region, normalized to [0, 255].
    fn hue_histogram(
        &self,
        hsv: &Image<u8, 3>,
        mask: &Image<u8, 1>,
        roi: Rect,
        hist: &mut [f32],
    ) -> Result<(), ImageError>;

    /// Back-project a hue histogram.
    fn back_project(
        &self,
        hsv: &Image<u8, 3>,
        hist: &[f32],
        dst: &mut Image<u8, 1>,
    ) -> Result<(), ImageError>;

    /// Continuously adaptive mean-shift.
    fn cam_shift(
        &self,
        prob: &Image<u8, 1>,
        window: Rect,
        criteria: &TermCriteria,
    ) -> Result<CamShiftResult, ImageError>;
}

/// A [`VisionBackend`] implemented with `lasertag-imgproc`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeBackend;

impl VisionBackend for NativeBackend {
    fn probe(&self) -> Result<(), TrackingError> {
        Ok(())
    }

    fn hsv_from_rgb(&self, src: &Image<u8, 3>, dst: &mut Image<u8, 3>) -> Result<(), ImageError> {
        color::hsv_from_rgb_u8(src, dst)
    }

    fn gray_from_rgb(&self, src: &Image<u8, 3>, dst: &mut Image<u8, 1>) -> Result<(), ImageError> {
        color::gray_from_rgb_u8(src, dst)
    }

    fn in_range(
        &self,
        src: &Image<u8, 3>,
        dst: &mut Image<u8, 1>,
        lower: &[u8; 3],
        upper: &[u8; 3],
    ) -> Result<(), ImageError> {
        threshold::in_range(src, dst, lower, upper)
    }

    fn open(
        &self,
        src: &Image<u8, 1>,
        dst: &mut Image<u8, 1>,
        tmp: &mut Image<u8, 1>,
        kernel: &Kernel,
    ) -> Result<(), ImageError> {
        morphology::open(src, dst, tmp, kernel)
    }

    fn close(
        &self,
        src: &Image<u8, 1>,
        dst: &mut Image<u8, 1>,
        tmp: &mut Image<u8, 1>,
        kernel: &Kernel,
    ) -> Result<(), ImageError> {
        morphology::close(src, dst, tmp, kernel)
    }

    fn find_external_contours(&self, mask: &Image<u8, 1>) -> Vec<Contour> {
        contours::find_external_contours(mask)
    }

    fn moments(&self, contour: &Contour) -> Moments {
        moments::polygon_moments(&contour.points)
    }

    fn track_point(
        &self,
        prev: &Image<u8, 1>,
        next: &Image<u8, 1>,
        point: [f32; 2],
        params: &PyrLkParams,
    ) -> Result<Option<LkTrack>, ImageError> {
        let tracks = optical_flow::calc_optical_flow_pyr_lk(
            &prev.cast_and_scale(1.0f32)?,
            &next.cast_and_scale(1.0f32)?,
            &[point],
            params,
        )?;
        Ok(tracks.into_iter().next().flatten())
    }

    fn hue_histogram(
        &self,
        hsv: &Image<u8, 3>,
        mask: &Image<u8, 1>,
        roi: Rect,
        hist: &mut [f32],
    ) -> Result<(), ImageError> {
        histogram::hue_histogram(hsv, mask, roi, hist)
    }

    fn back_project(
        &self,
        hsv: &Image<u8, 3>,
        hist: &[f32],
        dst: &mut Image<u8, 1>,
    ) -> Result<(), ImageError> {
        histogram::back_project(hsv, hist, dst)
    }

    fn cam_shift(
        &self,
        prob: &Image<u8, 1>,
        window: Rect,
        criteria: &TermCriteria,
    ) -> Result<CamShiftResult, ImageError> {
        meanshift::cam_shift(prob, window, criteria)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lasertag_image::ImageSize;

    fn disc(size: ImageSize, cx: i32, cy: i32) -> Result<Image<u8, 1>, ImageError> {
        let mut img = Image::<u8, 1>::from_size_val(size, 0)?;
        for y in 0..size.height as i32 {
            for x in 0..size.width as i32 {
                if (x - cx).pow(2) + (y - cy).pow(2) < 64 {
                    img.set_pixel(x as usize, y as usize, 0, 255)?;
                }
            }
        }
        Ok(img)
    }

    #[test]
    fn test_track_point_follows_disc() -> Result<(), ImageError> {
        let size = ImageSize {
            width: 64,
            height: 64,
        };
        let prev = disc(size, 32, 32)?;
        let next = disc(size, 35, 30)?;

        let params = PyrLkParams {
            max_level: 2,
            ..Default::default()
        };
        let track = NativeBackend
            .track_point(&prev, &next, [32.0, 32.0], &params)?
            .ok_or(ImageError::EmptyWindow)?;
        assert!((track.point[0] - 35.0).abs() < 0.5, "x: {}", track.point[0]);
        assert!((track.point[1] - 30.0).abs() < 0.5, "y: {}", track.point[1]);

        Ok(())
    }

    #[test]
    fn test_track_point_size_mismatch() -> Result<(), ImageError> {
        let prev = Image::<u8, 1>::from_size_val(
            ImageSize {
                width: 32,
                height: 32,
            },
            0,
        )?;
        let next = Image::<u8, 1>::from_size_val(
            ImageSize {
                width: 16,
                height: 32,
            },
            0,
        )?;
        assert!(matches!(
            NativeBackend.track_point(&prev, &next, [8.0, 8.0], &PyrLkParams::default()),
            Err(ImageError::InvalidImageSize(32, 32, 16, 32))
        ));
        Ok(())
    }
}
