use glam::Vec2;
use lasertag_image::Image;
use lasertag_imgproc::rect::Rect;

use crate::{backend::VisionBackend, config::TrackerConfig};

/// A connected mask region accepted as the tracked point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Blob {
    /// Centroid `(M10 / M00, M01 / M00)`.
    pub centroid: Vec2,
    /// Area enclosed by the region's border.
    pub area: f64,
    /// Bounding box of the border pixels.
    pub bounding_rect: Rect,
}

/// Picks the best blob of a segmentation mask.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlobSelector;

impl BlobSelector {
    /// Select the largest region whose area lies in
    /// `[min_blob_area, max_blob_area]`.
    ///
    /// Regions are visited in raster order of their first border pixel and
    /// only a strictly larger area replaces the current best, so the first of
    /// two equally large regions wins. Regions with zero area are skipped.
    pub fn select<B: VisionBackend>(
        &self,
        backend: &B,
        mask: &Image<u8, 1>,
        config: &TrackerConfig,
    ) -> Option<Blob> {
        let mut best: Option<Blob> = None;

        for contour in backend.find_external_contours(mask) {
            let moments = backend.moments(&contour);
            let area = moments.m00.abs();
            if area < config.min_blob_area || area > config.max_blob_area {
                continue;
            }
            if best.is_some_and(|b| area <= b.area) {
                continue;
            }
            let Some((cx, cy)) = moments.centroid() else {
                continue;
            };

            best = Some(Blob {
                centroid: Vec2::new(cx as f32, cy as f32),
                area,
                bounding_rect: contour.bounding_rect(),
            });
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NativeBackend;
    use lasertag_image::{ImageError, ImageSize};

    fn fill_rect(mask: &mut Image<u8, 1>, r: Rect) -> Result<(), ImageError> {
        for y in r.y..r.bottom() {
            for x in r.x..r.right() {
                mask.set_pixel(x as usize, y as usize, 0, 255)?;
            }
        }
        Ok(())
    }

    fn empty_mask() -> Result<Image<u8, 1>, ImageError> {
        Image::from_size_val(
            ImageSize {
                width: 64,
                height: 48,
            },
            0,
        )
    }

    #[test]
    fn test_select_largest() -> Result<(), ImageError> {
        let mut mask = empty_mask()?;
        fill_rect(&mut mask, Rect::new(2, 2, 5, 5))?;
        fill_rect(&mut mask, Rect::new(20, 10, 9, 7))?;

        let blob = BlobSelector
            .select(&NativeBackend, &mask, &TrackerConfig::default())
            .ok_or(ImageError::EmptyWindow)?;

        assert_eq!(blob.centroid, Vec2::new(24.0, 13.0));
        assert_eq!(blob.bounding_rect, Rect::new(20, 10, 9, 7));
        assert_eq!(blob.area, 48.0);

        Ok(())
    }

    #[test]
    fn test_area_bounds() -> Result<(), ImageError> {
        let mut mask = empty_mask()?;
        fill_rect(&mut mask, Rect::new(2, 2, 3, 3))?;
        fill_rect(&mut mask, Rect::new(20, 10, 30, 30))?;

        let config = TrackerConfig {
            min_blob_area: 10.0,
            max_blob_area: 500.0,
            ..Default::default()
        };
        // 2x2 area square is too small, the big one too large
        assert_eq!(BlobSelector.select(&NativeBackend, &mask, &config), None);

        Ok(())
    }

    #[test]
    fn test_tie_goes_to_first_in_raster_order() -> Result<(), ImageError> {
        let mut mask = empty_mask()?;
        fill_rect(&mut mask, Rect::new(30, 20, 6, 6))?;
        fill_rect(&mut mask, Rect::new(5, 5, 6, 6))?;

        let blob = BlobSelector
            .select(&NativeBackend, &mask, &TrackerConfig::default())
            .ok_or(ImageError::EmptyWindow)?;
        assert_eq!(blob.centroid, Vec2::new(7.5, 7.5));

        Ok(())
    }

    #[test]
    fn test_degenerate_regions_are_skipped() -> Result<(), ImageError> {
        let mut mask = empty_mask()?;
        // a one pixel wide line encloses no area
        fill_rect(&mut mask, Rect::new(5, 5, 20, 1))?;

        let config = TrackerConfig {
            min_blob_area: 0.0,
            ..Default::default()
        };
        assert_eq!(BlobSelector.select(&NativeBackend, &mask, &config), None);

        Ok(())
    }
}
