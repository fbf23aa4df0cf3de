use lasertag_image::{Image, ImageError};
use lasertag_imgproc::morphology::Kernel;

use crate::{backend::VisionBackend, config::TrackerConfig};

/// Thresholds a frame in HSV space into a denoised binary mask.
///
/// The raw range mask is opened and then closed with an elliptical
/// structuring element, removing speckles first and filling small gaps after.
#[derive(Debug, Clone)]
pub struct ColorSegmenter {
    kernel: Kernel,
    kernel_size: usize,
}

/// Scratch and output images of the segmentation.
pub struct SegmentationBuffers<'a> {
    /// HSV conversion of the frame.
    pub hsv: &'a mut Image<u8, 3>,
    /// The denoised mask.
    pub mask: &'a mut Image<u8, 1>,
    /// Scratch buffer, holds the raw threshold.
    pub raw: &'a mut Image<u8, 1>,
    /// Scratch buffer, holds the opened mask.
    pub opened: &'a mut Image<u8, 1>,
}

impl ColorSegmenter {
    /// Create a segmenter with a `kernel_size` x `kernel_size` ellipse.
    pub fn new(kernel_size: usize) -> Self {
        Self {
            kernel: Kernel::ellipse(kernel_size, kernel_size),
            kernel_size,
        }
    }

    /// The structuring element in use.
    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    /// Rebuild the structuring element if the configured size changed.
    pub fn update_kernel(&mut self, kernel_size: usize) {
        if kernel_size != self.kernel_size {
            *self = Self::new(kernel_size);
        }
    }

    /// Segment `frame` into `buffers.mask`.
    pub fn segment<B: VisionBackend>(
        &self,
        backend: &B,
        frame: &Image<u8, 3>,
        config: &TrackerConfig,
        buffers: SegmentationBuffers<'_>,
    ) -> Result<(), ImageError> {
        let SegmentationBuffers {
            hsv,
            mask,
            raw,
            opened,
        } = buffers;

        backend.hsv_from_rgb(frame, hsv)?;
        backend.in_range(hsv, raw, &config.hsv_lower(), &config.hsv_upper())?;
        backend.open(raw, opened, mask, &self.kernel)?;
        backend.close(opened, mask, raw, &self.kernel)?;

        Ok(())
    }
}

impl Default for ColorSegmenter {
    fn default() -> Self {
        Self::new(TrackerConfig::default().morph_kernel_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NativeBackend;
    use lasertag_image::ImageSize;

    #[test]
    fn test_segment_removes_speckles() -> Result<(), ImageError> {
        let size = ImageSize {
            width: 40,
            height: 40,
        };
        let mut frame = Image::<u8, 3>::from_size_val(size, 0)?;

        // a green square and an isolated green pixel
        for y in 10..20 {
            for x in 10..20 {
                frame.set_pixel(x, y, 1, 255)?;
            }
        }
        frame.set_pixel(30, 30, 1, 255)?;

        let mut hsv = Image::<u8, 3>::from_size_val(size, 0)?;
        let mut mask = Image::<u8, 1>::from_size_val(size, 0)?;
        let mut raw = mask.clone();
        let mut opened = mask.clone();

        let segmenter = ColorSegmenter::default();
        segmenter.segment(
            &NativeBackend,
            &frame,
            &TrackerConfig::default(),
            SegmentationBuffers {
                hsv: &mut hsv,
                mask: &mut mask,
                raw: &mut raw,
                opened: &mut opened,
            },
        )?;

        assert_eq!(*mask.get_pixel(15, 15, 0)?, 255);
        assert_eq!(*mask.get_pixel(30, 30, 0)?, 0);
        assert_eq!(*mask.get_pixel(5, 5, 0)?, 0);

        Ok(())
    }

    #[test]
    fn test_update_kernel() {
        let mut segmenter = ColorSegmenter::new(5);
        segmenter.update_kernel(3);
        assert_eq!(segmenter.kernel().width(), 3);
    }
}
