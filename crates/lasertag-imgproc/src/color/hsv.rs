use crate::parallel;
use lasertag_image::{Image, ImageError};

/// Convert an RGB8 image to an 8-bit HSV image.
///
/// The input image is assumed to have 3 channels in the order R, G, B.
///
/// # Arguments
///
/// * `src` - The input RGB image assumed to have 3 channels.
/// * `dst` - The output HSV image.
///
/// # Returns
///
/// The HSV image with the following channels:
///
/// * H: The hue channel in the range [0, 180) (half degrees).
/// * S: The saturation channel in the range [0, 255].
/// * V: The value channel in the range [0, 255].
///
/// Precondition: the input and output images must have the same size.
///
/// # Example
///
/// ```
/// use lasertag_image::{Image, ImageSize};
/// use lasertag_imgproc::color::hsv_from_rgb_u8;
///
/// let image = Image::<u8, 3>::new(
///     ImageSize {
///         width: 1,
///         height: 1,
///     },
///     vec![0, 255, 0],
/// )
/// .unwrap();
///
/// let mut hsv = Image::<u8, 3>::from_size_val(image.size(), 0).unwrap();
///
/// hsv_from_rgb_u8(&image, &mut hsv).unwrap();
///
/// assert_eq!(hsv.as_slice(), &[60, 255, 255]);
/// ```
pub fn hsv_from_rgb_u8(src: &Image<u8, 3>, dst: &mut Image<u8, 3>) -> Result<(), ImageError> {
    if src.size() != dst.size() {
        return Err(ImageError::InvalidImageSize(
            src.cols(),
            src.rows(),
            dst.cols(),
            dst.rows(),
        ));
    }

    parallel::par_iter_rows(src, dst, |src_pixel, dst_pixel| {
        let r = src_pixel[0] as f32;
        let g = src_pixel[1] as f32;
        let b = src_pixel[2] as f32;

        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let delta = max - min;

        let h = if delta == 0.0 {
            0.0
        } else if max == r {
            60.0 * ((g - b) / delta)
        } else if max == g {
            60.0 * ((b - r) / delta + 2.0)
        } else {
            60.0 * ((r - g) / delta + 4.0)
        };

        // wrap to [0, 360) before halving so that 8 bits can hold it
        let h = if h < 0.0 { h + 360.0 } else { h };
        let h = (h / 2.0).round();
        let h = if h >= 180.0 { h - 180.0 } else { h };

        let s = if max == 0.0 { 0.0 } else { delta / max * 255.0 };

        dst_pixel[0] = h as u8;
        dst_pixel[1] = s.round() as u8;
        dst_pixel[2] = max as u8;
    });

    Ok(())
}
