use lasertag_image::{Image, ImageError};

use crate::{parallel, rect::Rect};

/// Exclusive upper bound of the 8-bit hue channel.
pub const HUE_RANGE: usize = 180;

/// Upper bound of a normalized histogram.
pub const HIST_NORM_MAX: f32 = 255.0;

fn hue_bin_lut(num_bins: usize) -> [usize; 256] {
    let mut lut = [0usize; 256];
    for (h, bin) in lut.iter_mut().enumerate() {
        *bin = (h * num_bins / HUE_RANGE).min(num_bins - 1);
    }
    lut
}

/// Compute a 1-D hue histogram over a region of an HSV image.
///
/// Only pixels inside `roi` whose `mask` value is non-zero are counted. The
/// histogram is min-max normalized so that its largest bin equals
/// [`HIST_NORM_MAX`]; an all-zero histogram is left untouched.
///
/// # Arguments
///
/// * `src` - The HSV image, hue in the first channel in [0, 180).
/// * `mask` - Binary mask selecting the pixels to count.
/// * `roi` - The region to accumulate over, already clipped to the image.
/// * `hist` - The output histogram; its length is the number of bins.
///
/// # Errors
///
/// Returns an error if the number of bins is invalid or the sizes differ.
///
/// # Example
///
/// ```
/// use lasertag_image::{Image, ImageSize};
/// use lasertag_imgproc::histogram::hue_histogram;
/// use lasertag_imgproc::rect::Rect;
///
/// let hsv = Image::<u8, 3>::new(
///     ImageSize { width: 2, height: 1 },
///     vec![10, 255, 255, 100, 255, 255],
/// )
/// .unwrap();
/// let mask = Image::<u8, 1>::new(ImageSize { width: 2, height: 1 }, vec![255, 255]).unwrap();
///
/// let mut hist = vec![0.0; 2];
/// hue_histogram(&hsv, &mask, Rect::new(0, 0, 2, 1), &mut hist).unwrap();
/// assert_eq!(hist, vec![255.0, 255.0]);
/// ```
pub fn hue_histogram(
    src: &Image<u8, 3>,
    mask: &Image<u8, 1>,
    roi: Rect,
    hist: &mut [f32],
) -> Result<(), ImageError> {
    let num_bins = hist.len();
    if num_bins == 0 || num_bins > HUE_RANGE {
        return Err(ImageError::InvalidHistogramBins(num_bins));
    }
    if src.size() != mask.size() {
        return Err(ImageError::InvalidImageSize(
            src.cols(),
            src.rows(),
            mask.cols(),
            mask.rows(),
        ));
    }

    let roi = roi.clip(src.size());
    if roi.is_empty() {
        return Err(ImageError::EmptyWindow);
    }

    let bin_lut = hue_bin_lut(num_bins);
    let width = src.width();
    let hsv = src.as_slice();
    let mask = mask.as_slice();

    hist.fill(0.0);
    for y in roi.y as usize..roi.bottom() as usize {
        for x in roi.x as usize..roi.right() as usize {
            let idx = y * width + x;
            if mask[idx] == 0 {
                continue;
            }
            hist[bin_lut[hsv[idx * 3] as usize]] += 1.0;
        }
    }

    let max = hist.iter().cloned().fold(0.0f32, f32::max);
    if max > 0.0 {
        let scale = HIST_NORM_MAX / max;
        hist.iter_mut().for_each(|v| *v *= scale);
    }

    Ok(())
}

/// Back-project a hue histogram onto an HSV image.
///
/// Every destination pixel receives the histogram value of the bin its hue
/// falls into, producing a probability map in [0, 255].
///
/// # Arguments
///
/// * `src` - The HSV image, hue in the first channel in [0, 180).
/// * `hist` - A normalized hue histogram as produced by [`hue_histogram`].
/// * `dst` - The output probability image.
pub fn back_project(
    src: &Image<u8, 3>,
    hist: &[f32],
    dst: &mut Image<u8, 1>,
) -> Result<(), ImageError> {
    let num_bins = hist.len();
    if num_bins == 0 || num_bins > HUE_RANGE {
        return Err(ImageError::InvalidHistogramBins(num_bins));
    }
    if src.size() != dst.size() {
        return Err(ImageError::InvalidImageSize(
            src.cols(),
            src.rows(),
            dst.cols(),
            dst.rows(),
        ));
    }

    let bin_lut = hue_bin_lut(num_bins);
    let mut value_lut = [0u8; 256];
    for (h, v) in value_lut.iter_mut().enumerate() {
        *v = hist[bin_lut[h]].round().clamp(0.0, HIST_NORM_MAX) as u8;
    }

    parallel::par_iter_rows(src, dst, |src_pixel, dst_pixel| {
        dst_pixel[0] = value_lut[src_pixel[0] as usize];
    });

    Ok(())
}
