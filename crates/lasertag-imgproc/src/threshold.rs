use lasertag_image::{Image, ImageError};

use crate::parallel;

/// Apply a range threshold to an image.
///
/// A destination pixel is set to 255 when every channel of the source pixel
/// lies inside `[lower_bound, upper_bound]` (both inclusive) and to 0 otherwise.
///
/// # Arguments
///
/// * `src` - The input image of an arbitrary number of channels and type.
/// * `dst` - The output binary mask.
/// * `lower_bound` - The inclusive lower bound for each channel.
/// * `upper_bound` - The inclusive upper bound for each channel.
///
/// # Examples
///
/// ```
/// use lasertag_image::{Image, ImageSize};
/// use lasertag_imgproc::threshold::in_range;
///
/// let data = vec![100u8, 200, 50, 150, 200, 250];
/// let image = Image::<u8, 3>::new(ImageSize { width: 2, height: 1 }, data).unwrap();
///
/// let mut mask = Image::<u8, 1>::from_size_val(image.size(), 0).unwrap();
///
/// in_range(&image, &mut mask, &[90, 150, 0], &[160, 255, 100]).unwrap();
/// assert_eq!(mask.as_slice(), &[255, 0]);
/// ```
pub fn in_range<T, const C: usize>(
    src: &Image<T, C>,
    dst: &mut Image<u8, 1>,
    lower_bound: &[T; C],
    upper_bound: &[T; C],
) -> Result<(), ImageError>
where
    T: Clone + Send + Sync + PartialOrd,
{
    if src.size() != dst.size() {
        return Err(ImageError::InvalidImageSize(
            src.cols(),
            src.rows(),
            dst.cols(),
            dst.rows(),
        ));
    }

    // parallelize the operation by rows
    parallel::par_iter_rows(src, dst, |src_pixel, dst_pixel| {
        let is_in_range = src_pixel
            .iter()
            .zip(lower_bound.iter().zip(upper_bound.iter()))
            .all(|(val, (lower, upper))| val >= lower && val <= upper);
        dst_pixel[0] = if is_in_range { 255 } else { 0 };
    });

    Ok(())
}
