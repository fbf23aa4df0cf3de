use super::kernels::Kernel;
use lasertag_image::{Image, ImageError};
use rayon::prelude::*;

/// Selects between min (erosion) and max (dilation) filtering.
#[derive(Clone, Copy)]
enum RankOp {
    Min,
    Max,
}

fn check_sizes<T>(src: &Image<T, 1>, dst: &Image<T, 1>) -> Result<(), ImageError> {
    if src.size() != dst.size() {
        return Err(ImageError::InvalidImageSize(
            src.width(),
            src.height(),
            dst.width(),
            dst.height(),
        ));
    }
    Ok(())
}

// Neighbours that fall outside the image are ignored, which matches treating
// the border as neutral for both erosion and dilation.
fn rank_filter<T>(src: &Image<T, 1>, dst: &mut Image<T, 1>, kernel: &Kernel, op: RankOp)
where
    T: Copy + Send + Sync + Ord,
{
    let width = src.width() as isize;
    let height = src.height() as isize;
    let offsets = kernel.offsets();
    let src_data = src.as_slice();

    dst.as_slice_mut()
        .par_chunks_exact_mut(width as usize)
        .enumerate()
        .for_each(|(y, row)| {
            let y = y as isize;
            for (x, out) in row.iter_mut().enumerate() {
                let x = x as isize;
                let mut acc = src_data[(y * width + x) as usize];
                for &(dx, dy) in offsets.iter() {
                    let (px, py) = (x + dx, y + dy);
                    if px < 0 || py < 0 || px >= width || py >= height {
                        continue;
                    }
                    let val = src_data[(py * width + px) as usize];
                    acc = match op {
                        RankOp::Min => acc.min(val),
                        RankOp::Max => acc.max(val),
                    };
                }
                *out = acc;
            }
        });
}

/// Erode a single channel image using a [`Kernel`].
///
/// Each pixel is replaced by the minimum value in the neighborhood defined by
/// the kernel.
///
/// # Arguments
///
/// * `src` - The source image.
/// * `dst` - The destination image (will be overwritten).
/// * `kernel` - The morphological structuring element ([`Kernel`]).
pub fn erode<T>(src: &Image<T, 1>, dst: &mut Image<T, 1>, kernel: &Kernel) -> Result<(), ImageError>
where
    T: Copy + Send + Sync + Ord,
{
    check_sizes(src, dst)?;
    rank_filter(src, dst, kernel, RankOp::Min);
    Ok(())
}

/// Dilate a single channel image using a [`Kernel`].
///
/// Each pixel is replaced by the maximum value in the neighborhood defined by
/// the kernel.
pub fn dilate<T>(src: &Image<T, 1>, dst: &mut Image<T, 1>, kernel: &Kernel) -> Result<(), ImageError>
where
    T: Copy + Send + Sync + Ord,
{
    check_sizes(src, dst)?;
    rank_filter(src, dst, kernel, RankOp::Max);
    Ok(())
}

/// Opening: erosion followed by dilation.
///
/// Removes small objects and smooths object boundaries. `tmp` holds the
/// intermediate result so that callers can reuse one scratch buffer across
/// frames.
pub fn open<T>(
    src: &Image<T, 1>,
    dst: &mut Image<T, 1>,
    tmp: &mut Image<T, 1>,
    kernel: &Kernel,
) -> Result<(), ImageError>
where
    T: Copy + Send + Sync + Ord,
{
    erode(src, tmp, kernel)?;
    dilate(tmp, dst, kernel)?;
    Ok(())
}

/// Closing: dilation followed by erosion.
///
/// Fills small holes and gaps. `tmp` holds the intermediate result.
pub fn close<T>(
    src: &Image<T, 1>,
    dst: &mut Image<T, 1>,
    tmp: &mut Image<T, 1>,
    kernel: &Kernel,
) -> Result<(), ImageError>
where
    T: Copy + Send + Sync + Ord,
{
    dilate(src, tmp, kernel)?;
    erode(tmp, dst, kernel)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lasertag_image::ImageSize;

    fn square_image(size: usize, x0: usize, y0: usize, side: usize) -> Result<Image<u8, 1>, ImageError> {
        let mut img = Image::<u8, 1>::from_size_val(ImageSize { width: size, height: size }, 0)?;
        for y in y0..y0 + side {
            for x in x0..x0 + side {
                img.set_pixel(x, y, 0, 255)?;
            }
        }
        Ok(img)
    }

    #[test]
    fn test_open_removes_speckle() -> Result<(), ImageError> {
        let mut img = square_image(20, 5, 5, 8)?;
        // isolated noise pixel
        img.set_pixel(17, 2, 0, 255)?;

        let kernel = Kernel::ellipse(3, 3);
        let mut dst = Image::<u8, 1>::from_size_val(img.size(), 0)?;
        let mut tmp = Image::<u8, 1>::from_size_val(img.size(), 0)?;
        open(&img, &mut dst, &mut tmp, &kernel)?;

        assert_eq!(*dst.get_pixel(17, 2, 0)?, 0);
        assert_eq!(*dst.get_pixel(8, 8, 0)?, 255);
        assert_eq!(*dst.get_pixel(5, 5, 0)?, 255);

        Ok(())
    }

    #[test]
    fn test_close_fills_gap() -> Result<(), ImageError> {
        let mut img = square_image(20, 5, 5, 8)?;
        img.set_pixel(8, 8, 0, 0)?;

        let kernel = Kernel::ellipse(3, 3);
        let mut dst = Image::<u8, 1>::from_size_val(img.size(), 0)?;
        let mut tmp = Image::<u8, 1>::from_size_val(img.size(), 0)?;
        close(&img, &mut dst, &mut tmp, &kernel)?;

        assert_eq!(*dst.get_pixel(8, 8, 0)?, 255);
        assert_eq!(*dst.get_pixel(2, 2, 0)?, 0);

        Ok(())
    }

    #[test]
    fn test_border_pixels_survive_erosion() -> Result<(), ImageError> {
        let img = Image::<u8, 1>::from_size_val(ImageSize { width: 4, height: 4 }, 255)?;
        let kernel = Kernel::ellipse(3, 3);
        let mut dst = Image::<u8, 1>::from_size_val(img.size(), 0)?;
        erode(&img, &mut dst, &kernel)?;
        assert!(dst.as_slice().iter().all(|&v| v == 255));
        Ok(())
    }

    #[test]
    fn test_size_mismatch() -> Result<(), ImageError> {
        let img = Image::<u8, 1>::from_size_val(ImageSize { width: 4, height: 4 }, 0)?;
        let mut dst = Image::<u8, 1>::from_size_val(ImageSize { width: 3, height: 4 }, 0)?;
        let kernel = Kernel::ellipse(3, 3);
        assert!(dilate(&img, &mut dst, &kernel).is_err());
        Ok(())
    }
}
