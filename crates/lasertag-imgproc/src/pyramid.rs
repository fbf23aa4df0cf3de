use lasertag_image::{Image, ImageError, ImageSize};

// 1-D binomial kernel; the separable 2-D kernel is its outer product / 256.
const PYRAMID_KERNEL: [f32; 5] = [1.0 / 16.0, 4.0 / 16.0, 6.0 / 16.0, 4.0 / 16.0, 1.0 / 16.0];

// reflect-101 border handling: -1 -> 1, n -> n - 2
fn reflect_101(i: isize, n: usize) -> usize {
    let n = n as isize;
    if n <= 1 {
        return 0;
    }
    let mut i = i;
    while i < 0 || i >= n {
        if i < 0 {
            i = -i;
        }
        if i >= n {
            i = 2 * (n - 1) - i;
        }
    }
    i as usize
}

/// Size of the next (coarser) pyramid level.
pub fn pyrdown_size(size: ImageSize) -> ImageSize {
    ImageSize {
        width: size.width.div_ceil(2),
        height: size.height.div_ceil(2),
    }
}

/// Blur an image with a 5x5 Gaussian kernel and then downsample it by two.
///
/// # Arguments
///
/// * `src` - The source image.
/// * `dst` - The destination image, of size [`pyrdown_size`] of the source.
///
/// # Returns
///
/// * `Result<(), ImageError>` - Ok if successful, Err otherwise.
///
/// # Example
///
/// ```
/// use lasertag_image::{Image, ImageSize};
/// use lasertag_imgproc::pyramid::pyrdown;
///
/// let image = Image::<f32, 1>::from_size_val(ImageSize { width: 4, height: 4 }, 2.0).unwrap();
/// let mut down = Image::<f32, 1>::from_size_val(ImageSize { width: 2, height: 2 }, 0.0).unwrap();
///
/// pyrdown(&image, &mut down).unwrap();
/// assert!(down.as_slice().iter().all(|&v| (v - 2.0).abs() < 1e-6));
/// ```
pub fn pyrdown(src: &Image<f32, 1>, dst: &mut Image<f32, 1>) -> Result<(), ImageError> {
    let expected = pyrdown_size(src.size());
    if dst.size() != expected {
        return Err(ImageError::InvalidImageSize(
            expected.width,
            expected.height,
            dst.width(),
            dst.height(),
        ));
    }

    let (width, height) = (src.width(), src.height());
    let src_data = src.as_slice();

    // horizontal pass evaluated only at the even columns we keep
    let mut horizontal = vec![0.0f32; expected.width * height];
    for y in 0..height {
        let row = &src_data[y * width..(y + 1) * width];
        for xd in 0..expected.width {
            let xs = (2 * xd) as isize;
            let mut acc = 0.0;
            for (k, w) in PYRAMID_KERNEL.iter().enumerate() {
                acc += w * row[reflect_101(xs + k as isize - 2, width)];
            }
            horizontal[y * expected.width + xd] = acc;
        }
    }

    let dst_data = dst.as_slice_mut();
    for yd in 0..expected.height {
        let ys = (2 * yd) as isize;
        for xd in 0..expected.width {
            let mut acc = 0.0;
            for (k, w) in PYRAMID_KERNEL.iter().enumerate() {
                let yy = reflect_101(ys + k as isize - 2, height);
                acc += w * horizontal[yy * expected.width + xd];
            }
            dst_data[yd * expected.width + xd] = acc;
        }
    }

    Ok(())
}

/// Build a Gaussian pyramid with `levels` additional coarser levels.
///
/// The first element is a copy of the source; level `i` has roughly
/// `1 / 2^i` of the source resolution. Building stops early once a level
/// would become smaller than 2 pixels on either side.
pub fn build_pyramid(src: &Image<f32, 1>, levels: usize) -> Result<Vec<Image<f32, 1>>, ImageError> {
    let mut pyramid = Vec::with_capacity(levels + 1);
    pyramid.push(src.clone());

    for _ in 0..levels {
        let Some(prev) = pyramid.last() else {
            break;
        };
        let size = pyrdown_size(prev.size());
        if size.width < 2 || size.height < 2 {
            break;
        }
        let mut next = Image::<f32, 1>::from_size_val(size, 0.0)?;
        pyrdown(prev, &mut next)?;
        pyramid.push(next);
    }

    Ok(pyramid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reflect_101() {
        assert_eq!(reflect_101(-1, 5), 1);
        assert_eq!(reflect_101(-2, 5), 2);
        assert_eq!(reflect_101(5, 5), 3);
        assert_eq!(reflect_101(6, 5), 2);
        assert_eq!(reflect_101(3, 1), 0);
    }

    #[test]
    fn test_pyrdown_preserves_mass_center() -> Result<(), ImageError> {
        let mut src = Image::<f32, 1>::from_size_val(ImageSize { width: 9, height: 9 }, 0.0)?;
        src.set_pixel(4, 4, 0, 16.0)?;

        let mut dst = Image::<f32, 1>::from_size_val(pyrdown_size(src.size()), 0.0)?;
        pyrdown(&src, &mut dst)?;

        assert_eq!(dst.size(), ImageSize { width: 5, height: 5 });
        // the peak lands on the downsampled center
        let center = *dst.get_pixel(2, 2, 0)?;
        assert!(dst.as_slice().iter().all(|&v| v <= center));

        Ok(())
    }

    #[test]
    fn test_build_pyramid_levels() -> Result<(), ImageError> {
        let src = Image::<f32, 1>::from_size_val(ImageSize { width: 64, height: 48 }, 1.0)?;
        let pyramid = build_pyramid(&src, 3)?;

        assert_eq!(pyramid.len(), 4);
        assert_eq!(pyramid[3].size(), ImageSize { width: 8, height: 6 });

        let tiny = Image::<f32, 1>::from_size_val(ImageSize { width: 4, height: 4 }, 1.0)?;
        assert_eq!(build_pyramid(&tiny, 5)?.len(), 2);

        Ok(())
    }
}
