use lasertag_image::{Image, ImageError};

use crate::{moments::window_moments, rect::Rect};

// pixels added around the converged window when measuring the object's shape
const SHAPE_TOLERANCE: i32 = 10;

/// Stopping rule for the iterative window searches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TermCriteria {
    /// Upper bound on the number of iterations.
    pub max_iterations: usize,
    /// Stop once the window moves by less than this many pixels.
    pub epsilon: f32,
}

impl Default for TermCriteria {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            epsilon: 1.0,
        }
    }
}

/// The rotated box found by [`cam_shift`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CamShiftResult {
    /// Center of the object, in image coordinates.
    pub center: [f32; 2],
    /// Length and width of the object along its main axes.
    pub size: [f32; 2],
    /// Orientation of the main axis, in degrees.
    pub angle: f32,
    /// The search window to use on the next frame.
    pub window: Rect,
    /// Mean-shift iterations that were run.
    pub iterations: usize,
}

/// Move a window to the mode of a probability image.
///
/// The window is re-centred on the weighted centroid of the pixels it covers
/// until it moves less than `criteria.epsilon` or the iteration budget is
/// exhausted. The window keeps its size and always stays inside the image.
///
/// # Arguments
///
/// * `prob` - The probability (back-projection) image.
/// * `window` - The initial search window.
/// * `criteria` - The stopping rule.
///
/// # Returns
///
/// The converged window and the number of iterations run.
///
/// # Errors
///
/// [`ImageError::EmptyWindow`] if the window does not overlap the image or
/// covers no probability mass.
pub fn mean_shift(
    prob: &Image<u8, 1>,
    window: Rect,
    criteria: &TermCriteria,
) -> Result<(Rect, usize), ImageError> {
    let size = prob.size();
    let mut win = window.clip(size);
    if win.is_empty() {
        return Err(ImageError::EmptyWindow);
    }

    let max_x = size.width as i32 - win.width;
    let max_y = size.height as i32 - win.height;
    let eps2 = criteria.epsilon * criteria.epsilon;

    for i in 0..criteria.max_iterations.max(1) {
        let m = window_moments(prob, win)?;
        let Some((cx, cy)) = m.centroid() else {
            return Err(ImageError::EmptyWindow);
        };

        let nx = ((cx - (win.width - 1) as f64 / 2.0).round() as i32).clamp(0, max_x);
        let ny = ((cy - (win.height - 1) as f64 / 2.0).round() as i32).clamp(0, max_y);
        let dx = (nx - win.x) as f32;
        let dy = (ny - win.y) as f32;
        win.x = nx;
        win.y = ny;

        if dx * dx + dy * dy < eps2 {
            return Ok((win, i + 1));
        }
    }

    Ok((win, criteria.max_iterations.max(1)))
}

/// Continuously adaptive mean-shift.
///
/// Runs [`mean_shift`] and then estimates the size and orientation of the
/// object from the second order moments of a slightly enlarged window. The
/// returned window is sized to the object so that it adapts from frame to
/// frame.
///
/// # Errors
///
/// [`ImageError::EmptyWindow`] if the window carries no probability mass,
/// in which case the tracker should be reseeded.
pub fn cam_shift(
    prob: &Image<u8, 1>,
    window: Rect,
    criteria: &TermCriteria,
) -> Result<CamShiftResult, ImageError> {
    let size = prob.size();
    let (win, iterations) = mean_shift(prob, window, criteria)?;

    let search = win.padded(SHAPE_TOLERANCE).clip(size);
    let m = window_moments(prob, search)?;
    let (Some((cx, cy)), Some((a, b, c))) = (m.centroid(), m.central_second_order()) else {
        return Err(ImageError::EmptyWindow);
    };

    let square = (4.0 * b * b + (a - c) * (a - c)).sqrt();
    let length = (((a + c + square) / 2.0).max(0.0)).sqrt() * 4.0;
    let breadth = (((a + c - square) / 2.0).max(0.0)).sqrt() * 4.0;
    let theta = 0.5 * (2.0 * b).atan2(a - c);

    let (cs, sn) = (theta.cos(), theta.sin());
    let extent_x = (length * cs).abs().max((breadth * sn).abs()).max(1.0);
    let extent_y = (length * sn).abs().max((breadth * cs).abs()).max(1.0);

    let x0 = (cx - extent_x / 2.0).round() as i32;
    let y0 = (cy - extent_y / 2.0).round() as i32;
    let mut next = Rect::new(x0, y0, extent_x.round() as i32, extent_y.round() as i32).clip(size);
    if next.is_empty() {
        next = win;
    }

    Ok(CamShiftResult {
        center: [cx as f32, cy as f32],
        size: [length as f32, breadth as f32],
        angle: theta.to_degrees() as f32,
        window: next,
        iterations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lasertag_image::ImageSize;

    fn blob_image(cx: i32, cy: i32, half_w: i32, half_h: i32) -> Result<Image<u8, 1>, ImageError> {
        let mut img = Image::<u8, 1>::from_size_val(
            ImageSize {
                width: 80,
                height: 60,
            },
            0,
        )?;
        for y in (cy - half_h)..=(cy + half_h) {
            for x in (cx - half_w)..=(cx + half_w) {
                img.set_pixel(x as usize, y as usize, 0, 255)?;
            }
        }
        Ok(img)
    }

    #[test]
    fn test_mean_shift_converges_on_blob() -> Result<(), ImageError> {
        let prob = blob_image(40, 30, 4, 4)?;
        let (win, iterations) = mean_shift(&prob, Rect::new(30, 22, 15, 15), &TermCriteria::default())?;

        assert_eq!(win.width, 15);
        assert_eq!(win.x + 7, 40);
        assert_eq!(win.y + 7, 30);
        assert!(iterations <= 10);

        Ok(())
    }

    #[test]
    fn test_mean_shift_empty_window() -> Result<(), ImageError> {
        let prob = blob_image(40, 30, 2, 2)?;
        assert_eq!(
            mean_shift(&prob, Rect::new(0, 0, 10, 10), &TermCriteria::default()),
            Err(ImageError::EmptyWindow)
        );
        assert_eq!(
            mean_shift(&prob, Rect::new(100, 100, 10, 10), &TermCriteria::default()),
            Err(ImageError::EmptyWindow)
        );
        Ok(())
    }

    #[test]
    fn test_cam_shift_adapts_window() -> Result<(), ImageError> {
        // wide, flat blob
        let prob = blob_image(40, 30, 10, 3)?;
        let result = cam_shift(&prob, Rect::new(33, 25, 12, 12), &TermCriteria::default())?;

        assert!((result.center[0] - 40.0).abs() < 1.0);
        assert!((result.center[1] - 30.0).abs() < 1.0);
        assert!(result.size[0] > result.size[1]);
        assert!(result.angle.abs() < 1.0);
        assert!(result.window.width > result.window.height);

        Ok(())
    }
}
