//! Sparse pyramidal Lucas–Kanade optical flow.
//!
//! Points are tracked coarse to fine through Gaussian pyramids of the two
//! frames. At every level the spatial gradient matrix of the previous frame is
//! accumulated once over a square window and the residual flow is refined with
//! Gauss–Newton iterations. Sampling is bilinear with clamped borders.

use lasertag_image::{Image, ImageError};

use crate::pyramid::build_pyramid;

/// Parameters for LK optical flow.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PyrLkParams {
    /// Side of the square integration window, must be odd.
    pub win_size: usize,
    /// Number of coarser pyramid levels on top of the full resolution.
    pub max_level: usize,
    /// Gauss–Newton iterations per level.
    pub max_iterations: usize,
    /// Stop iterating once the update is shorter than this (pixels).
    pub epsilon: f32,
    /// Minimum eigenvalue of the gradient matrix, divided by the window area.
    pub min_eigen_threshold: f32,
}

impl Default for PyrLkParams {
    fn default() -> Self {
        Self {
            win_size: 21,
            max_level: 3,
            max_iterations: 30,
            epsilon: 0.01,
            min_eigen_threshold: 1e-2,
        }
    }
}

/// Result of tracking a single point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LkTrack {
    /// The tracked position in the next frame.
    pub point: [f32; 2],
    /// Mean absolute intensity difference over the window at the final position.
    pub error: f32,
}

fn bilinear(img: &Image<f32, 1>, x: f32, y: f32) -> f32 {
    let w = img.width();
    let h = img.height();
    let x = x.clamp(0.0, (w - 1) as f32);
    let y = y.clamp(0.0, (h - 1) as f32);

    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let ax = x - x0 as f32;
    let ay = y - y0 as f32;

    let data = img.as_slice();
    let p00 = data[y0 * w + x0];
    let p01 = data[y0 * w + x1];
    let p10 = data[y1 * w + x0];
    let p11 = data[y1 * w + x1];

    (1.0 - ay) * ((1.0 - ax) * p00 + ax * p01) + ay * ((1.0 - ax) * p10 + ax * p11)
}

// central differences on the interpolated surface
fn gradient(img: &Image<f32, 1>, x: f32, y: f32) -> (f32, f32) {
    let gx = (bilinear(img, x + 1.0, y) - bilinear(img, x - 1.0, y)) * 0.5;
    let gy = (bilinear(img, x, y + 1.0) - bilinear(img, x, y - 1.0)) * 0.5;
    (gx, gy)
}

/// Track a single point between two prebuilt pyramids.
///
/// Returns `None` when the gradient matrix is too weak to solve at any level
/// or the iteration diverges to non-finite values.
pub fn track_point_pyramids(
    prev_pyr: &[Image<f32, 1>],
    next_pyr: &[Image<f32, 1>],
    point: [f32; 2],
    params: &PyrLkParams,
) -> Option<LkTrack> {
    let levels = prev_pyr.len().min(next_pyr.len());
    if levels == 0 || params.win_size % 2 == 0 {
        return None;
    }

    let half_win = (params.win_size / 2) as i32;
    let win_area = (params.win_size * params.win_size) as f32;
    let mut template = Vec::with_capacity(params.win_size * params.win_size);

    // accumulated guess propagated from the coarser levels
    let mut guess = [0.0f32; 2];

    for lvl in (0..levels).rev() {
        let prev = &prev_pyr[lvl];
        let next = &next_pyr[lvl];
        let scale = 1.0 / (1u32 << lvl) as f32;
        let (px, py) = (point[0] * scale, point[1] * scale);

        template.clear();
        let (mut gxx, mut gxy, mut gyy) = (0.0f32, 0.0f32, 0.0f32);
        for wy in -half_win..=half_win {
            for wx in -half_win..=half_win {
                let (sx, sy) = (px + wx as f32, py + wy as f32);
                let (ix, iy) = gradient(prev, sx, sy);
                gxx += ix * ix;
                gxy += ix * iy;
                gyy += iy * iy;
                template.push((bilinear(prev, sx, sy), ix, iy));
            }
        }

        let det = gxx * gyy - gxy * gxy;
        let min_eigen = ((gxx + gyy) - ((gxx - gyy) * (gxx - gyy) + 4.0 * gxy * gxy).sqrt()) * 0.5;
        if det.abs() < f32::EPSILON || min_eigen / win_area < params.min_eigen_threshold {
            return None;
        }
        let inv_det = 1.0 / det;

        let mut nu = [0.0f32; 2];
        for _ in 0..params.max_iterations {
            let (mut bx, mut by) = (0.0f32, 0.0f32);
            let mut k = 0;
            for wy in -half_win..=half_win {
                for wx in -half_win..=half_win {
                    let (i0, ix, iy) = template[k];
                    k += 1;
                    let j = bilinear(
                        next,
                        px + wx as f32 + guess[0] + nu[0],
                        py + wy as f32 + guess[1] + nu[1],
                    );
                    let di = i0 - j;
                    bx += di * ix;
                    by += di * iy;
                }
            }

            let eta_x = inv_det * (gyy * bx - gxy * by);
            let eta_y = inv_det * (gxx * by - gxy * bx);
            if !eta_x.is_finite() || !eta_y.is_finite() {
                return None;
            }
            nu[0] += eta_x;
            nu[1] += eta_y;

            if eta_x * eta_x + eta_y * eta_y < params.epsilon * params.epsilon {
                break;
            }
        }

        if lvl > 0 {
            guess = [2.0 * (guess[0] + nu[0]), 2.0 * (guess[1] + nu[1])];
        } else {
            guess = [guess[0] + nu[0], guess[1] + nu[1]];
        }
    }

    let tracked = [point[0] + guess[0], point[1] + guess[1]];

    // residual at full resolution
    let prev = &prev_pyr[0];
    let next = &next_pyr[0];
    let mut err = 0.0f32;
    for wy in -half_win..=half_win {
        for wx in -half_win..=half_win {
            let i0 = bilinear(prev, point[0] + wx as f32, point[1] + wy as f32);
            let j = bilinear(next, tracked[0] + wx as f32, tracked[1] + wy as f32);
            err += (i0 - j).abs();
        }
    }

    Some(LkTrack {
        point: tracked,
        error: err / win_area,
    })
}

/// Compute sparse pyramidal Lucas–Kanade optical flow.
///
/// # Arguments
///
/// * `prev_img` - Previous image (grayscale, f32).
/// * `next_img` - Next image (grayscale, f32).
/// * `prev_pts` - Points to track, as (x, y).
/// * `params` - LK parameters.
///
/// # Returns
///
/// One entry per input point, `None` for points that could not be tracked.
pub fn calc_optical_flow_pyr_lk(
    prev_img: &Image<f32, 1>,
    next_img: &Image<f32, 1>,
    prev_pts: &[[f32; 2]],
    params: &PyrLkParams,
) -> Result<Vec<Option<LkTrack>>, ImageError> {
    if prev_img.size() != next_img.size() {
        return Err(ImageError::InvalidImageSize(
            prev_img.width(),
            prev_img.height(),
            next_img.width(),
            next_img.height(),
        ));
    }

    let prev_pyr = build_pyramid(prev_img, params.max_level)?;
    let next_pyr = build_pyramid(next_img, params.max_level)?;

    Ok(prev_pts
        .iter()
        .map(|&pt| track_point_pyramids(&prev_pyr, &next_pyr, pt, params))
        .collect())
}
