use lasertag_image::{Image, ImageError};

use crate::rect::Rect;

/// Raw spatial moments up to the second order.
///
/// For a polygon the moments are exact integrals over its interior; for an
/// image window they are intensity weighted sums.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Moments {
    /// Zeroth order moment (area or total mass).
    pub m00: f64,
    /// First order moment along x.
    pub m10: f64,
    /// First order moment along y.
    pub m01: f64,
    /// Second order moment along x.
    pub m20: f64,
    /// Second order mixed moment.
    pub m11: f64,
    /// Second order moment along y.
    pub m02: f64,
}

impl Moments {
    /// Centroid `(M10 / M00, M01 / M00)`, or `None` when the mass is zero.
    pub fn centroid(&self) -> Option<(f64, f64)> {
        if self.m00.abs() <= f64::EPSILON {
            return None;
        }
        Some((self.m10 / self.m00, self.m01 / self.m00))
    }

    /// Normalised central second order moments `(mu20, mu11, mu02) / m00`.
    pub fn central_second_order(&self) -> Option<(f64, f64, f64)> {
        let (cx, cy) = self.centroid()?;
        Some((
            self.m20 / self.m00 - cx * cx,
            self.m11 / self.m00 - cx * cy,
            self.m02 / self.m00 - cy * cy,
        ))
    }
}

/// Compute the moments of a closed polygon given by its vertices.
///
/// The polygon is closed implicitly between the last and the first vertex.
/// The sign of the moments follows the orientation of the vertices; the
/// centroid is orientation independent. Polygons with fewer than three
/// vertices, or that enclose no area, yield `m00 == 0`.
///
/// # Example
///
/// ```
/// use lasertag_imgproc::moments::polygon_moments;
///
/// let m = polygon_moments(&[[0, 0], [4, 0], [4, 2], [0, 2]]);
/// assert_eq!(m.m00.abs(), 8.0);
/// assert_eq!(m.centroid(), Some((2.0, 1.0)));
/// ```
pub fn polygon_moments(points: &[[i32; 2]]) -> Moments {
    let n = points.len();
    if n < 3 {
        return Moments::default();
    }

    let (mut a00, mut a10, mut a01, mut a20, mut a11, mut a02) = (0.0, 0.0, 0.0, 0.0, 0.0, 0.0);

    let mut prev = points[n - 1];
    for &curr in points {
        let (xp, yp) = (prev[0] as f64, prev[1] as f64);
        let (xc, yc) = (curr[0] as f64, curr[1] as f64);
        let cross = xp * yc - xc * yp;

        a00 += cross;
        a10 += cross * (xp + xc);
        a01 += cross * (yp + yc);
        a20 += cross * (xp * xp + xp * xc + xc * xc);
        a11 += cross * (2.0 * xp * yp + xp * yc + xc * yp + 2.0 * xc * yc);
        a02 += cross * (yp * yp + yp * yc + yc * yc);

        prev = curr;
    }

    Moments {
        m00: a00 / 2.0,
        m10: a10 / 6.0,
        m01: a01 / 6.0,
        m20: a20 / 12.0,
        m11: a11 / 24.0,
        m02: a02 / 12.0,
    }
}

/// Compute the intensity weighted moments of a single channel image inside `window`.
///
/// The window must already be clipped to the image; coordinates of the
/// returned moments are absolute image coordinates.
pub fn window_moments(src: &Image<u8, 1>, window: Rect) -> Result<Moments, ImageError> {
    if window.is_empty() || window.x < 0 || window.y < 0 {
        return Err(ImageError::EmptyWindow);
    }
    if window.right() as usize > src.width() || window.bottom() as usize > src.height() {
        return Err(ImageError::PixelIndexOutOfBounds(
            window.right() as usize,
            window.bottom() as usize,
            src.width(),
            src.height(),
        ));
    }

    let data = src.as_slice();
    let width = src.width();
    let mut m = Moments::default();

    for y in window.y..window.bottom() {
        let row = &data[y as usize * width..(y as usize + 1) * width];
        let yf = y as f64;
        for x in window.x..window.right() {
            let w = row[x as usize] as f64;
            if w == 0.0 {
                continue;
            }
            let xf = x as f64;
            m.m00 += w;
            m.m10 += w * xf;
            m.m01 += w * yf;
            m.m20 += w * xf * xf;
            m.m11 += w * xf * yf;
            m.m02 += w * yf * yf;
        }
    }

    Ok(m)
}
