use lasertag_image::ImageSize;

/// An axis aligned rectangle in pixel coordinates.
///
/// `x` and `y` are the top-left corner; `width` and `height` are in pixels
/// and a rectangle with either of them equal to zero is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    /// Left column.
    pub x: i32,
    /// Top row.
    pub y: i32,
    /// Width in pixels.
    pub width: i32,
    /// Height in pixels.
    pub height: i32,
}

impl Rect {
    /// Construct a rectangle from its top-left corner and extent.
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Whether the rectangle covers no pixels.
    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Number of pixels covered, zero for empty rectangles.
    pub fn area(&self) -> i64 {
        if self.is_empty() {
            0
        } else {
            self.width as i64 * self.height as i64
        }
    }

    /// Exclusive right edge.
    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    /// Grow the rectangle by `pad` pixels on every side.
    pub fn padded(&self, pad: i32) -> Self {
        Self::new(
            self.x - pad,
            self.y - pad,
            self.width + 2 * pad,
            self.height + 2 * pad,
        )
    }

    /// Intersect the rectangle with the image area.
    ///
    /// # Example
    ///
    /// ```
    /// use lasertag_image::ImageSize;
    /// use lasertag_imgproc::rect::Rect;
    ///
    /// let r = Rect::new(-5, 10, 20, 20).clip(ImageSize { width: 12, height: 25 });
    /// assert_eq!(r, Rect::new(0, 10, 12, 15));
    /// ```
    pub fn clip(&self, size: ImageSize) -> Self {
        let x0 = self.x.max(0);
        let y0 = self.y.max(0);
        let x1 = self.right().min(size.width as i32);
        let y1 = self.bottom().min(size.height as i32);
        Self::new(x0, y0, (x1 - x0).max(0), (y1 - y0).max(0))
    }
}
