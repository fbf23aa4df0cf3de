/// A binary structuring element centred on its middle pixel.
///
/// Elements are stored row major, `1` marking the pixels that take part in
/// the operation. Odd sizes keep the element symmetric.
///
/// # Example
///
/// ```rust
/// use lasertag_imgproc::morphology::Kernel;
///
/// let kernel = Kernel::ellipse(5, 5);
/// assert_eq!(kernel.width(), 5);
/// assert_eq!(kernel.anchor(), (2, 2));
/// assert_eq!(kernel.offsets().len(), 21);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Kernel {
    data: Vec<u8>,
    width: usize,
    height: usize,
}

impl Kernel {
    /// The ellipse inscribed in a `width` x `height` box.
    ///
    /// A pixel belongs to the element when `(x / rx)^2 + (y / ry)^2 <= 1`
    /// measured from the box centre, with `rx = width / 2` and `ry = height / 2`.
    pub fn ellipse(width: usize, height: usize) -> Self {
        let cx = (width as f32 - 1.0) / 2.0;
        let cy = (height as f32 - 1.0) / 2.0;
        let (rx, ry) = (width as f32 / 2.0, height as f32 / 2.0);

        let data = (0..height)
            .flat_map(|i| (0..width).map(move |j| (j, i)))
            .map(|(j, i)| {
                let (dx, dy) = ((j as f32 - cx) / rx, (i as f32 - cy) / ry);
                u8::from(dx * dx + dy * dy <= 1.0)
            })
            .collect();

        Self {
            data,
            width,
            height,
        }
    }

    /// The raw element mask.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of rows.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Position of the centre as `(column, row)`.
    pub fn anchor(&self) -> (usize, usize) {
        (self.width / 2, self.height / 2)
    }

    /// Offsets `(dx, dy)` of the active elements relative to the anchor.
    pub fn offsets(&self) -> Vec<(isize, isize)> {
        let (ax, ay) = self.anchor();
        self.data
            .iter()
            .enumerate()
            .filter(|(_, &v)| v != 0)
            .map(|(idx, _)| {
                let (row, col) = (idx / self.width, idx % self.width);
                (col as isize - ax as isize, row as isize - ay as isize)
            })
            .collect()
    }
}
