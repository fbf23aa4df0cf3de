use lasertag_image::Image;

use crate::rect::Rect;

/// Whether a border encloses foreground or a hole in it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BorderType {
    /// Perimeter of foreground regions
    Outer,
    /// Perimeter of background regions enclosed by foreground.
    Hole,
}

/// The border of a connected region.
#[derive(Debug, Clone, PartialEq)]
pub struct Contour {
    /// The points on the border as (x, y) pixel coordinates, in tracing order.
    pub points: Vec<[i32; 2]>,
    /// The type of the border. Outer or Hole.
    pub border_type: BorderType,
    /// Index of the enclosing border, `None` for borders touching the background frame.
    pub parent: Option<usize>,
}

impl Contour {
    /// Tight bounding rectangle of the border pixels.
    pub fn bounding_rect(&self) -> Rect {
        let Some(first) = self.points.first() else {
            return Rect::default();
        };
        let (mut x0, mut y0, mut x1, mut y1) = (first[0], first[1], first[0], first[1]);
        for p in self.points.iter().skip(1) {
            x0 = x0.min(p[0]);
            y0 = y0.min(p[1]);
            x1 = x1.max(p[0]);
            y1 = y1.max(p[1]);
        }
        Rect::new(x0, y0, x1 - x0 + 1, y1 - y0 + 1)
    }
}

// Neighbour offsets ordered clockwise in image coordinates (y down):
// E, SE, S, SW, W, NW, N, NE.
const DIRECTIONS: [(i32, i32); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];

fn direction_index(dx: i32, dy: i32) -> usize {
    DIRECTIONS
        .iter()
        .position(|&d| d == (dx, dy))
        .unwrap_or(0)
}

/// Finds the borders of the foreground regions of a binary image.
///
/// Every non-zero pixel is foreground. Borders are traced with the Suzuki and
/// Abe border following algorithm using 8-connectivity, so the returned list
/// contains outer borders and hole borders together with their hierarchy.
/// Contours are ordered by the raster position of their starting pixel.
///
/// # Arguments
///
/// * `src` - A binary mask.
///
/// # Returns
///
/// A vector containing all the [`Contour`]s found in the input image.
pub fn find_contours(src: &Image<u8, 1>) -> Vec<Contour> {
    let width = src.width();
    let height = src.height();
    let mut labels: Vec<i32> = src.as_slice().iter().map(|&v| i32::from(v != 0)).collect();
    let mut contours: Vec<Contour> = Vec::new();
    let mut nbd = 1i32;

    let at = |x: usize, y: usize| x + y * width;

    // Pixels outside the image are treated as background.
    let label_at = |labels: &[i32], x: i32, y: i32| -> i32 {
        if x < 0 || y < 0 || x >= width as i32 || y >= height as i32 {
            0
        } else {
            labels[at(x as usize, y as usize)]
        }
    };

    for y in 0..height {
        let mut lnbd = 1i32;

        for x in 0..width {
            let value = labels[at(x, y)];
            if value == 0 {
                continue;
            }

            let start = if value == 1 && (x == 0 || labels[at(x - 1, y)] == 0) {
                Some(((x as i32 - 1, y as i32), BorderType::Outer))
            } else if value >= 1 && x + 1 < width && labels[at(x + 1, y)] == 0 {
                if value > 1 {
                    lnbd = value;
                }
                Some(((x as i32 + 1, y as i32), BorderType::Hole))
            } else {
                None
            };

            if let Some((from, border_type)) = start {
                nbd += 1;

                let parent = if lnbd >= 2 {
                    let index = (lnbd - 2) as usize;
                    let neighbour = &contours[index];
                    if border_type != neighbour.border_type {
                        Some(index)
                    } else {
                        neighbour.parent
                    }
                } else {
                    None
                };

                let curr = (x as i32, y as i32);
                let mut points = Vec::new();

                // look clockwise around the start pixel for the first foreground neighbour
                let from_dir = direction_index(from.0 - curr.0, from.1 - curr.1);
                let first = (0..8).find_map(|k| {
                    let (dx, dy) = DIRECTIONS[(from_dir + k) % 8];
                    let p = (curr.0 + dx, curr.1 + dy);
                    (label_at(&labels, p.0, p.1) != 0).then_some(p)
                });

                match first {
                    None => {
                        // isolated pixel
                        points.push([curr.0, curr.1]);
                        labels[at(x, y)] = -nbd;
                    }
                    Some(pos1) => {
                        let mut pos2 = pos1;
                        let mut pos3 = curr;

                        loop {
                            points.push([pos3.0, pos3.1]);

                            // counterclockwise search starting after pos2
                            let dir2 = direction_index(pos2.0 - pos3.0, pos2.1 - pos3.1);
                            let mut pos4 = pos2;
                            let mut east_is_background = false;
                            for k in 1..=8 {
                                let d = (dir2 + 8 - k) % 8;
                                let (dx, dy) = DIRECTIONS[d];
                                let p = (pos3.0 + dx, pos3.1 + dy);
                                if label_at(&labels, p.0, p.1) != 0 {
                                    pos4 = p;
                                    break;
                                }
                                if d == 0 {
                                    east_is_background = true;
                                }
                            }

                            let idx = at(pos3.0 as usize, pos3.1 as usize);
                            if east_is_background {
                                labels[idx] = -nbd;
                            } else if labels[idx] == 1 {
                                labels[idx] = nbd;
                            }

                            if pos4 == curr && pos3 == pos1 {
                                break;
                            }
                            pos2 = pos3;
                            pos3 = pos4;
                        }
                    }
                }

                contours.push(Contour {
                    points,
                    border_type,
                    parent,
                });
            }

            let value = labels[at(x, y)];
            if value != 1 {
                lnbd = value.abs();
            }
        }
    }

    contours
}

/// Finds only the outermost borders of the foreground regions.
///
/// Holes and regions nested inside holes are discarded, which mirrors an
/// external-only retrieval mode.
pub fn find_external_contours(src: &Image<u8, 1>) -> Vec<Contour> {
    find_contours(src)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .collect()
}
