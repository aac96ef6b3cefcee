/// Mapping between mask cells and frame pixels.
///
/// Every routine that touches frame pixels through a mask (statistics,
/// extraction, weighted sums, dodging) goes through `Patch::locate`; plain
/// square boxes (profiles, centroid windows) go through `Patch::window`.
use crate::aperture::Mask;
use crate::frame::PlaneView;

/// Clipped overlap of a mask placed on a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Patch {
    /// First mask column/row inside the frame
    pub mask_x0: usize,
    pub mask_y0: usize,
    /// Frame pixel under `(mask_x0, mask_y0)`
    pub frame_x0: usize,
    pub frame_y0: usize,
    pub width: usize,
    pub height: usize,
}

/// Round half up, then clamp into `[0, dim - 1]`.
#[inline]
pub fn anchor(v: f64, dim: usize) -> i64 {
    let a = (v + 0.5).floor() as i64;
    a.clamp(0, dim as i64 - 1)
}

fn clip_axis(offset: i64, mask_len: usize, frame_len: usize) -> (usize, usize, usize) {
    let start = (-offset).max(0);
    let end = (frame_len as i64 - offset).min(mask_len as i64);
    if end <= start {
        return (0, 0, 0);
    }
    (start as usize, (offset + start) as usize, (end - start) as usize)
}

impl Patch {
    /// Place the mask's reference cell on the frame pixel nearest `(x, y)`
    /// and clip to the frame.
    pub fn locate(mask: &Mask, frame: &PlaneView, x: f64, y: f64) -> Self {
        Self::locate_dims(mask, frame.width, frame.height, x, y)
    }

    pub fn locate_dims(mask: &Mask, frame_w: usize, frame_h: usize, x: f64, y: f64) -> Self {
        let ox = anchor(x, frame_w) - mask.cx as i64;
        let oy = anchor(y, frame_h) - mask.cy as i64;
        Self::clip((ox, oy), (mask.width, mask.height), (frame_w, frame_h))
    }

    /// Square box of side `2 * half + 1` centered on the frame pixel nearest
    /// `(x, y)`, clipped to the frame. The "mask" coordinates are offsets
    /// into the unclipped box.
    pub fn window(x: f64, y: f64, half: usize, frame_w: usize, frame_h: usize) -> Self {
        let side = 2 * half + 1;
        let ox = anchor(x, frame_w) - half as i64;
        let oy = anchor(y, frame_h) - half as i64;
        Self::clip((ox, oy), (side, side), (frame_w, frame_h))
    }

    fn clip(offset: (i64, i64), mask: (usize, usize), frame: (usize, usize)) -> Self {
        let (mask_x0, frame_x0, width) = clip_axis(offset.0, mask.0, frame.0);
        let (mask_y0, frame_y0, height) = clip_axis(offset.1, mask.1, frame.1);
        if width == 0 || height == 0 {
            return Self {
                mask_x0: 0,
                mask_y0: 0,
                frame_x0: 0,
                frame_y0: 0,
                width: 0,
                height: 0,
            };
        }
        Self {
            mask_x0,
            mask_y0,
            frame_x0,
            frame_y0,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Iterate `(mask_x, mask_y, frame_x, frame_y)` over the overlap, row-major.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize, usize, usize)> + '_ {
        (0..self.height).flat_map(move |j| {
            (0..self.width).map(move |i| {
                (
                    self.mask_x0 + i,
                    self.mask_y0 + j,
                    self.frame_x0 + i,
                    self.frame_y0 + j,
                )
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anchor_rounds_half_up_and_clamps() {
        assert_eq!(anchor(2.5, 10), 3);
        assert_eq!(anchor(2.49, 10), 2);
        assert_eq!(anchor(-0.5, 10), 0);
        assert_eq!(anchor(-3.0, 10), 0);
        assert_eq!(anchor(9.7, 10), 9);
        assert_eq!(anchor(42.0, 10), 9);
    }

    #[test]
    fn test_fully_inside() {
        let mask = Mask::new(5, 5).unwrap();
        let p = Patch::locate_dims(&mask, 100, 100, 50.2, 40.6);
        assert_eq!(
            p,
            Patch {
                mask_x0: 0,
                mask_y0: 0,
                frame_x0: 48,
                frame_y0: 39,
                width: 5,
                height: 5
            }
        );
        assert_eq!(p.cells().count(), 25);
    }

    #[test]
    fn test_clipped_at_origin() {
        let mask = Mask::new(7, 7).unwrap();
        let p = Patch::locate_dims(&mask, 20, 20, 1.0, 0.0);
        assert_eq!((p.mask_x0, p.frame_x0, p.width), (2, 0, 5));
        assert_eq!((p.mask_y0, p.frame_y0, p.height), (3, 0, 4));
        let first = p.cells().next().unwrap();
        assert_eq!(first, (2, 3, 0, 0));
    }

    #[test]
    fn test_clipped_at_far_edge() {
        let mask = Mask::new(7, 7).unwrap();
        let p = Patch::locate_dims(&mask, 20, 10, 19.4, 9.0);
        assert_eq!((p.frame_x0, p.width), (16, 4));
        assert_eq!((p.frame_y0, p.height), (6, 4));
        for (_, _, fx, fy) in p.cells() {
            assert!(fx < 20 && fy < 10);
        }
    }

    #[test]
    fn test_mask_larger_than_frame() {
        let mask = Mask::new(31, 31).unwrap();
        let p = Patch::locate_dims(&mask, 4, 3, 2.0, 1.0);
        assert_eq!((p.frame_x0, p.frame_y0, p.width, p.height), (0, 0, 4, 3));
        assert_eq!((p.mask_x0, p.mask_y0), (13, 14));
    }

    #[test]
    fn test_window_inside_and_clipped() {
        let p = Patch::window(10.4, 20.6, 3, 64, 64);
        assert_eq!((p.frame_x0, p.frame_y0, p.width, p.height), (7, 18, 7, 7));
        assert_eq!((p.mask_x0, p.mask_y0), (0, 0));

        let p = Patch::window(1.0, 62.7, 3, 64, 64);
        assert_eq!((p.frame_x0, p.width, p.mask_x0), (0, 5, 2));
        assert_eq!((p.frame_y0, p.height, p.mask_y0), (60, 4, 0));
        assert_eq!(p.cells().count(), 20);
        for (_, _, fx, fy) in p.cells() {
            assert!(fx <= 4 && (60..64).contains(&fy));
        }
    }

    #[test]
    fn test_window_zero_half_is_one_pixel() {
        let p = Patch::window(5.5, 2.2, 0, 8, 8);
        assert_eq!(p.cells().collect::<Vec<_>>(), vec![(0, 0, 6, 2)]);
    }
}
