/// Aperture weight masks
/// Circular and annular apertures with sub-pixel reference centers, plus
/// synthetic Gaussian/Moffat amplitude surfaces on the same grid.
use crate::error::{PhotometryError, Result};

/// Rectangular grid of weights with a fractional-pixel reference center.
///
/// Cell `(i, j)` has its center at integer coordinates; the reference point
/// sits at `(cx + dx, cy + dy)` in those coordinates. A fresh mask places it
/// at the geometric center, so `dx` is `0` for odd widths and `-0.5` for even.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    pub width: usize,
    pub height: usize,
    pub cx: usize,
    pub cy: usize,
    pub dx: f64,
    pub dy: f64,
    weights: Vec<f64>,
}

// Region-grow walk patterns: relative offsets per ring, applied cumulatively.
const GROW_RING_1: [(i32, i32); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];

const GROW_RING_2: [(i32, i32); 12] = [
    (2, 0),
    (2, 1),
    (1, 2),
    (0, 2),
    (-1, 2),
    (-2, 1),
    (-2, 0),
    (-2, -1),
    (-1, -2),
    (0, -2),
    (1, -2),
    (2, -1),
];

const GROW_RING_3: [(i32, i32); 16] = [
    (3, 0),
    (3, 1),
    (2, 2),
    (1, 3),
    (0, 3),
    (-1, 3),
    (-2, 2),
    (-3, 1),
    (-3, 0),
    (-3, -1),
    (-2, -2),
    (-1, -3),
    (0, -3),
    (1, -3),
    (2, -2),
    (3, -1),
];

/// Largest supported region-grow radius.
pub const MAX_GROW: usize = 3;

impl Mask {
    /// Create a zero-filled mask. Fails on a zero dimension.
    pub fn new(width: usize, height: usize) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(PhotometryError::EmptyMask { width, height });
        }
        let cx = width / 2;
        let cy = height / 2;
        Ok(Self {
            width,
            height,
            cx,
            cy,
            dx: (width as f64 - 1.0) / 2.0 - cx as f64,
            dy: (height as f64 - 1.0) / 2.0 - cy as f64,
            weights: vec![0.0; width * height],
        })
    }

    /// Square mask large enough for a circle of radius `r` including its
    /// antialiased edge at any sub-pixel offset.
    pub fn circle(r: f64, dx: f64, dy: f64) -> Result<Self> {
        let side = 2 * (r.max(0.0) + 0.5).ceil() as usize + 3;
        let mut mask = Self::new(side, side)?;
        mask.set_offset(dx, dy);
        mask.fill_circle(r);
        Ok(mask)
    }

    /// Square mask holding the ring `r1 <= d < r2` around its center cell.
    pub fn annulus(r1: f64, r2: f64) -> Result<Self> {
        let side = 2 * r2.max(0.0).ceil() as usize + 1;
        let mut mask = Self::new(side, side)?;
        mask.fill_annulus(r1, r2);
        Ok(mask)
    }

    pub fn set_offset(&mut self, dx: f64, dy: f64) {
        self.dx = dx;
        self.dy = dy;
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f64 {
        self.weights[y * self.width + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, w: f64) {
        self.weights[y * self.width + x] = w;
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn total_weight(&self) -> f64 {
        self.weights.iter().sum()
    }

    /// Squared distance of cell `(x, y)` from the reference point.
    #[inline]
    pub fn dist2(&self, x: usize, y: usize) -> f64 {
        let ddx = x as f64 - self.cx as f64 - self.dx;
        let ddy = y as f64 - self.cy as f64 - self.dy;
        ddx * ddx + ddy * ddy
    }

    fn fill_with<F: Fn(f64) -> f64>(&mut self, f: F) {
        for y in 0..self.height {
            for x in 0..self.width {
                let w = f(self.dist2(x, y));
                self.set(x, y, w);
            }
        }
    }

    /// Hard-edged ring: 1 where `r1^2 <= d^2 < r2^2`, else 0.
    pub fn fill_annulus(&mut self, r1: f64, r2: f64) {
        let (r1s, r2s) = (r1 * r1, r2 * r2);
        self.fill_with(|d2| if d2 >= r1s && d2 < r2s { 1.0 } else { 0.0 });
    }

    /// Antialiased disk: 1 inside `r - 0.5`, 0 beyond `r + 0.5`, and a linear
    /// ramp `r + 0.5 - d` in between.
    pub fn fill_circle(&mut self, r: f64) {
        let inner = (r - 0.5).max(0.0);
        let outer = r + 0.5;
        let (inner2, outer2) = (inner * inner, outer * outer);
        self.fill_with(|d2| {
            if d2 <= inner2 && r >= 0.5 {
                1.0
            } else if d2 > outer2 {
                0.0
            } else {
                (outer - d2.sqrt()).clamp(0.0, 1.0)
            }
        });
    }

    /// Gaussian amplitude surface `A * exp(-d^2 / (2 sigma^2))`.
    pub fn fill_gaussian(&mut self, sigma: f64, amplitude: f64) {
        let two_s2 = 2.0 * sigma * sigma;
        self.fill_with(|d2| amplitude * (-d2 / two_s2).exp());
    }

    /// Moffat amplitude surface with the given FWHM and beta.
    pub fn fill_moffat(&mut self, fwhm: f64, beta: f64, amplitude: f64) {
        let alpha = fwhm / (2.0 * (2.0_f64.powf(1.0 / beta) - 1.0).sqrt());
        let a2 = alpha * alpha;
        self.fill_with(|d2| amplitude * (1.0 + d2 / a2).powf(-beta));
    }

    /// Copy the weight at `(x, y)` to its neighbours out to `steps` rings
    /// (clamped to `MAX_GROW`). Cells outside the mask are ignored.
    pub fn region_grow(&mut self, x: usize, y: usize, steps: usize) {
        if x >= self.width || y >= self.height {
            return;
        }
        let w = self.get(x, y);
        let rings: [&[(i32, i32)]; MAX_GROW] = [&GROW_RING_1, &GROW_RING_2, &GROW_RING_3];
        for ring in rings.iter().take(steps.min(MAX_GROW)) {
            for &(ox, oy) in ring.iter() {
                let nx = x as i64 + ox as i64;
                let ny = y as i64 + oy as i64;
                if nx >= 0 && ny >= 0 && (nx as usize) < self.width && (ny as usize) < self.height
                {
                    self.set(nx as usize, ny as usize, w);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_new_rejects_empty() {
        assert_eq!(
            Mask::new(0, 3).unwrap_err(),
            PhotometryError::EmptyMask {
                width: 0,
                height: 3
            }
        );
        assert!(Mask::new(3, 0).is_err());
    }

    #[test]
    fn test_reference_center_odd_even() {
        let odd = Mask::new(5, 7).unwrap();
        assert_eq!((odd.cx, odd.cy), (2, 3));
        assert_eq!((odd.dx, odd.dy), (0.0, 0.0));

        let even = Mask::new(4, 6).unwrap();
        assert_eq!((even.cx, even.cy), (2, 3));
        assert_eq!((even.dx, even.dy), (-0.5, -0.5));
        // geometric center sits between cells 1 and 2
        assert_eq!(even.dist2(1, 2), even.dist2(2, 3));
    }

    #[test]
    fn test_circle_area_conservation() {
        for &r in &[3.0, 3.5, 4.0, 5.0, 6.3, 8.0, 10.0] {
            let mask = Mask::circle(r, 0.0, 0.0).unwrap();
            let area = mask.total_weight();
            assert!(
                (area - PI * r * r).abs() <= 1.0,
                "r={} area={} expected={}",
                r,
                area,
                PI * r * r
            );
        }
    }

    #[test]
    fn test_circle_area_stable_under_subpixel_shift() {
        let centered = Mask::circle(5.0, 0.0, 0.0).unwrap().total_weight();
        for &(dx, dy) in &[(0.25, 0.0), (-0.4, 0.3), (0.1, -0.45)] {
            let shifted = Mask::circle(5.0, dx, dy).unwrap().total_weight();
            assert!((shifted - centered).abs() < 1.0);
        }
    }

    #[test]
    fn test_circle_edge_ramp() {
        let mask = Mask::circle(3.0, 0.0, 0.0).unwrap();
        let (cx, cy) = (mask.cx, mask.cy);
        assert_eq!(mask.get(cx, cy), 1.0);
        assert_eq!(mask.get(cx + 2, cy), 1.0);
        // d = 3 sits on the radius: half weight
        assert!((mask.get(cx + 3, cy) - 0.5).abs() < 1e-12);
        assert_eq!(mask.get(cx + 4, cy), 0.0);
    }

    #[test]
    fn test_annulus_matches_circle_difference() {
        let (r1, r3) = (4.0, 9.0);
        let ring = Mask::annulus(r1, r3).unwrap();
        let mut outer = Mask::new(ring.width, ring.height).unwrap();
        outer.fill_circle(r3);
        let mut inner = Mask::new(ring.width, ring.height).unwrap();
        inner.fill_circle(r1);

        for y in 0..ring.height {
            for x in 0..ring.width {
                let d = ring.dist2(x, y).sqrt();
                if (d - r1).abs() == 0.0 || (d - r3).abs() == 0.0 {
                    continue;
                }
                let diff = outer.get(x, y) - inner.get(x, y);
                if (d - r1).abs() > 0.5 && (d - r3).abs() > 0.5 {
                    // away from the antialiased edges the identity is exact
                    assert_eq!(ring.get(x, y), diff, "cell ({}, {})", x, y);
                } else {
                    // on the edges the ring is the hard-edged rounding
                    let hard = (outer.get(x, y) >= 0.5) as i32 as f64
                        - (inner.get(x, y) >= 0.5) as i32 as f64;
                    assert_eq!(ring.get(x, y), hard, "edge cell ({}, {})", x, y);
                }
            }
        }
    }

    #[test]
    fn test_region_grow_rings() {
        let mut mask = Mask::new(11, 11).unwrap();
        mask.fill_circle(20.0);
        let full = mask.total_weight();

        mask.set(5, 5, 0.0);
        mask.region_grow(5, 5, 1);
        assert_eq!(full - mask.total_weight(), 9.0);

        mask.region_grow(5, 5, 2);
        assert_eq!(full - mask.total_weight(), 21.0);

        mask.region_grow(5, 5, 3);
        assert_eq!(full - mask.total_weight(), 37.0);

        // clamped to three rings
        mask.region_grow(5, 5, 9);
        assert_eq!(full - mask.total_weight(), 37.0);
    }

    #[test]
    fn test_region_grow_clips_at_mask_edge() {
        let mut mask = Mask::new(3, 3).unwrap();
        mask.fill_circle(10.0);
        mask.set(0, 0, 0.0);
        mask.region_grow(0, 0, 3);
        assert_eq!(mask.get(1, 1), 0.0);
        assert_eq!(mask.get(2, 2), 0.0);
        assert_eq!(mask.get(2, 0), 0.0);
    }

    #[test]
    fn test_gaussian_surface_peak_and_falloff() {
        let mut mask = Mask::new(9, 9).unwrap();
        mask.fill_gaussian(2.0, 10.0);
        assert!((mask.get(4, 4) - 10.0).abs() < 1e-12);
        // one sigma away
        let expected = 10.0 * (-0.5_f64).exp();
        assert!((mask.get(6, 4) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_moffat_half_maximum_at_half_fwhm() {
        let mut mask = Mask::new(21, 21).unwrap();
        mask.fill_moffat(8.0, 4.0, 1.0);
        assert!((mask.get(14, 10) - 0.5).abs() < 1e-9);
    }
}
