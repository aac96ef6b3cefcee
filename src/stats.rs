use bumpalo::Bump;
use serde::Serialize;

use crate::aperture::Mask;
use crate::frame::PlaneView;
use crate::patch::Patch;

/// Cells at or above this weight count as "core" pixels for peak/median.
pub const CORE_WEIGHT: f64 = 0.5;

/// Weighted statistics over a masked frame region.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RegionStats {
    pub sum: f64,
    pub sumsq: f64,
    /// Total weight (effective pixel count)
    pub all: f64,
    pub min: f64,
    pub max: f64,
    pub max_x: usize,
    pub max_y: usize,
    pub median: f64,
    pub avg: f64,
    pub sigma: f64,
    /// Weight of cells dropped because the pixel was not finite
    pub skipped: f64,
}

impl RegionStats {
    /// Fill `avg`/`sigma` from the accumulated moments; left at 0 when empty.
    fn finish(&mut self) {
        if self.all > 0.0 {
            self.avg = self.sum / self.all;
            let var = self.sumsq / self.all - self.avg * self.avg;
            self.sigma = var.max(0.0).sqrt();
        }
    }
}

/// Median of a slice, sorting it in place. Empty input gives 0.
pub fn median_in_place(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len();
    if n % 2 == 0 {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    } else {
        values[n / 2]
    }
}

/// Statistics of the frame under `mask`, with the mask's reference cell
/// anchored at `(x, y)`.
///
/// Every non-zero cell with a finite pixel contributes `w*p` and `w*p^2` to
/// the sums and `w` to `all`; only cells with `w >= CORE_WEIGHT` feed
/// min/max and the median.
pub fn compute_stats(frame: &PlaneView, mask: &Mask, x: f64, y: f64) -> RegionStats {
    let patch = Patch::locate(mask, frame, x, y);
    let arena = Bump::new();
    let mut core = bumpalo::collections::Vec::with_capacity_in(patch.width * patch.height, &arena);

    let mut stats = RegionStats::default();
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;

    for (mx, my, fx, fy) in patch.cells() {
        let w = mask.get(mx, my);
        if w <= 0.0 {
            continue;
        }
        let v = frame.pixel(fx, fy);
        if !v.is_finite() {
            stats.skipped += w;
            continue;
        }
        stats.sum += w * v;
        stats.sumsq += w * v * v;
        stats.all += w;
        if w >= CORE_WEIGHT {
            core.push(v);
            if v < min {
                min = v;
            }
            if v > max {
                max = v;
                stats.max_x = fx;
                stats.max_y = fy;
            }
        }
    }

    if !core.is_empty() {
        stats.min = min;
        stats.max = max;
        stats.median = median_in_place(&mut core);
    }
    stats.finish();
    stats
}

/// Copy the frame region under `mask` into a buffer shaped like the mask.
/// Cells falling outside the frame are zero.
pub fn extract_patch(frame: &PlaneView, mask: &Mask, x: f64, y: f64) -> Vec<f64> {
    let patch = Patch::locate(mask, frame, x, y);
    let mut out = vec![0.0; mask.width * mask.height];
    for (mx, my, fx, fy) in patch.cells() {
        out[my * mask.width + mx] = frame.pixel(fx, fy);
    }
    out
}

/// `sum(w * p)` over the frame region under `mask`.
pub fn weighted_sum(frame: &PlaneView, mask: &Mask, x: f64, y: f64) -> f64 {
    Patch::locate(mask, frame, x, y)
        .cells()
        .map(|(mx, my, fx, fy)| mask.get(mx, my) * frame.pixel(fx, fy))
        .sum()
}
