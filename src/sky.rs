/// Sky background estimation from an annulus, with iterative rejection of
/// pixels above `median + sigmas * sigma` for the clipping methods.
use serde::Serialize;

use crate::aperture::Mask;
use crate::error::{Result, BIG_ERR};
use crate::frame::PlaneView;
use crate::params::{ApertureParams, SkyMethod};
use crate::patch::Patch;
use crate::stats::{compute_stats, RegionStats};

/// Relative efficiency of the median against the mean for Gaussian noise.
pub const MEDIAN_EFFICIENCY: f64 = 0.65;

/// Pearson's empirical mode estimate: `mode = 3 * median - 2 * mean`.
pub const MODE_MEDIAN_WEIGHT: f64 = 3.0;
pub const MODE_MEAN_WEIGHT: f64 = 2.0;

/// Safety cap on clipping passes; each pass only ever removes weight.
pub const MAX_CLIP_ITERATIONS: usize = 64;

#[derive(Debug, Clone, Serialize)]
pub struct SkyEstimate {
    pub value: f64,
    pub error: f64,
    pub stats: RegionStats,
    /// Clipping passes run (0 for non-clipping methods)
    pub iterations: usize,
    /// Cells rejected directly (not counting region-grown neighbours)
    pub dodged: usize,
    #[serde(skip)]
    pub mask: Mask,
}

/// Zero every mask cell whose frame pixel exceeds `threshold` and grow the
/// exclusion by `grow` rings. Returns the number of newly rejected cells.
pub fn dodge_outliers(
    frame: &PlaneView,
    mask: &mut Mask,
    x: f64,
    y: f64,
    threshold: f64,
    grow: usize,
) -> usize {
    let patch = Patch::locate(mask, frame, x, y);
    let mut dodged = 0;
    for (mx, my, fx, fy) in patch.cells() {
        if mask.get(mx, my) <= 0.0 {
            continue;
        }
        if frame.pixel(fx, fy) > threshold {
            mask.set(mx, my, 0.0);
            mask.region_grow(mx, my, grow);
            dodged += 1;
        }
    }
    dodged
}

/// Estimate the sky level around `(x, y)` over the annulus `r2..r3`.
pub fn estimate_sky(
    frame: &PlaneView,
    x: f64,
    y: f64,
    params: &ApertureParams,
) -> Result<SkyEstimate> {
    frame.check_bounds(x, y)?;
    params.validate()?;

    let mut mask = Mask::annulus(params.r2, params.r3)?;
    let mut stats = compute_stats(frame, &mask, x, y);
    let mut iterations = 0;
    let mut dodged = 0;

    if params.sky_method.clips() {
        while iterations < MAX_CLIP_ITERATIONS {
            let threshold = stats.median + params.sigmas * stats.sigma;
            let n = dodge_outliers(frame, &mut mask, x, y, threshold, params.grow);
            iterations += 1;
            tracing::trace!(
                "sky clip pass {}: threshold {:.3}, dodged {}",
                iterations,
                threshold,
                n
            );
            if n == 0 {
                break;
            }
            dodged += n;
            stats = compute_stats(frame, &mask, x, y);
        }
    }

    if stats.all <= 0.0 {
        tracing::warn!("empty sky annulus at ({:.2}, {:.2})", x, y);
        return Ok(SkyEstimate {
            value: 0.0,
            error: BIG_ERR,
            stats,
            iterations,
            dodged,
            mask,
        });
    }

    let sqrt_n = stats.all.sqrt();
    let (value, error) = match params.sky_method {
        SkyMethod::Average | SkyMethod::KappaSigma => (stats.avg, stats.sigma / sqrt_n),
        SkyMethod::Median => (stats.median, stats.sigma / sqrt_n / MEDIAN_EFFICIENCY),
        SkyMethod::SyntheticMode => (
            MODE_MEDIAN_WEIGHT * stats.median - MODE_MEAN_WEIGHT * stats.avg,
            stats.sigma / sqrt_n,
        ),
    };

    tracing::debug!(
        "sky at ({:.2}, {:.2}): {:.3} +/- {:.3} ({:?}, {} passes, {} dodged, n={:.1})",
        x,
        y,
        value,
        error,
        params.sky_method,
        iterations,
        dodged,
        stats.all
    );

    Ok(SkyEstimate {
        value,
        error,
        stats,
        iterations,
        dodged,
        mask,
    })
}
