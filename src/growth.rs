/// Curve of growth: sky-subtracted flux in apertures of increasing radius,
/// normalized to the flux in the operational aperture `r1`.
use serde::Serialize;

use crate::centering::{center_star, StarFinder};
use crate::error::{PhotometryError, Result};
use crate::frame::PlaneView;
use crate::magnitude::MIN_FLUX;
use crate::params::ApertureParams;
use crate::photometry::aperture_stats;
use crate::sky::estimate_sky;

/// Radius of growth step `i`.
pub fn growth_radius(i: usize) -> f64 {
    1.0 + 0.5 * i as f64
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GrowthPoint {
    pub radius: f64,
    /// Sky-subtracted flux
    pub flux: f64,
    /// Effective aperture area
    pub area: f64,
    /// `flux` divided by the flux at `r1`
    pub normalized: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GrowthCurve {
    pub x: f64,
    pub y: f64,
    pub centered: bool,
    pub sky: f64,
    pub sky_err: f64,
    pub reference_radius: f64,
    pub reference_flux: f64,
    pub points: Vec<GrowthPoint>,
}

impl GrowthCurve {
    pub fn normalized(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.normalized).collect()
    }

    /// First radius after which the normalized flux changes by no more than
    /// `tolerance` per step.
    pub fn convergence_radius(&self, tolerance: f64) -> Option<f64> {
        let n = self.points.len();
        (0..n.saturating_sub(1))
            .find(|&i| {
                self.points[i..]
                    .windows(2)
                    .all(|w| (w[1].normalized - w[0].normalized).abs() <= tolerance)
            })
            .map(|i| self.points[i].radius)
    }
}

fn net_flux(frame: &PlaneView, x: f64, y: f64, r: f64, sky: f64) -> Result<(f64, f64)> {
    let (_, stats) = aperture_stats(frame, x, y, r)?;
    Ok((stats.sum - stats.all * sky, stats.all))
}

/// Measure the growth curve of the star near `(x, y)` over `steps` radii.
///
/// Centering and the sky estimate run once; each radius then reuses them.
/// Fails with `NoReferenceFlux` when the star has no positive flux at `r1`.
pub fn growth_curve(
    frame: &PlaneView,
    x: f64,
    y: f64,
    steps: usize,
    params: &ApertureParams,
    finder: Option<&dyn StarFinder>,
) -> Result<GrowthCurve> {
    frame.check_bounds(x, y)?;
    params.validate()?;

    let (cx, cy, centered) = match finder {
        Some(finder) if params.auto_center => {
            match center_star(frame, finder, x, y, params.max_center_error) {
                Ok(c) => (c.x, c.y, true),
                Err(PhotometryError::StarNotFound { .. }) => {
                    tracing::warn!("growth curve: could not center star at ({:.2}, {:.2})", x, y);
                    (x, y, false)
                }
                Err(e) => return Err(e),
            }
        }
        _ => (x, y, false),
    };

    let sky = estimate_sky(frame, cx, cy, params)?;

    let (reference_flux, _) = net_flux(frame, cx, cy, params.r1, sky.value)?;
    if !reference_flux.is_finite() || reference_flux <= MIN_FLUX {
        return Err(PhotometryError::NoReferenceFlux { radius: params.r1 });
    }

    let points = (0..steps)
        .map(|i| {
            let radius = growth_radius(i);
            let (flux, area) = net_flux(frame, cx, cy, radius, sky.value)?;
            Ok(GrowthPoint {
                radius,
                flux,
                area,
                normalized: flux / reference_flux,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    tracing::debug!(
        "growth curve at ({:.2}, {:.2}): {} steps, reference flux {:.1} at r={:.1}",
        cx,
        cy,
        points.len(),
        reference_flux,
        params.r1
    );

    Ok(GrowthCurve {
        x: cx,
        y: cy,
        centered,
        sky: sky.value,
        sky_err: sky.error,
        reference_radius: params.r1,
        reference_flux,
        points,
    })
}
