/// Radial profile extraction and 1-D Gaussian profile fitting
/// Builds a radius/intensity point cloud around a star and fits
/// `A * exp(-0.5 * (r / s)^2)` with the downhill simplex to estimate FWHM.
use nalgebra::Vector2;
use serde::Serialize;

use crate::error::Result;
use crate::frame::PlaneView;
use crate::magnitude::InstrumentalMagnitude;
use crate::params::ApertureParams;
use crate::patch::Patch;
use crate::photometry::measure_star;
use crate::simplex::Simplex;

/// FWHM of a Gaussian in units of its sigma: `2 * sqrt(2 ln 2)`.
pub const FWHM_PER_SIGMA: f64 = 2.354_820_045_030_949;

/// Relative tolerance on the fit objective.
pub const PROFILE_FIT_FTOL: f64 = 1.0e-3;

/// Simplex size, relative to the parameters, at which the fit may stop.
pub const PROFILE_FIT_XTOL: f64 = 1.0e-4;

/// Below this fraction of the peak, `peak - sky` is too small to normalize by.
const MIN_CONTRAST: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProfilePoint {
    /// Distance from the star center in pixels
    pub r: f64,
    /// Sky-subtracted value normalized to the peak
    pub v: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RadialProfile {
    /// Points in scan order (row-major), not sorted by radius
    pub points: Vec<ProfilePoint>,
    pub peak: f64,
    pub flux: f64,
    pub sky: f64,
    pub err: f64,
    /// Set when the point capacity cut the scan short
    pub truncated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProfileFit {
    pub amplitude: f64,
    pub sigma: f64,
    pub fwhm: f64,
    /// Sum of squared residuals at the solution
    pub residual: f64,
    pub evaluations: usize,
    pub converged: bool,
}

/// Collect `(distance, normalized value)` for every pixel within `radius` of
/// `(x, y)`, up to `capacity` points.
pub fn radial_profile(
    frame: &PlaneView,
    x: f64,
    y: f64,
    radius: f64,
    capacity: usize,
    params: &ApertureParams,
) -> Result<RadialProfile> {
    let ap = measure_star(frame, x, y, params, &InstrumentalMagnitude::default())?;
    let peak = ap.star_max;
    let sky = ap.sky;

    let contrast = peak - sky;
    let norm = if contrast.abs() < MIN_CONTRAST * peak.abs() || contrast == 0.0 {
        if peak != 0.0 {
            peak
        } else {
            1.0
        }
    } else {
        contrast
    };

    let half = radius.max(0.0).ceil() as usize;
    let window = Patch::window(x, y, half, frame.width, frame.height);

    let r2 = radius * radius;
    let mut points = Vec::with_capacity(capacity.min(window.width * window.height));
    let mut truncated = false;
    for (_, _, px, py) in window.cells() {
        let ddx = px as f64 - x;
        let ddy = py as f64 - y;
        let d2 = ddx * ddx + ddy * ddy;
        if d2 > r2 {
            continue;
        }
        let v = frame.pixel(px, py);
        if !v.is_finite() {
            continue;
        }
        if points.len() >= capacity {
            truncated = true;
            break;
        }
        points.push(ProfilePoint {
            r: d2.sqrt(),
            v: (v - sky) / norm,
        });
    }

    tracing::debug!(
        "radial profile at ({:.2}, {:.2}): {} points, peak {:.1}, sky {:.2}{}",
        x,
        y,
        points.len(),
        peak,
        sky,
        if truncated { " (truncated)" } else { "" }
    );

    Ok(RadialProfile {
        points,
        peak,
        flux: ap.star,
        sky,
        err: ap.star_err,
        truncated,
    })
}

fn gaussian_residual(points: &[ProfilePoint], a: f64, s: f64) -> f64 {
    let inv = 1.0 / (s * s);
    points
        .iter()
        .map(|p| {
            let model = a * (-0.5 * p.r * p.r * inv).exp();
            (model - p.v).powi(2)
        })
        .sum()
}

/// Least-squares fit of a 1-D Gaussian to profile points.
///
/// The simplex is seeded with `(A, s)`, `(1.1A, s)` and `(A, 1.1s)` and is
/// restarted once from its first answer. Never fails; check `converged` and
/// `evaluations` for quality.
pub fn fit_1d_gaussian(
    points: &[ProfilePoint],
    amplitude: f64,
    sigma: f64,
    max_evaluations: usize,
) -> ProfileFit {
    if points.is_empty() || sigma == 0.0 {
        return ProfileFit {
            amplitude,
            sigma: sigma.abs(),
            fwhm: sigma.abs() * FWHM_PER_SIGMA,
            residual: 0.0,
            evaluations: 0,
            converged: false,
        };
    }

    let objective = |p: &Vector2<f64>| gaussian_residual(points, p[0], p[1]);
    let simplex = Simplex::new(PROFILE_FIT_FTOL, max_evaluations).with_xtol(PROFILE_FIT_XTOL);

    let start = Vector2::new(amplitude, sigma);
    let first = simplex.minimize(objective, start, start * 0.1);

    let budget = max_evaluations.saturating_sub(first.evaluations);
    let result = if budget > 3 {
        let restart = Simplex::new(PROFILE_FIT_FTOL, budget).with_xtol(PROFILE_FIT_XTOL);
        let second = restart.minimize(objective, first.point, first.point * 0.1);
        let mut best = if second.value <= first.value { second } else { first };
        best.evaluations = first.evaluations + second.evaluations;
        best
    } else {
        first
    };

    let s = result.point[1].abs();
    tracing::trace!(
        "profile fit: A={:.4} s={:.4} ssr={:.3e} after {} evaluations",
        result.point[0],
        s,
        result.value,
        result.evaluations
    );

    ProfileFit {
        amplitude: result.point[0],
        sigma: s,
        fwhm: s * FWHM_PER_SIGMA,
        residual: result.value,
        evaluations: result.evaluations,
        converged: result.converged,
    }
}

/// Radial profile out to `radius` followed by a Gaussian fit; the usual way
/// to get a star's FWHM.
pub fn fit_profile_fwhm(
    frame: &PlaneView,
    x: f64,
    y: f64,
    radius: f64,
    params: &ApertureParams,
) -> Result<(RadialProfile, ProfileFit)> {
    let side = 2 * radius.max(0.0).ceil() as usize + 1;
    let profile = radial_profile(frame, x, y, radius, side * side, params)?;
    let fit = fit_1d_gaussian(&profile.points, 1.0, (radius / 4.0).max(0.5), 2000);
    Ok((profile, fit))
}
