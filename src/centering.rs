use serde::Serialize;

use crate::error::{PhotometryError, Result, BIG_ERR};
use crate::frame::PlaneView;
use crate::magnitude::MagnitudeScale;
use crate::params::ApertureParams;
use crate::patch::Patch;
use crate::photometry::{measure_star, StarSample};
use crate::stats::median_in_place;

/// MAD to Gaussian sigma.
const MAD_TO_SIGMA: f64 = 1.4826;

/// Centroid moves smaller than this end the iteration.
const CONVERGED_SHIFT: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Centroid {
    pub x: f64,
    pub y: f64,
    pub xerr: f64,
    pub yerr: f64,
}

/// Locates a star near an approximate position.
pub trait StarFinder {
    /// Refined position of the star nearest `(x, y)`, or `None` if there is
    /// no star there.
    fn find_star_near(&self, frame: &PlaneView, x: f64, y: f64) -> Option<Centroid>;
}

impl<F> StarFinder for F
where
    F: Fn(&PlaneView, f64, f64) -> Option<Centroid>,
{
    fn find_star_near(&self, frame: &PlaneView, x: f64, y: f64) -> Option<Centroid> {
        self(frame, x, y)
    }
}

/// Intensity-weighted first moments over background-subtracted pixels.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MomentCentroider {
    /// Radius of the moment window around the current estimate
    pub search_radius: f64,
    pub max_iterations: usize,
    /// Pixels must exceed the background by this many sigmas
    pub threshold_sigmas: f64,
}

impl Default for MomentCentroider {
    fn default() -> Self {
        Self {
            search_radius: 5.0,
            max_iterations: 10,
            threshold_sigmas: 3.0,
        }
    }
}

impl MomentCentroider {
    /// Median and MAD-derived sigma of a box around `(x, y)`.
    fn background(&self, frame: &PlaneView, x: f64, y: f64) -> (f64, f64) {
        let half = self.search_radius.max(1.0).ceil() as usize + 2;
        let mut values: Vec<f64> = Patch::window(x, y, half, frame.width, frame.height)
            .cells()
            .map(|(_, _, px, py)| frame.pixel(px, py))
            .filter(|v| v.is_finite())
            .collect();
        let median = median_in_place(&mut values);
        let mut deviations: Vec<f64> = values.iter().map(|v| (v - median).abs()).collect();
        let mad = median_in_place(&mut deviations);
        (median, mad * MAD_TO_SIGMA)
    }
}

#[derive(Default)]
struct Moments {
    w: f64,
    wx: f64,
    wy: f64,
    wxx: f64,
    wyy: f64,
    n: usize,
}

impl StarFinder for MomentCentroider {
    fn find_star_near(&self, frame: &PlaneView, x: f64, y: f64) -> Option<Centroid> {
        if !frame.contains(x, y) {
            return None;
        }
        let (bg, sigma) = self.background(frame, x, y);
        let cut = self.threshold_sigmas * sigma;
        let r = self.search_radius.max(1.0);
        let half = r.ceil() as usize;

        let window = |cx: f64, cy: f64| -> Moments {
            let mut m = Moments::default();
            for (_, _, px, py) in Patch::window(cx, cy, half, frame.width, frame.height).cells() {
                let (fx, fy) = (px as f64, py as f64);
                if (fx - cx).powi(2) + (fy - cy).powi(2) > r * r {
                    continue;
                }
                let v = frame.pixel(px, py) - bg;
                if !v.is_finite() || v <= cut {
                    continue;
                }
                m.w += v;
                m.wx += v * fx;
                m.wy += v * fy;
                m.wxx += v * fx * fx;
                m.wyy += v * fy * fy;
                m.n += 1;
            }
            m
        };

        let (mut cx, mut cy) = (x, y);
        let mut moments = window(cx, cy);
        for iteration in 0..self.max_iterations.max(1) {
            if moments.w <= 0.0 {
                break;
            }
            let nx = moments.wx / moments.w;
            let ny = moments.wy / moments.w;
            let shift = (nx - cx).hypot(ny - cy);
            cx = nx;
            cy = ny;
            moments = window(cx, cy);
            if shift < CONVERGED_SHIFT {
                tracing::trace!("centroid converged after {} iterations", iteration + 1);
                break;
            }
        }

        if moments.w <= 0.0 {
            tracing::trace!("no signal above {:.2} near ({:.2}, {:.2})", cut, cx, cy);
            return None;
        }
        if !frame.contains(cx, cy) {
            return None;
        }
        let m_xx = (moments.wxx / moments.w - cx * cx).max(0.0);
        let m_yy = (moments.wyy / moments.w - cy * cy).max(0.0);
        let n = moments.n as f64;
        Some(Centroid {
            x: cx,
            y: cy,
            xerr: (m_xx / n).sqrt(),
            yerr: (m_yy / n).sqrt(),
        })
    }
}

/// Refine `(x, y)` with `finder`, accepting the answer only when it moved
/// by at most `max_center_error` pixels.
pub fn center_star(
    frame: &PlaneView,
    finder: &dyn StarFinder,
    x: f64,
    y: f64,
    max_center_error: f64,
) -> Result<Centroid> {
    frame.check_bounds(x, y)?;
    match finder.find_star_near(frame, x, y) {
        Some(c) if (c.x - x).hypot(c.y - y) <= max_center_error => {
            tracing::debug!(
                "centered ({:.2}, {:.2}) -> ({:.3}, {:.3})",
                x,
                y,
                c.x,
                c.y
            );
            Ok(c)
        }
        Some(c) => {
            tracing::debug!(
                "rejected center ({:.3}, {:.3}) for ({:.2}, {:.2}): moved more than {:.2}",
                c.x,
                c.y,
                x,
                y,
                max_center_error
            );
            Err(PhotometryError::StarNotFound { x, y })
        }
        None => Err(PhotometryError::StarNotFound { x, y }),
    }
}

/// Center (when enabled) and measure one star.
///
/// A failed centering is not fatal: the star is measured at the given
/// position and its position errors are set to `BIG_ERR`.
pub fn measure_sample<S: MagnitudeScale + ?Sized>(
    frame: &PlaneView,
    x: f64,
    y: f64,
    params: &ApertureParams,
    finder: Option<&dyn StarFinder>,
    scale: &S,
) -> Result<StarSample> {
    frame.check_bounds(x, y)?;
    let position = match finder {
        Some(finder) if params.auto_center => {
            match center_star(frame, finder, x, y, params.max_center_error) {
                Ok(c) => c,
                Err(PhotometryError::StarNotFound { .. }) => {
                    tracing::warn!("could not center star at ({:.2}, {:.2})", x, y);
                    Centroid {
                        x,
                        y,
                        xerr: BIG_ERR,
                        yerr: BIG_ERR,
                    }
                }
                Err(e) => return Err(e),
            }
        }
        _ => Centroid {
            x,
            y,
            xerr: 0.0,
            yerr: 0.0,
        },
    };

    let aperture = measure_star(frame, position.x, position.y, params, scale)?;
    Ok(StarSample {
        x: position.x,
        y: position.y,
        xerr: position.xerr,
        yerr: position.yerr,
        aperture,
    })
}
