use std::path::Path;

use anyhow::Result;
use psf_phot::{center_star, fit_profile_fwhm, ApertureParams, Frame, MomentCentroider};

use crate::cli::ExposureOptions;

#[allow(clippy::too_many_arguments)]
pub fn show_profile(
    fits_path: &Path,
    x: f64,
    y: f64,
    radius: f64,
    plane: usize,
    show_points: bool,
    params: &ApertureParams,
    exposure: &ExposureOptions,
    format: &str,
) -> Result<()> {
    let mut frame = Frame::from_fits(fits_path)?;
    exposure.apply(&mut frame.exposure);
    let view = frame.view(plane)?;

    let (cx, cy) = if params.auto_center {
        match center_star(&view, &MomentCentroider::default(), x, y, params.max_center_error) {
            Ok(c) => (c.x, c.y),
            Err(e) => {
                tracing::warn!("{}; using the given position", e);
                (x, y)
            }
        }
    } else {
        (x, y)
    };

    let (profile, fit) = fit_profile_fwhm(&view, cx, cy, radius, params)?;

    if format == "json" {
        let out = serde_json::json!({
            "x": cx,
            "y": cy,
            "profile": profile,
            "fit": fit,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("Profile at ({:.3}, {:.3}), radius {:.1}", cx, cy, radius);
    println!("  Points:     {}", profile.points.len());
    println!("  Peak:       {:.1}", profile.peak);
    println!("  Sky:        {:.2}", profile.sky);
    println!("  Flux:       {:.1} +/- {:.1}", profile.flux, profile.err);
    println!("  Amplitude:  {:.4}", fit.amplitude);
    println!("  Sigma:      {:.3}", fit.sigma);
    println!("  FWHM:       {:.3}", fit.fwhm);
    println!(
        "  Fit:        {} evaluations, residual {:.3e}{}",
        fit.evaluations,
        fit.residual,
        if fit.converged { "" } else { " (not converged)" }
    );

    if show_points {
        let mut points = profile.points.clone();
        points.sort_by(|a, b| a.r.total_cmp(&b.r));
        println!("\n{:>8} {:>10}", "R", "Value");
        for p in &points {
            println!("{:>8.3} {:>10.4}", p.r, p.v);
        }
    }
    Ok(())
}
