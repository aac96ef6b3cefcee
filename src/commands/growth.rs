use std::path::Path;

use anyhow::Result;
use psf_phot::{growth_curve, ApertureParams, Frame, MomentCentroider};

#[allow(clippy::too_many_arguments)]
pub fn show_growth(
    fits_path: &Path,
    x: f64,
    y: f64,
    steps: usize,
    plane: usize,
    tolerance: f64,
    params: &ApertureParams,
    format: &str,
) -> Result<()> {
    let frame = Frame::from_fits(fits_path)?;
    let view = frame.view(plane)?;
    let finder = MomentCentroider::default();
    let curve = growth_curve(&view, x, y, steps, params, Some(&finder))?;
    let converged = curve.convergence_radius(tolerance);

    if format == "json" {
        let out = serde_json::json!({
            "curve": curve,
            "convergence_radius": converged,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!(
        "Growth curve at ({:.3}, {:.3}){}, sky {:.2} +/- {:.2}",
        curve.x,
        curve.y,
        if curve.centered { "" } else { " (not centered)" },
        curve.sky,
        curve.sky_err
    );
    println!("{:>8} {:>12} {:>10} {:>10}", "Radius", "Flux", "Area", "Norm");
    println!("{:-<44}", "");
    for p in &curve.points {
        println!(
            "{:>8.1} {:>12.1} {:>10.2} {:>10.4}",
            p.radius, p.flux, p.area, p.normalized
        );
    }

    match converged {
        Some(r) => println!("\nConverged at r = {:.1} (tolerance {})", r, tolerance),
        None => println!("\nNot converged within {} steps", curve.points.len()),
    }
    Ok(())
}
