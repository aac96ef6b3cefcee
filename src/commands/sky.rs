use std::path::Path;

use anyhow::Result;
use psf_phot::{estimate_sky, ApertureParams, Frame};

pub fn show_sky(
    fits_path: &Path,
    x: f64,
    y: f64,
    plane: usize,
    params: &ApertureParams,
    format: &str,
) -> Result<()> {
    let frame = Frame::from_fits(fits_path)?;
    let view = frame.view(plane)?;
    let sky = estimate_sky(&view, x, y, params)?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&sky)?);
        return Ok(());
    }

    println!("Sky at ({:.2}, {:.2}), annulus {:.1}..{:.1}", x, y, params.r2, params.r3);
    println!("  Method:      {:?}", params.sky_method);
    println!("  Value:       {:.3}", sky.value);
    println!("  Error:       {:.3}", sky.error);
    println!("  Pixels:      {:.1}", sky.stats.all);
    println!("  Median:      {:.3}", sky.stats.median);
    println!("  Mean:        {:.3}", sky.stats.avg);
    println!("  Sigma:       {:.3}", sky.stats.sigma);
    println!("  Range:       {:.1} .. {:.1}", sky.stats.min, sky.stats.max);
    println!("  Clip passes: {}", sky.iterations);
    println!("  Rejected:    {}", sky.dodged);
    Ok(())
}
