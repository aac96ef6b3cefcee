use std::path::Path;

use anyhow::{Context, Result};
use psf_phot::{
    measure_planes, measure_sample, ApertureParams, Frame, InstrumentalMagnitude, MeasureFlags,
    MomentCentroider, PhotometryResult, StarSample,
};

use crate::cli::ExposureOptions;

/// Measurement of one star across every plane of the frame.
struct StarReport {
    sample: StarSample,
    planes: Vec<(String, PhotometryResult)>,
}

pub fn measure_stars(
    fits_path: &Path,
    stars: &[(f64, f64)],
    bands: &[String],
    zero_point: f64,
    params: &ApertureParams,
    exposure: &ExposureOptions,
    format: &str,
) -> Result<()> {
    let mut frame = Frame::from_fits(fits_path)?;
    exposure.apply(&mut frame.exposure);

    let scale = InstrumentalMagnitude { zero_point };
    let finder = MomentCentroider::default();
    let view = frame.view(0)?;

    let mut reports = Vec::with_capacity(stars.len());
    for &(x, y) in stars {
        let sample = measure_sample(&view, x, y, params, Some(&finder), &scale)
            .with_context(|| format!("Failed to measure star at ({}, {})", x, y))?;

        let planes = if frame.is_color() {
            measure_planes(&frame, sample.x, sample.y, params, &scale)?
                .into_iter()
                .map(|(plane, result)| (band_name(bands, plane), result))
                .collect()
        } else {
            vec![(band_name(bands, 0), sample.aperture)]
        };
        reports.push(StarReport { sample, planes });
    }

    match format {
        "json" => output_json(&reports)?,
        _ => output_table(&reports),
    }

    Ok(())
}

/// Name of a plane's band: the user's list when given, else a plane label.
fn band_name(bands: &[String], plane: usize) -> String {
    bands
        .get(plane.saturating_sub(1))
        .cloned()
        .unwrap_or_else(|| {
            if plane == 0 {
                "mag".to_string()
            } else {
                format!("p{}", plane)
            }
        })
}

/// `"<band>=<mag>/<err>"` entries joined by spaces.
pub fn band_string(planes: &[(String, PhotometryResult)]) -> String {
    planes
        .iter()
        .map(|(band, r)| format!("{}={:.3}/{:.3}", band, r.absmag, r.magerr))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn flag_names(flags: MeasureFlags) -> String {
    let names: Vec<&str> = flags.iter_names().map(|(name, _)| name).collect();
    if names.is_empty() {
        "-".to_string()
    } else {
        names.join(",")
    }
}

fn output_table(reports: &[StarReport]) {
    println!(
        "{:<4} {:>9} {:>9} {:>7} {:>7} {:>12} {:>10} {:>10} {:<24} {}",
        "#", "X", "Y", "Xerr", "Yerr", "Flux", "FluxErr", "Sky", "Flags", "Bands"
    );
    println!("{:-<120}", "");

    for (i, report) in reports.iter().enumerate() {
        let s = &report.sample;
        let ap = &s.aperture;
        println!(
            "{:<4} {:>9.3} {:>9.3} {:>7.3} {:>7.3} {:>12.1} {:>10.1} {:>10.2} {:<24} {}",
            i + 1,
            s.x,
            s.y,
            s.xerr.min(999.0),
            s.yerr.min(999.0),
            ap.star,
            ap.star_err,
            ap.sky,
            flag_names(ap.flags),
            band_string(&report.planes)
        );
    }

    println!("\nTotal: {} stars", reports.len());
}

fn output_json(reports: &[StarReport]) -> Result<()> {
    let json_results: Vec<serde_json::Value> = reports
        .iter()
        .map(|report| {
            let planes: Vec<serde_json::Value> = report
                .planes
                .iter()
                .map(|(band, result)| {
                    serde_json::json!({
                        "band": band,
                        "photometry": result,
                        "flags": flag_names(result.flags),
                    })
                })
                .collect();
            serde_json::json!({
                "x": report.sample.x,
                "y": report.sample.y,
                "xerr": report.sample.xerr,
                "yerr": report.sample.yerr,
                "bands": band_string(&report.planes),
                "planes": planes,
            })
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&json_results)?);
    Ok(())
}
