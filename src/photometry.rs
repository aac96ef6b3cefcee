/// Aperture photometry of a single star
/// Sky from the annulus, flux from an antialiased circular aperture placed
/// at the star's sub-pixel position, and a propagated noise budget.
use bitflags::bitflags;
use serde::Serialize;

use crate::aperture::Mask;
use crate::error::{Result, BIG_ERR};
use crate::frame::{ExposureParams, Frame, PlaneView};
use crate::magnitude::{MagnitudeScale, MIN_FLUX};
use crate::params::{ApertureParams, ScintillationParams};
use crate::sky::estimate_sky;
use crate::stats::{compute_stats, RegionStats};

bitflags! {
    /// Conditions recorded on a measurement
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
    #[serde(transparent)]
    pub struct MeasureFlags: u32 {
        /// Flux below three times its error
        const FAINT = 1 << 0;
        /// Aperture peak above the saturation limit
        const BURNOUT = 1 << 1;
        /// Photometry ran to completion
        const MEASURED = 1 << 2;
        /// Aperture pixels were skipped (off-frame or not finite)
        const BADPIX = 1 << 3;
    }
}

/// Noise terms of a measurement, each as a standard deviation in ADU.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct NoiseTerms {
    pub photon: f64,
    pub read: f64,
    pub flat: f64,
    pub sky: f64,
    pub scint: f64,
}

/// Aperture photometry result for one star on one plane.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PhotometryResult {
    /// Raw sum in the aperture
    pub tflux: f64,
    /// Effective aperture area
    pub star_all: f64,
    pub sky: f64,
    pub sky_err: f64,
    /// Effective sky pixel count after rejection
    pub sky_all: f64,
    /// Peak aperture pixel
    pub star_max: f64,
    /// Sky-subtracted flux
    pub star: f64,
    /// Photon, read and flat noise combined
    pub flux_err: f64,
    /// `flux_err` with the sky uncertainty added
    pub star_err: f64,
    pub noise: NoiseTerms,
    pub absmag: f64,
    pub magerr: f64,
    pub flags: MeasureFlags,
}

/// Star position with its aperture photometry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StarSample {
    pub x: f64,
    pub y: f64,
    pub xerr: f64,
    pub yerr: f64,
    pub aperture: PhotometryResult,
}

/// Relative scintillation noise (Young's approximation).
pub fn scintillation_fraction(site: &ScintillationParams, exposure: &ExposureParams) -> f64 {
    if site.aperture_cm <= 0.0 || exposure.exptime <= 0.0 {
        return 0.0;
    }
    let aperture = site.aperture_cm.powf(-2.0 / 3.0);
    let airmass = exposure.airmass.max(1.0).powf(1.75);
    let altitude = (-site.altitude_m / 8000.0).exp();
    0.09 * aperture * airmass * altitude / (2.0 * exposure.exptime).sqrt()
}

/// Photon, read and flat noise for an aperture sum. Returns the three
/// terms as variances.
fn aperture_variances(
    tflux: f64,
    all: f64,
    sumsq: f64,
    exposure: &ExposureParams,
) -> (f64, f64, f64) {
    let gain = if exposure.gain > 0.0 { exposure.gain } else { 1.0 };
    let photon = (tflux - exposure.bias * all).abs() / gain;
    let flat = exposure.flat_noise * exposure.flat_noise * sumsq;
    let read = exposure.read_noise * exposure.read_noise * all;
    (photon, read, flat)
}

/// Statistics of a circular aperture of radius `r` centered on the
/// sub-pixel position `(x, y)`, together with the mask used.
pub fn aperture_stats(frame: &PlaneView, x: f64, y: f64, r: f64) -> Result<(Mask, RegionStats)> {
    let dx = x - (x + 0.5).floor();
    let dy = y - (y + 0.5).floor();
    let mask = Mask::circle(r, dx, dy)?;
    let stats = compute_stats(frame, &mask, x, y);
    Ok((mask, stats))
}

/// Measure the star at `(x, y)`.
///
/// Fails only when the position is off the frame or the radii are invalid;
/// faint, saturated and degenerate measurements come back flagged.
pub fn measure_star<S: MagnitudeScale + ?Sized>(
    frame: &PlaneView,
    x: f64,
    y: f64,
    params: &ApertureParams,
    scale: &S,
) -> Result<PhotometryResult> {
    frame.check_bounds(x, y)?;
    params.validate()?;

    let sky = estimate_sky(frame, x, y, params)?;

    let (mask, ap) = aperture_stats(frame, x, y, params.r1)?;

    let mut flags = MeasureFlags::MEASURED;
    if ap.skipped > 0.0 || ap.all + ap.skipped < mask.total_weight() - 1e-9 {
        flags |= MeasureFlags::BADPIX;
    }

    let tflux = ap.sum;
    let star_all = ap.all;
    let star = tflux - star_all * sky.value;

    let (photon2, read2, flat2) = aperture_variances(tflux, star_all, ap.sumsq, frame.exposure);
    let flux_err = (photon2 + flat2 + read2).sqrt();
    let sky_term = star_all * sky.error;
    let star_err = (flux_err * flux_err + sky_term * sky_term).sqrt();

    let scint = params
        .scintillation
        .map(|site| scintillation_fraction(&site, frame.exposure) * star.max(0.0))
        .unwrap_or(0.0);

    let flux_c = star.max(MIN_FLUX);
    let err_c = (star_err * star_err + scint * scint).sqrt().max(MIN_FLUX);
    let absmag = scale.flux_to_magnitude(flux_c);
    let magerr = if sky.error >= BIG_ERR || star_all <= 0.0 {
        BIG_ERR
    } else {
        (scale.flux_to_magnitude(flux_c + err_c) - absmag).abs()
    };

    if star < 3.0 * flux_err {
        flags |= MeasureFlags::FAINT;
    }
    if ap.max > params.saturation {
        flags |= MeasureFlags::BURNOUT;
    }

    tracing::debug!(
        "star at ({:.2}, {:.2}): flux {:.1} +/- {:.1}, sky {:.2}, mag {:.3} +/- {:.3} {:?}",
        x,
        y,
        star,
        star_err,
        sky.value,
        absmag,
        magerr,
        flags
    );

    Ok(PhotometryResult {
        tflux,
        star_all,
        sky: sky.value,
        sky_err: sky.error,
        sky_all: sky.stats.all,
        star_max: ap.max,
        star,
        flux_err,
        star_err,
        noise: NoiseTerms {
            photon: photon2.sqrt(),
            read: read2.sqrt(),
            flat: flat2.sqrt(),
            sky: sky_term,
            scint,
        },
        absmag,
        magerr,
        flags,
    })
}

/// Measure the star on every plane of a frame. Monochrome frames yield a
/// single entry for plane 0; color frames yield planes `1..=n`.
pub fn measure_planes<S: MagnitudeScale + ?Sized>(
    frame: &Frame,
    x: f64,
    y: f64,
    params: &ApertureParams,
    scale: &S,
) -> Result<Vec<(usize, PhotometryResult)>> {
    let planes: Vec<usize> = if frame.is_color() {
        (1..=frame.plane_count()).collect()
    } else {
        vec![0]
    };
    planes
        .into_iter()
        .map(|plane| {
            let view = frame.view(plane)?;
            Ok((plane, measure_star(&view, x, y, params, scale)?))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PhotometryError;
    use crate::magnitude::InstrumentalMagnitude;
    use crate::params::SkyMethod;
    use crate::test_support::SyntheticFrame;
    use approx::assert_relative_eq;

    fn star_frame(exposure: ExposureParams) -> Frame {
        let mut synth = SyntheticFrame::new(64, 64, 100.0, 2.0, 42);
        synth.add_gaussian_star(32.3, 31.8, 1.5, 5000.0);
        synth.exposure = exposure;
        synth.into_frame()
    }

    fn flat_frame(value: f32) -> Frame {
        Frame::new(48, 48, vec![value; 48 * 48]).unwrap()
    }

    #[test]
    fn test_recovers_gaussian_flux() {
        let frame = star_frame(ExposureParams::default());
        let view = frame.view(0).unwrap();
        let params = ApertureParams {
            r1: 8.0,
            r2: 12.0,
            r3: 18.0,
            ..Default::default()
        };
        let r = measure_star(&view, 32.3, 31.8, &params, &InstrumentalMagnitude::default())
            .unwrap();
        let expected = 2.0 * std::f64::consts::PI * 1.5 * 1.5 * 5000.0;
        assert!(
            (r.star - expected).abs() / expected < 0.02,
            "flux {} expected {}",
            r.star,
            expected
        );
        assert!((r.sky - 100.0).abs() < 1.0);
        assert!(r.flags.contains(MeasureFlags::MEASURED));
        assert!(!r.flags.contains(MeasureFlags::FAINT));
        assert_relative_eq!(r.star, r.tflux - r.star_all * r.sky, max_relative = 1e-12);
    }

    #[test]
    fn test_sky_subtracted_identity_and_noise_terms() {
        let exposure = ExposureParams {
            gain: 2.0,
            read_noise: 5.0,
            flat_noise: 0.01,
            bias: 10.0,
            ..Default::default()
        };
        let frame = flat_frame(110.0).with_exposure(exposure);
        let view = frame.view(0).unwrap();
        let params = ApertureParams {
            sky_method: SkyMethod::Average,
            ..Default::default()
        };
        let r = measure_star(&view, 24.0, 24.0, &params, &InstrumentalMagnitude::default())
            .unwrap();
        assert_relative_eq!(r.star, 0.0, epsilon = 1e-6);
        let photon2 = (r.tflux - 10.0 * r.star_all).abs() / 2.0;
        assert_relative_eq!(r.noise.photon, photon2.sqrt(), max_relative = 1e-12);
        assert_relative_eq!(r.noise.read, (25.0 * r.star_all).sqrt(), max_relative = 1e-12);
        let flux_err =
            (r.noise.photon.powi(2) + r.noise.read.powi(2) + r.noise.flat.powi(2)).sqrt();
        assert_relative_eq!(r.flux_err, flux_err, max_relative = 1e-12);
        // zero sky noise on a flat frame
        assert_eq!(r.sky_err, 0.0);
        assert_relative_eq!(r.star_err, r.flux_err, max_relative = 1e-12);
        assert!(r.flags.contains(MeasureFlags::FAINT));
    }

    #[test]
    fn test_noise_model_monotonic() {
        let base = ExposureParams {
            gain: 2.0,
            read_noise: 3.0,
            flat_noise: 0.005,
            ..Default::default()
        };
        let params = ApertureParams::default();
        let scale = InstrumentalMagnitude::default();
        let err_for = |e: ExposureParams| {
            let frame = star_frame(e);
            let view = frame.view(0).unwrap();
            measure_star(&view, 32.3, 31.8, &params, &scale).unwrap().flux_err
        };
        let reference = err_for(base.clone());
        assert!(err_for(ExposureParams { read_noise: 6.0, ..base.clone() }) >= reference);
        assert!(err_for(ExposureParams { flat_noise: 0.02, ..base.clone() }) >= reference);
        assert!(err_for(ExposureParams { gain: 0.5, ..base.clone() }) >= reference);
    }

    #[test]
    fn test_magnitude_clamped_for_non_positive_flux() {
        // star aperture darker than the sky ring
        let mut data = vec![100.0f32; 48 * 48];
        for y in 20..29 {
            for x in 20..29 {
                data[y * 48 + x] = 50.0;
            }
        }
        let frame = Frame::new(48, 48, data).unwrap();
        let view = frame.view(0).unwrap();
        let scale = InstrumentalMagnitude { zero_point: 25.0 };
        let params = ApertureParams {
            r1: 3.0,
            ..Default::default()
        };
        let r = measure_star(&view, 24.0, 24.0, &params, &scale).unwrap();
        assert!(r.star < 0.0);
        assert!(r.absmag.is_finite() && r.magerr.is_finite());
        assert_eq!(r.absmag, scale.flux_to_magnitude(MIN_FLUX));
        assert!(r.flags.contains(MeasureFlags::FAINT));
    }

    #[test]
    fn test_saturation_flag_threshold() {
        let params = ApertureParams {
            saturation: 60000.0,
            ..Default::default()
        };
        let scale = InstrumentalMagnitude::default();

        let mut data = vec![100.0f32; 48 * 48];
        data[24 * 48 + 24] = 60001.0;
        let frame = Frame::new(48, 48, data.clone()).unwrap();
        let r = measure_star(&frame.view(0).unwrap(), 24.0, 24.0, &params, &scale).unwrap();
        assert!(r.flags.contains(MeasureFlags::BURNOUT));
        assert_eq!(r.star_max, 60001.0);

        data[24 * 48 + 24] = 60000.0;
        let frame = Frame::new(48, 48, data).unwrap();
        let r = measure_star(&frame.view(0).unwrap(), 24.0, 24.0, &params, &scale).unwrap();
        assert!(!r.flags.contains(MeasureFlags::BURNOUT));
    }

    #[test]
    fn test_out_of_bounds_position() {
        let frame = flat_frame(1.0);
        let view = frame.view(0).unwrap();
        let err = measure_star(
            &view,
            -1.0,
            0.0,
            &ApertureParams::default(),
            &InstrumentalMagnitude::default(),
        )
        .unwrap_err();
        assert!(matches!(err, PhotometryError::OutOfBounds { .. }));
    }

    #[test]
    fn test_edge_star_flagged_badpix() {
        let frame = flat_frame(100.0);
        let view = frame.view(0).unwrap();
        let r = measure_star(
            &view,
            1.0,
            24.0,
            &ApertureParams::default(),
            &InstrumentalMagnitude::default(),
        )
        .unwrap();
        assert!(r.flags.contains(MeasureFlags::BADPIX));
        assert!(r.star_all < std::f64::consts::PI * 25.0);
    }

    #[test]
    fn test_degenerate_sky_gives_big_error() {
        let frame = Frame::new(5, 5, vec![10.0; 25]).unwrap();
        let view = frame.view(0).unwrap();
        let r = measure_star(
            &view,
            2.0,
            2.0,
            &ApertureParams::default(),
            &InstrumentalMagnitude::default(),
        )
        .unwrap();
        assert_eq!(r.sky_err, BIG_ERR);
        assert_eq!(r.magerr, BIG_ERR);
        assert!(r.absmag.is_finite());
    }

    #[test]
    fn test_subpixel_position_consistent_flux() {
        let mut fluxes = Vec::new();
        for &(x, y) in &[(32.0, 32.0), (32.25, 32.1), (32.45, 31.6)] {
            let mut synth = SyntheticFrame::new(64, 64, 0.0, 0.0, 1);
            synth.add_gaussian_star(x, y, 1.2, 1000.0);
            let frame = synth.into_frame();
            let view = frame.view(0).unwrap();
            let params = ApertureParams {
                r1: 6.0,
                sky_method: SkyMethod::Average,
                ..Default::default()
            };
            let r = measure_star(&view, x, y, &params, &InstrumentalMagnitude::default()).unwrap();
            fluxes.push(r.star);
        }
        for f in &fluxes[1..] {
            assert!((f - fluxes[0]).abs() / fluxes[0] < 0.005);
        }
    }

    #[test]
    fn test_scintillation_term() {
        let site = ScintillationParams {
            aperture_cm: 20.0,
            altitude_m: 0.0,
        };
        let exposure = ExposureParams {
            exptime: 60.0,
            airmass: 1.0,
            ..Default::default()
        };
        let frac = scintillation_fraction(&site, &exposure);
        let expected = 0.09 * 20.0_f64.powf(-2.0 / 3.0) / 120.0_f64.sqrt();
        assert_relative_eq!(frac, expected, max_relative = 1e-12);

        let high = ScintillationParams {
            altitude_m: 8000.0,
            ..site
        };
        let thick = ExposureParams {
            airmass: 2.0,
            ..exposure.clone()
        };
        let scaled = scintillation_fraction(&high, &thick);
        let factor = 2.0_f64.powf(1.75) * (-1.0_f64).exp();
        assert_relative_eq!(scaled, expected * factor, max_relative = 1e-12);

        let frame = star_frame(exposure);
        let view = frame.view(0).unwrap();
        let params = ApertureParams {
            scintillation: Some(site),
            ..Default::default()
        };
        let with = measure_star(&view, 32.3, 31.8, &params, &InstrumentalMagnitude::default())
            .unwrap();
        let without = measure_star(
            &view,
            32.3,
            31.8,
            &ApertureParams::default(),
            &InstrumentalMagnitude::default(),
        )
        .unwrap();
        assert_relative_eq!(with.noise.scint, frac * with.star, max_relative = 1e-12);
        assert_eq!(with.flux_err, without.flux_err);
        assert!(with.magerr > without.magerr);
    }

    #[test]
    fn test_measure_planes_color() {
        let plane = |v: f32| {
            let mut p = vec![v; 48 * 48];
            p[24 * 48 + 24] = v + 500.0;
            p
        };
        let frame =
            Frame::from_planes(48, 48, vec![plane(10.0), plane(20.0), plane(30.0)]).unwrap();
        let results = measure_planes(
            &frame,
            24.0,
            24.0,
            &ApertureParams::default(),
            &InstrumentalMagnitude::default(),
        )
        .unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(
            results.iter().map(|(p, _)| *p).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        for (_, r) in &results {
            assert_relative_eq!(r.star, 500.0, max_relative = 1e-9);
        }

        let mono = flat_frame(5.0);
        let results = measure_planes(
            &mono,
            24.0,
            24.0,
            &ApertureParams::default(),
            &InstrumentalMagnitude::default(),
        )
        .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, 0);
    }
}
