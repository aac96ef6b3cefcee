use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use psf_phot::{ApertureParams, ExposureParams, ScintillationParams, SkyMethod};

#[derive(Parser)]
#[command(name = "aphot")]
#[command(about = "Aperture photometry and profile fitting for FITS frames", long_about = None)]
pub struct Cli {
    /// Enable debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Measure magnitudes of one or more stars
    Measure {
        /// FITS file to measure
        fits: PathBuf,

        /// Star position as X,Y (repeatable)
        #[arg(short, long = "star", value_parser = parse_position, required = true)]
        stars: Vec<(f64, f64)>,

        /// Band names for the frame planes, comma separated (e.g. B,V,R)
        #[arg(long, value_delimiter = ',')]
        bands: Vec<String>,

        /// Magnitude zero point
        #[arg(long, default_value = "0.0")]
        zero_point: f64,

        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,

        #[command(flatten)]
        aperture: ApertureOptions,

        #[command(flatten)]
        exposure: ExposureOptions,
    },

    /// Estimate the sky background around a position
    Sky {
        /// FITS file to read
        fits: PathBuf,

        /// X coordinate
        x: f64,

        /// Y coordinate
        y: f64,

        /// Plane to use for color frames (0 = first)
        #[arg(long, default_value = "0")]
        plane: usize,

        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,

        #[command(flatten)]
        aperture: ApertureOptions,
    },

    /// Radial profile and Gaussian FWHM of a star
    Profile {
        /// FITS file to read
        fits: PathBuf,

        /// X coordinate
        x: f64,

        /// Y coordinate
        y: f64,

        /// Profile radius in pixels
        #[arg(long, default_value = "8.0")]
        radius: f64,

        /// Plane to use for color frames (0 = first)
        #[arg(long, default_value = "0")]
        plane: usize,

        /// Also print every profile point
        #[arg(long)]
        points: bool,

        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,

        #[command(flatten)]
        aperture: ApertureOptions,

        #[command(flatten)]
        exposure: ExposureOptions,
    },

    /// Curve of growth of a star
    Growth {
        /// FITS file to read
        fits: PathBuf,

        /// X coordinate
        x: f64,

        /// Y coordinate
        y: f64,

        /// Number of radius steps (radius = 1 + 0.5 * step)
        #[arg(long, default_value = "20")]
        steps: usize,

        /// Plane to use for color frames (0 = first)
        #[arg(long, default_value = "0")]
        plane: usize,

        /// Normalized flux change per step considered converged
        #[arg(long, default_value = "0.01")]
        tolerance: f64,

        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,

        #[command(flatten)]
        aperture: ApertureOptions,
    },
}

/// Parse an `X,Y` pair.
pub fn parse_position(s: &str) -> Result<(f64, f64), String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("Expected X,Y but got '{}'", s))?;
    let x = x
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("Invalid X coordinate '{}': {}", x, e))?;
    let y = y
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("Invalid Y coordinate '{}': {}", y, e))?;
    Ok((x, y))
}

#[derive(Parser, Debug, Clone, Default)]
pub struct ApertureOptions {
    /// JSON file with aperture parameters; flags below override it
    #[arg(long)]
    pub params: Option<PathBuf>,

    /// Star aperture radius
    #[arg(long)]
    pub r1: Option<f64>,

    /// Sky annulus inner radius
    #[arg(long)]
    pub r2: Option<f64>,

    /// Sky annulus outer radius
    #[arg(long)]
    pub r3: Option<f64>,

    /// Sky method (average, median, kappa-sigma, synthetic-mode)
    #[arg(long)]
    pub sky_method: Option<SkyMethod>,

    /// Sky outlier rejection threshold in sigmas
    #[arg(long)]
    pub sigmas: Option<f64>,

    /// Rings of neighbours rejected with each sky outlier (0-3)
    #[arg(long)]
    pub grow: Option<usize>,

    /// Saturation limit in ADU
    #[arg(long)]
    pub saturation: Option<f64>,

    /// Measure at the given positions without centering
    #[arg(long)]
    pub no_center: bool,

    /// Largest accepted centering correction in pixels
    #[arg(long)]
    pub max_center_error: Option<f64>,

    /// Telescope aperture in cm; enables the scintillation term
    #[arg(long)]
    pub telescope_cm: Option<f64>,

    /// Observatory altitude in metres
    #[arg(long, default_value = "0.0")]
    pub altitude: f64,
}

impl ApertureOptions {
    pub fn to_aperture_params(&self) -> anyhow::Result<ApertureParams> {
        let mut params = match &self.params {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read parameter file: {}", path.display()))?;
                serde_json::from_str::<ApertureParams>(&text)
                    .with_context(|| format!("Invalid parameter file: {}", path.display()))?
            }
            None => ApertureParams::default(),
        };

        if let Some(r1) = self.r1 {
            params.r1 = r1;
        }
        if let Some(r2) = self.r2 {
            params.r2 = r2;
        }
        if let Some(r3) = self.r3 {
            params.r3 = r3;
        }
        if let Some(method) = self.sky_method {
            params.sky_method = method;
        }
        if let Some(sigmas) = self.sigmas {
            params.sigmas = sigmas;
        }
        if let Some(grow) = self.grow {
            params.grow = grow;
        }
        if let Some(saturation) = self.saturation {
            params.saturation = saturation;
        }
        if self.no_center {
            params.auto_center = false;
        }
        if let Some(max_err) = self.max_center_error {
            params.max_center_error = max_err;
        }
        if let Some(aperture_cm) = self.telescope_cm {
            params.scintillation = Some(ScintillationParams {
                aperture_cm,
                altitude_m: self.altitude,
            });
        }

        params.validate()?;
        Ok(params)
    }
}

#[derive(Parser, Debug, Clone, Default)]
pub struct ExposureOptions {
    /// Gain in electrons per ADU (overrides GAIN)
    #[arg(long)]
    pub gain: Option<f64>,

    /// Read noise in ADU (overrides RDNOISE)
    #[arg(long)]
    pub read_noise: Option<f64>,

    /// Relative flat-field noise (overrides FLATNOIS)
    #[arg(long)]
    pub flat_noise: Option<f64>,

    /// Bias level in ADU (overrides DCBIAS)
    #[arg(long)]
    pub bias: Option<f64>,

    /// Exposure time in seconds (overrides EXPTIME)
    #[arg(long)]
    pub exptime: Option<f64>,

    /// Airmass (overrides AIRMASS)
    #[arg(long)]
    pub airmass: Option<f64>,
}

impl ExposureOptions {
    pub fn apply(&self, exposure: &mut ExposureParams) {
        if let Some(v) = self.gain {
            exposure.gain = v;
        }
        if let Some(v) = self.read_noise {
            exposure.read_noise = v;
        }
        if let Some(v) = self.flat_noise {
            exposure.flat_noise = v;
        }
        if let Some(v) = self.bias {
            exposure.bias = v;
        }
        if let Some(v) = self.exptime {
            exposure.exptime = v;
        }
        if let Some(v) = self.airmass {
            exposure.airmass = v;
        }
    }
}
