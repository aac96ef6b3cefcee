use serde::{Deserialize, Serialize};

use crate::error::{PhotometryError, Result};

/// Sky background estimation method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkyMethod {
    /// Plain weighted mean of the annulus
    Average,
    /// Median of the annulus core pixels
    Median,
    /// Mean after iterative kappa-sigma clipping
    KappaSigma,
    /// Pearson mode estimate after clipping: `3 * median - 2 * mean`
    SyntheticMode,
}

impl SkyMethod {
    /// Whether the method runs iterative outlier rejection.
    pub fn clips(&self) -> bool {
        matches!(self, SkyMethod::KappaSigma | SkyMethod::SyntheticMode)
    }
}

impl std::str::FromStr for SkyMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "average" | "mean" => Ok(SkyMethod::Average),
            "median" => Ok(SkyMethod::Median),
            "kappa-sigma" | "kappa_sigma" | "ksigma" => Ok(SkyMethod::KappaSigma),
            "synthetic-mode" | "synthetic_mode" | "mode" => Ok(SkyMethod::SyntheticMode),
            _ => Err(format!("Unknown sky method: {}", s)),
        }
    }
}

/// Telescope/site data for the scintillation noise term.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScintillationParams {
    /// Telescope aperture diameter in centimetres
    pub aperture_cm: f64,
    /// Observatory altitude in metres
    pub altitude_m: f64,
}

/// Aperture photometry configuration, passed by value into every call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApertureParams {
    /// Star aperture radius
    pub r1: f64,
    /// Sky annulus inner radius
    pub r2: f64,
    /// Sky annulus outer radius
    pub r3: f64,
    pub sky_method: SkyMethod,
    /// Outlier rejection threshold in sigmas above the median
    pub sigmas: f64,
    /// Region-grow radius (rings) around rejected sky pixels
    pub grow: usize,
    /// Pixel value above which a star is flagged as burned out
    pub saturation: f64,
    pub auto_center: bool,
    /// Largest centering shift accepted, in pixels
    pub max_center_error: f64,
    pub scintillation: Option<ScintillationParams>,
}

impl Default for ApertureParams {
    fn default() -> Self {
        Self {
            r1: 5.0,
            r2: 9.0,
            r3: 13.0,
            sky_method: SkyMethod::KappaSigma,
            sigmas: 3.0,
            grow: 1,
            saturation: 65000.0,
            auto_center: true,
            max_center_error: 1.5,
            scintillation: None,
        }
    }
}

impl ApertureParams {
    pub fn validate(&self) -> Result<()> {
        let ok = self.r1 > 0.0 && self.r2 >= 0.0 && self.r2 < self.r3;
        if ok && self.r1.is_finite() && self.r3.is_finite() {
            Ok(())
        } else {
            Err(PhotometryError::InvalidAperture {
                r1: self.r1,
                r2: self.r2,
                r3: self.r3,
            })
        }
    }
}
