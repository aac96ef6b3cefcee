use anyhow::{Context, Result};
use fitrs::{Fits, FitsData, FitsDataArray, HeaderValue};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::PhotometryError;

/// Detector/exposure parameters consumed by the noise model.
///
/// `gain` is in electrons per ADU; `read_noise` and `bias` are in ADU;
/// `flat_noise` is the relative flat-field error (0.01 = 1%).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExposureParams {
    pub gain: f64,
    pub read_noise: f64,
    pub flat_noise: f64,
    pub bias: f64,
    /// Exposure time in seconds, only used for scintillation
    pub exptime: f64,
    pub airmass: f64,
}

impl Default for ExposureParams {
    fn default() -> Self {
        Self {
            gain: 1.0,
            read_noise: 0.0,
            flat_noise: 0.0,
            bias: 0.0,
            exptime: 1.0,
            airmass: 1.0,
        }
    }
}

/// Pixel frame with one or more planes (monochrome or color).
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: usize,
    pub height: usize,
    planes: Vec<Vec<f32>>,
    pub exposure: ExposureParams,
}

/// Read-only view of a single plane, the unit every core routine works on.
#[derive(Debug, Clone, Copy)]
pub struct PlaneView<'a> {
    pub width: usize,
    pub height: usize,
    data: &'a [f32],
    pub exposure: &'a ExposureParams,
}

impl<'a> PlaneView<'a> {
    /// Pixel at integer coordinates. Callers clip through `patch` first.
    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> f64 {
        self.data[y * self.width + x] as f64
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= 0.0 && y >= 0.0 && x < self.width as f64 && y < self.height as f64
    }

    /// Fail with `OutOfBounds` unless `(x, y)` lies inside the frame.
    pub fn check_bounds(&self, x: f64, y: f64) -> Result<(), PhotometryError> {
        if self.contains(x, y) {
            Ok(())
        } else {
            Err(PhotometryError::OutOfBounds {
                x,
                y,
                width: self.width,
                height: self.height,
            })
        }
    }
}

impl Frame {
    /// Monochrome frame from row-major data.
    pub fn new(width: usize, height: usize, data: Vec<f32>) -> Result<Self> {
        Self::from_planes(width, height, vec![data])
    }

    pub fn from_planes(width: usize, height: usize, planes: Vec<Vec<f32>>) -> Result<Self> {
        if width == 0 || height == 0 || planes.is_empty() {
            anyhow::bail!("frame must have non-zero size and at least one plane");
        }
        for (i, plane) in planes.iter().enumerate() {
            if plane.len() != width * height {
                anyhow::bail!(
                    "plane {} size mismatch: expected {} pixels, got {}",
                    i,
                    width * height,
                    plane.len()
                );
            }
        }
        Ok(Self {
            width,
            height,
            planes,
            exposure: ExposureParams::default(),
        })
    }

    pub fn with_exposure(mut self, exposure: ExposureParams) -> Self {
        self.exposure = exposure;
        self
    }

    pub fn plane_count(&self) -> usize {
        self.planes.len()
    }

    pub fn is_color(&self) -> bool {
        self.planes.len() > 1
    }

    /// View of a plane. Plane 0 means "no plane selected" and maps to the
    /// first (or only) plane; planes `1..=n` select color planes.
    pub fn view(&self, plane: usize) -> Result<PlaneView<'_>, PhotometryError> {
        let index = plane.saturating_sub(1);
        let data = self.planes.get(index).ok_or(PhotometryError::NoSuchPlane {
            plane,
            planes: self.planes.len(),
        })?;
        Ok(PlaneView {
            width: self.width,
            height: self.height,
            data,
            exposure: &self.exposure,
        })
    }

    /// Load the primary HDU of a FITS file. BZERO/BSCALE are applied since
    /// photometry needs physical values; a NAXIS3 cube becomes color planes.
    pub fn from_fits(path: &Path) -> Result<Self> {
        let fits = Fits::open(path)
            .with_context(|| format!("Failed to open FITS file: {}", path.display()))?;

        let hdu = fits
            .get(0)
            .ok_or_else(|| anyhow::anyhow!("No primary HDU found in FITS file"))?;

        let naxis = header_int(hdu.value("NAXIS")).context("Missing NAXIS header")?;
        let (width, height, depth) = image_shape(
            naxis,
            header_int(hdu.value("NAXIS1")),
            header_int(hdu.value("NAXIS2")),
            header_int(hdu.value("NAXIS3")),
        )?;

        let bzero = header_real(hdu.value("BZERO")).unwrap_or(0.0);
        let bscale = header_real(hdu.value("BSCALE")).unwrap_or(1.0);
        let scale = |v: f64| (v * bscale + bzero) as f32;

        let data: Vec<f32> = match hdu.read_data() {
            FitsData::Characters(_) => {
                return Err(anyhow::anyhow!(
                    "FITS file contains character data, not image data"
                ));
            }
            FitsData::IntegersI32(FitsDataArray { data, .. }) => data
                .into_iter()
                .map(|x| x.map(|v| scale(v as f64)).unwrap_or(0.0))
                .collect(),
            FitsData::IntegersU32(FitsDataArray { data, .. }) => data
                .into_iter()
                .map(|x| x.map(|v| scale(v as f64)).unwrap_or(0.0))
                .collect(),
            FitsData::FloatingPoint32(FitsDataArray { data, .. }) => {
                data.into_iter().map(|v| scale(v as f64)).collect()
            }
            FitsData::FloatingPoint64(FitsDataArray { data, .. }) => {
                data.into_iter().map(scale).collect()
            }
        };

        let plane_len = width * height;
        if data.len() < plane_len * depth {
            return Err(anyhow::anyhow!(
                "Data size mismatch: expected {} pixels, got {}",
                plane_len * depth,
                data.len()
            ));
        }
        let planes = data
            .chunks_exact(plane_len)
            .take(depth)
            .map(|c| c.to_vec())
            .collect();

        let mut exposure = ExposureParams::default();
        if let Some(v) = header_real(hdu.value("GAIN")) {
            exposure.gain = v;
        }
        if let Some(v) = header_real(hdu.value("RDNOISE")) {
            exposure.read_noise = v;
        }
        if let Some(v) = header_real(hdu.value("FLATNOIS")) {
            exposure.flat_noise = v;
        }
        if let Some(v) = header_real(hdu.value("DCBIAS")) {
            exposure.bias = v;
        }
        if let Some(v) = header_real(hdu.value("EXPTIME")) {
            exposure.exptime = v;
        }
        if let Some(v) = header_real(hdu.value("AIRMASS")) {
            exposure.airmass = v;
        }

        tracing::debug!(
            "Loaded {} ({}x{}, {} plane(s), gain={}, rdnoise={})",
            path.display(),
            width,
            height,
            depth,
            exposure.gain,
            exposure.read_noise
        );

        Ok(Self::from_planes(width, height, planes)?.with_exposure(exposure))
    }
}

/// Width, height and plane count from the NAXIS keywords.
fn image_shape(
    naxis: i64,
    naxis1: Option<i64>,
    naxis2: Option<i64>,
    naxis3: Option<i64>,
) -> Result<(usize, usize, usize)> {
    if naxis < 2 {
        return Err(anyhow::anyhow!(
            "FITS file does not contain 2D image data (NAXIS={})",
            naxis
        ));
    }
    let width = naxis1.context("Missing NAXIS1 header")?;
    let height = naxis2.context("Missing NAXIS2 header")?;
    if width <= 0 || height <= 0 {
        return Err(anyhow::anyhow!("Invalid image dimensions {}x{}", width, height));
    }
    let depth = if naxis >= 3 {
        naxis3.unwrap_or(1).max(1)
    } else {
        1
    };
    Ok((width as usize, height as usize, depth as usize))
}

fn header_int(value: Option<&HeaderValue>) -> Option<i64> {
    match value? {
        HeaderValue::IntegerNumber(n) => Some(*n as i64),
        HeaderValue::RealFloatingNumber(f) => Some(*f as i64),
        _ => None,
    }
}

fn header_real(value: Option<&HeaderValue>) -> Option<f64> {
    match value? {
        HeaderValue::IntegerNumber(n) => Some(*n as f64),
        HeaderValue::RealFloatingNumber(f) => Some(*f),
        HeaderValue::CharacterString(s) => s.trim().parse().ok(),
        _ => None,
    }
}
