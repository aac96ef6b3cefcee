use serde::{Deserialize, Serialize};

/// Smallest flux passed into a logarithm. Fluxes and errors are clamped up
/// to this value before conversion.
pub const MIN_FLUX: f64 = 1.0e-6;

/// Monotonic flux to magnitude conversion. Zero-point calibration lives
/// with whoever implements this.
pub trait MagnitudeScale {
    fn flux_to_magnitude(&self, flux: f64) -> f64;
}

/// Instrumental magnitude `zero_point - 2.5 * log10(flux)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InstrumentalMagnitude {
    pub zero_point: f64,
}

impl Default for InstrumentalMagnitude {
    fn default() -> Self {
        Self { zero_point: 0.0 }
    }
}

impl MagnitudeScale for InstrumentalMagnitude {
    fn flux_to_magnitude(&self, flux: f64) -> f64 {
        self.zero_point - 2.5 * flux.log10()
    }
}

impl<F: Fn(f64) -> f64> MagnitudeScale for F {
    fn flux_to_magnitude(&self, flux: f64) -> f64 {
        self(flux)
    }
}
