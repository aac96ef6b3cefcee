pub mod aperture;
pub mod centering;
pub mod error;
pub mod frame;
pub mod growth;
pub mod magnitude;
pub mod params;
pub mod patch;
pub mod photometry;
pub mod profile;
pub mod simplex;
pub mod sky;
pub mod stats;

#[cfg(test)]
mod test_support;

// Re-export commonly used items
pub use aperture::Mask;
pub use centering::{center_star, measure_sample, Centroid, MomentCentroider, StarFinder};
pub use error::{PhotometryError, BIG_ERR};
pub use frame::{ExposureParams, Frame, PlaneView};
pub use growth::{growth_curve, GrowthCurve};
pub use magnitude::{InstrumentalMagnitude, MagnitudeScale};
pub use params::{ApertureParams, ScintillationParams, SkyMethod};
pub use photometry::{measure_planes, measure_star, MeasureFlags, PhotometryResult, StarSample};
pub use profile::{fit_1d_gaussian, fit_profile_fwhm, radial_profile, ProfileFit, RadialProfile};
pub use sky::{estimate_sky, SkyEstimate};
pub use stats::{compute_stats, RegionStats};
