use thiserror::Error;

/// Sentinel for "error effectively unbounded". Callers should treat any
/// error at or above this value as an unusable measurement.
pub const BIG_ERR: f64 = 1.0e10;

/// Contract violations raised by the photometry core.
///
/// Degenerate statistics, saturation and faintness are *not* errors; they are
/// reported through `BIG_ERR` and result flags instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PhotometryError {
    /// Star position lies outside the frame.
    #[error("position ({x:.2}, {y:.2}) is outside the {width}x{height} frame")]
    OutOfBounds {
        x: f64,
        y: f64,
        width: usize,
        height: usize,
    },

    /// A weight mask was requested with a zero dimension.
    #[error("cannot create a {width}x{height} weight mask")]
    EmptyMask { width: usize, height: usize },

    /// Aperture radii are not ordered `0 < r1`, `r2 < r3`.
    #[error("invalid aperture radii r1={r1}, r2={r2}, r3={r3}")]
    InvalidAperture { r1: f64, r2: f64, r3: f64 },

    /// Requested plane does not exist in the frame.
    #[error("plane {plane} requested but frame has {planes} plane(s)")]
    NoSuchPlane { plane: usize, planes: usize },

    /// Growth curve could not be normalised (non-positive flux at r1).
    #[error("growth curve reference flux at r={radius:.2} is not positive")]
    NoReferenceFlux { radius: f64 },

    /// Centering failed and the caller required a centered star.
    #[error("no star found near ({x:.2}, {y:.2})")]
    StarNotFound { x: f64, y: f64 },
}

pub type Result<T> = std::result::Result<T, PhotometryError>;
