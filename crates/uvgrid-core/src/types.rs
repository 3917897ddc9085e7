//! Core types for visibility resampling
//!
//! This module defines the numeric types shared by every stage of the
//! gridder: the complex sample type, the precision seam used to instantiate
//! the resampler for single- and double-precision grids, and the error type
//! returned by all fallible operations.
//!
//! ## Precision
//!
//! Visibilities and convolution kernels are stored in single precision
//! (`Complex32`), like the measurement data they come from. The grid may be
//! single or double precision; the accumulation loops are written once over
//! [`GridPrecision`] and instantiated for `f32` and `f64`.
//!
//! ```rust
//! use uvgrid_core::types::GridPrecision;
//!
//! assert_eq!(<f64 as GridPrecision>::from_f32(0.5), 0.5);
//! assert_eq!(<f32 as GridPrecision>::NAME, "single");
//! ```

use num_complex::{Complex, Complex32};
use num_traits::{Float, NumAssign};
use std::fmt::Debug;

/// Complex visibility sample (single precision).
pub type Visibility = Complex32;

/// Complex kernel weight (single precision).
pub type KernelWeight = Complex32;

/// Speed of light in m/s, used to turn metres into wavelengths.
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Result type for resampling operations
pub type ResampleResult<T> = Result<T, ResampleError>;

/// Floating-point type a grid can be instantiated with.
///
/// This is the only generic seam of the accumulator: addressing, bounds
/// checks and kernel selection are precision independent.
pub trait GridPrecision:
    Float + NumAssign + Default + Debug + Send + Sync + 'static
{
    /// Human readable precision name used in log output.
    const NAME: &'static str;

    fn from_f32(v: f32) -> Self;
    fn from_f64(v: f64) -> Self;
    fn into_f32(self) -> f32;
    fn into_f64(self) -> f64;

    /// Widen a single-precision complex value into grid precision.
    #[inline]
    fn complex_from(c: Complex32) -> Complex<Self> {
        Complex::new(Self::from_f32(c.re), Self::from_f32(c.im))
    }

    #[inline]
    fn complex_from_f64(c: Complex<f64>) -> Complex<Self> {
        Complex::new(Self::from_f64(c.re), Self::from_f64(c.im))
    }

    /// Narrow a grid-precision complex value back to a visibility.
    #[inline]
    fn complex_to_visibility(c: Complex<Self>) -> Visibility {
        Complex32::new(c.re.into_f32(), c.im.into_f32())
    }
}

impl GridPrecision for f32 {
    const NAME: &'static str = "single";

    #[inline]
    fn from_f32(v: f32) -> Self {
        v
    }
    #[inline]
    fn from_f64(v: f64) -> Self {
        v as f32
    }
    #[inline]
    fn into_f32(self) -> f32 {
        self
    }
    #[inline]
    fn into_f64(self) -> f64 {
        self as f64
    }
}

impl GridPrecision for f64 {
    const NAME: &'static str = "double";

    #[inline]
    fn from_f32(v: f32) -> Self {
        v as f64
    }
    #[inline]
    fn from_f64(v: f64) -> Self {
        v
    }
    #[inline]
    fn into_f32(self) -> f32 {
        self as f32
    }
    #[inline]
    fn into_f64(self) -> f64 {
        self
    }
}

/// Errors that abort the processing of a buffer.
///
/// Per-sample skips (flagged, off-grid, unmapped) are not errors; they are
/// counted in [`crate::stats::ResampleStats`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResampleError {
    #[error("Buffer shape mismatch: {field} has length {actual}, expected {expected}")]
    BufferShape {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid {map} entry at index {index}: {reason}")]
    InvalidMap {
        map: &'static str,
        index: usize,
        reason: String,
    },

    #[error("Invalid grid: {0}")]
    GridShape(String),

    #[error("Kernel has zero support (empty {nx}x{ny} stencil)")]
    ZeroSupport { nx: usize, ny: usize },

    #[error("Kernel has zero oversampling")]
    ZeroOversampling,

    #[error("Kernel support window does not fit the stencil: {0}")]
    KernelWindow(String),

    #[error("No tabulated kernel within tolerance of {0}")]
    KernelContextNotFound(String),

    #[error("Kernel provider could not supply kernel {index}: {reason}")]
    KernelUnavailable { index: usize, reason: String },

    #[error("Invalid reduction state: expected {expected}, found {found}")]
    InvalidState {
        expected: &'static str,
        found: &'static str,
    },
}

impl ResampleError {
    /// Configuration errors indicate a caller/setup bug.
    pub fn is_configuration(&self) -> bool {
        !matches!(self, ResampleError::KernelUnavailable { .. })
    }
}
