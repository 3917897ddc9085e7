//! # Visibility Gridding Core
//!
//! This crate resamples interferometric visibilities between irregular
//! (u, v, w) sample positions and a regular complex Fourier grid through
//! oversampled convolution kernels, as used by A- and W-projection imaging.
//!
//! ## Overview
//!
//! - **Gridding**: scatter weighted, phase-rotated samples onto a grid and
//!   accumulate the weight sum per (channel, polarization)
//! - **Degridding**: gather a model prediction for every sample from a grid
//! - **Kernel selection**: resolve each sample to the nearest tabulated
//!   kernel context (orientation, baseline class, w-plane, frequency,
//!   polarization), with Hermitian mirroring of negative-w samples
//! - **Pointing correction**: a cached phase ramp for sub-pixel pointing
//!   offsets
//! - **Parallel passes**: private partial grids per worker, reduced once
//!   per pass
//!
//! ## Data Flow
//!
//! ```text
//! Grid:   VisBuffer → place (uvw, freq) → select kernel → scatter → Grid + SumWeights
//! Degrid: Grid → place (uvw, freq) → select kernel → gather → VisBuffer::model
//! ```
//!
//! ## Example
//!
//! ```rust
//! use uvgrid_core::prelude::*;
//!
//! let mut table = KernelTable::new();
//! table.insert(
//!     KernelContext::new(0.0, 0, 0, 1.0e9, 0),
//!     KernelStencil::gaussian(3, 4, 1.0).unwrap(),
//! );
//!
//! let mut vb = VisBuffer::new(1, vec![1.0e9], 1, 64, 64);
//! vb.set_intensity(0, 0, 0, 1.0);
//!
//! let shape = GridShape::new(64, 64, 1, 1);
//! let mut grid: Grid<f64> = Grid::new(shape);
//! let mut weights = SumWeights::for_shape(&shape);
//!
//! let mut resampler = VisResampler::new(&table, ResamplerOptions::default(), KernelTolerance::default());
//! resampler.grid_samples(&vb, &mut grid.view_mut(), &mut weights, false).unwrap();
//! let predicted = resampler.degrid_samples(&vb, &grid.view()).unwrap();
//! assert_eq!(predicted.stats.gridded, 1);
//! ```

pub mod accumulate;
pub mod buffer;
pub mod config;
pub mod coords;
pub mod grid;
pub mod kernel;
pub mod observe;
pub mod phase_gradient;
pub mod reduction;
pub mod resampler;
pub mod residual;
pub mod selector;
pub mod stats;
pub mod types;

#[cfg(feature = "parallel")]
pub mod parallel;

pub use types::{GridPrecision, ResampleError, ResampleResult, Visibility};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::buffer::{ResampleMaps, RowKernelKey, VisBuffer};
    pub use crate::config::UvgridConfig;
    pub use crate::grid::{Grid, GridShape, GridView, GridViewMut, SumWeights};
    pub use crate::kernel::{
        KernelContext, KernelProvider, KernelStencil, KernelTable, KernelTolerance, KernelView,
    };
    pub use crate::reduction::PartialGridSet;
    pub use crate::resampler::{DegridNormalization, Degridded, ResamplerOptions, VisResampler};
    pub use crate::residual::{apply_residuals, compute_residuals, ResidualSource};
    pub use crate::stats::ResampleStats;
    pub use crate::types::{GridPrecision, ResampleError, ResampleResult, Visibility};

    #[cfg(feature = "parallel")]
    pub use crate::parallel::ParallelGridder;
}
