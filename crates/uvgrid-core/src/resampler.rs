//! Visibility Resampler
//!
//! [`VisResampler`] is the per-worker entry point for both directions of
//! the transform:
//!
//! - [`VisResampler::grid_samples`] scatters every valid sample of a buffer
//!   onto a grid through its convolution kernel, accumulating the weight sum
//!   per (channel, polarization).
//! - [`VisResampler::degrid_samples`] gathers a prediction for every sample
//!   from a model grid.
//!
//! One resampler holds the mutable per-worker state (kernel memo and
//! phase-gradient cache), so it is never shared between threads; the kernel
//! provider is.
//!
//! ## Conjugate Symmetry
//!
//! With `conjugate_symmetry` enabled, a sample with `w < 0` is processed as
//! its Hermitian mirror at `(-u, -v, -w)` with conjugated value and phase
//! factor and the conjugate kernel, so only half of the w-planes need
//! tabulating.
//!
//! ## Example
//!
//! ```rust
//! use uvgrid_core::prelude::*;
//!
//! let mut table = KernelTable::new();
//! table.insert(KernelContext::new(0.0, 0, 0, 1.0e9, 0), KernelStencil::delta());
//!
//! let mut vb = VisBuffer::new(1, vec![1.0e9], 1, 16, 16);
//! vb.set_intensity(0, 0, 0, 2.0);
//!
//! let mut grid: Grid<f64> = Grid::new(GridShape::new(16, 16, 1, 1));
//! let mut weights = SumWeights::new(1, 1);
//! let mut resampler = VisResampler::new(&table, ResamplerOptions::default(), KernelTolerance::default());
//! let stats = resampler.grid_samples(&vb, &mut grid.view_mut(), &mut weights, false).unwrap();
//!
//! assert_eq!(stats.gridded, 1);
//! assert_eq!(grid.get(8, 8, 0, 0).re, 2.0);
//! ```

use num_complex::{Complex32, Complex64};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::accumulate;
use crate::buffer::{BufferContext, ResampleMaps, Sample, VisBuffer};
use crate::coords::{self, Footprint};
use crate::grid::{GridView, GridViewMut, SumWeights};
use crate::kernel::{KernelProvider, KernelTolerance, KernelView};
use crate::phase_gradient::PhaseGradientCache;
use crate::selector::KernelSelector;
use crate::stats::ResampleStats;
use crate::types::{GridPrecision, ResampleError, ResampleResult, Visibility};

/// Post-processing of gathered predictions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegridNormalization {
    /// Raw `Σ grid * conj(k)`.
    #[default]
    None,
    /// Divide by `Σ |k|` over the support window.
    KernelSum,
}

/// Behaviour switches of the resampler.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResamplerOptions {
    /// Process `w < 0` samples on the conjugate path.
    pub conjugate_symmetry: bool,
    /// Apply the pointing phase ramp when a buffer carries pointing offsets.
    pub phase_gradient: bool,
    pub degrid_normalization: DegridNormalization,
}

impl Default for ResamplerOptions {
    fn default() -> Self {
        Self {
            conjugate_symmetry: true,
            phase_gradient: true,
            degrid_normalization: DegridNormalization::None,
        }
    }
}

/// Output of a degridding call.
#[derive(Debug, Clone, PartialEq)]
pub struct Degridded {
    /// One prediction per sample, in buffer storage order. Skipped samples are zero.
    pub predicted: Vec<Visibility>,
    pub stats: ResampleStats,
}

/// Where one sample lands and with which kernel.
struct Placement<'k> {
    kernel: KernelView<'k>,
    footprint: Footprint,
    conjugate: bool,
    phasor: Complex64,
}

enum Skip {
    Flagged,
    Unmapped,
    OffGrid,
}

impl Skip {
    fn count(&self, stats: &mut ResampleStats) {
        match self {
            Skip::Flagged => stats.flagged += 1,
            Skip::Unmapped => stats.unmapped += 1,
            Skip::OffGrid => stats.off_grid += 1,
        }
    }
}

/// Per-worker gridder/degridder.
pub struct VisResampler<'p, P: KernelProvider + ?Sized> {
    selector: KernelSelector<'p, P>,
    phase_cache: PhaseGradientCache,
    options: ResamplerOptions,
    bound_maps: Option<ResampleMaps>,
}

impl<'p, P: KernelProvider + ?Sized> VisResampler<'p, P> {
    pub fn new(provider: &'p P, options: ResamplerOptions, tolerance: KernelTolerance) -> Self {
        Self {
            selector: KernelSelector::new(provider, tolerance),
            phase_cache: PhaseGradientCache::new(),
            options,
            bound_maps: None,
        }
    }

    pub fn options(&self) -> ResamplerOptions {
        self.options
    }

    pub fn tolerance(&self) -> KernelTolerance {
        self.selector.tolerance()
    }

    pub fn set_options(&mut self, options: ResamplerOptions) {
        if options != self.options {
            self.options = options;
            self.reset();
        }
    }

    pub fn set_tolerance(&mut self, tolerance: KernelTolerance) {
        if tolerance != self.selector.tolerance() {
            self.selector.set_tolerance(tolerance);
            self.phase_cache.reset();
        }
    }

    /// Drop all per-worker caches.
    pub fn reset(&mut self) {
        self.selector.reset();
        self.phase_cache.reset();
        self.bound_maps = None;
    }

    pub fn phase_cache(&self) -> &PhaseGradientCache {
        &self.phase_cache
    }

    /// Caches are valid for one set of maps; new maps invalidate them.
    fn bind(&mut self, maps: &ResampleMaps) {
        if self.bound_maps.as_ref() != Some(maps) {
            self.selector.reset();
            self.phase_cache.reset();
            self.bound_maps = Some(maps.clone());
        }
    }

    fn place(
        &mut self,
        ctx: &BufferContext<'_>,
        sample: &Sample,
        nx: usize,
        ny: usize,
    ) -> ResampleResult<Result<(Placement<'p>, usize, usize), Skip>> {
        let Sample { row, chan, pol, .. } = *sample;
        if !sample.valid {
            return Ok(Err(Skip::Flagged));
        }
        let (gchan, gpol) = match (ctx.grid_chan[chan], ctx.grid_pol[pol]) {
            (Some(c), Some(p)) => (c, p),
            _ => return Ok(Err(Skip::Unmapped)),
        };

        let conjugate = self.options.conjugate_symmetry && sample.uvw[2] < 0.0;
        let uvw = if conjugate { coords::mirrored(sample.uvw) } else { sample.uvw };
        let position = coords::grid_position(uvw, ctx.freq_scale[chan], ctx.maps);

        let wanted = KernelSelector::<P>::context(ctx, row, chan, pol, position.w_plane, conjugate);
        let kernel = self.selector.select(&wanted, conjugate)?;

        let footprint = match position.footprint(kernel.oversampling()) {
            Some(fp) if fp.on_grid(kernel.support(), nx, ny) => fp,
            _ => return Ok(Err(Skip::OffGrid)),
        };

        let buffer = ctx.buffer;
        let phasor = coords::phasor(buffer.dphase[row], buffer.freq[chan]);
        let phasor = if conjugate { phasor.conj() } else { phasor };
        Ok(Ok((
            Placement {
                kernel,
                footprint,
                conjugate,
                phasor,
            },
            gchan,
            gpol,
        )))
    }

    fn correction<'c>(
        cache: &'c mut PhaseGradientCache,
        options: &ResamplerOptions,
        buffer: &VisBuffer,
        row: usize,
        kernel: &KernelView<'_>,
    ) -> Option<&'c [Complex32]> {
        if !options.phase_gradient {
            return None;
        }
        match &buffer.pointing_offsets {
            Some(offsets) => Some(cache.correction_for(offsets[row], kernel)),
            None => None,
        }
    }

    /// Grid every valid sample of `buffer` into `grid`.
    ///
    /// With `psf_only` the sample weight is gridded in place of the value.
    /// The buffer and its maps are validated before the grid is touched. A
    /// kernel provider failure part way through leaves earlier samples of
    /// this buffer in the grid; callers discard the grid on error.
    pub fn grid_samples<T: GridPrecision>(
        &mut self,
        buffer: &VisBuffer,
        grid: &mut GridViewMut<'_, T>,
        weights: &mut SumWeights,
        psf_only: bool,
    ) -> ResampleResult<ResampleStats> {
        let shape = grid.shape();
        let ctx = BufferContext::new(buffer, &shape)?;
        if !weights.matches(&shape) {
            return Err(ResampleError::GridShape(format!(
                "weight accumulator {}x{} does not match grid {}x{}",
                weights.nchan(),
                weights.npol(),
                shape.nchan,
                shape.npol
            )));
        }
        self.bind(&buffer.maps);

        let mut stats = ResampleStats::default();
        for row in 0..buffer.n_rows() {
            for chan in 0..buffer.n_chan() {
                for pol in 0..buffer.n_pol() {
                    let sample = buffer.sample(row, chan, pol);
                    let (placement, gchan, gpol) =
                        match self.place(&ctx, &sample, shape.nx, shape.ny)? {
                            Ok(p) => p,
                            Err(skip) => {
                                skip.count(&mut stats);
                                continue;
                            }
                        };

                    let weight = sample.weight as f64;
                    let value = if psf_only {
                        Complex64::new(weight, 0.0)
                    } else {
                        let v = sample.value;
                        let v = if placement.conjugate { v.conj() } else { v };
                        Complex64::new(v.re as f64, v.im as f64) * weight * placement.phasor
                    };

                    let correction = Self::correction(
                        &mut self.phase_cache,
                        &self.options,
                        buffer,
                        row,
                        &placement.kernel,
                    );
                    let norm = accumulate::scatter(
                        grid,
                        &placement.footprint,
                        gchan,
                        gpol,
                        &placement.kernel,
                        correction,
                        T::complex_from_f64(value),
                    );
                    weights.add(gchan, gpol, weight * norm);
                    stats.gridded += 1;
                }
            }
        }

        debug!(
            rows = buffer.n_rows(),
            precision = T::NAME,
            psf_only,
            gridded = stats.gridded,
            flagged = stats.flagged,
            off_grid = stats.off_grid,
            unmapped = stats.unmapped,
            "Gridded buffer"
        );
        Ok(stats)
    }

    /// Predict every valid sample of `buffer` from `grid`.
    pub fn degrid_samples<T: GridPrecision>(
        &mut self,
        buffer: &VisBuffer,
        grid: &GridView<'_, T>,
    ) -> ResampleResult<Degridded> {
        let shape = grid.shape();
        let ctx = BufferContext::new(buffer, &shape)?;
        self.bind(&buffer.maps);

        let mut predicted = vec![Visibility::new(0.0, 0.0); buffer.len()];
        let mut stats = ResampleStats::default();
        for row in 0..buffer.n_rows() {
            for chan in 0..buffer.n_chan() {
                for pol in 0..buffer.n_pol() {
                    let sample = buffer.sample(row, chan, pol);
                    let (placement, gchan, gpol) =
                        match self.place(&ctx, &sample, shape.nx, shape.ny)? {
                            Ok(p) => p,
                            Err(skip) => {
                                skip.count(&mut stats);
                                continue;
                            }
                        };

                    let correction = Self::correction(
                        &mut self.phase_cache,
                        &self.options,
                        buffer,
                        row,
                        &placement.kernel,
                    );
                    let (sum, norm) = accumulate::gather(
                        grid,
                        &placement.footprint,
                        gchan,
                        gpol,
                        &placement.kernel,
                        correction,
                    );

                    let mut value = Complex64::new(sum.re.into_f64(), sum.im.into_f64());
                    if placement.conjugate {
                        value = value.conj();
                    }
                    // Undo the phase rotation of the original sample
                    let phasor = if placement.conjugate {
                        placement.phasor
                    } else {
                        placement.phasor.conj()
                    };
                    value *= phasor;
                    if self.options.degrid_normalization == DegridNormalization::KernelSum && norm > 0.0 {
                        value /= norm;
                    }
                    predicted[buffer.index(row, chan, pol)] =
                        Visibility::new(value.re as f32, value.im as f32);
                    stats.gridded += 1;
                }
            }
        }

        debug!(
            rows = buffer.n_rows(),
            precision = T::NAME,
            predicted = stats.gridded,
            flagged = stats.flagged,
            off_grid = stats.off_grid,
            unmapped = stats.unmapped,
            "Degridded buffer"
        );
        Ok(Degridded { predicted, stats })
    }

    /// Degrid into the model column of `buffer`.
    pub fn degrid_into<T: GridPrecision>(
        &mut self,
        buffer: &mut VisBuffer,
        grid: &GridView<'_, T>,
    ) -> ResampleResult<ResampleStats> {
        let Degridded { predicted, stats } = self.degrid_samples(buffer, grid)?;
        buffer.model = predicted;
        Ok(stats)
    }
}
