//! Parallel Passes
//!
//! Runs gridding and degridding over many buffers using Rayon.
//! Enable with the `parallel` feature flag (on by default).
//!
//! ## Gridding
//!
//! Buffers are split into contiguous chunks, one chunk per worker; a buffer
//! is never split across workers. Each worker owns one resampler and one
//! partial grid, and the partial grids are summed once at the end of the
//! pass. If any buffer fails, the whole pass is discarded and the caller's
//! grid is left untouched.
//!
//! ## Degridding
//!
//! Samples are independent, so buffers are predicted in any order with one
//! resampler per Rayon job.
//!
//! ## Ordering
//!
//! The reduction order of partial grids depends on the worker count;
//! results agree to floating-point rounding only.

use rayon::prelude::*;
use std::time::Instant;
use tracing::{debug, warn};

use crate::buffer::VisBuffer;
use crate::config::UvgridConfig;
use crate::grid::{GridView, GridViewMut, SumWeights};
use crate::kernel::{KernelProvider, KernelTolerance};
use crate::reduction::PartialGridSet;
use crate::resampler::{ResamplerOptions, VisResampler};
use crate::stats::{PassCounters, ResampleStats};
use crate::types::{GridPrecision, ResampleResult};

/// Drives resampling passes over a shared kernel provider.
pub struct ParallelGridder<'p, P: KernelProvider + ?Sized> {
    provider: &'p P,
    options: ResamplerOptions,
    tolerance: KernelTolerance,
    workers: usize,
    counters: PassCounters,
}

impl<'p, P: KernelProvider + ?Sized> ParallelGridder<'p, P> {
    /// `workers == 0` uses one worker per Rayon thread.
    pub fn new(
        provider: &'p P,
        options: ResamplerOptions,
        tolerance: KernelTolerance,
        workers: usize,
    ) -> Self {
        let workers = if workers == 0 {
            rayon::current_num_threads()
        } else {
            workers
        };
        Self {
            provider,
            options,
            tolerance,
            workers,
            counters: PassCounters::new(),
        }
    }

    pub fn from_config(provider: &'p P, config: &UvgridConfig) -> Self {
        Self::new(
            provider,
            config.resampler,
            config.kernel_tolerance,
            config.parallel.workers,
        )
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Per-buffer counters accumulated over every pass.
    pub fn counters(&self) -> &PassCounters {
        &self.counters
    }

    /// Grid every buffer into `target`, accumulating weights into `weights`.
    ///
    /// `partials` must be idle; it is left idle on return.
    pub fn grid_pass<T: GridPrecision>(
        &self,
        buffers: &[VisBuffer],
        partials: &mut PartialGridSet<T>,
        target: &mut GridViewMut<'_, T>,
        weights: &mut SumWeights,
        psf_only: bool,
    ) -> ResampleResult<ResampleStats> {
        let workers = self.workers.min(buffers.len()).max(1);
        partials.begin(workers)?;
        let per_worker = ((buffers.len() + workers - 1) / workers).max(1);

        let outcome = match partials.partials_mut() {
            Ok(slots) => slots
                .par_iter_mut()
                .zip(buffers.par_chunks(per_worker))
                .try_for_each(|(partial, chunk)| {
                    let mut resampler = VisResampler::new(self.provider, self.options, self.tolerance);
                    for vb in chunk {
                        let start = Instant::now();
                        let stats = resampler.grid_samples(
                            vb,
                            &mut partial.grid.view_mut(),
                            &mut partial.weights,
                            psf_only,
                        )?;
                        self.counters
                            .record_buffer(&stats, start.elapsed().as_nanos() as u64);
                        partial.stats.merge(&stats);
                    }
                    Ok(())
                }),
            Err(e) => Err(e),
        };

        if let Err(e) = outcome {
            warn!(error = %e, buffers = buffers.len(), workers, "Discarding gridding pass");
            partials.discard();
            return Err(e);
        }

        let stats = partials.finalize(target, weights)?;
        debug!(
            buffers = buffers.len(),
            workers,
            precision = T::NAME,
            gridded = stats.gridded,
            skipped = stats.skipped(),
            "Gridding pass complete"
        );
        Ok(stats)
    }

    /// Predict every buffer from `grid` into its model column.
    pub fn degrid_pass<T: GridPrecision>(
        &self,
        buffers: &mut [VisBuffer],
        grid: &GridView<'_, T>,
    ) -> ResampleResult<ResampleStats> {
        let stats = buffers
            .par_iter_mut()
            .map_init(
                || VisResampler::new(self.provider, self.options, self.tolerance),
                |resampler, vb| {
                    let start = Instant::now();
                    let stats = resampler.degrid_into(vb, grid)?;
                    self.counters
                        .record_buffer(&stats, start.elapsed().as_nanos() as u64);
                    Ok(stats)
                },
            )
            .try_reduce(ResampleStats::default, |mut a, b| {
                a.merge(&b);
                Ok(a)
            })?;

        debug!(
            buffers = buffers.len(),
            precision = T::NAME,
            predicted = stats.gridded,
            skipped = stats.skipped(),
            "Degridding pass complete"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::RowKernelKey;
    use crate::grid::{Grid, GridShape};
    use crate::kernel::{KernelContext, KernelStencil, KernelTable};
    use crate::reduction::ReductionState;
    use crate::types::{ResampleError, SPEED_OF_LIGHT};
    use approx::assert_relative_eq;
    use num_complex::{Complex32, Complex64};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const N: usize = 48;

    fn table() -> KernelTable {
        let mut t = KernelTable::new();
        t.insert(
            KernelContext::new(0.0, 0, 0, SPEED_OF_LIGHT, 0),
            KernelStencil::gaussian(2, 4, 1.0).unwrap(),
        );
        t
    }

    fn buffers(count: usize, seed: u64) -> Vec<VisBuffer> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..count)
            .map(|_| {
                let mut vb = VisBuffer::new(32, vec![SPEED_OF_LIGHT], 1, N, N);
                for row in 0..32 {
                    let uvw = [
                        rng.gen_range(-18.0..18.0),
                        rng.gen_range(-18.0..18.0),
                        rng.gen_range(-3.0..3.0),
                    ];
                    vb.set_row(row, uvw, rng.gen_range(-0.2..0.2));
                    vb.set_value(row, 0, 0, Complex32::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)));
                }
                vb
            })
            .collect()
    }

    fn run(workers: usize, bufs: &[VisBuffer], t: &KernelTable) -> (Grid<f64>, SumWeights, ResampleStats) {
        let shape = GridShape::new(N, N, 1, 1);
        let gridder = ParallelGridder::new(t, ResamplerOptions::default(), KernelTolerance::default(), workers);
        let mut partials = PartialGridSet::new(shape);
        let mut grid: Grid<f64> = Grid::new(shape);
        let mut weights = SumWeights::for_shape(&shape);
        let stats = gridder
            .grid_pass(bufs, &mut partials, &mut grid.view_mut(), &mut weights, false)
            .unwrap();
        assert_eq!(partials.state(), ReductionState::Idle);
        assert_eq!(gridder.counters().buffers(), bufs.len() as u64);
        (grid, weights, stats)
    }

    #[test]
    fn test_worker_counts_agree() {
        let t = table();
        let bufs = buffers(24, 5);
        let (g1, w1, s1) = run(1, &bufs, &t);
        for workers in [2, 8] {
            let (g, w, s) = run(workers, &bufs, &t);
            assert_eq!(s, s1);
            assert_relative_eq!(w.get(0, 0), w1.get(0, 0), max_relative = 1e-12);
            for (a, b) in g.as_slice().iter().zip(g1.as_slice()) {
                assert_relative_eq!(a.re, b.re, epsilon = 1e-9);
                assert_relative_eq!(a.im, b.im, epsilon = 1e-9);
            }
        }
        assert_eq!(s1.total(), 24 * 32);
    }

    #[test]
    fn test_failed_buffer_discards_pass() {
        let t = table();
        let mut bufs = buffers(8, 9);
        bufs[5].maps.cf_map[3] = RowKernelKey::new(2.0, 0);

        let shape = GridShape::new(N, N, 1, 1);
        let gridder = ParallelGridder::new(&t, ResamplerOptions::default(), KernelTolerance::default(), 4);
        let mut partials = PartialGridSet::new(shape);
        let mut grid: Grid<f64> = Grid::new(shape);
        grid.view_mut().set(0, 0, 0, 0, Complex64::new(7.0, 0.0));
        let mut weights = SumWeights::for_shape(&shape);

        let err = gridder
            .grid_pass(&bufs, &mut partials, &mut grid.view_mut(), &mut weights, false)
            .unwrap_err();
        assert!(matches!(err, ResampleError::KernelContextNotFound(_)));
        assert_eq!(partials.state(), ReductionState::Idle);
        assert_eq!(weights.total(), 0.0);
        let touched = grid.as_slice().iter().filter(|v| v.norm() != 0.0).count();
        assert_eq!(touched, 1);
    }

    #[test]
    fn test_degrid_pass_matches_sequential() {
        let t = table();
        let shape = GridShape::new(N, N, 1, 1);
        let mut model: Grid<f64> = Grid::new(shape);
        let mut rng = StdRng::seed_from_u64(17);
        for y in 0..N {
            for x in 0..N {
                model
                    .view_mut()
                    .set(x, y, 0, 0, Complex64::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)));
            }
        }

        let mut parallel = buffers(12, 23);
        let sequential = parallel.clone();
        let gridder = ParallelGridder::new(&t, ResamplerOptions::default(), KernelTolerance::default(), 0);
        let stats = gridder.degrid_pass(&mut parallel, &model.view()).unwrap();
        assert_eq!(stats.total(), 12 * 32);

        let mut r = VisResampler::new(&t, ResamplerOptions::default(), KernelTolerance::default());
        for (par, seq) in parallel.iter().zip(&sequential) {
            let expected = r.degrid_samples(seq, &model.view()).unwrap();
            assert_eq!(par.model, expected.predicted);
        }
    }

    #[test]
    fn test_empty_pass() {
        let t = table();
        let (grid, weights, stats) = run(4, &[], &t);
        assert_eq!(stats, ResampleStats::default());
        assert_eq!(weights.total(), 0.0);
        assert!(grid.as_slice().iter().all(|v| v.norm() == 0.0));
    }
}
