//! Partial-Grid Reduction
//!
//! Each worker of a gridding pass accumulates into its own private
//! [`PartialGrid`]; nothing is shared in the hot loop. After every buffer
//! of the pass has been consumed, [`PartialGridSet::finalize`] sums the
//! partial grids and their weight accumulators into the caller's grid.
//!
//! ```text
//! Idle ──begin(n)──> Accumulating ──finalize──> Finalizing ──> Idle
//!   ^                     │
//!   └─────discard()───────┘
//! ```
//!
//! Floating-point summation order differs with the number of partial
//! grids, so results for different worker counts agree to rounding, not
//! bit for bit.

use crate::grid::{Grid, GridShape, GridViewMut, SumWeights};
use crate::stats::ResampleStats;
use crate::types::{GridPrecision, ResampleError, ResampleResult};

/// Lifecycle of a reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReductionState {
    Idle,
    Accumulating,
    Finalizing,
}

impl ReductionState {
    pub fn name(&self) -> &'static str {
        match self {
            ReductionState::Idle => "idle",
            ReductionState::Accumulating => "accumulating",
            ReductionState::Finalizing => "finalizing",
        }
    }
}

/// One worker's private accumulation target.
#[derive(Debug, Clone)]
pub struct PartialGrid<T> {
    pub grid: Grid<T>,
    pub weights: SumWeights,
    pub stats: ResampleStats,
}

impl<T: GridPrecision> PartialGrid<T> {
    pub fn new(shape: GridShape) -> Self {
        Self {
            grid: Grid::new(shape),
            weights: SumWeights::for_shape(&shape),
            stats: ResampleStats::default(),
        }
    }

    fn clear(&mut self) {
        self.grid.clear();
        self.weights.clear();
        self.stats = ResampleStats::default();
    }
}

/// The fixed set of partial grids of one pass.
#[derive(Debug)]
pub struct PartialGridSet<T> {
    shape: GridShape,
    partials: Vec<PartialGrid<T>>,
    state: ReductionState,
}

impl<T: GridPrecision> PartialGridSet<T> {
    pub fn new(shape: GridShape) -> Self {
        Self {
            shape,
            partials: Vec::new(),
            state: ReductionState::Idle,
        }
    }

    #[inline]
    pub fn state(&self) -> ReductionState {
        self.state
    }

    pub fn shape(&self) -> GridShape {
        self.shape
    }

    pub fn len(&self) -> usize {
        self.partials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partials.is_empty()
    }

    fn expect(&self, expected: ReductionState) -> ResampleResult<()> {
        if self.state != expected {
            return Err(ResampleError::InvalidState {
                expected: expected.name(),
                found: self.state.name(),
            });
        }
        Ok(())
    }

    /// Start a pass with `workers` zeroed partial grids.
    ///
    /// Grids from a previous pass are reused when the count allows.
    pub fn begin(&mut self, workers: usize) -> ResampleResult<()> {
        self.expect(ReductionState::Idle)?;
        if workers == 0 {
            return Err(ResampleError::GridShape(
                "a pass needs at least one partial grid".to_string(),
            ));
        }
        self.partials.truncate(workers);
        self.partials.iter_mut().for_each(PartialGrid::clear);
        while self.partials.len() < workers {
            self.partials.push(PartialGrid::new(self.shape));
        }
        self.state = ReductionState::Accumulating;
        Ok(())
    }

    /// All partial grids, one per worker.
    pub fn partials_mut(&mut self) -> ResampleResult<&mut [PartialGrid<T>]> {
        self.expect(ReductionState::Accumulating)?;
        Ok(&mut self.partials)
    }

    pub fn partial_mut(&mut self, worker: usize) -> ResampleResult<&mut PartialGrid<T>> {
        self.expect(ReductionState::Accumulating)?;
        let n = self.partials.len();
        self.partials.get_mut(worker).ok_or_else(|| {
            ResampleError::GridShape(format!("worker {} of a {}-worker pass", worker, n))
        })
    }

    /// Sum every partial grid into `target` and `weights`, then return to idle.
    ///
    /// `target` and `weights` are accumulated into, not overwritten.
    pub fn finalize(
        &mut self,
        target: &mut GridViewMut<'_, T>,
        weights: &mut SumWeights,
    ) -> ResampleResult<ResampleStats> {
        self.expect(ReductionState::Accumulating)?;
        if target.shape() != self.shape || !weights.matches(&self.shape) {
            return Err(ResampleError::GridShape(format!(
                "cannot finalize {:?} partials into grid {:?}",
                self.shape,
                target.shape()
            )));
        }

        self.state = ReductionState::Finalizing;
        let mut stats = ResampleStats::default();
        for partial in &self.partials {
            target.add_assign_from(&partial.grid.view())?;
            weights.merge(&partial.weights)?;
            stats.merge(&partial.stats);
        }
        self.state = ReductionState::Idle;
        Ok(stats)
    }

    /// Abandon the pass; nothing reaches the caller's grid.
    pub fn discard(&mut self) {
        self.partials.iter_mut().for_each(PartialGrid::clear);
        self.state = ReductionState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::VisBuffer;
    use crate::kernel::{KernelContext, KernelStencil, KernelTable, KernelTolerance};
    use crate::resampler::{ResamplerOptions, VisResampler};
    use crate::types::SPEED_OF_LIGHT;
    use approx::assert_relative_eq;
    use num_complex::Complex64;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn shape() -> GridShape {
        GridShape::new(32, 32, 1, 1)
    }

    #[test]
    fn test_state_machine() {
        let mut set: PartialGridSet<f64> = PartialGridSet::new(shape());
        assert_eq!(set.state(), ReductionState::Idle);
        assert!(matches!(
            set.partials_mut(),
            Err(ResampleError::InvalidState { expected: "accumulating", found: "idle" })
        ));

        let mut target: Grid<f64> = Grid::new(shape());
        let mut weights = SumWeights::for_shape(&shape());
        assert!(set.finalize(&mut target.view_mut(), &mut weights).is_err());

        assert!(set.begin(0).is_err());
        set.begin(2).unwrap();
        assert_eq!(set.state(), ReductionState::Accumulating);
        assert!(set.begin(2).is_err());
        assert!(set.partial_mut(2).is_err());

        set.finalize(&mut target.view_mut(), &mut weights).unwrap();
        assert_eq!(set.state(), ReductionState::Idle);
    }

    #[test]
    fn test_discard_leaves_target_untouched() {
        let mut set: PartialGridSet<f64> = PartialGridSet::new(shape());
        set.begin(3).unwrap();
        set.partial_mut(1)
            .unwrap()
            .grid
            .view_mut()
            .set(4, 4, 0, 0, Complex64::new(1.0, 0.0));
        set.partial_mut(1).unwrap().weights.add(0, 0, 1.0);
        set.discard();
        assert_eq!(set.state(), ReductionState::Idle);

        // The next pass starts from zero
        set.begin(3).unwrap();
        let mut target: Grid<f64> = Grid::new(shape());
        let mut weights = SumWeights::for_shape(&shape());
        set.finalize(&mut target.view_mut(), &mut weights).unwrap();
        assert!(target.as_slice().iter().all(|v| v.norm() == 0.0));
        assert_eq!(weights.total(), 0.0);
    }

    #[test]
    fn test_finalize_rejects_mismatched_target() {
        let mut set: PartialGridSet<f32> = PartialGridSet::new(shape());
        set.begin(1).unwrap();
        let mut target: Grid<f32> = Grid::new(GridShape::new(16, 16, 1, 1));
        let mut weights = SumWeights::new(1, 1);
        assert!(set.finalize(&mut target.view_mut(), &mut weights).is_err());
        assert_eq!(set.state(), ReductionState::Accumulating);
    }

    fn split_and_reduce(buffers: &[VisBuffer], table: &KernelTable, workers: usize) -> (Grid<f64>, SumWeights) {
        let mut set: PartialGridSet<f64> = PartialGridSet::new(shape());
        set.begin(workers).unwrap();
        let per_worker = (buffers.len() + workers - 1) / workers;
        for (partial, chunk) in set
            .partials_mut()
            .unwrap()
            .iter_mut()
            .zip(buffers.chunks(per_worker))
        {
            let mut r = VisResampler::new(table, ResamplerOptions::default(), KernelTolerance::default());
            for vb in chunk {
                let stats = r
                    .grid_samples(vb, &mut partial.grid.view_mut(), &mut partial.weights, false)
                    .unwrap();
                partial.stats.merge(&stats);
            }
        }
        let mut target: Grid<f64> = Grid::new(shape());
        let mut weights = SumWeights::for_shape(&shape());
        let stats = set.finalize(&mut target.view_mut(), &mut weights).unwrap();
        assert_eq!(stats.total(), (buffers.len() * 20) as u64);
        (target, weights)
    }

    #[test]
    fn test_reduction_independent_of_worker_count() {
        let mut table = KernelTable::new();
        table.insert(
            KernelContext::new(0.0, 0, 0, SPEED_OF_LIGHT, 0),
            KernelStencil::gaussian(2, 4, 1.2).unwrap(),
        );
        let mut rng = StdRng::seed_from_u64(99);
        let buffers: Vec<VisBuffer> = (0..16)
            .map(|_| {
                let mut vb = VisBuffer::new(20, vec![SPEED_OF_LIGHT], 1, 32, 32);
                for row in 0..20 {
                    let uvw = [rng.gen_range(-12.0..12.0), rng.gen_range(-12.0..12.0), rng.gen_range(-5.0..5.0)];
                    vb.set_row(row, uvw, rng.gen_range(-0.5..0.5));
                    vb.set_value(row, 0, 0, num_complex::Complex32::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)));
                    vb.set_weight(row, 0, rng.gen_range(0.5..1.5));
                }
                vb
            })
            .collect();

        let (one, w1) = split_and_reduce(&buffers, &table, 1);
        for workers in [2, 8] {
            let (many, wn) = split_and_reduce(&buffers, &table, workers);
            for (a, b) in one.as_slice().iter().zip(many.as_slice()) {
                assert_relative_eq!(a.re, b.re, epsilon = 1e-9);
                assert_relative_eq!(a.im, b.im, epsilon = 1e-9);
            }
            assert_relative_eq!(w1.get(0, 0), wn.get(0, 0), max_relative = 1e-12);
        }
    }
}
