//! Phase-Gradient Cache
//!
//! Antenna pointing errors shift the aperture, which multiplies each kernel
//! pixel by a linear phase ramp
//!
//! ```text
//! corr[ky][kx] = exp(i * ((kx - ox) * o0 + (ky - oy) * o1))
//! ```
//!
//! where `(ox, oy)` is the kernel origin and `(o0, o1)` the pointing offset
//! in radians per kernel pixel. Within one buffer nearly every sample shares
//! the same offset, so a single cached ramp is enough.
//!
//! The cache is mutable per-sample state and must stay with one worker; it
//! is `Send` but not `Sync`.

use num_complex::Complex32;
use std::cell::Cell;
use std::marker::PhantomData;

use crate::kernel::{KernelShape, KernelView};

/// Offsets closer than this on every axis reuse the cached ramp.
pub const OFFSET_TOLERANCE: f64 = 1e-6;

/// Single-entry cache of the phase ramp for the last pointing offset.
#[derive(Debug, Default)]
pub struct PhaseGradientCache {
    key: Option<([f64; 2], KernelShape)>,
    ramp: Vec<Complex32>,
    hits: u64,
    recomputes: u64,
    _not_sync: PhantomData<Cell<()>>,
}

impl PhaseGradientCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ramp for `offset` over the stencil of `kernel`, row-major like the kernel.
    pub fn correction_for(&mut self, offset: [f64; 2], kernel: &KernelView<'_>) -> &[Complex32] {
        let shape = kernel.shape();
        let hit = match &self.key {
            Some((cached, cached_shape)) => {
                *cached_shape == shape
                    && (cached[0] - offset[0]).abs() <= OFFSET_TOLERANCE
                    && (cached[1] - offset[1]).abs() <= OFFSET_TOLERANCE
            }
            None => false,
        };
        if hit {
            self.hits += 1;
        } else {
            self.recompute(offset, shape);
        }
        &self.ramp
    }

    fn recompute(&mut self, offset: [f64; 2], shape: KernelShape) {
        self.ramp.clear();
        self.ramp.reserve(shape.nx * shape.ny);
        let [ox, oy] = shape.origin;
        for ky in 0..shape.ny {
            let py = (ky as f64 - oy as f64) * offset[1];
            for kx in 0..shape.nx {
                let phase = (kx as f64 - ox as f64) * offset[0] + py;
                self.ramp
                    .push(Complex32::new(phase.cos() as f32, phase.sin() as f32));
            }
        }
        self.key = Some((offset, shape));
        self.recomputes += 1;
    }

    /// Drop the cached entry.
    pub fn reset(&mut self) {
        self.key = None;
        self.ramp.clear();
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn recomputes(&self) -> u64 {
        self.recomputes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::KernelStencil;
    use approx::assert_relative_eq;

    #[test]
    fn test_ramp_values() {
        let k = KernelStencil::gaussian(1, 1, 1.0).unwrap();
        let mut cache = PhaseGradientCache::new();
        let ramp = cache.correction_for([0.1, -0.2], &k.view());
        assert_eq!(ramp.len(), 9);
        // Origin pixel has zero phase
        assert_relative_eq!(ramp[4].re, 1.0);
        assert_relative_eq!(ramp[4].im, 0.0);
        // kx = 2, ky = 0: phase = 0.1 + 0.2
        assert_relative_eq!(ramp[2].re, 0.3f64.cos() as f32, epsilon = 1e-6);
        assert_relative_eq!(ramp[2].im, 0.3f64.sin() as f32, epsilon = 1e-6);
    }

    #[test]
    fn test_hit_within_tolerance() {
        let k = KernelStencil::gaussian(1, 2, 1.0).unwrap();
        let mut cache = PhaseGradientCache::new();
        cache.correction_for([0.01, 0.02], &k.view());
        cache.correction_for([0.01 + 5e-7, 0.02], &k.view());
        assert_eq!((cache.hits(), cache.recomputes()), (1, 1));

        cache.correction_for([0.011, 0.02], &k.view());
        assert_eq!(cache.recomputes(), 2);
    }

    #[test]
    fn test_shape_change_recomputes() {
        let small = KernelStencil::gaussian(1, 1, 1.0).unwrap();
        let large = KernelStencil::gaussian(2, 1, 1.0).unwrap();
        let mut cache = PhaseGradientCache::new();
        cache.correction_for([0.0, 0.0], &small.view());
        let ramp = cache.correction_for([0.0, 0.0], &large.view());
        assert_eq!(ramp.len(), 25);
        assert_eq!(cache.recomputes(), 2);

        cache.reset();
        cache.correction_for([0.0, 0.0], &large.view());
        assert_eq!(cache.recomputes(), 3);
    }
}
