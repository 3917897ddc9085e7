//! Scatter/Gather Accumulator
//!
//! Inner loops of gridding and degridding. For a footprint `(loc, off)` and
//! a kernel with oversampling `s`, half-support `S` and origin `o`, grid
//! cell `loc + d` pairs with kernel pixel `d * s + off + o` for every
//! `d ∈ [-S, S]` on both axes.
//!
//! Callers must have checked [`Footprint::on_grid`] for the kernel support;
//! the loops index the grid without further bounds tests on the window.

use num_complex::{Complex, Complex32};

use crate::coords::Footprint;
use crate::grid::{GridView, GridViewMut};
use crate::kernel::KernelView;
use crate::types::GridPrecision;

#[inline(always)]
fn tap(kernel: &KernelView<'_>, correction: Option<&[Complex32]>, kx: usize, ky: usize) -> Complex32 {
    let w = kernel.at(kx, ky);
    match correction {
        Some(c) => w * c[ky * kernel.nx() + kx],
        None => w,
    }
}

/// Kernel pixel of grid offset `d` on one axis.
#[inline(always)]
fn kernel_index(d: i64, s: i64, off: i64, origin: usize) -> usize {
    (d * s + off + origin as i64) as usize
}

/// Add `value * k` into every cell of the support window.
///
/// Returns `Σ |k|` over the window, with `k` the kernel weight times the
/// optional phase correction.
pub fn scatter<T: GridPrecision>(
    grid: &mut GridViewMut<'_, T>,
    footprint: &Footprint,
    chan: usize,
    pol: usize,
    kernel: &KernelView<'_>,
    correction: Option<&[Complex32]>,
    value: Complex<T>,
) -> f64 {
    let [sx, sy] = kernel.support();
    let (sx, sy) = (sx as i64, sy as i64);
    let s = kernel.oversampling() as i64;
    let [ox, oy] = kernel.origin();
    let strides = grid.strides();
    debug_assert!(footprint.on_grid(kernel.support(), grid.shape().nx, grid.shape().ny));

    let x0 = (footprint.loc[0] - sx) as usize;
    let y0 = (footprint.loc[1] - sy) as usize;
    let base = strides.offset(x0, y0, chan, pol);
    let data = grid.data_mut();

    let mut norm = 0.0f64;
    for (j, dy) in (-sy..=sy).enumerate() {
        let ky = kernel_index(dy, s, footprint.off[1], oy);
        let row = base + j * strides.y;
        for (i, dx) in (-sx..=sx).enumerate() {
            let kx = kernel_index(dx, s, footprint.off[0], ox);
            let w = tap(kernel, correction, kx, ky);
            data[row + i * strides.x] += value * T::complex_from(w);
            norm += w.norm() as f64;
        }
    }
    norm
}

/// `Σ grid * conj(k)` over the support window, and `Σ |k|`.
pub fn gather<T: GridPrecision>(
    grid: &GridView<'_, T>,
    footprint: &Footprint,
    chan: usize,
    pol: usize,
    kernel: &KernelView<'_>,
    correction: Option<&[Complex32]>,
) -> (Complex<T>, f64) {
    let [sx, sy] = kernel.support();
    let (sx, sy) = (sx as i64, sy as i64);
    let s = kernel.oversampling() as i64;
    let [ox, oy] = kernel.origin();
    let strides = grid.strides();
    debug_assert!(footprint.on_grid(kernel.support(), grid.shape().nx, grid.shape().ny));

    let x0 = (footprint.loc[0] - sx) as usize;
    let y0 = (footprint.loc[1] - sy) as usize;
    let base = strides.offset(x0, y0, chan, pol);
    let data = grid.data();

    let mut sum = Complex::new(T::zero(), T::zero());
    let mut norm = 0.0f64;
    for (j, dy) in (-sy..=sy).enumerate() {
        let ky = kernel_index(dy, s, footprint.off[1], oy);
        let row = base + j * strides.y;
        for (i, dx) in (-sx..=sx).enumerate() {
            let kx = kernel_index(dx, s, footprint.off[0], ox);
            let w = tap(kernel, correction, kx, ky);
            sum += data[row + i * strides.x] * T::complex_from(w.conj());
            norm += w.norm() as f64;
        }
    }
    (sum, norm)
}
