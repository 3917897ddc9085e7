//! Coordinate Mapping
//!
//! Converts a sample's `(u, v, w)` into grid space:
//!
//! ```text
//! pos   = uv_scale * uvw * freq / c + uv_offset      (continuous pixel position)
//! loc   = round(pos)                                 (nearest grid cell)
//! off   = round((loc - pos) * oversampling)          (oversampled kernel pixels)
//! plane = round(sqrt(|scale_w * w * freq / c|) + offset_w)
//! ```
//!
//! The fractional remainder is taken from the unrounded position, so the
//! kernel offset is the result of a single rounding. The footprint test
//! [`Footprint::on_grid`] is evaluated once per sample before any cell of
//! the support window is touched. Positions that are not finite or lie
//! beyond [`MAX_PIXEL`] have no footprint and are off the grid.

use num_complex::Complex64;
use std::f64::consts::PI;

use crate::buffer::ResampleMaps;
use crate::types::SPEED_OF_LIGHT;

/// Largest pixel coordinate magnitude that is discretized.
pub const MAX_PIXEL: f64 = i32::MAX as f64;

/// Continuous grid position of one sample at one frequency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridPosition {
    /// Pixel position on the x and y axes.
    pub pos: [f64; 2],
    /// w-plane index, clamped to the tabulated planes.
    pub w_plane: usize,
}

/// Integer cell and oversampled kernel offset of a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footprint {
    pub loc: [i64; 2],
    pub off: [i64; 2],
}

impl Footprint {
    /// True when the whole support window `loc ± support` lies on the grid.
    #[inline]
    pub fn on_grid(&self, support: [usize; 2], nx: usize, ny: usize) -> bool {
        let inside = |loc: i64, support: usize, n: usize| {
            let (Ok(support), Ok(n)) = (i64::try_from(support), i64::try_from(n)) else {
                return false;
            };
            match (loc.checked_sub(support), loc.checked_add(support)) {
                (Some(lo), Some(hi)) => lo >= 0 && hi < n,
                _ => false,
            }
        };
        inside(self.loc[0], support[0], nx) && inside(self.loc[1], support[1], ny)
    }
}

/// uvw of the Hermitian-conjugate sample.
#[inline]
pub fn mirrored(uvw: [f64; 3]) -> [f64; 3] {
    [-uvw[0], -uvw[1], -uvw[2]]
}

/// Map `uvw` (metres) at `freq_scale = freq / c` into grid space.
#[inline]
pub fn grid_position(uvw: [f64; 3], freq_scale: f64, maps: &ResampleMaps) -> GridPosition {
    let pos = [
        maps.uv_scale[0] * uvw[0] * freq_scale + maps.uv_offset[0],
        maps.uv_scale[1] * uvw[1] * freq_scale + maps.uv_offset[1],
    ];
    GridPosition {
        pos,
        w_plane: w_plane(uvw[2], freq_scale, maps),
    }
}

/// w-plane index; planes are spaced in `sqrt(|w|)`.
#[inline]
pub fn w_plane(w: f64, freq_scale: f64, maps: &ResampleMaps) -> usize {
    if maps.n_w_planes <= 1 {
        return 0;
    }
    let plane = ((maps.uv_scale[2] * w * freq_scale).abs().sqrt() + maps.uv_offset[2]).round();
    if plane <= 0.0 {
        0
    } else {
        (plane as usize).min(maps.n_w_planes - 1)
    }
}

impl GridPosition {
    /// Discretize for a kernel with the given oversampling factor.
    ///
    /// `None` when either coordinate is not finite or exceeds [`MAX_PIXEL`].
    #[inline]
    pub fn footprint(&self, oversampling: usize) -> Option<Footprint> {
        if self.pos.iter().any(|p| !(p.is_finite() && p.abs() <= MAX_PIXEL)) {
            return None;
        }
        let s = oversampling as f64;
        let half = (oversampling / 2) as i64;
        let mut loc = [0i64; 2];
        let mut off = [0i64; 2];
        for axis in 0..2 {
            let nearest = self.pos[axis].round();
            loc[axis] = nearest as i64;
            off[axis] = (((nearest - self.pos[axis]) * s).round() as i64).clamp(-half, half);
        }
        Some(Footprint { loc, off })
    }
}

/// Phase rotation for the residual delay `dphase` (metres) at `freq` (Hz).
#[inline]
pub fn phasor(dphase: f64, freq: f64) -> Complex64 {
    if dphase == 0.0 {
        return Complex64::new(1.0, 0.0);
    }
    let phase = -2.0 * PI * dphase * freq / SPEED_OF_LIGHT;
    Complex64::new(phase.cos(), phase.sin())
}
