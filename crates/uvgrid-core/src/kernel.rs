//! Convolution Kernels
//!
//! A convolution function is tabulated as an oversampled 2-D stencil of
//! complex weights. For a kernel with oversampling `s`, half-support `S`
//! and origin `o`, the weight applied to grid offset `d ∈ [-S, S]` of a
//! sample with sub-cell offset `off` is
//!
//! ```text
//! k = d * s + off + o
//! ```
//!
//! so a stencil is valid only when `o - (S*s + s/2) >= 0` and
//! `o + (S*s + s/2) < n` on both axes.
//!
//! Kernels are owned by a [`KernelProvider`] and lent to the resampler as
//! [`KernelView`]s for the duration of one sample. Providers are tabulated
//! over discrete [`KernelContext`]s; a request that falls between tabulated
//! contexts is served by the nearest one within a [`KernelTolerance`].
//!
//! ## Example
//!
//! ```rust
//! use uvgrid_core::kernel::{KernelContext, KernelProvider, KernelStencil, KernelTable, KernelTolerance};
//!
//! let mut table = KernelTable::new();
//! let ctx = KernelContext::new(0.0, 0, 0, 1.4e9, 0);
//! table.insert(ctx, KernelStencil::gaussian(3, 8, 1.0).unwrap());
//!
//! // Slightly rotated aperture still resolves to the tabulated kernel
//! let wanted = KernelContext { orientation: 0.001, ..ctx };
//! let view = table.lookup(&wanted, &KernelTolerance::default()).unwrap();
//! assert_eq!(view.support(), [3, 3]);
//! ```

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;

use crate::types::{KernelWeight, ResampleError, ResampleResult};

/// Discretized lookup key of a tabulated convolution function.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KernelContext {
    /// Aperture orientation (radians).
    pub orientation: f64,
    pub baseline_class: usize,
    pub w_plane: usize,
    /// Frequency (Hz).
    pub frequency: f64,
    pub polarization: usize,
}

impl KernelContext {
    pub fn new(
        orientation: f64,
        baseline_class: usize,
        w_plane: usize,
        frequency: f64,
        polarization: usize,
    ) -> Self {
        Self {
            orientation,
            baseline_class,
            w_plane,
            frequency,
            polarization,
        }
    }
}

impl fmt::Display for KernelContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(orientation={:.6} rad, class={}, w_plane={}, freq={:.1} Hz, pol={})",
            self.orientation, self.baseline_class, self.w_plane, self.frequency, self.polarization
        )
    }
}

/// How far a requested context may drift from a tabulated one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelTolerance {
    /// Maximum angular distance (radians).
    pub orientation_rad: f64,
    /// Maximum frequency distance (Hz).
    pub frequency_hz: f64,
}

impl Default for KernelTolerance {
    fn default() -> Self {
        Self {
            orientation_rad: 1.0_f64.to_radians(),
            frequency_hz: 1.0e6,
        }
    }
}

impl KernelTolerance {
    /// Only exact matches.
    pub fn exact() -> Self {
        Self {
            orientation_rad: 0.0,
            frequency_hz: 0.0,
        }
    }
}

/// Extent and origin of a stencil, used to key derived per-pixel tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelShape {
    pub nx: usize,
    pub ny: usize,
    pub origin: [usize; 2],
}

/// Borrowed view of a tabulated kernel.
#[derive(Debug, Clone, Copy)]
pub struct KernelView<'a> {
    data: &'a [KernelWeight],
    nx: usize,
    ny: usize,
    oversampling: usize,
    support: [usize; 2],
    origin: [usize; 2],
}

impl<'a> KernelView<'a> {
    /// Wrap externally owned weights (row-major, `ky * nx + kx`).
    pub fn new(
        data: &'a [KernelWeight],
        nx: usize,
        ny: usize,
        oversampling: usize,
        support: [usize; 2],
        origin: [usize; 2],
    ) -> ResampleResult<Self> {
        let view = Self {
            data,
            nx,
            ny,
            oversampling,
            support,
            origin,
        };
        view.validate()?;
        Ok(view)
    }

    fn validate(&self) -> ResampleResult<()> {
        if self.nx == 0 || self.ny == 0 || self.data.is_empty() {
            return Err(ResampleError::ZeroSupport {
                nx: self.nx,
                ny: self.ny,
            });
        }
        if self.oversampling == 0 {
            return Err(ResampleError::ZeroOversampling);
        }
        if self.data.len() != self.nx * self.ny {
            return Err(ResampleError::KernelWindow(format!(
                "{} weights for a {}x{} stencil",
                self.data.len(),
                self.nx,
                self.ny
            )));
        }
        let s = self.oversampling;
        for (axis, n) in [self.nx, self.ny].into_iter().enumerate() {
            let reach = self.support[axis] * s + s / 2;
            let origin = self.origin[axis];
            if origin < reach || origin + reach >= n {
                return Err(ResampleError::KernelWindow(format!(
                    "axis {}: origin {} with reach {} outside stencil of {}",
                    axis, origin, reach, n
                )));
            }
        }
        Ok(())
    }

    #[inline(always)]
    pub fn at(&self, kx: usize, ky: usize) -> KernelWeight {
        self.data[ky * self.nx + kx]
    }

    #[inline]
    pub fn nx(&self) -> usize {
        self.nx
    }

    #[inline]
    pub fn ny(&self) -> usize {
        self.ny
    }

    #[inline]
    pub fn oversampling(&self) -> usize {
        self.oversampling
    }

    #[inline]
    pub fn support(&self) -> [usize; 2] {
        self.support
    }

    #[inline]
    pub fn origin(&self) -> [usize; 2] {
        self.origin
    }

    pub fn shape(&self) -> KernelShape {
        KernelShape {
            nx: self.nx,
            ny: self.ny,
            origin: self.origin,
        }
    }
}

/// Owned, validated kernel stencil.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelStencil {
    data: Vec<KernelWeight>,
    nx: usize,
    ny: usize,
    oversampling: usize,
    support: [usize; 2],
    origin: [usize; 2],
}

impl KernelStencil {
    pub fn new(
        data: Vec<KernelWeight>,
        nx: usize,
        ny: usize,
        oversampling: usize,
        support: [usize; 2],
        origin: [usize; 2],
    ) -> ResampleResult<Self> {
        KernelView::new(&data, nx, ny, oversampling, support, origin)?;
        Ok(Self {
            data,
            nx,
            ny,
            oversampling,
            support,
            origin,
        })
    }

    /// Single-tap unit kernel: support 0, oversampling 1.
    pub fn delta() -> Self {
        Self {
            data: vec![KernelWeight::new(1.0, 0.0)],
            nx: 1,
            ny: 1,
            oversampling: 1,
            support: [0, 0],
            origin: [0, 0],
        }
    }

    /// Stencil from rows of weights (`rows[ky][kx]`) centred on the middle element.
    pub fn from_rows(
        rows: &[Vec<KernelWeight>],
        oversampling: usize,
        support: [usize; 2],
    ) -> ResampleResult<Self> {
        let ny = rows.len();
        let nx = rows.first().map_or(0, Vec::len);
        if let Some(ky) = rows.iter().position(|r| r.len() != nx) {
            return Err(ResampleError::KernelWindow(format!(
                "row {} has {} weights, expected {}",
                ky,
                rows[ky].len(),
                nx
            )));
        }
        let data: Vec<KernelWeight> = rows.iter().flatten().copied().collect();
        let origin = [nx.saturating_sub(1) / 2, ny.saturating_sub(1) / 2];
        Self::new(data, nx, ny, oversampling, support, origin)
    }

    /// Circular Gaussian of width `sigma_cells` (grid cells), tabulated just
    /// wide enough for `support` at `oversampling`.
    pub fn gaussian(support: usize, oversampling: usize, sigma_cells: f64) -> ResampleResult<Self> {
        if oversampling == 0 {
            return Err(ResampleError::ZeroOversampling);
        }
        let reach = support * oversampling + oversampling / 2;
        let n = 2 * reach + 1;
        let s = oversampling as f64;
        let denom = 2.0 * sigma_cells * sigma_cells;
        let mut data = Vec::with_capacity(n * n);
        for ky in 0..n {
            let dy = (ky as f64 - reach as f64) / s;
            for kx in 0..n {
                let dx = (kx as f64 - reach as f64) / s;
                let w = (-(dx * dx + dy * dy) / denom).exp();
                data.push(KernelWeight::new(w as f32, 0.0));
            }
        }
        Self::new(data, n, n, oversampling, [support, support], [reach, reach])
    }

    pub fn view(&self) -> KernelView<'_> {
        KernelView {
            data: &self.data,
            nx: self.nx,
            ny: self.ny,
            oversampling: self.oversampling,
            support: self.support,
            origin: self.origin,
        }
    }

    /// Kernel for the conjugate path: complex conjugate, flipped through the origin.
    pub fn conjugate(&self) -> Self {
        let mut data = Vec::with_capacity(self.data.len());
        for ky in 0..self.ny {
            for kx in 0..self.nx {
                let src = (self.ny - 1 - ky) * self.nx + (self.nx - 1 - kx);
                data.push(self.data[src].conj());
            }
        }
        Self {
            data,
            nx: self.nx,
            ny: self.ny,
            oversampling: self.oversampling,
            support: self.support,
            origin: [self.nx - 1 - self.origin[0], self.ny - 1 - self.origin[1]],
        }
    }
}

/// Source of tabulated convolution functions.
///
/// Implementations are shared read-only between worker threads.
pub trait KernelProvider: Sync {
    /// Contexts of all tabulated kernels, by index.
    fn contexts(&self) -> &[KernelContext];

    /// Kernel tabulated at `index`.
    fn kernel(&self, index: usize) -> ResampleResult<KernelView<'_>>;

    /// Conjugate-path kernel tabulated at `index`.
    fn conjugate_kernel(&self, index: usize) -> ResampleResult<KernelView<'_>>;

    /// Index of the nearest tabulated context within `tolerance`.
    fn nearest(&self, wanted: &KernelContext, tolerance: &KernelTolerance) -> ResampleResult<usize> {
        nearest_context(self.contexts(), wanted, tolerance)
            .ok_or_else(|| ResampleError::KernelContextNotFound(wanted.to_string()))
    }

    fn lookup(&self, wanted: &KernelContext, tolerance: &KernelTolerance) -> ResampleResult<KernelView<'_>> {
        self.kernel(self.nearest(wanted, tolerance)?)
    }

    fn lookup_conjugate(
        &self,
        wanted: &KernelContext,
        tolerance: &KernelTolerance,
    ) -> ResampleResult<KernelView<'_>> {
        self.conjugate_kernel(self.nearest(wanted, tolerance)?)
    }
}

/// Smallest angle between two orientations.
fn angular_distance(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(2.0 * PI);
    d.min(2.0 * PI - d)
}

/// Nearest tabulated context.
///
/// Baseline class, w-plane and polarization must match exactly; orientation
/// and frequency must each be within tolerance. Candidates are ranked by
/// orientation distance, then frequency distance; equidistant candidates
/// resolve to the lowest index.
pub fn nearest_context(
    tabulated: &[KernelContext],
    wanted: &KernelContext,
    tolerance: &KernelTolerance,
) -> Option<usize> {
    let mut best: Option<((f64, f64), usize)> = None;
    for (i, c) in tabulated.iter().enumerate() {
        if c.baseline_class != wanted.baseline_class
            || c.w_plane != wanted.w_plane
            || c.polarization != wanted.polarization
        {
            continue;
        }
        let d_orientation = angular_distance(c.orientation, wanted.orientation);
        let d_frequency = (c.frequency - wanted.frequency).abs();
        if d_orientation > tolerance.orientation_rad || d_frequency > tolerance.frequency_hz {
            continue;
        }
        let distance = (d_orientation, d_frequency);
        match best {
            Some((b, _)) if distance >= b => {}
            _ => best = Some((distance, i)),
        }
    }
    best.map(|(_, i)| i)
}

/// In-memory kernel store.
#[derive(Debug, Clone, Default)]
pub struct KernelTable {
    contexts: Vec<KernelContext>,
    kernels: Vec<KernelStencil>,
    conjugates: Vec<KernelStencil>,
}

impl KernelTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tabulate `kernel` at `context`, deriving its conjugate. Returns the index.
    pub fn insert(&mut self, context: KernelContext, kernel: KernelStencil) -> usize {
        let conjugate = kernel.conjugate();
        self.insert_with_conjugate(context, kernel, conjugate)
    }

    pub fn insert_with_conjugate(
        &mut self,
        context: KernelContext,
        kernel: KernelStencil,
        conjugate: KernelStencil,
    ) -> usize {
        self.contexts.push(context);
        self.kernels.push(kernel);
        self.conjugates.push(conjugate);
        self.contexts.len() - 1
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

impl KernelProvider for KernelTable {
    fn contexts(&self) -> &[KernelContext] {
        &self.contexts
    }

    fn kernel(&self, index: usize) -> ResampleResult<KernelView<'_>> {
        self.kernels
            .get(index)
            .map(KernelStencil::view)
            .ok_or_else(|| ResampleError::KernelUnavailable {
                index,
                reason: format!("table holds {} kernels", self.kernels.len()),
            })
    }

    fn conjugate_kernel(&self, index: usize) -> ResampleResult<KernelView<'_>> {
        self.conjugates
            .get(index)
            .map(KernelStencil::view)
            .ok_or_else(|| ResampleError::KernelUnavailable {
                index,
                reason: format!("table holds {} conjugate kernels", self.conjugates.len()),
            })
    }
}
