//! 4-D Grid Addressing
//!
//! The gridder accumulates into a dense `(x, y, channel, polarization)`
//! array owned by the caller. No axis order is assumed: every view carries
//! explicit per-axis strides, so the same loops work on x-fastest images,
//! polarization-fastest FFT buffers, or a sub-region of a padded array.
//!
//! ```rust
//! use uvgrid_core::grid::{Grid, GridShape};
//! use num_complex::Complex64;
//!
//! let mut grid: Grid<f64> = Grid::new(GridShape::new(8, 8, 1, 1));
//! grid.view_mut().set(3, 4, 0, 0, Complex64::new(1.0, 0.0));
//! assert_eq!(grid.get(3, 4, 0, 0), Complex64::new(1.0, 0.0));
//! ```

use num_complex::Complex;

use crate::types::{GridPrecision, ResampleError, ResampleResult};

/// Extent of a grid along its four axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridShape {
    pub nx: usize,
    pub ny: usize,
    pub nchan: usize,
    pub npol: usize,
}

impl GridShape {
    pub fn new(nx: usize, ny: usize, nchan: usize, npol: usize) -> Self {
        Self { nx, ny, nchan, npol }
    }

    /// Total number of cells.
    pub fn len(&self) -> usize {
        self.nx * self.ny * self.nchan * self.npol
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Strides of a contiguous layout with x varying fastest.
    pub fn contiguous_strides(&self) -> GridStrides {
        GridStrides {
            x: 1,
            y: self.nx,
            chan: self.nx * self.ny,
            pol: self.nx * self.ny * self.nchan,
        }
    }

    /// Strides of a contiguous layout with polarization varying fastest.
    pub fn pol_major_strides(&self) -> GridStrides {
        GridStrides {
            pol: 1,
            chan: self.npol,
            x: self.npol * self.nchan,
            y: self.npol * self.nchan * self.nx,
        }
    }

    fn extents(&self) -> [usize; 4] {
        [self.nx, self.ny, self.nchan, self.npol]
    }
}

/// Element strides of each grid axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridStrides {
    pub x: usize,
    pub y: usize,
    pub chan: usize,
    pub pol: usize,
}

impl GridStrides {
    /// Linear offset of cell `(x, y, chan, pol)`.
    #[inline(always)]
    pub fn offset(&self, x: usize, y: usize, chan: usize, pol: usize) -> usize {
        x * self.x + y * self.y + chan * self.chan + pol * self.pol
    }

    fn as_array(&self) -> [usize; 4] {
        [self.x, self.y, self.chan, self.pol]
    }

    /// Offset of the last cell of `shape`.
    fn max_offset(&self, shape: &GridShape) -> usize {
        shape
            .extents()
            .iter()
            .zip(self.as_array())
            .map(|(&n, s)| n.saturating_sub(1) * s)
            .sum()
    }

    /// True when distinct cells of `shape` map to distinct offsets.
    fn is_injective(&self, shape: &GridShape) -> bool {
        let mut axes: Vec<(usize, usize)> = self
            .as_array()
            .into_iter()
            .zip(shape.extents())
            .filter(|&(_, n)| n > 1)
            .collect();
        axes.sort_unstable();
        let mut span = 1;
        for (stride, n) in axes {
            if stride < span {
                return false;
            }
            span = stride * n;
        }
        true
    }
}

fn check_layout(shape: &GridShape, strides: &GridStrides, len: usize) -> ResampleResult<()> {
    if shape.is_empty() {
        return Err(ResampleError::GridShape(format!(
            "empty grid {}x{}x{}x{}",
            shape.nx, shape.ny, shape.nchan, shape.npol
        )));
    }
    let last = strides.max_offset(shape);
    if last >= len {
        return Err(ResampleError::GridShape(format!(
            "last cell at offset {} but storage holds {} elements",
            last, len
        )));
    }
    if !strides.is_injective(shape) {
        return Err(ResampleError::GridShape(format!(
            "strides {:?} alias cells of shape {:?}",
            strides, shape
        )));
    }
    Ok(())
}

/// Read-only strided view of caller-owned grid memory.
#[derive(Debug, Clone, Copy)]
pub struct GridView<'a, T> {
    data: &'a [Complex<T>],
    shape: GridShape,
    strides: GridStrides,
}

impl<'a, T: GridPrecision> GridView<'a, T> {
    pub fn new(data: &'a [Complex<T>], shape: GridShape, strides: GridStrides) -> ResampleResult<Self> {
        check_layout(&shape, &strides, data.len())?;
        Ok(Self { data, shape, strides })
    }

    #[inline]
    pub fn shape(&self) -> GridShape {
        self.shape
    }

    #[inline]
    pub fn strides(&self) -> GridStrides {
        self.strides
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize, chan: usize, pol: usize) -> Complex<T> {
        self.data[self.strides.offset(x, y, chan, pol)]
    }

    #[inline(always)]
    pub(crate) fn data(&self) -> &'a [Complex<T>] {
        self.data
    }
}

/// Mutable strided view of caller-owned grid memory.
#[derive(Debug)]
pub struct GridViewMut<'a, T> {
    data: &'a mut [Complex<T>],
    shape: GridShape,
    strides: GridStrides,
}

impl<'a, T: GridPrecision> GridViewMut<'a, T> {
    pub fn new(
        data: &'a mut [Complex<T>],
        shape: GridShape,
        strides: GridStrides,
    ) -> ResampleResult<Self> {
        check_layout(&shape, &strides, data.len())?;
        Ok(Self { data, shape, strides })
    }

    #[inline]
    pub fn shape(&self) -> GridShape {
        self.shape
    }

    #[inline]
    pub fn strides(&self) -> GridStrides {
        self.strides
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize, chan: usize, pol: usize) -> Complex<T> {
        self.data[self.strides.offset(x, y, chan, pol)]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, chan: usize, pol: usize, value: Complex<T>) {
        let at = self.strides.offset(x, y, chan, pol);
        self.data[at] = value;
    }

    /// Set every addressed cell to `value`, leaving stride gaps untouched.
    pub fn fill(&mut self, value: Complex<T>) {
        for pol in 0..self.shape.npol {
            for chan in 0..self.shape.nchan {
                for y in 0..self.shape.ny {
                    for x in 0..self.shape.nx {
                        self.set(x, y, chan, pol, value);
                    }
                }
            }
        }
    }

    /// Element-wise `self += other`; both views must have the same shape.
    pub fn add_assign_from(&mut self, other: &GridView<'_, T>) -> ResampleResult<()> {
        if other.shape != self.shape {
            return Err(ResampleError::GridShape(format!(
                "cannot add grid {:?} into {:?}",
                other.shape, self.shape
            )));
        }
        let (dst, src) = (self.strides, other.strides);
        for pol in 0..self.shape.npol {
            for chan in 0..self.shape.nchan {
                for y in 0..self.shape.ny {
                    let d0 = dst.offset(0, y, chan, pol);
                    let s0 = src.offset(0, y, chan, pol);
                    for x in 0..self.shape.nx {
                        self.data[d0 + x * dst.x] += other.data[s0 + x * src.x];
                    }
                }
            }
        }
        Ok(())
    }

    #[inline(always)]
    pub(crate) fn data_mut(&mut self) -> &mut [Complex<T>] {
        &mut *self.data
    }
}

/// Owned grid, used for per-worker partial grids and tests.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid<T> {
    data: Vec<Complex<T>>,
    shape: GridShape,
    strides: GridStrides,
}

impl<T: GridPrecision> Grid<T> {
    /// Zeroed grid with the contiguous x-fastest layout.
    pub fn new(shape: GridShape) -> Self {
        Self {
            data: vec![Complex::new(T::zero(), T::zero()); shape.len()],
            strides: shape.contiguous_strides(),
            shape,
        }
    }

    /// Zeroed grid with an explicit layout.
    pub fn with_strides(shape: GridShape, strides: GridStrides) -> ResampleResult<Self> {
        if shape.is_empty() {
            return Err(ResampleError::GridShape("empty grid".to_string()));
        }
        let len = strides.max_offset(&shape) + 1;
        let data = vec![Complex::new(T::zero(), T::zero()); len];
        check_layout(&shape, &strides, len)?;
        Ok(Self { data, shape, strides })
    }

    #[inline]
    pub fn shape(&self) -> GridShape {
        self.shape
    }

    #[inline]
    pub fn strides(&self) -> GridStrides {
        self.strides
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize, chan: usize, pol: usize) -> Complex<T> {
        self.data[self.strides.offset(x, y, chan, pol)]
    }

    pub fn view(&self) -> GridView<'_, T> {
        GridView {
            data: &self.data,
            shape: self.shape,
            strides: self.strides,
        }
    }

    pub fn view_mut(&mut self) -> GridViewMut<'_, T> {
        GridViewMut {
            data: &mut self.data,
            shape: self.shape,
            strides: self.strides,
        }
    }

    /// Reset every cell to zero.
    pub fn clear(&mut self) {
        self.data
            .iter_mut()
            .for_each(|c| *c = Complex::new(T::zero(), T::zero()));
    }

    /// Raw storage in layout order.
    pub fn as_slice(&self) -> &[Complex<T>] {
        &self.data
    }
}

/// Per-(channel, polarization) sum of gridding weights.
///
/// The imaging driver divides by these sums when normalising the image;
/// the resampler only accumulates.
#[derive(Debug, Clone, PartialEq)]
pub struct SumWeights {
    nchan: usize,
    npol: usize,
    values: Vec<f64>,
}

impl SumWeights {
    pub fn new(nchan: usize, npol: usize) -> Self {
        Self {
            nchan,
            npol,
            values: vec![0.0; nchan * npol],
        }
    }

    pub fn for_shape(shape: &GridShape) -> Self {
        Self::new(shape.nchan, shape.npol)
    }

    pub fn nchan(&self) -> usize {
        self.nchan
    }

    pub fn npol(&self) -> usize {
        self.npol
    }

    #[inline]
    pub fn get(&self, chan: usize, pol: usize) -> f64 {
        self.values[chan * self.npol + pol]
    }

    #[inline]
    pub fn add(&mut self, chan: usize, pol: usize, weight: f64) {
        self.values[chan * self.npol + pol] += weight;
    }

    /// Sum over every channel and polarization.
    pub fn total(&self) -> f64 {
        self.values.iter().sum()
    }

    pub fn clear(&mut self) {
        self.values.iter_mut().for_each(|v| *v = 0.0);
    }

    /// True when this accumulator matches the channel/polarization axes of `shape`.
    pub fn matches(&self, shape: &GridShape) -> bool {
        self.nchan == shape.nchan && self.npol == shape.npol
    }

    pub fn merge(&mut self, other: &SumWeights) -> ResampleResult<()> {
        if other.nchan != self.nchan || other.npol != self.npol {
            return Err(ResampleError::GridShape(format!(
                "weight accumulator {}x{} does not match {}x{}",
                other.nchan, other.npol, self.nchan, self.npol
            )));
        }
        for (dst, src) in self.values.iter_mut().zip(&other.values) {
            *dst += src;
        }
        Ok(())
    }
}
