//! Visibility Buffers and Resampling Maps
//!
//! A [`VisBuffer`] holds one chunk of visibilities handed to the resampler
//! by the imaging driver: a `rows x channels x polarizations` cube of
//! complex samples with their weights, flags and per-row geometry, plus the
//! static [`ResampleMaps`] that say where each sample lands on the grid and
//! which convolution kernel it uses.
//!
//! ## Storage Layout
//!
//! ```text
//! data / model / flags   index = (row * n_chan + chan) * n_pol + pol
//! weight                 index =  row * n_chan + chan
//! uvw / dphase / cf_map  index =  row
//! freq / chan_map        index =  chan
//! ```
//!
//! UVW coordinates are in metres; multiplied by `freq / c` they are in
//! wavelengths. `dphase` is the residual delay of each row (metres) left
//! after rotating to the reference phase centre.

use num_complex::Complex32;

use crate::grid::GridShape;
use crate::types::{ResampleError, ResampleResult, Visibility, SPEED_OF_LIGHT};

/// Row-scoped part of the kernel lookup key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowKernelKey {
    /// Parallactic angle / orientation of the aperture (radians).
    pub orientation: f64,
    /// Antenna-pair class; kernels differ between dish types.
    pub baseline_class: usize,
}

impl RowKernelKey {
    pub fn new(orientation: f64, baseline_class: usize) -> Self {
        Self {
            orientation,
            baseline_class,
        }
    }
}

impl Default for RowKernelKey {
    fn default() -> Self {
        Self::new(0.0, 0)
    }
}

/// Static per-buffer maps and scalings.
#[derive(Debug, Clone, PartialEq)]
pub struct ResampleMaps {
    /// uvw-to-pixel scale for u, v and w.
    pub uv_scale: [f64; 3],
    /// Pixel offset added after scaling (usually the grid centre).
    pub uv_offset: [f64; 3],
    /// Sample channel -> grid channel, -1 for channels not gridded.
    pub chan_map: Vec<i32>,
    /// Sample polarization -> grid polarization, -1 for not gridded.
    pub pol_map: Vec<i32>,
    /// Frequency (Hz) at which conjugate kernels are looked up, per sample channel.
    pub conj_freq_map: Vec<f64>,
    /// Row -> kernel key on the direct path.
    pub cf_map: Vec<RowKernelKey>,
    /// Row -> kernel key on the conjugate path.
    pub conj_cf_map: Vec<RowKernelKey>,
    /// Sample polarization -> kernel polarization on the conjugate path.
    pub conj_pol_map: Option<Vec<usize>>,
    /// Number of tabulated w-planes; 1 disables w-projection.
    pub n_w_planes: usize,
}

impl ResampleMaps {
    /// Identity maps for a buffer of the given shape, gridded about the
    /// centre of an `nx x ny` grid with `uv_scale = 1` pixel per wavelength.
    pub fn identity(n_rows: usize, freq: &[f64], n_pol: usize, nx: usize, ny: usize) -> Self {
        Self {
            uv_scale: [1.0, 1.0, 1.0],
            uv_offset: [(nx / 2) as f64, (ny / 2) as f64, 0.0],
            chan_map: (0..freq.len() as i32).collect(),
            pol_map: (0..n_pol as i32).collect(),
            conj_freq_map: freq.to_vec(),
            cf_map: vec![RowKernelKey::default(); n_rows],
            conj_cf_map: vec![RowKernelKey::default(); n_rows],
            conj_pol_map: None,
            n_w_planes: 1,
        }
    }

    /// Map every sample channel onto one grid channel (continuum imaging).
    pub fn with_single_grid_channel(mut self) -> Self {
        self.chan_map.iter_mut().for_each(|c| *c = 0);
        self
    }
}

/// One visibility measurement, as seen through a buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub row: usize,
    pub chan: usize,
    pub pol: usize,
    pub value: Visibility,
    pub weight: f32,
    pub uvw: [f64; 3],
    /// True when the sample may be used (neither sample nor row flagged).
    pub valid: bool,
}

/// A chunk of visibilities with its resampling maps.
#[derive(Debug, Clone)]
pub struct VisBuffer {
    n_rows: usize,
    n_chan: usize,
    n_pol: usize,
    pub uvw: Vec<[f64; 3]>,
    pub dphase: Vec<f64>,
    pub freq: Vec<f64>,
    pub data: Vec<Visibility>,
    pub corrected: Option<Vec<Visibility>>,
    pub model: Vec<Visibility>,
    pub weight: Vec<f32>,
    pub flags: Vec<bool>,
    pub row_flags: Vec<bool>,
    /// Per-row antenna pointing offset (radians per kernel pixel on each axis).
    pub pointing_offsets: Option<Vec<[f64; 2]>>,
    pub maps: ResampleMaps,
}

impl VisBuffer {
    /// Zero-valued, unit-weight, unflagged buffer with identity maps for an `nx x ny` grid.
    pub fn new(n_rows: usize, freq: Vec<f64>, n_pol: usize, nx: usize, ny: usize) -> Self {
        let n_chan = freq.len();
        let cube = n_rows * n_chan * n_pol;
        let maps = ResampleMaps::identity(n_rows, &freq, n_pol, nx, ny);
        Self {
            n_rows,
            n_chan,
            n_pol,
            uvw: vec![[0.0; 3]; n_rows],
            dphase: vec![0.0; n_rows],
            freq,
            data: vec![Complex32::new(0.0, 0.0); cube],
            corrected: None,
            model: vec![Complex32::new(0.0, 0.0); cube],
            weight: vec![1.0; n_rows * n_chan],
            flags: vec![false; cube],
            row_flags: vec![false; n_rows],
            pointing_offsets: None,
            maps,
        }
    }

    #[inline]
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    #[inline]
    pub fn n_chan(&self) -> usize {
        self.n_chan
    }

    #[inline]
    pub fn n_pol(&self) -> usize {
        self.n_pol
    }

    /// Number of samples in the cube.
    pub fn len(&self) -> usize {
        self.n_rows * self.n_chan * self.n_pol
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline(always)]
    pub fn index(&self, row: usize, chan: usize, pol: usize) -> usize {
        (row * self.n_chan + chan) * self.n_pol + pol
    }

    #[inline(always)]
    pub fn weight_index(&self, row: usize, chan: usize) -> usize {
        row * self.n_chan + chan
    }

    pub fn set_row(&mut self, row: usize, uvw: [f64; 3], dphase: f64) {
        self.uvw[row] = uvw;
        self.dphase[row] = dphase;
    }

    pub fn set_value(&mut self, row: usize, chan: usize, pol: usize, value: Visibility) {
        let i = self.index(row, chan, pol);
        self.data[i] = value;
    }

    /// Store a pure-intensity sample.
    pub fn set_intensity(&mut self, row: usize, chan: usize, pol: usize, value: f32) {
        self.set_value(row, chan, pol, Complex32::new(value, 0.0));
    }

    pub fn set_weight(&mut self, row: usize, chan: usize, weight: f32) {
        let i = self.weight_index(row, chan);
        self.weight[i] = weight;
    }

    pub fn set_flag(&mut self, row: usize, chan: usize, pol: usize, flagged: bool) {
        let i = self.index(row, chan, pol);
        self.flags[i] = flagged;
    }

    /// True when the sample is usable.
    #[inline]
    pub fn is_valid(&self, row: usize, chan: usize, pol: usize) -> bool {
        !self.row_flags[row] && !self.flags[self.index(row, chan, pol)]
    }

    pub fn sample(&self, row: usize, chan: usize, pol: usize) -> Sample {
        Sample {
            row,
            chan,
            pol,
            value: self.data[self.index(row, chan, pol)],
            weight: self.weight[self.weight_index(row, chan)],
            uvw: self.uvw[row],
            valid: self.is_valid(row, chan, pol),
        }
    }

    /// Check that every column has the length implied by the buffer shape.
    pub fn validate_shape(&self) -> ResampleResult<()> {
        let cube = self.len();
        check_len("uvw", self.uvw.len(), self.n_rows)?;
        check_len("dphase", self.dphase.len(), self.n_rows)?;
        check_len("row_flags", self.row_flags.len(), self.n_rows)?;
        check_len("freq", self.freq.len(), self.n_chan)?;
        check_len("data", self.data.len(), cube)?;
        check_len("model", self.model.len(), cube)?;
        check_len("flags", self.flags.len(), cube)?;
        check_len("weight", self.weight.len(), self.n_rows * self.n_chan)?;
        if let Some(corrected) = &self.corrected {
            check_len("corrected", corrected.len(), cube)?;
        }
        if let Some(offsets) = &self.pointing_offsets {
            check_len("pointing_offsets", offsets.len(), self.n_rows)?;
        }
        Ok(())
    }
}

fn check_len(field: &'static str, actual: usize, expected: usize) -> ResampleResult<()> {
    if actual != expected {
        return Err(ResampleError::BufferShape {
            field,
            expected,
            actual,
        });
    }
    Ok(())
}

fn invalid(map: &'static str, index: usize, reason: impl Into<String>) -> ResampleError {
    ResampleError::InvalidMap {
        map,
        index,
        reason: reason.into(),
    }
}

/// Buffer-bound context: validated maps plus per-channel lookup tables.
///
/// Built once per resampling call before any grid memory is touched, so a
/// malformed buffer never leaves a partially updated grid behind.
#[derive(Debug)]
pub struct BufferContext<'b> {
    pub buffer: &'b VisBuffer,
    pub maps: &'b ResampleMaps,
    /// `freq / c` per sample channel (metres -> wavelengths).
    pub freq_scale: Vec<f64>,
    /// Grid channel per sample channel, `None` when not gridded.
    pub grid_chan: Vec<Option<usize>>,
    /// Grid polarization per sample polarization, `None` when not gridded.
    pub grid_pol: Vec<Option<usize>>,
}

impl<'b> BufferContext<'b> {
    pub fn new(buffer: &'b VisBuffer, grid: &GridShape) -> ResampleResult<Self> {
        buffer.validate_shape()?;
        let maps = &buffer.maps;

        check_len("chan_map", maps.chan_map.len(), buffer.n_chan)?;
        check_len("pol_map", maps.pol_map.len(), buffer.n_pol)?;
        check_len("conj_freq_map", maps.conj_freq_map.len(), buffer.n_chan)?;
        check_len("cf_map", maps.cf_map.len(), buffer.n_rows)?;
        check_len("conj_cf_map", maps.conj_cf_map.len(), buffer.n_rows)?;
        if let Some(conj_pol) = &maps.conj_pol_map {
            check_len("conj_pol_map", conj_pol.len(), buffer.n_pol)?;
            if let Some(i) = conj_pol.iter().position(|&p| p >= buffer.n_pol) {
                return Err(invalid("conj_pol_map", i, "polarization out of range"));
            }
        }
        if maps.n_w_planes == 0 {
            return Err(invalid("n_w_planes", 0, "at least one w-plane is required"));
        }
        for (i, v) in maps.uv_scale.iter().chain(&maps.uv_offset).enumerate() {
            if !v.is_finite() {
                return Err(invalid("uv_scale/uv_offset", i, "not finite"));
            }
        }

        check_rows(buffer)?;

        let grid_chan = map_axis("chan_map", &maps.chan_map, grid.nchan)?;
        let grid_pol = map_axis("pol_map", &maps.pol_map, grid.npol)?;

        let mut freq_scale = Vec::with_capacity(buffer.n_chan);
        for (i, &f) in buffer.freq.iter().enumerate() {
            if !(f.is_finite() && f > 0.0) {
                return Err(invalid("freq", i, format!("frequency {} Hz", f)));
            }
            freq_scale.push(f / SPEED_OF_LIGHT);
        }
        if let Some(i) = maps
            .conj_freq_map
            .iter()
            .position(|f| !(f.is_finite() && *f > 0.0))
        {
            return Err(invalid("conj_freq_map", i, "frequency must be positive"));
        }

        Ok(Self {
            buffer,
            maps,
            freq_scale,
            grid_chan,
            grid_pol,
        })
    }

    /// Kernel polarization used on the conjugate path.
    #[inline]
    pub fn conj_pol(&self, pol: usize) -> usize {
        self.maps
            .conj_pol_map
            .as_ref()
            .map_or(pol, |m| m[pol])
    }
}

/// Geometry of every unflagged row must be finite; flagged rows are never read.
fn check_rows(buffer: &VisBuffer) -> ResampleResult<()> {
    for row in (0..buffer.n_rows).filter(|&r| !buffer.row_flags[r]) {
        if !buffer.uvw[row].iter().all(|v| v.is_finite()) {
            return Err(invalid("uvw", row, format!("{:?} is not finite", buffer.uvw[row])));
        }
        if !buffer.dphase[row].is_finite() {
            return Err(invalid("dphase", row, "not finite"));
        }
        if let Some(offsets) = &buffer.pointing_offsets {
            if !offsets[row].iter().all(|v| v.is_finite()) {
                return Err(invalid("pointing_offsets", row, "not finite"));
            }
        }
    }
    Ok(())
}

fn map_axis(map: &'static str, entries: &[i32], extent: usize) -> ResampleResult<Vec<Option<usize>>> {
    entries
        .iter()
        .enumerate()
        .map(|(i, &m)| match m {
            -1 => Ok(None),
            m if m >= 0 && (m as usize) < extent => Ok(Some(m as usize)),
            m => Err(invalid(
                map,
                i,
                format!("{} outside grid axis of length {}", m, extent),
            )),
        })
        .collect()
}
