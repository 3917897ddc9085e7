//! # Resampling Statistics
//!
//! [`ResampleStats`] is the per-call account of what happened to every
//! sample of a buffer. Skips are routine and only ever reported here.
//!
//! [`PassCounters`] aggregates across the workers of a parallel pass
//! without locking.
//!
//! ## Example
//!
//! ```rust
//! use uvgrid_core::stats::{PassCounters, ResampleStats};
//!
//! let counters = PassCounters::new();
//! let stats = ResampleStats { gridded: 90, flagged: 6, off_grid: 4, unmapped: 0 };
//! counters.record_buffer(&stats, 1_500);
//!
//! let snap = counters.snapshot();
//! assert_eq!(snap.buffers, 1);
//! assert_eq!(snap.samples_skipped, 10);
//! ```

use std::ops::AddAssign;
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-call sample accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResampleStats {
    /// Samples gridded (or, for degridding, predicted).
    pub gridded: u64,
    /// Samples skipped because the sample or its row is flagged.
    pub flagged: u64,
    /// Samples skipped because the support window leaves the grid.
    pub off_grid: u64,
    /// Samples whose channel or polarization is not mapped to the grid.
    pub unmapped: u64,
}

impl ResampleStats {
    pub fn skipped(&self) -> u64 {
        self.flagged + self.off_grid + self.unmapped
    }

    pub fn total(&self) -> u64 {
        self.gridded + self.skipped()
    }

    pub fn merge(&mut self, other: &ResampleStats) {
        self.gridded += other.gridded;
        self.flagged += other.flagged;
        self.off_grid += other.off_grid;
        self.unmapped += other.unmapped;
    }
}

impl AddAssign for ResampleStats {
    fn add_assign(&mut self, rhs: Self) {
        self.merge(&rhs);
    }
}

/// Lock-free counters shared by the workers of a pass.
#[derive(Debug)]
pub struct PassCounters {
    buffers: AtomicU64,
    samples_gridded: AtomicU64,
    samples_skipped: AtomicU64,
    busy_ns: AtomicU64,
    /// Longest single buffer
    max_buffer_ns: AtomicU64,
}

impl Default for PassCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl PassCounters {
    pub fn new() -> Self {
        Self {
            buffers: AtomicU64::new(0),
            samples_gridded: AtomicU64::new(0),
            samples_skipped: AtomicU64::new(0),
            busy_ns: AtomicU64::new(0),
            max_buffer_ns: AtomicU64::new(0),
        }
    }

    /// Record one processed buffer and the time spent on it.
    #[inline]
    pub fn record_buffer(&self, stats: &ResampleStats, elapsed_ns: u64) {
        self.buffers.fetch_add(1, Ordering::Relaxed);
        self.samples_gridded.fetch_add(stats.gridded, Ordering::Relaxed);
        self.samples_skipped.fetch_add(stats.skipped(), Ordering::Relaxed);
        self.busy_ns.fetch_add(elapsed_ns, Ordering::Relaxed);

        let mut current_max = self.max_buffer_ns.load(Ordering::Relaxed);
        while elapsed_ns > current_max {
            match self.max_buffer_ns.compare_exchange_weak(
                current_max,
                elapsed_ns,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(v) => current_max = v,
            }
        }
    }

    #[inline]
    pub fn buffers(&self) -> u64 {
        self.buffers.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> PassSnapshot {
        PassSnapshot {
            buffers: self.buffers.load(Ordering::Relaxed),
            samples_gridded: self.samples_gridded.load(Ordering::Relaxed),
            samples_skipped: self.samples_skipped.load(Ordering::Relaxed),
            busy_ns: self.busy_ns.load(Ordering::Relaxed),
            max_buffer_ns: self.max_buffer_ns.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.buffers.store(0, Ordering::Relaxed);
        self.samples_gridded.store(0, Ordering::Relaxed);
        self.samples_skipped.store(0, Ordering::Relaxed);
        self.busy_ns.store(0, Ordering::Relaxed);
        self.max_buffer_ns.store(0, Ordering::Relaxed);
    }
}

/// Point-in-time copy of [`PassCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSnapshot {
    pub buffers: u64,
    pub samples_gridded: u64,
    pub samples_skipped: u64,
    pub busy_ns: u64,
    pub max_buffer_ns: u64,
}

impl PassSnapshot {
    /// Mean time per buffer in nanoseconds.
    pub fn avg_buffer_ns(&self) -> u64 {
        if self.buffers == 0 {
            0
        } else {
            self.busy_ns / self.buffers
        }
    }
}
