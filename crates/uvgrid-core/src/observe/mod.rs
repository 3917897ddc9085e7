//! # Observability
//!
//! Structured logging for resampling runs via `tracing`. Per-pass sample
//! accounting lives in [`crate::stats`].
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use uvgrid_core::config::UvgridConfig;
//! use uvgrid_core::observe;
//!
//! let config = UvgridConfig::load()?;
//! observe::init(&config);
//!
//! tracing::info!(workers = config.parallel.workers, "Imaging started");
//! ```

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat, LogLevel};

use crate::config::UvgridConfig;

/// Initialize logging from the `logging` section of a full configuration.
pub fn init(config: &UvgridConfig) -> bool {
    init_logging(&config.logging)
}
