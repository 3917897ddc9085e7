//! # Configuration System
//!
//! YAML configuration for the resampler:
//!
//! - Resampler switches (conjugate symmetry, pointing phase ramp, degrid normalization)
//! - Kernel lookup tolerances
//! - Parallel pass settings
//! - Logging
//!
//! ## Configuration Search Path
//!
//! Configuration is loaded from the first file found:
//! 1. Path specified via the `UVGRID_CONFIG` environment variable
//! 2. `./uvgrid.yaml` (current directory)
//! 3. `~/.config/uvgrid/config.yaml` (user config)
//! 4. `/etc/uvgrid/config.yaml` (system config)
//!
//! ## Example Configuration
//!
//! ```yaml
//! resampler:
//!   conjugate_symmetry: true
//!   phase_gradient: true
//!   degrid_normalization: none
//!
//! kernel_tolerance:
//!   orientation_rad: 0.0175
//!   frequency_hz: 1.0e6
//!
//! parallel:
//!   workers: 8
//!
//! logging:
//!   level: debug
//!   format: json
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::kernel::KernelTolerance;
use crate::observe::logging::LogConfig;
use crate::resampler::ResamplerOptions;

/// Environment variable naming an explicit configuration file.
pub const CONFIG_ENV: &str = "UVGRID_CONFIG";

/// Error type for configuration operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(String),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Validation(String),
}

/// Parallel pass configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelConfig {
    /// Partial grids per gridding pass (0 = one per Rayon thread)
    pub workers: usize,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self { workers: 0 }
    }
}

/// Complete resampler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UvgridConfig {
    pub version: String,
    pub resampler: ResamplerOptions,
    pub kernel_tolerance: KernelTolerance,
    pub parallel: ParallelConfig,
    pub logging: LogConfig,
}

impl Default for UvgridConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            resampler: ResamplerOptions::default(),
            kernel_tolerance: KernelTolerance::default(),
            parallel: ParallelConfig::default(),
            logging: LogConfig::default(),
        }
    }
}

impl UvgridConfig {
    /// Load configuration from the default search path.
    ///
    /// Returns the default config if no file is found.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            if Path::new(&path).exists() {
                return Self::load_from(Path::new(&path));
            }
        }

        for path in &Self::config_search_paths() {
            if path.exists() {
                return Self::load_from(path);
            }
        }

        Ok(Self::default())
    }

    /// Load and validate configuration from a specific file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(format!("{}: {}", path.display(), e)))?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content =
            serde_yaml::to_string(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        std::fs::write(path, content)
            .map_err(|e| ConfigError::Read(format!("{}: {}", path.display(), e)))
    }

    /// Candidate files after the environment variable.
    pub fn config_search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("./uvgrid.yaml")];

        if let Some(dirs) = directories::ProjectDirs::from("", "", "uvgrid") {
            paths.push(dirs.config_dir().join("config.yaml"));
        }

        paths.push(PathBuf::from("/etc/uvgrid/config.yaml"));
        paths
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let tol = &self.kernel_tolerance;
        if !(tol.orientation_rad.is_finite() && tol.orientation_rad >= 0.0) {
            return Err(ConfigError::Validation(format!(
                "kernel_tolerance.orientation_rad must be a non-negative number, got {}",
                tol.orientation_rad
            )));
        }
        if !(tol.frequency_hz.is_finite() && tol.frequency_hz >= 0.0) {
            return Err(ConfigError::Validation(format!(
                "kernel_tolerance.frequency_hz must be a non-negative number, got {}",
                tol.frequency_hz
            )));
        }
        Ok(())
    }

    /// Default configuration as YAML.
    pub fn example_yaml() -> String {
        serde_yaml::to_string(&Self::default()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observe::logging::{LogFormat, LogLevel};
    use crate::resampler::DegridNormalization;

    #[test]
    fn test_default_config() {
        let config = UvgridConfig::default();
        assert!(config.resampler.conjugate_symmetry);
        assert!(config.resampler.phase_gradient);
        assert_eq!(config.resampler.degrid_normalization, DegridNormalization::None);
        assert_eq!(config.parallel.workers, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
resampler:
  conjugate_symmetry: false
  degrid_normalization: kernel_sum

kernel_tolerance:
  orientation_rad: 0.05
  frequency_hz: 2.5e5

parallel:
  workers: 8

logging:
  level: debug
  format: json
"#;

        let config = UvgridConfig::parse(yaml).unwrap();
        assert!(!config.resampler.conjugate_symmetry);
        assert!(config.resampler.phase_gradient);
        assert_eq!(config.resampler.degrid_normalization, DegridNormalization::KernelSum);
        assert_eq!(config.kernel_tolerance.orientation_rad, 0.05);
        assert_eq!(config.kernel_tolerance.frequency_hz, 250_000.0);
        assert_eq!(config.parallel.workers, 8);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_parse_partial_yaml() {
        let yaml = r#"
kernel_tolerance:
  frequency_hz: 10.0
"#;

        let config = UvgridConfig::parse(yaml).unwrap();
        assert_eq!(config.kernel_tolerance.frequency_hz, 10.0);
        // Defaults fill the rest
        assert_eq!(
            config.kernel_tolerance.orientation_rad,
            KernelTolerance::default().orientation_rad
        );
        assert!(config.resampler.conjugate_symmetry);
    }

    #[test]
    fn test_validation() {
        let mut config = UvgridConfig::default();
        config.kernel_tolerance.orientation_rad = -0.1;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        config.kernel_tolerance.orientation_rad = 0.1;
        config.kernel_tolerance.frequency_hz = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            UvgridConfig::parse("parallel: [1, 2"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_serialize_deserialize() {
        let yaml = UvgridConfig::example_yaml();
        assert!(yaml.contains("resampler:"));
        assert!(yaml.contains("kernel_tolerance:"));
        let parsed = UvgridConfig::parse(&yaml).unwrap();
        assert_eq!(parsed, UvgridConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("uvgrid-config-{}.yaml", std::process::id()));
        let mut config = UvgridConfig::default();
        config.parallel.workers = 3;
        config.save(&path).unwrap();
        let loaded = UvgridConfig::load_from(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded.parallel.workers, 3);

        let missing = std::env::temp_dir().join("uvgrid-config-does-not-exist.yaml");
        assert!(matches!(UvgridConfig::load_from(&missing), Err(ConfigError::Read(_))));
    }

    #[test]
    fn test_config_search_paths() {
        let paths = UvgridConfig::config_search_paths();
        assert!(paths[0].ends_with("uvgrid.yaml"));
        assert!(paths.last().unwrap().starts_with("/etc/uvgrid"));
    }
}
