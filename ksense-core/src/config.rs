//! TOML configuration for the estimators and the reference window.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::histogram::{PickMode, DEFAULT_SUBBITS};
use crate::mahalanobis::MahalanobisConfig;

/// Default number of feature vectors kept in the reference window.
pub const DEFAULT_WINDOW_CAPACITY: usize = 512;

/// Errors loading or validating a config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Histogram estimator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistogramConfig {
    pub subbits: u32,
    pub percentiles: Vec<f64>,
    pub mode: PickMode,
}

impl Default for HistogramConfig {
    fn default() -> Self {
        Self {
            subbits: DEFAULT_SUBBITS,
            percentiles: vec![0.95, 0.99],
            mode: PickMode::Mid,
        }
    }
}

/// Reference window settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub capacity: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_WINDOW_CAPACITY,
        }
    }
}

/// Top-level configuration. Every section is optional in the TOML file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KsenseConfig {
    pub histogram: HistogramConfig,
    pub mahalanobis: MahalanobisConfig,
    pub window: WindowConfig,
}

impl KsenseConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: KsenseConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let h = &self.histogram;
        if !(1..=16).contains(&h.subbits) {
            return Err(ConfigError::Invalid(format!(
                "histogram.subbits must be in 1..=16, got {}",
                h.subbits
            )));
        }
        if let Some(p) = h
            .percentiles
            .iter()
            .find(|p| !p.is_finite() || **p <= 0.0 || **p > 1.0)
        {
            return Err(ConfigError::Invalid(format!(
                "histogram.percentiles must lie in (0, 1], got {p}"
            )));
        }

        let m = &self.mahalanobis;
        if m.min_samples < 2 {
            return Err(ConfigError::Invalid(format!(
                "mahalanobis.min_samples must be >= 2, got {}",
                m.min_samples
            )));
        }
        for (name, value) in [("reg_abs", m.reg_abs), ("reg_rel", m.reg_rel)] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "mahalanobis.{name} must be finite and >= 0, got {value}"
                )));
            }
        }

        if self.window.capacity == 0 {
            return Err(ConfigError::Invalid(
                "window.capacity must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}
