//! Application configuration, loaded from an optional TOML file.
//!
//! Every field has a default so a missing file or a partial one both work;
//! a present but malformed file is an error rather than a silent fallback.

use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::chart::{DEFAULT_CHART_HEIGHT, DEFAULT_CHART_WIDTH};
use crate::log::{DEFAULT_CPI, MAX_EVENTS};

pub const CONFIG_FILE: &str = "mousemeter.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// CPI assumed for velocity/distance until a Measure cycle runs.
    pub default_cpi: f64,
    /// Hard cap on events retained per capture cycle.
    pub max_events: usize,
    pub chart_width: u32,
    pub chart_height: u32,
    /// Tracing filter directive, e.g. "info" or "mousemeter=debug".
    pub log_level: String,
    /// Capture device as "bus.device.endpoint"; autodetected when unset.
    pub device: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_cpi: DEFAULT_CPI,
            max_events: MAX_EVENTS,
            chart_width: DEFAULT_CHART_WIDTH,
            chart_height: DEFAULT_CHART_HEIGHT,
            log_level: "info".to_owned(),
            device: None,
        }
    }
}

impl AppConfig {
    /// Read the config at `path`. Absent file yields the defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let cfg: Self = toml::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = AppConfig::load(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(cfg.default_cpi, DEFAULT_CPI);
        assert_eq!(cfg.max_events, MAX_EVENTS);
        assert_eq!(cfg.log_level, "info");
        assert!(cfg.device.is_none());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "default_cpi = 1600\ndevice = \"1.3.1\"\n").unwrap();

        let cfg = AppConfig::load(&path).unwrap();
        assert_eq!(cfg.default_cpi, 1600.0);
        assert_eq!(cfg.device.as_deref(), Some("1.3.1"));
        assert_eq!(cfg.chart_width, DEFAULT_CHART_WIDTH);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "default_cpi = \"not a number\"").unwrap();
        assert!(AppConfig::load(&path).is_err());
    }
}
