use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::Result;
use crate::validation_error;

/// Engine configuration, resolved once at startup and passed by reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub engine_name: String,
    pub engine_author: String,
    pub enable_debug: bool,

    // Pattern store
    pub pattern_store_path: PathBuf,

    // Move selection
    pub jitter: f32,
    pub top_k: usize,
    pub safety_filter: bool,
    pub seed: Option<u64>,

    pub time: TimeConfig,
}

/// Wall-clock budgeting constants used by the time controller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeConfig {
    /// Reserved for host/IO latency, subtracted from every clock-derived budget
    pub move_overhead_ms: u64,
    /// Lower bound on any clock-derived budget
    pub min_think_ms: u64,
    /// Budget used when `go` carries neither movetime nor a clock
    pub default_think_ms: u64,
    /// Fraction of the increment added to the per-move share
    pub increment_fraction: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            engine_name: "Style Engine".to_string(),
            engine_author: "Style Engine Team".to_string(),
            enable_debug: false,
            pattern_store_path: PathBuf::from("data/patterns.json"),
            jitter: 0.05,
            top_k: 3,
            safety_filter: true,
            seed: None,
            time: TimeConfig::default(),
        }
    }
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            move_overhead_ms: 50,
            min_think_ms: 10,
            default_think_ms: 1000,
            increment_fraction: 0.75,
        }
    }
}

impl EngineConfig {
    /// Read a JSON config; absent fields take their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        let config: EngineConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Deterministic configuration for tests and benchmarks: no jitter, fixed seed.
    pub fn deterministic(seed: u64) -> Self {
        Self {
            jitter: 0.0,
            seed: Some(seed),
            ..Self::default()
        }
    }

    pub fn with_pattern_store<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.pattern_store_path = path.into();
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=0.2).contains(&self.jitter) {
            return Err(validation_error!("jitter", self.jitter, "0.0..=0.2"));
        }
        if self.top_k == 0 {
            return Err(validation_error!("top_k", self.top_k, ">= 1"));
        }
        if !(0.0..=1.0).contains(&self.time.increment_fraction) {
            return Err(validation_error!(
                "time.increment_fraction",
                self.time.increment_fraction,
                "0.0..=1.0"
            ));
        }
        if self.time.min_think_ms == 0 {
            return Err(validation_error!("time.min_think_ms", 0, ">= 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.top_k, 3);
        assert_eq!(config.pattern_store_path, PathBuf::from("data/patterns.json"));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"jitter": 0.1, "time": {{"move_overhead_ms": 20}}}}"#).unwrap();

        let config = EngineConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.jitter, 0.1);
        assert_eq!(config.time.move_overhead_ms, 20);
        assert_eq!(config.time.default_think_ms, 1000);
        assert!(config.safety_filter);
    }

    #[test]
    fn test_invalid_jitter_rejected() {
        let config = EngineConfig {
            jitter: 0.5,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deterministic_config() {
        let config = EngineConfig::deterministic(7);
        assert_eq!(config.jitter, 0.0);
        assert_eq!(config.seed, Some(7));
    }
}
