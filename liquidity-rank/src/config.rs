//! Run configuration loaded from TOML.
//!
//! Every section falls back to its defaults, so an empty file is a valid
//! configuration. See `config/default.toml` for the full layout.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analytics::LiquidityClassifierConfig;
use crate::data::XigniteSettings;
use crate::pipeline::{BatchConfig, RunSettings};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Output locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Main report, `.csv` or `.parquet`.
    pub report_path: PathBuf,
    /// Tier 1/2 tracker; not written when absent.
    pub tracker_path: Option<PathBuf>,
    /// IV rank export; IV columns stay empty when absent.
    pub vol_data_path: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            report_path: PathBuf::from("output/option_liquidity_us.csv"),
            tracker_path: Some(PathBuf::from("output/liquidity_tracker_us.csv")),
            vol_data_path: Some(PathBuf::from("data/iv_rank.csv")),
        }
    }
}

/// Full run configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Exchange whose option underlyings form the universe.
    pub exchange: String,
    /// Concurrent earnings lookups.
    pub earnings_concurrency: usize,
    pub batch: BatchConfig,
    pub liquidity: LiquidityClassifierConfig,
    pub xignite: XigniteSettings,
    pub output: OutputConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            exchange: "OPRA".to_string(),
            earnings_concurrency: 10,
            batch: BatchConfig::default(),
            liquidity: LiquidityClassifierConfig::default(),
            xignite: XigniteSettings::default(),
            output: OutputConfig::default(),
        }
    }
}

impl RunConfig {
    /// Read and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.exchange.trim().is_empty() {
            return Err(ConfigError::Invalid("exchange must not be empty".into()));
        }
        if self.batch.batch_size == 0 {
            return Err(ConfigError::Invalid("batch.batch_size must be positive".into()));
        }
        if self.batch.max_concurrent_batches == 0 {
            return Err(ConfigError::Invalid(
                "batch.max_concurrent_batches must be positive".into(),
            ));
        }
        if self.batch.fetch_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "batch.fetch_timeout_secs must be positive".into(),
            ));
        }
        if self.earnings_concurrency == 0 {
            return Err(ConfigError::Invalid("earnings_concurrency must be positive".into()));
        }

        let l = &self.liquidity;
        if !(l.tier1_spread_spot > 0.0 && l.tier2_spread_spot > 0.0) {
            return Err(ConfigError::Invalid("spread thresholds must be positive".into()));
        }
        if l.tier1_open_interest <= 0 || l.tier2_open_interest <= 0 {
            return Err(ConfigError::Invalid(
                "open interest thresholds must be positive".into(),
            ));
        }
        if l.tier1_spread_spot > l.tier2_spread_spot {
            return Err(ConfigError::Invalid(format!(
                "tier1_spread_spot ({}) exceeds tier2_spread_spot ({})",
                l.tier1_spread_spot, l.tier2_spread_spot
            )));
        }

        Ok(())
    }

    /// Pipeline settings, with an optional universe limit.
    pub fn run_settings(&self, limit: Option<usize>) -> RunSettings {
        RunSettings {
            exchange: self.exchange.clone(),
            batch: self.batch.clone(),
            liquidity: self.liquidity.clone(),
            earnings_concurrency: self.earnings_concurrency,
            limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = RunConfig::from_toml_str("").unwrap();
        assert_eq!(config.exchange, "OPRA");
        assert_eq!(config.batch.batch_size, 100);
        assert_eq!(config.batch.max_concurrent_batches, 10);
        assert_eq!(config.liquidity.tier1_spread_spot, 0.004);
        assert_eq!(config.xignite.token_env, "XIGNITE_API_TOKEN");
        assert_eq!(
            config.output.report_path,
            PathBuf::from("output/option_liquidity_us.csv")
        );
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config = RunConfig::from_toml_str(
            r#"
            [batch]
            batch_size = 25

            [liquidity]
            tier2_spread_spot = 0.008
            "#,
        )
        .unwrap();
        assert_eq!(config.batch.batch_size, 25);
        assert_eq!(config.batch.fetch_timeout_secs, 30);
        assert_eq!(config.liquidity.tier2_spread_spot, 0.008);
        assert_eq!(config.liquidity.tier1_open_interest, 1000);
    }

    #[test]
    fn test_rejects_zero_batch_size() {
        let result = RunConfig::from_toml_str("[batch]\nbatch_size = 0\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_non_positive_thresholds() {
        let result = RunConfig::from_toml_str("[liquidity]\ntier1_spread_spot = 0.0\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));

        let result = RunConfig::from_toml_str("[liquidity]\ntier2_open_interest = -5\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_inverted_spread_thresholds() {
        let result = RunConfig::from_toml_str(
            "[liquidity]\ntier1_spread_spot = 0.01\ntier2_spread_spot = 0.005\n",
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_malformed_toml() {
        let result = RunConfig::from_toml_str("[batch\nbatch_size = 1");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "exchange = \"XNAS\"\nearnings_concurrency = 4").unwrap();

        let config = RunConfig::load(file.path()).unwrap();
        assert_eq!(config.exchange, "XNAS");

        let settings = config.run_settings(Some(50));
        assert_eq!(settings.earnings_concurrency, 4);
        assert_eq!(settings.limit, Some(50));
    }

    #[test]
    fn test_missing_file() {
        let result = RunConfig::load(Path::new("/nonexistent/liquidity.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_shipped_default_config_parses() {
        let config = RunConfig::from_toml_str(include_str!("../config/default.toml")).unwrap();
        assert_eq!(config.batch.batch_size, 100);
        assert_eq!(config.xignite.option_exchange, "OPRA");
    }
}
