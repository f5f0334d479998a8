use std::path::Path;
use std::str::FromStr;

use chrono::FixedOffset;
use error_stack::{Report, ResultExt};
use serde::Deserialize;

use crate::error::ConfigError;
use crate::indicator::IndicatorParams;

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "text".into()
}

fn default_data_dir() -> String {
    "./data".into()
}

fn default_batch_size() -> usize {
    1000
}

fn default_timezone_offset() -> String {
    "+07:00".into()
}

fn default_ema_fast() -> usize {
    13
}

fn default_ema_slow() -> usize {
    21
}

fn default_macd_fast() -> usize {
    12
}

fn default_macd_slow() -> usize {
    26
}

fn default_macd_signal() -> usize {
    9
}

fn default_stoch_k() -> usize {
    5
}

fn default_stoch_smoothing() -> usize {
    3
}

fn default_stoch_d() -> usize {
    3
}

/// How the upper endpoint of a run's `[start, end]` range is treated when
/// filtering source rows. The lower endpoint is always inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangeBound {
    Inclusive,
    Exclusive,
}

impl Default for RangeBound {
    fn default() -> Self {
        Self::Inclusive
    }
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub general: GeneralConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub indicators: IndicatorConfig,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Accepted values: `"text"` | `"json"`
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub batch_size: usize,
    /// Fixed offset used for all time bucketing, e.g. `"+07:00"` so daily
    /// buckets align with that zone's midnight.
    pub timezone_offset: String,
    pub upper_bound: RangeBound,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            timezone_offset: default_timezone_offset(),
            upper_bound: RangeBound::default(),
        }
    }
}

impl PipelineConfig {
    pub fn offset(&self) -> Result<FixedOffset, Report<ConfigError>> {
        FixedOffset::from_str(&self.timezone_offset).change_context(ConfigError::Validation {
            field: format!(
                "pipeline.timezone_offset: \"{}\" is not a valid offset",
                self.timezone_offset
            ),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct IndicatorConfig {
    #[serde(default = "default_ema_fast")]
    pub ema_fast: usize,
    #[serde(default = "default_ema_slow")]
    pub ema_slow: usize,
    #[serde(default = "default_macd_fast")]
    pub macd_fast: usize,
    #[serde(default = "default_macd_slow")]
    pub macd_slow: usize,
    #[serde(default = "default_macd_signal")]
    pub macd_signal: usize,
    #[serde(default = "default_stoch_k")]
    pub stoch_k: usize,
    #[serde(default = "default_stoch_smoothing")]
    pub stoch_smoothing: usize,
    #[serde(default = "default_stoch_d")]
    pub stoch_d: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            ema_fast: default_ema_fast(),
            ema_slow: default_ema_slow(),
            macd_fast: default_macd_fast(),
            macd_slow: default_macd_slow(),
            macd_signal: default_macd_signal(),
            stoch_k: default_stoch_k(),
            stoch_smoothing: default_stoch_smoothing(),
            stoch_d: default_stoch_d(),
        }
    }
}

impl IndicatorConfig {
    pub fn params(&self) -> IndicatorParams {
        IndicatorParams {
            ema_fast: self.ema_fast,
            ema_slow: self.ema_slow,
            macd_fast: self.macd_fast,
            macd_slow: self.macd_slow,
            macd_signal: self.macd_signal,
            stoch_k: self.stoch_k,
            stoch_smoothing: self.stoch_smoothing,
            stoch_d: self.stoch_d,
        }
    }
}

/// Load and validate an `AppConfig` from a TOML file at `path`.
pub fn load(path: &Path) -> Result<AppConfig, Report<ConfigError>> {
    let content = std::fs::read_to_string(path)
        .change_context(ConfigError::ReadFile)
        .attach_with(|| format!("path: {}", path.display()))?;

    let config: AppConfig = toml::from_str(&content).change_context(ConfigError::Parse {
        reason: "invalid TOML syntax or schema mismatch".into(),
    })?;

    validate(&config)?;

    Ok(config)
}

fn validate(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    if config.pipeline.batch_size == 0 {
        return Err(Report::new(ConfigError::Validation {
            field: "pipeline.batch_size must be > 0".into(),
        }));
    }

    config.pipeline.offset()?;

    let indicators = &config.indicators;
    let periods = [
        ("indicators.ema_fast", indicators.ema_fast),
        ("indicators.ema_slow", indicators.ema_slow),
        ("indicators.macd_fast", indicators.macd_fast),
        ("indicators.macd_slow", indicators.macd_slow),
        ("indicators.macd_signal", indicators.macd_signal),
        ("indicators.stoch_k", indicators.stoch_k),
        ("indicators.stoch_smoothing", indicators.stoch_smoothing),
        ("indicators.stoch_d", indicators.stoch_d),
    ];
    for (field, period) in periods {
        if period == 0 {
            return Err(Report::new(ConfigError::Validation {
                field: format!("{field} must be > 0"),
            }));
        }
    }

    if indicators.macd_fast >= indicators.macd_slow {
        return Err(Report::new(ConfigError::Validation {
            field: "indicators.macd_fast must be < indicators.macd_slow".into(),
        }));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> AppConfig {
        toml::from_str(toml).expect("parse failed")
    }

    #[test]
    fn valid_full_config_parses() {
        let toml = r#"
[general]
log_level = "debug"
log_format = "json"
data_dir = "/tmp/data"

[pipeline]
batch_size = 500
timezone_offset = "+09:00"
upper_bound = "exclusive"

[indicators]
ema_fast = 9
ema_slow = 50
"#;
        let config = parse(toml);
        assert!(validate(&config).is_ok());
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.pipeline.batch_size, 500);
        assert_eq!(config.pipeline.upper_bound, RangeBound::Exclusive);
        assert_eq!(config.indicators.ema_fast, 9);
        // Unset indicator fields keep their defaults.
        assert_eq!(config.indicators.macd_slow, 26);
    }

    #[test]
    fn defaults_applied_when_sections_omitted() {
        let config = parse("[general]\n");
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.log_format, "text");
        assert_eq!(config.general.data_dir, "./data");
        assert_eq!(config.pipeline.batch_size, 1000);
        assert_eq!(config.pipeline.timezone_offset, "+07:00");
        assert_eq!(config.pipeline.upper_bound, RangeBound::Inclusive);
        assert_eq!(config.indicators.stoch_k, 5);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn zero_batch_size_rejected() {
        let config = parse("[general]\n\n[pipeline]\nbatch_size = 0\n");
        assert!(validate(&config).is_err());
    }

    #[test]
    fn bad_timezone_offset_rejected() {
        let config = parse("[general]\n\n[pipeline]\ntimezone_offset = \"Jakarta\"\n");
        assert!(validate(&config).is_err());
    }

    #[test]
    fn macd_fast_ge_slow_rejected() {
        let config = parse("[general]\n\n[indicators]\nmacd_fast = 26\nmacd_slow = 12\n");
        assert!(validate(&config).is_err());
    }

    #[test]
    fn zero_period_rejected() {
        let config = parse("[general]\n\n[indicators]\nstoch_d = 0\n");
        assert!(validate(&config).is_err());
    }

    #[test]
    fn offset_parses_to_fixed_offset() {
        let config = parse("[general]\n");
        let offset = config.pipeline.offset().unwrap();
        assert_eq!(offset.local_minus_utc(), 7 * 3600);
    }
}
