//! Configuration management for pacer
//!
//! This module handles loading and validating configuration from environment variables,
//! TOML files, and command-line overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::scheduler::{DistributionPattern, PeakWindow, ScheduleSpec};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Schedule to run
    pub schedule: ScheduleConfig,

    /// Where the run state is persisted
    pub storage: StorageConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Schedule configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Number of requests in the run
    pub total_requests: usize,

    /// Window the requests are spread over (e.g. "90s", "45m", "24h", "1d")
    pub duration: String,

    /// Distribution pattern (uniform, peak_weighted)
    pub pattern: DistributionPattern,

    /// First peak hour (0-23), inclusive
    pub peak_start_hour: u8,

    /// Last peak hour (0-23), exclusive
    pub peak_end_hour: u8,

    /// Density multiplier inside the peak window
    pub peak_weight: f64,

    /// Random spread applied to each delay (0 disables)
    pub jitter_ratio: f64,

    /// Seed for the jitter RNG
    pub jitter_seed: Option<u64>,
}

/// Persistence backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// JSON file
    #[default]
    File,
    /// Embedded SQLite database
    Sqlite,
    /// In-process only, lost on exit
    Memory,
}

impl StorageBackend {
    /// Get backend ID
    pub fn id(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Sqlite => "sqlite",
            Self::Memory => "memory",
        }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "file" | "json" => Ok(Self::File),
            "sqlite" | "db" => Ok(Self::Sqlite),
            "memory" | "mem" => Ok(Self::Memory),
            other => anyhow::bail!("Unknown storage backend: {other}"),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend kind
    pub backend: StorageBackend,

    /// State file or database path
    pub path: PathBuf,

    /// Row key when several runs share one database
    pub key: String,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            total_requests: 100,
            duration: String::from("24h"),
            pattern: DistributionPattern::Uniform,
            peak_start_hour: 18,
            peak_end_hour: 22,
            peak_weight: 3.0,
            jitter_ratio: 0.0,
            jitter_seed: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::File,
            path: PathBuf::from("data/pacer-state.json"),
            key: String::from("default"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Overlay `PACER_*` environment variables onto this configuration
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(total) = env_parse::<usize>("PACER_TOTAL_REQUESTS")? {
            self.schedule.total_requests = total;
        }

        if let Ok(duration) = std::env::var("PACER_DURATION") {
            self.schedule.duration = duration;
        }

        if let Ok(pattern) = std::env::var("PACER_PATTERN") {
            self.schedule.pattern = pattern
                .parse()
                .with_context(|| format!("Invalid PACER_PATTERN: {pattern}"))?;
        }

        if let Some(hour) = env_parse::<u8>("PACER_PEAK_START_HOUR")? {
            self.schedule.peak_start_hour = hour;
        }

        if let Some(hour) = env_parse::<u8>("PACER_PEAK_END_HOUR")? {
            self.schedule.peak_end_hour = hour;
        }

        if let Some(weight) = env_parse::<f64>("PACER_PEAK_WEIGHT")? {
            self.schedule.peak_weight = weight;
        }

        if let Some(ratio) = env_parse::<f64>("PACER_JITTER_RATIO")? {
            self.schedule.jitter_ratio = ratio;
        }

        if let Some(seed) = env_parse::<u64>("PACER_JITTER_SEED")? {
            self.schedule.jitter_seed = Some(seed);
        }

        if let Ok(backend) = std::env::var("PACER_STORAGE_BACKEND") {
            self.storage.backend = backend.parse()?;
        }

        if let Ok(path) = std::env::var("PACER_STORAGE_PATH") {
            self.storage.path = PathBuf::from(path);
        }

        if let Ok(key) = std::env::var("PACER_STORAGE_KEY") {
            self.storage.key = key;
        }

        if let Ok(level) = std::env::var("PACER_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Ok(format) = std::env::var("PACER_LOG_FORMAT") {
            self.logging.format = format;
        }

        Ok(())
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Write configuration as TOML
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        std::fs::write(path, self.to_toml()?)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        self.schedule.to_spec().context("Invalid schedule")?;

        if self.storage.backend != StorageBackend::Memory
            && self.storage.path.as_os_str().is_empty()
        {
            anyhow::bail!("storage.path must be set for the {} backend", self.storage.backend);
        }

        if self.storage.key.trim().is_empty() {
            anyhow::bail!("storage.key must not be empty");
        }

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            anyhow::bail!("logging.format must be 'text' or 'json'");
        }

        Ok(())
    }
}

impl ScheduleConfig {
    /// Parsed duration window
    pub fn window(&self) -> Result<Duration> {
        parse_duration(&self.duration)
    }

    /// Build the schedule this configuration describes
    pub fn to_spec(&self) -> Result<ScheduleSpec> {
        let mut builder = ScheduleSpec::builder()
            .total_requests(self.total_requests)
            .duration_window(self.window()?)
            .pattern(self.pattern);

        if self.pattern == DistributionPattern::PeakWeighted {
            builder = builder.peak(PeakWindow::new(
                self.peak_start_hour,
                self.peak_end_hour,
                self.peak_weight,
            ));
        }

        if self.jitter_ratio > 0.0 {
            builder = builder.jitter(self.jitter_ratio, self.jitter_seed.unwrap_or(0));
        }

        Ok(builder.build()?)
    }
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("Invalid value for {name}: {value}")),
        Err(_) => Ok(None),
    }
}

// ============================================================================
// Durations
// ============================================================================

/// Parse a human duration: `90s`, `45m`, `2h`, `1.5d`, or plain seconds
pub fn parse_duration(input: &str) -> Result<Duration> {
    let input = input.trim();
    if input.is_empty() {
        anyhow::bail!("Empty duration");
    }

    let split = input
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(input.len());
    let (number, unit) = input.split_at(split);

    let value: f64 = number
        .trim()
        .parse()
        .with_context(|| format!("Invalid duration: {input}"))?;

    let scale = match unit.trim().to_lowercase().as_str() {
        "" | "s" | "sec" | "secs" => 1.0,
        "ms" => 0.001,
        "m" | "min" | "mins" => 60.0,
        "h" | "hr" | "hrs" => 3600.0,
        "d" | "day" | "days" => 86_400.0,
        other => anyhow::bail!("Unknown duration unit '{other}' in {input}"),
    };

    let secs = value * scale;
    if !secs.is_finite() || secs < 0.0 {
        anyhow::bail!("Invalid duration: {input}");
    }

    Duration::try_from_secs_f64(secs).with_context(|| format!("Duration out of range: {input}"))
}

/// Format a duration the way `parse_duration` reads it
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if duration.subsec_millis() != 0 {
        return format!("{}ms", duration.as_millis());
    }

    match secs {
        s if s != 0 && s % 86_400 == 0 => format!("{}d", s / 86_400),
        s if s != 0 && s % 3600 == 0 => format!("{}h", s / 3600),
        s if s != 0 && s % 60 == 0 => format!("{}m", s / 60),
        s => format!("{s}s"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_total_requests() {
        let mut config = Config::default();
        config.schedule.total_requests = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_log_format() {
        let mut config = Config::default();
        config.logging.format = String::from("xml");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("45m").unwrap(), Duration::from_secs(2700));
        assert_eq!(parse_duration("24h").unwrap(), Duration::from_secs(86_400));
        assert_eq!(
            parse_duration("1.5d").unwrap(),
            Duration::from_secs(129_600)
        );
        assert_eq!(parse_duration("300").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("5w").is_err());
        assert!(parse_duration("-3s").is_err());
        assert!(parse_duration("99999999999999999999999").is_err());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(86_400)), "1d");
        assert_eq!(format_duration(Duration::from_secs(7200)), "2h");
        assert_eq!(format_duration(Duration::from_secs(90)), "90s");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1500ms");
    }

    #[test]
    fn test_to_spec_peak_weighted() {
        let mut config = ScheduleConfig::default();
        config.pattern = DistributionPattern::PeakWeighted;

        let spec = config.to_spec().unwrap();
        let peak = spec.peak.unwrap();
        assert_eq!(peak.start_hour, 18);
        assert_eq!(peak.end_hour, 22);
        assert_eq!(spec.duration_window, Duration::from_secs(86_400));
    }

    #[test]
    fn test_to_spec_uniform_ignores_peak() {
        let spec = ScheduleConfig::default().to_spec().unwrap();
        assert!(spec.peak.is_none());
        assert!(spec.jitter.is_none());
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut config = Config::default();
        config.storage.backend = StorageBackend::Sqlite;
        config.schedule.jitter_ratio = 0.2;
        config.schedule.jitter_seed = Some(7);

        let text = config.to_toml().unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [schedule]
            total_requests = 12
            pattern = "peak_weighted"
            "#,
        )
        .unwrap();

        assert_eq!(config.schedule.total_requests, 12);
        assert_eq!(config.schedule.duration, "24h");
        assert_eq!(config.storage, StorageConfig::default());
    }

    #[test]
    fn test_storage_backend_from_str() {
        assert_eq!(
            "SQLite".parse::<StorageBackend>().unwrap(),
            StorageBackend::Sqlite
        );
        assert!("redis".parse::<StorageBackend>().is_err());
    }
}
