use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::scoring::{ChangeDetectorConfig, ScoringModelConfig};

/// Minimum inter-cycle sleep. Shorter configured intervals are clamped up.
pub const MIN_INTERVAL_SECONDS: u64 = 60;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub sources: SourcesConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub detector: ChangeDetectorConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub interval_seconds: u64,
    pub issuers: Vec<String>,
    pub country_code: String,
    pub lookback_days: u32,
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourcesConfig {
    pub market_base_url: String,
    pub macro_base_url: String,
    #[serde(default)]
    pub news_feeds: Vec<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScoringConfig {
    /// Persist the model state across cycles (and restarts) through the
    /// store. Off means learning lives only as long as the process.
    #[serde(default = "default_true")]
    pub persist_model: bool,
    #[serde(default)]
    pub model: ScoringModelConfig,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            persist_model: true,
            model: ScoringModelConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

fn default_fetch_concurrency() -> usize {
    4
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

impl PipelineConfig {
    /// Configured tickers, trimmed, uppercased, deduplicated, in order.
    pub fn tracked_tickers(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for ticker in &self.issuers {
            let t = ticker.trim().to_ascii_uppercase();
            if !t.is_empty() && !out.iter().any(|v| v == &t) {
                out.push(t);
            }
        }
        out
    }

    /// Inter-cycle sleep with the minimum enforced.
    pub fn effective_interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds.max(MIN_INTERVAL_SECONDS))
    }
}

impl SourcesConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config_path = std::env::var("CREDIT_RADAR_CONFIG")
            .unwrap_or_else(|_| "config/default.toml".to_string());
        Self::load_from(Path::new(&config_path))
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&config_str)
            .with_context(|| format!("failed to parse {}", config_path.display()))?;

        if let Ok(issuers) = std::env::var("ISSUERS") {
            config.pipeline.issuers = split_csv(&issuers);
        }
        if let Ok(feeds) = std::env::var("NEWS_RSS_FEEDS") {
            config.sources.news_feeds = split_csv(&feeds);
        }
        if let Ok(interval) = std::env::var("SCHEDULER_INTERVAL_SECONDS") {
            config.pipeline.interval_seconds = interval
                .parse()
                .context("SCHEDULER_INTERVAL_SECONDS must be an integer")?;
        }
        if let Ok(path) = std::env::var("DATABASE_PATH") {
            config.database.path = path;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pipeline.tracked_tickers().is_empty() {
            bail!("pipeline.issuers must list at least one ticker");
        }
        if self.pipeline.lookback_days == 0 {
            bail!("pipeline.lookback_days must be > 0");
        }
        if self.pipeline.fetch_concurrency == 0 {
            bail!("pipeline.fetch_concurrency must be > 0");
        }
        if self.sources.request_timeout_secs == 0 {
            bail!("sources.request_timeout_secs must be > 0");
        }
        if self.database.path.trim().is_empty() {
            bail!("database.path must not be empty");
        }
        Ok(())
    }
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
