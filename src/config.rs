use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::app::settings::{
    default_borough_passes, DatasetNames, PipelineSettings, RuleBook, SampleSize, TableNames,
};
use crate::constants;
use crate::error::{EtlError, Result};
use crate::pipeline::dedupe::DedupePass;
use crate::pipeline::enrich::EnricherSettings;
use crate::retry::RetryPolicy;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";
pub const GEOCODE_URL_ENV: &str = "LONDON_ETL_GEOCODE_URL";

/// Everything is defaulted, so an empty file is a valid config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub geocode: GeocodeConfig,
    pub datasets: DatasetsConfig,
    pub tables: TableNames,
    pub sampling: SamplingConfig,
    pub business: BusinessConfig,
    pub borough: BoroughConfig,
    pub sink: SinkConfig,
    pub rules: RuleBook,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocodeConfig {
    pub base_url: String,
    pub min_delay_ms: u64,
    pub timeout_ms: u64,
    pub workers: usize,
    /// Extra attempts for transient failures (connection errors, timeouts,
    /// 429 and 5xx).
    pub max_retries: u32,
    pub backoff_ms: u64,
}

impl Default for GeocodeConfig {
    fn default() -> Self {
        Self {
            base_url: constants::DEFAULT_GEOCODE_URL.to_string(),
            min_delay_ms: constants::DEFAULT_MIN_DELAY_MS,
            timeout_ms: 10_000,
            workers: 1,
            max_retries: 0,
            backoff_ms: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetsConfig {
    /// Directory the source datasets are read from.
    pub dir: PathBuf,
    #[serde(flatten)]
    pub names: DatasetNames,
}

impl Default for DatasetsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data"),
            names: DatasetNames::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub postcodes: SampleSize,
    pub venues: SampleSize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusinessConfig {
    pub post_town: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoroughConfig {
    pub dedupe_passes: Vec<DedupePass>,
}

impl Default for BoroughConfig {
    fn default() -> Self {
        Self {
            dedupe_passes: default_borough_passes(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    Sqlite,
    Csv,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    pub kind: SinkKind,
    /// Database file for `sqlite`, output directory for `csv`.
    pub path: PathBuf,
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            kind: SinkKind::Sqlite,
            path: PathBuf::from("output/london_etl.db"),
            max_attempts: 1,
            backoff_ms: 250,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
        }
    }
}

impl Config {
    /// Reads `path`, then applies environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            EtlError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        let mut config = Self::from_toml(&content)?;
        config.apply_env();
        Ok(config)
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            let mut config = Self::default();
            config.apply_env();
            Ok(config)
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(GEOCODE_URL_ENV) {
            if !url.trim().is_empty() {
                self.geocode.base_url = url;
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.geocode.workers == 0 {
            return Err(EtlError::Config("geocode.workers must be at least 1".to_string()));
        }
        if self.geocode.timeout_ms == 0 {
            return Err(EtlError::Config("geocode.timeout_ms must be positive".to_string()));
        }
        if let Some(pass) = self.borough.dedupe_passes.iter().find(|p| p.key.is_empty()) {
            return Err(EtlError::Config(format!(
                "borough.dedupe_passes has a pass with an empty key (keep = {:?})",
                pass.keep
            )));
        }
        for rules in [
            &self.rules.business,
            &self.rules.venues,
            &self.rules.boroughs,
            &self.rules.postcodes,
        ] {
            rules.validate()?;
        }
        Ok(())
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            datasets: self.datasets.names.clone(),
            tables: self.tables.clone(),
            postcode_sample: self.sampling.postcodes,
            venue_sample: self.sampling.venues,
            post_town: self.business.post_town.clone(),
            borough_passes: self.borough.dedupe_passes.clone(),
            rules: self.rules.clone(),
        }
    }

    pub fn enricher_settings(&self) -> EnricherSettings {
        EnricherSettings {
            workers: self.geocode.workers,
            min_delay: Duration::from_millis(self.geocode.min_delay_ms),
            timeout: Duration::from_millis(self.geocode.timeout_ms),
            retry: RetryPolicy::new(
                self.geocode.max_retries.saturating_add(1),
                Duration::from_millis(self.geocode.backoff_ms),
            ),
        }
    }

    pub fn sink_retry(&self) -> RetryPolicy {
        RetryPolicy::new(self.sink.max_attempts, Duration::from_millis(self.sink.backoff_ms))
    }
}
