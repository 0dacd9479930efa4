//! Configuration loading from TOML files

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use prepline_core::RetryPolicy;
use prepline_osf::{ClientConfig, HarvestConfig, IngestConfig};
use serde::Deserialize;

/// Global configuration for prepline
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub api: ApiConfig,
    pub harvest: HarvestSection,
    pub ingest: IngestSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
    /// Defaults to `{data_dir}/raw`
    pub raw_dir: Option<PathBuf>,
    /// Defaults to `{data_dir}/preprints.db`
    pub db_path: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            raw_dir: None,
            db_path: None,
        }
    }
}

impl PathsConfig {
    pub fn raw_dir(&self) -> PathBuf {
        self.raw_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("raw"))
    }

    pub fn db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("preprints.db"))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub page_size: u32,
    pub min_delay_ms: u64,
    pub timeout_secs: u64,
    pub max_retries: u32,
    #[serde(deserialize_with = "deserialize_env_var")]
    pub token: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: prepline_osf::config::DEFAULT_BASE_URL.to_string(),
            page_size: 50,
            min_delay_ms: 3000,
            timeout_secs: 30,
            max_retries: 5,
            token: std::env::var("OSF_TOKEN").ok(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HarvestSection {
    pub provider: String,
    pub start_date: NaiveDate,
    pub max_consecutive_failures: usize,
    pub workers: usize,
}

impl Default for HarvestSection {
    fn default() -> Self {
        let lib = HarvestConfig::default();
        Self {
            provider: lib.provider,
            start_date: lib.start_date,
            max_consecutive_failures: lib.max_consecutive_failures,
            workers: lib.workers,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct IngestSection {
    pub batch_size: usize,
}

impl Default for IngestSection {
    fn default() -> Self {
        Self {
            batch_size: IngestConfig::default().batch_size,
        }
    }
}

/// Deserialize a string that may contain environment variable reference like ${VAR}
fn deserialize_env_var<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.and_then(|s| expand_env_var(&s)))
}

/// Expand ${VAR} to environment variable value
fn expand_env_var(s: &str) -> Option<String> {
    if let Some(var_name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        std::env::var(var_name).ok()
    } else {
        Some(s.to_string())
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./prepline.toml (current directory)
    /// 2. ~/.config/prepline/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("prepline.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "prepline") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.api.base_url.clone(),
            page_size: self.api.page_size,
            request_timeout: Duration::from_secs(self.api.timeout_secs),
            min_delay: Duration::from_millis(self.api.min_delay_ms),
            retry: match self.api.max_retries {
                0 | 1 => RetryPolicy::none(),
                n => RetryPolicy {
                    max_attempts: n,
                    ..Default::default()
                },
            },
            token: self.api.token.clone(),
        }
    }

    pub fn harvest_config(&self) -> HarvestConfig {
        HarvestConfig {
            provider: self.harvest.provider.clone(),
            start_date: self.harvest.start_date,
            max_consecutive_failures: self.harvest.max_consecutive_failures,
            workers: self.harvest.workers,
            ..Default::default()
        }
    }

    pub fn ingest_config(&self) -> IngestConfig {
        IngestConfig {
            batch_size: self.ingest.batch_size,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.paths.raw_dir(), PathBuf::from("./data/raw"));
        assert_eq!(config.paths.db_path(), PathBuf::from("./data/preprints.db"));
        assert_eq!(config.api.page_size, 50);
        assert_eq!(config.harvest.provider, "psyarxiv");
        assert_eq!(config.ingest.batch_size, 500);
    }

    #[test]
    fn expand_env_var_simple() {
        std::env::set_var("PREPLINE_TEST_TOKEN", "secret");
        assert_eq!(
            expand_env_var("${PREPLINE_TEST_TOKEN}"),
            Some("secret".to_string())
        );
        std::env::remove_var("PREPLINE_TEST_TOKEN");
    }

    #[test]
    fn expand_env_var_literal() {
        assert_eq!(expand_env_var("literal"), Some("literal".to_string()));
    }

    #[test]
    fn expand_env_var_missing() {
        assert_eq!(expand_env_var("${NONEXISTENT_VAR_12345}"), None);
    }

    #[test]
    fn parse_config_toml() {
        let toml = r#"
[paths]
data_dir = "/srv/prepline"
db_path = "/srv/db/osf.db"

[api]
min_delay_ms = 500
max_retries = 2

[harvest]
provider = "socarxiv"
start_date = "2020-06-01"
workers = 2

[ingest]
batch_size = 100
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.paths.raw_dir(), PathBuf::from("/srv/prepline/raw"));
        assert_eq!(config.paths.db_path(), PathBuf::from("/srv/db/osf.db"));

        let client = config.client_config();
        assert_eq!(client.min_delay, Duration::from_millis(500));
        assert_eq!(client.retry.max_attempts, 2);
        assert_eq!(client.page_size, 50);

        let harvest = config.harvest_config();
        assert_eq!(harvest.provider, "socarxiv");
        assert_eq!(harvest.start_date, NaiveDate::from_ymd_opt(2020, 6, 1).unwrap());
        assert_eq!(harvest.workers, 2);
        assert_eq!(harvest.max_consecutive_failures, 3);
        assert_eq!(config.ingest_config().batch_size, 100);
    }

    #[test]
    fn unknown_date_rejected() {
        let err = toml::from_str::<Config>("[harvest]\nstart_date = \"yesterday\"\n");
        assert!(err.is_err());
    }
}
