//! Runtime configuration for the harvest and ingest pipeline

use std::time::Duration;

use chrono::NaiveDate;
use prepline_core::RetryPolicy;

pub const DEFAULT_BASE_URL: &str = "https://api.osf.io/v2";
pub const DEFAULT_PROVIDER: &str = "psyarxiv";

/// OSF API client settings
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API root, without the trailing `/preprints/`
    pub base_url: String,
    /// Records per page (`page[size]`)
    pub page_size: u32,
    pub request_timeout: Duration,
    /// Minimum spacing between any two requests, retries included
    pub min_delay: Duration,
    pub retry: RetryPolicy,
    /// Personal access token sent as `Authorization: Bearer`
    pub token: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            page_size: 50,
            request_timeout: Duration::from_secs(30),
            min_delay: Duration::from_secs(3),
            retry: RetryPolicy::default(),
            token: None,
        }
    }
}

impl ClientConfig {
    /// `{base_url}/preprints/`, tolerating a trailing slash on the base.
    pub fn preprints_url(&self) -> String {
        format!("{}/preprints/", self.base_url.trim_end_matches('/'))
    }
}

/// Harvester settings
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub provider: String,
    /// First day harvested when no window is complete yet
    pub start_date: NaiveDate,
    /// Consecutive failed windows that count as a systemic outage
    pub max_consecutive_failures: usize,
    /// Windows harvested in parallel (one shared rate limiter)
    pub workers: usize,
    /// Pause before the next window after the API kept answering 429
    pub rate_limit_cooldown: Duration,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            provider: DEFAULT_PROVIDER.to_string(),
            start_date: NaiveDate::from_ymd_opt(2016, 1, 1).unwrap_or_default(),
            max_consecutive_failures: 3,
            workers: 1,
            rate_limit_cooldown: Duration::from_secs(60),
        }
    }
}

/// Ingestor settings
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Records per transaction
    pub batch_size: usize,
    /// Reprocess every record's latest raw document
    pub force: bool,
    pub limit: Option<usize>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: 500,
            force: false,
            limit: None,
        }
    }
}
