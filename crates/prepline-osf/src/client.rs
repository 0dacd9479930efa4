//! OSF preprints API client
//!
//! One call fetches one page of preprints for a provider whose
//! `date_modified` falls in a day range. Pages chain through the absolute
//! `links.next` URL, which is passed back as an opaque [`Cursor`].

use std::sync::Arc;

use anyhow::Context;
use chrono::{Days, NaiveDate};
use prepline_core::{FetchError, RateLimiter, get_text, retry_with_backoff};
use serde_json::Value;

use crate::config::ClientConfig;
use crate::error::InvalidRange;

/// Inclusive range of UTC days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, InvalidRange> {
        if start > end {
            return Err(InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// The one-day range of a harvest window.
    pub fn single(day: NaiveDate) -> Self {
        Self {
            start: day,
            end: day,
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Every day in the range, oldest first.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.start.iter_days().take_while(move |d| *d <= self.end)
    }

    pub fn len_days(&self) -> usize {
        (self.end - self.start).num_days() as usize + 1
    }

    /// Cut the range off at `last`, or `None` if it starts after `last`.
    pub fn clamp_end(&self, last: NaiveDate) -> Option<Self> {
        Self::new(self.start, self.end.min(last)).ok()
    }

    /// Exclusive upper bound used by the `[lt]` filter.
    fn end_exclusive(&self) -> NaiveDate {
        self.end.checked_add_days(Days::new(1)).unwrap_or(self.end)
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}..{}", self.start, self.end)
        }
    }
}

/// Continuation token: the absolute URL of the next page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor(pub String);

impl Cursor {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One record of a page: its id plus the untouched JSON document.
#[derive(Debug, Clone)]
pub struct ApiRecord {
    pub id: String,
    pub body: Value,
}

#[derive(Debug, Clone, Default)]
pub struct Page {
    pub records: Vec<ApiRecord>,
    /// `None` when the API reports no further pages
    pub next_cursor: Option<Cursor>,
}

/// Anything that can serve pages of preprints.
///
/// `Sync` so parallel harvest workers can share one source.
pub trait PageSource: Sync {
    fn fetch_page(
        &self,
        provider: &str,
        range: &DateRange,
        cursor: Option<&Cursor>,
    ) -> Result<Page, FetchError>;
}

/// HTTP client for `{base_url}/preprints/`.
///
/// Every attempt, retries included, first waits on the shared
/// [`RateLimiter`].
pub struct OsfClient {
    config: ClientConfig,
    endpoint: reqwest::Url,
    limiter: Arc<RateLimiter>,
}

impl OsfClient {
    pub fn new(config: ClientConfig) -> anyhow::Result<Self> {
        let limiter = Arc::new(RateLimiter::new(config.min_delay));
        Self::with_limiter(config, limiter)
    }

    /// Client sharing an existing limiter with other clients.
    pub fn with_limiter(config: ClientConfig, limiter: Arc<RateLimiter>) -> anyhow::Result<Self> {
        let endpoint = reqwest::Url::parse(&config.preprints_url())
            .with_context(|| format!("Invalid API base URL: {}", config.base_url))?;
        Ok(Self {
            config,
            endpoint,
            limiter,
        })
    }

    /// URL of the first page for `provider` and `range`.
    pub fn first_page_url(&self, provider: &str, range: &DateRange) -> String {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("filter[provider]", provider)
            .append_pair(
                "filter[date_modified][gte]",
                &format!("{}T00:00:00", range.start()),
            )
            .append_pair(
                "filter[date_modified][lt]",
                &format!("{}T00:00:00", range.end_exclusive()),
            )
            .append_pair("sort", "date_modified")
            .append_pair("embed", "contributors")
            .append_pair("embed", "license")
            .append_pair("fields[licenses]", "name")
            .append_pair("page[size]", &self.config.page_size.to_string());
        url.into()
    }
}

impl PageSource for OsfClient {
    fn fetch_page(
        &self,
        provider: &str,
        range: &DateRange,
        cursor: Option<&Cursor>,
    ) -> Result<Page, FetchError> {
        let url = match cursor {
            Some(c) => c.as_str().to_string(),
            None => self.first_page_url(provider, range),
        };
        let label = format!("{provider} {range}");
        retry_with_backoff(&label, &self.config.retry, || {
            self.limiter.acquire();
            let body = get_text(&url, self.config.token.as_deref(), self.config.request_timeout)?;
            parse_page(&body)
        })
    }
}

/// Decode a JSON:API list response.
///
/// A body that is not JSON or has no `data` array is malformed. Entries
/// without a string `id` are dropped with a warning.
pub fn parse_page(body: &str) -> Result<Page, FetchError> {
    let mut doc: Value =
        serde_json::from_str(body).map_err(|e| FetchError::Decode(format!("invalid JSON: {e}")))?;

    let next_cursor = doc
        .pointer("/links/next")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(|s| Cursor(s.to_string()));

    let data = match doc.get_mut("data").map(Value::take) {
        Some(Value::Array(items)) => items,
        Some(_) => return Err(FetchError::Decode("`data` is not an array".into())),
        None => return Err(FetchError::Decode("missing `data` array".into())),
    };

    let mut records = Vec::with_capacity(data.len());
    for body in data {
        match body.get("id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => records.push(ApiRecord {
                id: id.to_string(),
                body,
            }),
            _ => log::warn!("Dropping page entry without an id"),
        }
    }

    Ok(Page {
        records,
        next_cursor,
    })
}
