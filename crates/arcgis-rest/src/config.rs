//! Client configuration with environment overrides.
//!
//! Every setting can be overridden by a `STLCO_GIS_*` variable, e.g.
//! `STLCO_GIS_BASE_URL` or `STLCO_GIS_MAX_RETRIES`. Values that fail to
//! parse are ignored and the default is kept.

use std::str::FromStr;
use std::time::Duration;

use gis_common::{GisError, GisResult};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Prefix shared by all environment overrides.
pub const ENV_PREFIX: &str = "STLCO_GIS_";

/// St. Louis County (MN) open data MapServer.
pub const DEFAULT_BASE_URL: &str =
    "https://gis.stlouiscountymn.gov/server2/rest/services/GeneralUse/Open_Data/MapServer";

/// Statuses retried by default.
pub const DEFAULT_RETRY_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Configuration for ArcGIS REST access.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Base MapServer URL
    pub base_url: String,
    /// User-Agent header
    pub user_agent: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Retries after the first attempt for transient failures
    pub max_retries: u32,
    /// Initial backoff (doubles each retry)
    pub backoff_base: Duration,
    /// Backoff ceiling, also applied to Retry-After
    pub backoff_max: Duration,
    /// HTTP statuses treated as transient
    pub retry_statuses: Vec<u16>,
    /// Page size used when the caller does not pick one
    pub default_page_size: usize,
    /// Hard cap to avoid huge payloads
    pub max_page_size_cap: usize,
    /// Simultaneous layer fetches while building the catalog; also caps
    /// per-layer evaluations during bundle fan-out
    pub concurrency: usize,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: format!("stlouis-county-gis/{}", env!("CARGO_PKG_VERSION")),
            timeout: Duration::from_secs(30),
            max_retries: 6,
            backoff_base: Duration::from_millis(600),
            backoff_max: Duration::from_secs(10),
            retry_statuses: DEFAULT_RETRY_STATUSES.to_vec(),
            default_page_size: 200,
            max_page_size_cap: 2000,
            concurrency: 8,
        }
    }
}

impl ClientSettings {
    /// Defaults overlaid with `STLCO_GIS_*` process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();
        settings.apply_overrides(lookup);
        settings
    }

    /// Overlay values found through `lookup` onto these settings.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = raw_var(&lookup, "BASE_URL") {
            self.base_url = v;
        }
        if let Some(v) = raw_var(&lookup, "USER_AGENT") {
            self.user_agent = v;
        }
        if let Some(v) = seconds_var(&lookup, "TIMEOUT_S") {
            self.timeout = v;
        }
        if let Some(v) = parsed_var(&lookup, "MAX_RETRIES") {
            self.max_retries = v;
        }
        if let Some(v) = seconds_var(&lookup, "BACKOFF_BASE_S") {
            self.backoff_base = v;
        }
        if let Some(v) = seconds_var(&lookup, "BACKOFF_MAX_S") {
            self.backoff_max = v;
        }
        if let Some(v) = status_list_var(&lookup, "RETRY_STATUSES") {
            self.retry_statuses = v;
        }
        if let Some(v) = parsed_var(&lookup, "DEFAULT_PAGE_SIZE") {
            self.default_page_size = v;
        }
        if let Some(v) = parsed_var(&lookup, "MAX_PAGE_SIZE_CAP") {
            self.max_page_size_cap = v;
        }
        if let Some(v) = parsed_var(&lookup, "CONCURRENCY") {
            self.concurrency = v;
        }
    }

    /// Reject settings that cannot drive a client.
    pub fn validate(&self) -> GisResult<()> {
        if self.base_url.trim().is_empty() {
            return Err(GisError::MissingParameter("base_url".to_string()));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(GisError::InvalidParameter {
                param: "base_url".to_string(),
                message: format!("not an http(s) URL: {}", self.base_url),
            });
        }
        if self.max_page_size_cap == 0 {
            return Err(GisError::InvalidParameter {
                param: "max_page_size_cap".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Base URL without a trailing slash.
    pub fn normalized_base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retry_statuses.contains(&status)
    }

    /// Requested page size (or the default), capped and never zero.
    pub fn effective_page_size(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_page_size)
            .min(self.max_page_size_cap)
            .max(1)
    }
}

fn raw_var<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(&format!("{}{}", ENV_PREFIX, name)).filter(|v| !v.trim().is_empty())
}

fn parsed_var<T, F>(lookup: &F, name: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = raw_var(lookup, name)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(var = %format!("{}{}", ENV_PREFIX, name), value = %raw, "Ignoring unparsable setting");
            None
        }
    }
}

fn seconds_var<F>(lookup: &F, name: &str) -> Option<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let secs: f64 = parsed_var(lookup, name)?;
    let duration = Duration::try_from_secs_f64(secs).ok();
    if duration.is_none() {
        warn!(var = %format!("{}{}", ENV_PREFIX, name), secs, "Ignoring out-of-range duration");
    }
    duration
}

fn status_list_var<F>(lookup: &F, name: &str) -> Option<Vec<u16>>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = raw_var(lookup, name)?;
    let parsed: Result<Vec<u16>, _> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse::<u16>)
        .collect();
    match parsed {
        Ok(list) => Some(list),
        Err(_) => {
            warn!(var = %format!("{}{}", ENV_PREFIX, name), value = %raw, "Ignoring unparsable status list");
            None
        }
    }
}
