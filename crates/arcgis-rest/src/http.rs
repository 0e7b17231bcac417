//! Retrying HTTP transport built on reqwest.
//!
//! Key behavior:
//! - Exponential backoff with jitter on transient statuses and network errors
//! - `Retry-After` (seconds) honored, clamped to the backoff ceiling
//! - Non-transient failures returned immediately with a truncated body

use std::time::Duration;

use async_trait::async_trait;
use gis_common::error::truncate_body;
use gis_common::{FormParams, GisError, GisResult, HttpMethod, Transport};
use rand::Rng;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{redirect, Client};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::config::ClientSettings;

/// Body excerpt kept in the context of a transient failure.
const TRANSIENT_BODY_CHARS: usize = 400;
/// Body excerpt kept in a terminal error.
const ERROR_BODY_CHARS: usize = 800;
/// Upper bound of the random jitter added to each computed backoff.
const MAX_JITTER_SECS: f64 = 0.25;

/// Retry parameters for transient failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Initial retry delay (doubles each retry)
    pub backoff_base: Duration,
    /// Maximum retry delay
    pub backoff_max: Duration,
    /// Statuses treated as transient
    pub retry_statuses: Vec<u16>,
}

impl RetryPolicy {
    pub fn from_settings(settings: &ClientSettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            backoff_base: settings.backoff_base,
            backoff_max: settings.backoff_max,
            retry_statuses: settings.retry_statuses.clone(),
        }
    }

    /// Total attempts including the first one.
    pub fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn is_retryable(&self, status: u16) -> bool {
        self.retry_statuses.contains(&status)
    }

    /// Delay before the attempt following `attempt` (zero-based).
    pub fn backoff_delay(&self, attempt: u32, retry_after: Option<&str>) -> Duration {
        if let Some(delay) = retry_after.and_then(|raw| self.retry_after_delay(raw)) {
            return delay;
        }
        let jitter = rand::thread_rng().gen_range(0.0..MAX_JITTER_SECS);
        self.exponential_delay(attempt, jitter)
    }

    fn retry_after_delay(&self, raw: &str) -> Option<Duration> {
        let secs: f64 = raw.trim().parse().ok()?;
        if !secs.is_finite() || secs < 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(secs.min(self.backoff_max.as_secs_f64())))
    }

    fn exponential_delay(&self, attempt: u32, jitter_secs: f64) -> Duration {
        let exp = 2f64.powi(attempt.min(62) as i32);
        let secs = self.backoff_base.as_secs_f64() * exp + jitter_secs;
        Duration::from_secs_f64(secs.min(self.backoff_max.as_secs_f64()))
    }
}

/// reqwest-backed transport with retry/backoff.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    retry: RetryPolicy,
}

impl HttpTransport {
    /// Build a transport with its own connection pool.
    pub fn new(settings: &ClientSettings) -> GisResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("application/json, text/plain, */*"),
        );

        let client = Client::builder()
            .user_agent(settings.user_agent.clone())
            .default_headers(headers)
            .timeout(settings.timeout)
            .redirect(redirect::Policy::limited(10))
            .build()
            .map_err(|e| GisError::Client(e.to_string()))?;

        Ok(Self::with_client(client, settings))
    }

    /// Wrap a caller-supplied client; its headers and timeouts are left as-is.
    pub fn with_client(client: Client, settings: &ClientSettings) -> Self {
        Self {
            client,
            retry: RetryPolicy::from_settings(settings),
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    async fn pause(&self, attempt: u32, retry_after: Option<&str>) {
        // nothing left to wait for after the final attempt
        if attempt + 1 >= self.retry.attempts() {
            return;
        }
        let delay = self.retry.backoff_delay(attempt, retry_after);
        tokio::time::sleep(delay).await;
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[instrument(skip(self, params), fields(method = method.as_str()))]
    async fn request_json(
        &self,
        url: &str,
        method: HttpMethod,
        params: &FormParams,
    ) -> GisResult<Value> {
        let attempts = self.retry.attempts();
        let mut last_error = String::from("no attempt made");

        for attempt in 0..attempts {
            let request = match method {
                HttpMethod::Get => self.client.get(url).query(params),
                HttpMethod::Post => self.client.post(url).form(params),
            };

            debug!(attempt = attempt + 1, attempts, "Sending request");

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    last_error = format!("network error: {}", e);
                    warn!(
                        error = %e,
                        attempt = attempt + 1,
                        attempts,
                        "Request failed, retrying"
                    );
                    self.pause(attempt, None).await;
                    continue;
                }
            };

            let status = response.status();
            let retry_after = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    last_error = format!("error reading body: {}", e);
                    warn!(error = %e, attempt = attempt + 1, "Body read failed, retrying");
                    self.pause(attempt, None).await;
                    continue;
                }
            };

            if self.retry.is_retryable(status.as_u16()) {
                last_error = format!(
                    "transient HTTP {} from {}: {}",
                    status.as_u16(),
                    url,
                    truncate_body(&body, TRANSIENT_BODY_CHARS)
                );
                warn!(
                    status = status.as_u16(),
                    attempt = attempt + 1,
                    attempts,
                    retry_after = ?retry_after,
                    "Transient HTTP status, retrying"
                );
                self.pause(attempt, retry_after.as_deref()).await;
                continue;
            }

            if !status.is_success() {
                return Err(GisError::Http {
                    url: url.to_string(),
                    status: status.as_u16(),
                    body: truncate_body(&body, ERROR_BODY_CHARS),
                });
            }

            return serde_json::from_str(&body).map_err(|_| GisError::InvalidJson {
                url: url.to_string(),
                body: truncate_body(&body, ERROR_BODY_CHARS),
            });
        }

        Err(GisError::RetriesExhausted {
            url: url.to_string(),
            attempts,
            last_error,
        })
    }
}
