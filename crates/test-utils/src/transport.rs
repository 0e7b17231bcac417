//! In-memory [`Transport`] that answers from scripted routes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use gis_common::{FormParams, GisError, GisResult, HttpMethod, Transport};
use serde_json::Value;

/// One request seen by a [`ScriptedTransport`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub url: String,
    pub method: HttpMethod,
    pub params: Vec<(String, String)>,
}

impl RecordedCall {
    /// Value of the named form/query parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn has_param(&self, name: &str) -> bool {
        self.param(name).is_some()
    }

    /// Integer parameter, for offsets and record counts.
    pub fn param_usize(&self, name: &str) -> Option<usize> {
        self.param(name).and_then(|v| v.parse().ok())
    }
}

type Responder = Box<dyn Fn(&RecordedCall) -> GisResult<Value> + Send + Sync>;

struct Route {
    suffix: String,
    respond: Responder,
}

/// Transport whose responses are produced by closures keyed on URL suffix.
///
/// Routes are tried in registration order; the first whose suffix matches
/// the end of the request URL answers. Unmatched URLs fail with HTTP 404.
/// With [`ScriptedTransport::with_latency`] every request sleeps before
/// answering, and the peak number of overlapping `/query` requests is kept.
///
/// ```ignore
/// let transport = ScriptedTransport::new()
///     .route("/MapServer", service_json(&[(0, "Parcels")]))
///     .route_fn("/0/query", |call| Ok(ids_json(&[3, 1, 2])));
/// ```
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Vec<Route>,
    calls: Mutex<Vec<RecordedCall>>,
    latency: Option<Duration>,
    queries_in_flight: AtomicUsize,
    peak_queries: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer `suffix` with `body`.
    pub fn route(self, suffix: &str, body: Value) -> Self {
        self.route_fn(suffix, move |_| Ok(body.clone()))
    }

    /// Answer `suffix` by calling `respond` with the recorded call.
    pub fn route_fn<F>(mut self, suffix: &str, respond: F) -> Self
    where
        F: Fn(&RecordedCall) -> GisResult<Value> + Send + Sync + 'static,
    {
        self.routes.push(Route {
            suffix: suffix.to_string(),
            respond: Box::new(respond),
        });
        self
    }

    /// Fail every request to `suffix` with the given HTTP status.
    pub fn route_status(self, suffix: &str, status: u16) -> Self {
        self.route_fn(suffix, move |call| {
            Err(GisError::Http {
                url: call.url.clone(),
                status,
                body: String::new(),
            })
        })
    }

    /// Delay every response by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Most `/query` requests seen in flight at once.
    pub fn peak_concurrent_queries(&self) -> usize {
        self.peak_queries.load(Ordering::SeqCst)
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Every call seen so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().clone()
    }

    /// Calls whose URL ends with `suffix`.
    pub fn calls_to(&self, suffix: &str) -> Vec<RecordedCall> {
        self.lock()
            .iter()
            .filter(|c| c.url.ends_with(suffix))
            .cloned()
            .collect()
    }

    pub fn count(&self, suffix: &str) -> usize {
        self.calls_to(suffix).len()
    }

    pub fn total_calls(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<RecordedCall>> {
        // a panicking responder must not hide the calls from later asserts
        self.calls.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn request_json(
        &self,
        url: &str,
        method: HttpMethod,
        params: &FormParams,
    ) -> GisResult<Value> {
        let call = RecordedCall {
            url: url.to_string(),
            method,
            params: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        };
        self.lock().push(call.clone());

        let is_query = url.ends_with("/query");
        if is_query {
            let now = self.queries_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_queries.fetch_max(now, Ordering::SeqCst);
        }
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let result = match self.routes.iter().find(|r| url.ends_with(&r.suffix)) {
            Some(route) => (route.respond)(&call),
            None => Err(GisError::Http {
                url: url.to_string(),
                status: 404,
                body: "no scripted route".to_string(),
            }),
        };

        if is_query {
            self.queries_in_flight.fetch_sub(1, Ordering::SeqCst);
        }
        result
    }
}
