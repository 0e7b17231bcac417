//! ArcGIS REST MapServer client handle.

use std::collections::HashMap;
use std::sync::Arc;

use gis_common::{GisError, GisResult, LayerId, LayerInfo, ServiceInfo, Transport};
use serde_json::Value;
use tokio::sync::{Mutex, OnceCell};

use crate::config::ClientSettings;
use crate::http::HttpTransport;

/// Client for one MapServer.
///
/// Service and layer metadata are fetched on first use and kept for the
/// lifetime of the client; there is no refresh path.
pub struct ArcGisRestClient {
    pub(crate) base: String,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) service_cache: OnceCell<Arc<ServiceInfo>>,
    pub(crate) layer_cache: Mutex<HashMap<LayerId, Arc<OnceCell<Arc<LayerInfo>>>>>,
    pub(crate) catalog_concurrency: usize,
}

impl ArcGisRestClient {
    /// Client over an arbitrary transport.
    pub fn new(base_url: &str, transport: Arc<dyn Transport>) -> Self {
        Self {
            base: base_url.trim_end_matches('/').to_string(),
            transport,
            service_cache: OnceCell::new(),
            layer_cache: Mutex::new(HashMap::new()),
            catalog_concurrency: ClientSettings::default().concurrency,
        }
    }

    /// Client with a reqwest transport configured from `settings`.
    pub fn from_settings(settings: &ClientSettings) -> GisResult<Self> {
        settings.validate()?;
        let transport = HttpTransport::new(settings)?;
        Ok(Self::new(settings.normalized_base_url(), Arc::new(transport))
            .with_catalog_concurrency(settings.concurrency))
    }

    /// Bound on simultaneous layer metadata fetches in `build_layer_catalog`.
    pub fn with_catalog_concurrency(mut self, concurrency: usize) -> Self {
        self.catalog_concurrency = concurrency.max(1);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    pub(crate) fn layer_url(&self, layer_id: LayerId) -> String {
        format!("{}/{}", self.base, layer_id)
    }

    pub(crate) fn query_url(&self, layer_id: LayerId) -> String {
        format!("{}/{}/query", self.base, layer_id)
    }

    /// Release the transport and its connection pool.
    pub fn close(self) {
        drop(self);
    }
}

/// Surface an `{"error": {...}}` envelope as a remote-service error.
///
/// ArcGIS reports many failures this way with an HTTP 200.
pub fn check_error(payload: &Value, url: &str) -> GisResult<()> {
    let Some(err) = payload.get("error").and_then(Value::as_object) else {
        return Ok(());
    };

    let message = err
        .get("message")
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .unwrap_or("ArcGIS REST error")
        .to_string();

    let details = err
        .get("details")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|d| match d {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect()
        })
        .unwrap_or_default();

    Err(GisError::Remote {
        url: url.to_string(),
        code: err.get("code").and_then(Value::as_i64),
        message,
        details,
    })
}
