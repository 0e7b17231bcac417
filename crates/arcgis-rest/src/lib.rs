//! Async client for ArcGIS REST MapServer endpoints.
//!
//! - [`http`]: reqwest transport with retry and backoff
//! - [`metadata`]: fetch-once service and layer metadata
//! - [`query`]: paged, id-based and spatial feature queries
//!
//! ```ignore
//! use arcgis_rest::{ArcGisRestClient, ClientSettings, FeatureQuery};
//!
//! let client = ArcGisRestClient::from_settings(&ClientSettings::from_env())?;
//! let page = client.query_page(0, &FeatureQuery::default(), 0, 50).await?;
//! ```

pub mod client;
pub mod config;
pub mod http;
pub mod metadata;
pub mod query;

pub use client::{check_error, ArcGisRestClient};
pub use config::{ClientSettings, DEFAULT_BASE_URL, ENV_PREFIX};
pub use http::{HttpTransport, RetryPolicy};
pub use query::FeatureQuery;

pub use gis_common::{
    Feature, GisError, GisResult, HttpMethod, LayerId, LayerInfo, ObjectId, QueryPage,
    ServiceInfo, SpatialFilter, Transport,
};
