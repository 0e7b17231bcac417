//! Common types and utilities shared by the ArcGIS REST client crates.

pub mod bundle;
pub mod error;
pub mod feature;
pub mod fields;
pub mod geometry;
pub mod service;
pub mod transport;

/// Numeric id of a layer or table within a MapServer.
pub type LayerId = u32;

/// Per-record integer primary key within a layer.
pub type ObjectId = i64;

pub use bundle::{AddressBundle, LayerCatalog, LayerQueryResult, MatchMethod, ParcelBundle};
pub use error::{GisError, GisResult};
pub use feature::{Feature, QueryPage};
pub use geometry::{GeometryType, SpatialFilter, SpatialRel};
pub use service::{LayerInfo, LayerSummary, ServiceInfo};
pub use transport::{FormParams, HttpMethod, Transport};
