//! Service and layer metadata decoded from `?f=pjson` documents.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::LayerId;

/// Object id column assumed when a layer does not declare one.
pub const DEFAULT_OBJECT_ID_FIELD: &str = "OBJECTID";

/// Id and display name of a layer or table listed by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerSummary {
    pub id: LayerId,
    pub name: Option<String>,
}

impl LayerSummary {
    fn from_value(value: &Value) -> Option<Self> {
        let id = value.get("id")?.as_u64()?;
        Some(Self {
            id: LayerId::try_from(id).ok()?,
            name: value.get("name").and_then(Value::as_str).map(str::to_string),
        })
    }
}

/// Service-level metadata of a MapServer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub base_url: String,
    pub spatial_reference_wkid: Option<i64>,
    pub max_record_count: Option<usize>,
    pub layers: Vec<LayerSummary>,
    pub tables: Vec<LayerSummary>,
    #[serde(default)]
    pub raw: Value,
}

impl ServiceInfo {
    pub fn from_payload(base_url: &str, payload: &Value) -> Self {
        let wkid = payload.get("spatialReference").and_then(|sr| {
            sr.get("latestWkid")
                .and_then(Value::as_i64)
                .or_else(|| sr.get("wkid").and_then(Value::as_i64))
        });

        Self {
            base_url: base_url.to_string(),
            spatial_reference_wkid: wkid,
            max_record_count: payload
                .get("maxRecordCount")
                .and_then(Value::as_u64)
                .map(|n| n as usize),
            layers: summaries(payload.get("layers")),
            tables: summaries(payload.get("tables")),
            raw: payload.clone(),
        }
    }

    /// Layers followed by tables, in listing order.
    pub fn entries(&self) -> impl Iterator<Item = &LayerSummary> {
        self.layers.iter().chain(self.tables.iter())
    }

    /// Service-wide capability flag, if the service declares one.
    pub fn capability(&self, key: &str) -> Option<bool> {
        capability_flag(&self.raw, key)
    }
}

fn summaries(value: Option<&Value>) -> Vec<LayerSummary> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(LayerSummary::from_value).collect())
        .unwrap_or_default()
}

/// Look a capability up in `advancedQueryCapabilities`, then at top level.
fn capability_flag(payload: &Value, key: &str) -> Option<bool> {
    payload
        .get("advancedQueryCapabilities")
        .and_then(|aqc| aqc.get(key))
        .and_then(Value::as_bool)
        .or_else(|| payload.get(key).and_then(Value::as_bool))
}

/// Layer-level metadata and query capabilities.
///
/// Capability flags are tri-state: `None` means the service did not say,
/// and callers treat that as "try it".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerInfo {
    pub layer_id: LayerId,
    pub name: String,
    pub layer_type: Option<String>,
    pub geometry_type: Option<String>,
    pub object_id_field: String,
    pub fields: Vec<String>,
    pub max_record_count: Option<usize>,
    pub supports_pagination: Option<bool>,
    pub supports_order_by: Option<bool>,
    pub supports_spatial_filter: Option<bool>,
    #[serde(default)]
    pub raw: Value,
}

impl LayerInfo {
    /// Decode a layer document, falling back to service flags where the
    /// layer is silent.
    pub fn from_payload(layer_id: LayerId, payload: &Value, service: &ServiceInfo) -> Self {
        let field_defs: Vec<&Value> = payload
            .get("fields")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter(|f| f.is_object()).collect())
            .unwrap_or_default();

        let fields: Vec<String> = field_defs
            .iter()
            .filter_map(|f| f.get("name").and_then(Value::as_str))
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();

        let object_id_field = payload
            .get("objectIdField")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .or_else(|| {
                field_defs
                    .iter()
                    .find(|f| f.get("type").and_then(Value::as_str) == Some("esriFieldTypeOID"))
                    .and_then(|f| f.get("name").and_then(Value::as_str))
            })
            .unwrap_or(DEFAULT_OBJECT_ID_FIELD)
            .to_string();

        let flag = |key: &str| capability_flag(payload, key).or_else(|| service.capability(key));

        let id = payload
            .get("id")
            .and_then(Value::as_u64)
            .and_then(|id| LayerId::try_from(id).ok())
            .unwrap_or(layer_id);

        Self {
            layer_id: id,
            name: payload
                .get("name")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("layer_{}", layer_id)),
            layer_type: payload.get("type").and_then(Value::as_str).map(str::to_string),
            geometry_type: payload
                .get("geometryType")
                .and_then(Value::as_str)
                .map(str::to_string),
            object_id_field,
            fields,
            max_record_count: payload
                .get("maxRecordCount")
                .and_then(Value::as_u64)
                .map(|n| n as usize),
            supports_pagination: flag("supportsPagination"),
            supports_order_by: flag("supportsOrderBy"),
            supports_spatial_filter: flag("supportsSpatialFilter"),
            raw: payload.clone(),
        }
    }

    /// Page-size ceiling: the layer's limit, else the service's.
    pub fn effective_max_record_count(&self, service: &ServiceInfo) -> Option<usize> {
        self.max_record_count.or(service.max_record_count)
    }

    /// Clamp a requested page size to the known server limit (and to at least one).
    pub fn clamp_page_size(&self, service: &ServiceInfo, requested: usize) -> usize {
        let clamped = match self.effective_max_record_count(service) {
            Some(limit) => requested.min(limit),
            None => requested,
        };
        clamped.max(1)
    }

    /// Whether the layer exposes any geometry at all.
    pub fn has_geometry(&self) -> bool {
        self.geometry_type.is_some()
    }
}
