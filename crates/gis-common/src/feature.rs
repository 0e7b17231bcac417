//! Feature records and query pages.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{LayerId, ObjectId};

/// One record returned by a layer query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    /// Field name to scalar value.
    #[serde(default)]
    pub attributes: Map<String, Value>,

    /// Esri JSON geometry, when requested and present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Map<String, Value>>,
}

impl Feature {
    pub fn new(attributes: Map<String, Value>, geometry: Option<Map<String, Value>>) -> Self {
        Self {
            attributes,
            geometry,
        }
    }

    /// Lenient decode of one entry of a `features` array.
    ///
    /// Non-object entries are rejected; a non-object `attributes` becomes an
    /// empty map and a non-object `geometry` is dropped.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let attributes = obj
            .get("attributes")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let geometry = obj.get("geometry").and_then(Value::as_object).cloned();
        Some(Self::new(attributes, geometry))
    }

    /// All decodable features of a query response payload.
    pub fn parse_features(payload: &Value) -> Vec<Self> {
        payload
            .get("features")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Self::from_value).collect())
            .unwrap_or_default()
    }

    pub fn attribute(&self, field: &str) -> Option<&Value> {
        self.attributes.get(field)
    }

    /// Attribute rendered as trimmed text; `None` for null or blank values.
    pub fn attribute_text(&self, field: &str) -> Option<String> {
        let text = match self.attributes.get(field)? {
            Value::Null => return None,
            Value::String(s) => s.trim().to_string(),
            other => other.to_string(),
        };
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    /// Integer object id stored under `oid_field`.
    pub fn object_id(&self, oid_field: &str) -> Option<ObjectId> {
        let value = self.attributes.get(oid_field)?;
        value.as_i64().or_else(|| {
            value
                .as_f64()
                .filter(|f| f.fract() == 0.0)
                .map(|f| f as ObjectId)
        })
    }

    /// True when a non-empty geometry is attached.
    pub fn has_geometry(&self) -> bool {
        self.geometry.as_ref().is_some_and(|g| !g.is_empty())
    }
}

/// One page of a layer query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryPage {
    pub layer_id: LayerId,
    pub offset: u64,
    /// Page size actually sent, after clamping.
    pub page_size: usize,
    pub features: Vec<Feature>,
    pub exceeded_transfer_limit: Option<bool>,
    /// Offset of the following page; set only when this page came back full.
    pub next_offset: Option<u64>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub raw: Value,
}

impl QueryPage {
    /// Build a page, deriving `next_offset` from whether the page is full.
    pub fn new(
        layer_id: LayerId,
        offset: u64,
        page_size: usize,
        features: Vec<Feature>,
        exceeded_transfer_limit: Option<bool>,
        raw: Value,
    ) -> Self {
        let next_offset = if page_size > 0 && features.len() == page_size {
            Some(offset + page_size as u64)
        } else {
            None
        };
        Self {
            layer_id,
            offset,
            page_size,
            features,
            exceeded_transfer_limit,
            next_offset,
            raw,
        }
    }

    /// A page that was never requested from the server.
    pub fn empty(layer_id: LayerId, offset: u64, page_size: usize) -> Self {
        Self::new(layer_id, offset, page_size, Vec::new(), None, Value::Null)
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}
