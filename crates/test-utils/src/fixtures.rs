//! Canned MapServer payloads.
//!
//! Shapes follow what ArcGIS Server returns for `?f=pjson` and `/query`.

use gis_common::{LayerId, ObjectId};
use serde_json::{json, Map, Value};

use crate::transport::RecordedCall;

/// Base URL used by scripted clients.
pub const SERVICE_URL: &str = "https://gis.test/server2/rest/services/Open_Data/MapServer";

/// Suffix of the service document.
pub const SERVICE_SUFFIX: &str = "/MapServer";

/// Suffix of a layer document.
pub fn layer_suffix(layer_id: LayerId) -> String {
    format!("/MapServer/{}", layer_id)
}

/// Suffix of a layer query endpoint.
pub fn query_suffix(layer_id: LayerId) -> String {
    format!("/MapServer/{}/query", layer_id)
}

/// Service document listing `layers` in Web Mercator.
pub fn service_json(layers: &[(LayerId, &str)]) -> Value {
    json!({
        "currentVersion": 10.91,
        "spatialReference": {"wkid": 102100, "latestWkid": 3857},
        "maxRecordCount": 2000,
        "layers": layers
            .iter()
            .map(|(id, name)| json!({"id": id, "name": name}))
            .collect::<Vec<_>>(),
        "tables": []
    })
}

/// Layer document with every query capability enabled.
pub fn layer_json(layer_id: LayerId, name: &str, fields: &[&str], geometry_type: &str) -> Value {
    let mut defs = vec![json!({"name": "OBJECTID", "type": "esriFieldTypeOID"})];
    defs.extend(
        fields
            .iter()
            .map(|f| json!({"name": f, "type": "esriFieldTypeString"})),
    );

    json!({
        "id": layer_id,
        "name": name,
        "type": "Feature Layer",
        "geometryType": geometry_type,
        "objectIdField": "OBJECTID",
        "maxRecordCount": 2000,
        "fields": defs,
        "advancedQueryCapabilities": {
            "supportsPagination": true,
            "supportsOrderBy": true
        },
        "supportsSpatialFilter": true
    })
}

/// Override capability flags (and the record limit) of a layer document.
pub fn with_capabilities(
    mut layer: Value,
    pagination: Option<bool>,
    order_by: Option<bool>,
    spatial: Option<bool>,
) -> Value {
    if let Some(obj) = layer.as_object_mut() {
        let mut aqc = Map::new();
        if let Some(p) = pagination {
            aqc.insert("supportsPagination".into(), json!(p));
        }
        if let Some(o) = order_by {
            aqc.insert("supportsOrderBy".into(), json!(o));
        }
        obj.insert("advancedQueryCapabilities".into(), Value::Object(aqc));
        match spatial {
            Some(s) => obj.insert("supportsSpatialFilter".into(), json!(s)),
            None => obj.remove("supportsSpatialFilter"),
        };
    }
    layer
}

pub fn with_max_record_count(mut layer: Value, limit: usize) -> Value {
    if let Some(obj) = layer.as_object_mut() {
        obj.insert("maxRecordCount".into(), json!(limit));
    }
    layer
}

/// One feature entry.
pub fn feature(attributes: Value, geometry: Option<Value>) -> Value {
    match geometry {
        Some(g) => json!({"attributes": attributes, "geometry": g}),
        None => json!({"attributes": attributes}),
    }
}

/// Query response wrapping `features`.
pub fn features_json(features: Vec<Value>) -> Value {
    json!({"objectIdFieldName": "OBJECTID", "features": features})
}

/// `returnIdsOnly` response.
pub fn ids_json(ids: &[ObjectId]) -> Value {
    json!({"objectIdFieldName": "OBJECTID", "objectIds": ids})
}

/// HTTP-200 error envelope.
pub fn error_json(code: i64, message: &str) -> Value {
    json!({"error": {"code": code, "message": message, "details": []}})
}

/// Small square parcel ring.
pub fn polygon() -> Value {
    json!({
        "rings": [[[0.0, 0.0], [0.0, 10.0], [10.0, 10.0], [10.0, 0.0], [0.0, 0.0]]],
        "spatialReference": {"wkid": 3857}
    })
}

pub fn point(x: f64, y: f64) -> Value {
    json!({"x": x, "y": y, "spatialReference": {"wkid": 3857}})
}

/// Feature with only an object id.
pub fn numbered_feature(oid: ObjectId) -> Value {
    feature(json!({"OBJECTID": oid}), None)
}

/// Answer offset-paged queries over features numbered `1..=total`.
///
/// Honors `resultOffset` and `resultRecordCount` the way a server does.
pub fn paged_responder(total: usize) -> impl Fn(&RecordedCall) -> gis_common::GisResult<Value> {
    move |call| {
        let offset = call.param_usize("resultOffset").unwrap_or(0);
        let count = call.param_usize("resultRecordCount").unwrap_or(total);
        let end = (offset + count).min(total);
        let features = (offset..end)
            .map(|i| numbered_feature(i as ObjectId + 1))
            .collect();
        Ok(features_json(features))
    }
}

/// Answer `objectIds` lookups, returning the ids in reverse order.
pub fn object_ids_responder() -> impl Fn(&RecordedCall) -> gis_common::GisResult<Value> {
    |call| {
        let mut ids: Vec<ObjectId> = call
            .param("objectIds")
            .unwrap_or_default()
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        ids.reverse();
        Ok(features_json(ids.into_iter().map(numbered_feature).collect()))
    }
}
