//! Esri geometry vocabulary for spatial query filters.
//!
//! Geometries are carried as opaque JSON objects; nothing here inspects
//! coordinates beyond recognizing which Esri shape a payload is.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{GisError, GisResult};

/// Esri geometry types accepted by the `geometryType` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeometryType {
    #[serde(rename = "esriGeometryPoint")]
    Point,
    #[serde(rename = "esriGeometryMultipoint")]
    Multipoint,
    #[serde(rename = "esriGeometryPolyline")]
    Polyline,
    #[serde(rename = "esriGeometryPolygon")]
    Polygon,
    #[serde(rename = "esriGeometryEnvelope")]
    Envelope,
}

impl GeometryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GeometryType::Point => "esriGeometryPoint",
            GeometryType::Multipoint => "esriGeometryMultipoint",
            GeometryType::Polyline => "esriGeometryPolyline",
            GeometryType::Polygon => "esriGeometryPolygon",
            GeometryType::Envelope => "esriGeometryEnvelope",
        }
    }

    /// Parse an Esri geometry type name.
    pub fn from_esri(name: &str) -> Option<Self> {
        match name {
            "esriGeometryPoint" => Some(GeometryType::Point),
            "esriGeometryMultipoint" => Some(GeometryType::Multipoint),
            "esriGeometryPolyline" => Some(GeometryType::Polyline),
            "esriGeometryPolygon" => Some(GeometryType::Polygon),
            "esriGeometryEnvelope" => Some(GeometryType::Envelope),
            _ => None,
        }
    }

    /// Recognize the shape of an Esri JSON geometry.
    pub fn infer(geometry: &Map<String, Value>) -> Option<Self> {
        if geometry.contains_key("rings") {
            Some(GeometryType::Polygon)
        } else if geometry.contains_key("paths") {
            Some(GeometryType::Polyline)
        } else if geometry.contains_key("points") {
            Some(GeometryType::Multipoint)
        } else if ["xmin", "ymin", "xmax", "ymax"]
            .iter()
            .all(|k| geometry.contains_key(*k))
        {
            Some(GeometryType::Envelope)
        } else if geometry.contains_key("x") && geometry.contains_key("y") {
            Some(GeometryType::Point)
        } else {
            None
        }
    }
}

impl std::fmt::Display for GeometryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Spatial relationship for the `spatialRel` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SpatialRel {
    #[default]
    #[serde(rename = "esriSpatialRelIntersects")]
    Intersects,
    #[serde(rename = "esriSpatialRelContains")]
    Contains,
    #[serde(rename = "esriSpatialRelCrosses")]
    Crosses,
    #[serde(rename = "esriSpatialRelEnvelopeIntersects")]
    EnvelopeIntersects,
    #[serde(rename = "esriSpatialRelOverlaps")]
    Overlaps,
    #[serde(rename = "esriSpatialRelTouches")]
    Touches,
    #[serde(rename = "esriSpatialRelWithin")]
    Within,
}

impl SpatialRel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpatialRel::Intersects => "esriSpatialRelIntersects",
            SpatialRel::Contains => "esriSpatialRelContains",
            SpatialRel::Crosses => "esriSpatialRelCrosses",
            SpatialRel::EnvelopeIntersects => "esriSpatialRelEnvelopeIntersects",
            SpatialRel::Overlaps => "esriSpatialRelOverlaps",
            SpatialRel::Touches => "esriSpatialRelTouches",
            SpatialRel::Within => "esriSpatialRelWithin",
        }
    }
}

/// A geometry filter attached to a feature or id query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialFilter {
    pub geometry: Map<String, Value>,
    pub geometry_type: GeometryType,
    pub relation: SpatialRel,
}

impl SpatialFilter {
    /// Intersect filter with an explicit geometry type.
    pub fn new(geometry: Map<String, Value>, geometry_type: GeometryType) -> Self {
        Self {
            geometry,
            geometry_type,
            relation: SpatialRel::default(),
        }
    }

    /// Intersect filter whose geometry type is read off the payload shape.
    pub fn infer(geometry: Map<String, Value>) -> GisResult<Self> {
        let geometry_type = GeometryType::infer(&geometry).ok_or_else(|| {
            GisError::MissingParameter(
                "geometryType (could not be inferred from geometry)".to_string(),
            )
        })?;
        Ok(Self::new(geometry, geometry_type))
    }

    pub fn with_relation(mut self, relation: SpatialRel) -> Self {
        self.relation = relation;
        self
    }
}
