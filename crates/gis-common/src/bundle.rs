//! Parcel and address bundles: a primary record plus its matches across layers.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{Feature, LayerId, LayerInfo, ServiceInfo};

/// Every layer of a service keyed by id.
pub type LayerCatalog = BTreeMap<LayerId, Arc<LayerInfo>>;

/// How a layer's features were tied to the primary record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchMethod {
    /// The layer the primary record came from.
    Primary,
    /// Equality on a shared identifier column.
    AttributeJoin,
    /// Geometric intersection with the primary record.
    SpatialIntersect,
}

impl std::fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MatchMethod::Primary => "primary",
            MatchMethod::AttributeJoin => "attribute-join",
            MatchMethod::SpatialIntersect => "spatial-intersect",
        };
        f.write_str(s)
    }
}

/// Matches found in one layer.
#[derive(Debug, Clone, Serialize)]
pub struct LayerQueryResult {
    pub layer_id: LayerId,
    pub layer_name: String,
    pub match_method: MatchMethod,
    pub features: Vec<Feature>,
    pub layer_info: Arc<LayerInfo>,
}

impl LayerQueryResult {
    pub fn new(info: &Arc<LayerInfo>, match_method: MatchMethod, features: Vec<Feature>) -> Self {
        Self {
            layer_id: info.layer_id,
            layer_name: info.name.clone(),
            match_method,
            features,
            layer_info: Arc::clone(info),
        }
    }
}

/// A parcel and everything joined to it.
#[derive(Debug, Clone, Serialize)]
pub struct ParcelBundle {
    pub parcel_key: String,
    pub primary_layer_id: LayerId,
    pub primary_feature: Feature,
    pub service_info: Arc<ServiceInfo>,
    pub layer_catalog: LayerCatalog,
    pub matches: Vec<LayerQueryResult>,
    /// Address points located on the parcel.
    pub address_points: Vec<Feature>,
}

impl ParcelBundle {
    /// Match for a given layer, if that layer produced one.
    pub fn match_for(&self, layer_id: LayerId) -> Option<&LayerQueryResult> {
        self.matches.iter().find(|m| m.layer_id == layer_id)
    }
}

/// An address point, everything joined to it, and optionally its parcel.
#[derive(Debug, Clone, Serialize)]
pub struct AddressBundle {
    pub address_key: String,
    pub primary_layer_id: LayerId,
    pub primary_feature: Feature,
    pub service_info: Arc<ServiceInfo>,
    pub layer_catalog: LayerCatalog,
    pub matches: Vec<LayerQueryResult>,
    pub linked_parcel: Option<Box<ParcelBundle>>,
}

impl AddressBundle {
    pub fn match_for(&self, layer_id: LayerId) -> Option<&LayerQueryResult> {
        self.matches.iter().find(|m| m.layer_id == layer_id)
    }
}
