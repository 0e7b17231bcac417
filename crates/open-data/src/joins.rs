//! Bounded fan-out of a primary record across the layer catalog.

use std::sync::Arc;

use arcgis_rest::FeatureQuery;
use futures::future::try_join_all;
use gis_common::fields::{pick_first_existing_field, where_equals, PARCEL_ID_FIELD_CANDIDATES};
use gis_common::{
    Feature, GeometryType, GisError, GisResult, LayerCatalog, LayerId, LayerInfo,
    LayerQueryResult, MatchMethod, SpatialFilter,
};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::client::OpenDataClient;
use crate::options::BundleOptions;

/// What every non-primary layer is matched against.
pub(crate) struct JoinPlan<'a> {
    pub primary_layer_id: LayerId,
    pub primary_feature: &'a Feature,
    /// Parcel id for attribute joins
    pub join_key: Option<&'a str>,
    /// Filter for spatial joins; `None` turns them off
    pub spatial: Option<SpatialFilter>,
    pub options: &'a BundleOptions,
}

/// Spatial filter built from the primary feature's geometry.
///
/// Returns `None` (and logs) when the feature carries no geometry, which
/// turns spatial joins off for the whole bundle.
pub(crate) fn primary_spatial_filter(
    feature: &Feature,
    geometry_type: GeometryType,
    options: &BundleOptions,
    key: &str,
) -> Option<SpatialFilter> {
    if !options.include_spatial_intersects {
        return None;
    }
    match &feature.geometry {
        Some(geometry) if !geometry.is_empty() => {
            Some(SpatialFilter::new(geometry.clone(), geometry_type))
        }
        _ => {
            warn!(key, "Primary feature has no geometry, spatial joins disabled");
            None
        }
    }
}

/// Query for matches in a layer, honoring the geometry option.
pub(crate) fn match_query(where_clause: String, options: &BundleOptions) -> FeatureQuery {
    FeatureQuery::matching(where_clause).returning_geometry(options.return_geometries_in_matches)
}

/// Whether a spatial filter may be sent to this layer.
pub(crate) fn accepts_spatial(info: &LayerInfo) -> bool {
    info.has_geometry() && info.supports_spatial_filter != Some(false)
}

impl OpenDataClient {
    /// Evaluate every catalog layer against `plan`, at most
    /// `plan.options.concurrency` at a time and never more than the
    /// client's configured concurrency. Layers without matches are left
    /// out; the rest keep catalog order.
    pub(crate) async fn match_layers(
        &self,
        catalog: &LayerCatalog,
        plan: &JoinPlan<'_>,
    ) -> GisResult<Vec<LayerQueryResult>> {
        let permits = plan.options.concurrency.min(self.settings.concurrency).max(1);
        let semaphore = Semaphore::new(permits);

        let results = try_join_all(
            catalog
                .iter()
                .map(|(&layer_id, info)| self.match_layer(layer_id, info, plan, &semaphore)),
        )
        .await?;

        Ok(results.into_iter().flatten().collect())
    }

    async fn match_layer(
        &self,
        layer_id: LayerId,
        info: &Arc<LayerInfo>,
        plan: &JoinPlan<'_>,
        semaphore: &Semaphore,
    ) -> GisResult<Option<LayerQueryResult>> {
        if layer_id == plan.primary_layer_id {
            return Ok(Some(LayerQueryResult::new(
                info,
                MatchMethod::Primary,
                vec![plan.primary_feature.clone()],
            )));
        }

        let _permit = semaphore
            .acquire()
            .await
            .map_err(|e| GisError::Client(format!("fan-out semaphore closed: {}", e)))?;

        let max = plan.options.max_features_per_layer;

        if plan.options.include_attribute_joins {
            let join = plan.join_key.and_then(|key| {
                pick_first_existing_field(&info.fields, PARCEL_ID_FIELD_CANDIDATES)
                    .map(|field| where_equals(field, key))
            });
            if let Some(where_clause) = join {
                let query = match_query(where_clause, plan.options);
                let features = self.collect_matches(layer_id, &query, max).await?;
                if !features.is_empty() {
                    debug!(layer_id, count = features.len(), "Attribute join matched");
                    return Ok(Some(LayerQueryResult::new(
                        info,
                        MatchMethod::AttributeJoin,
                        features,
                    )));
                }
            }
        }

        if let Some(filter) = &plan.spatial {
            if accepts_spatial(info) {
                let query = match_query("1=1".to_string(), plan.options).intersecting(filter.clone());
                let features = self.collect_matches(layer_id, &query, max).await?;
                if !features.is_empty() {
                    debug!(layer_id, count = features.len(), "Spatial intersect matched");
                    return Ok(Some(LayerQueryResult::new(
                        info,
                        MatchMethod::SpatialIntersect,
                        features,
                    )));
                }
            }
        }

        Ok(None)
    }
}
