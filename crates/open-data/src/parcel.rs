//! Parcel bundles.

use arcgis_rest::FeatureQuery;
use gis_common::fields::{
    pick_first_existing_field, where_equals, PARCEL_ID_FIELD_CANDIDATES,
    PARCEL_PIN_FIELD_CANDIDATES,
};
use gis_common::{
    Feature, GeometryType, GisError, GisResult, LayerCatalog, LayerInfo, ParcelBundle,
    SpatialFilter,
};
use tracing::{debug, info, instrument};

use crate::client::{catalog_entry, OpenDataClient, ADDRESS_LAYER_TOKEN};
use crate::joins::{accepts_spatial, primary_spatial_filter, JoinPlan};
use crate::options::BundleOptions;

/// Parcel-id column of a parcels layer, falling back to PIN columns.
pub fn parcel_id_field(layer: &LayerInfo) -> GisResult<&str> {
    pick_first_existing_field(&layer.fields, PARCEL_ID_FIELD_CANDIDATES)
        .or_else(|| pick_first_existing_field(&layer.fields, PARCEL_PIN_FIELD_CANDIDATES))
        .ok_or_else(|| GisError::FieldNotFound {
            layer: layer.name.clone(),
            purpose: "parcel-id",
            available: layer.fields.clone(),
        })
}

impl OpenDataClient {
    /// A parcel and its matches in every other layer.
    ///
    /// The parcel is looked up by its identifier column (`PRCL_NBR` and
    /// friends, else `PIN_NUM`). Other layers are attribute-joined on the
    /// same identifier, or intersected with the parcel polygon when no
    /// attribute join hits.
    #[instrument(skip(self, options))]
    pub async fn parcel_bundle(
        &self,
        parcel_number: &str,
        options: &BundleOptions,
    ) -> GisResult<ParcelBundle> {
        let key = parcel_number.trim();
        if key.is_empty() {
            return Err(GisError::MissingParameter("parcel_number".to_string()));
        }

        let service_info = self.arc.get_service_info().await?;
        let layer_catalog = self.arc.build_layer_catalog().await?;

        let parcels_id = self.parcels_layer_id().await?;
        let parcels = catalog_entry(&layer_catalog, parcels_id)?;
        let field = parcel_id_field(&parcels)?;
        let where_clause = where_equals(field, key);

        let query = FeatureQuery::matching(where_clause.clone()).returning_geometry(true);
        let page = self.arc.query_page(parcels_id, &query, 0, 1).await?;
        let primary_feature = page
            .features
            .into_iter()
            .next()
            .ok_or_else(|| GisError::FeatureNotFound(format!("parcel where {}", where_clause)))?;

        let spatial = primary_spatial_filter(&primary_feature, GeometryType::Polygon, options, key);

        let address_points = self
            .parcel_address_points(&layer_catalog, key, spatial.as_ref(), options)
            .await?;

        let plan = JoinPlan {
            primary_layer_id: parcels_id,
            primary_feature: &primary_feature,
            join_key: Some(key),
            spatial,
            options,
        };
        let matches = self.match_layers(&layer_catalog, &plan).await?;

        info!(
            parcel = key,
            matches = matches.len(),
            address_points = address_points.len(),
            "Built parcel bundle"
        );

        Ok(ParcelBundle {
            parcel_key: key.to_string(),
            primary_layer_id: parcels_id,
            primary_feature,
            service_info,
            layer_catalog,
            matches,
            address_points,
        })
    }

    /// Address points on a parcel: joined on the parcel id when the address
    /// layer carries one, else intersected with the parcel polygon.
    async fn parcel_address_points(
        &self,
        catalog: &LayerCatalog,
        key: &str,
        spatial: Option<&SpatialFilter>,
        options: &BundleOptions,
    ) -> GisResult<Vec<Feature>> {
        let Some(address_id) = self.find_layer_id_by_name_contains(ADDRESS_LAYER_TOKEN).await?
        else {
            debug!("No address points layer, skipping address lookup");
            return Ok(Vec::new());
        };
        let Some(address) = catalog.get(&address_id) else {
            return Ok(Vec::new());
        };

        let max = options.max_features_per_layer;

        if let Some(field) = pick_first_existing_field(&address.fields, PARCEL_ID_FIELD_CANDIDATES) {
            let query = FeatureQuery::matching(where_equals(field, key));
            return self.collect_matches(address_id, &query, max).await;
        }

        match spatial {
            Some(filter) if accepts_spatial(address) => {
                let query = FeatureQuery::default().intersecting(filter.clone());
                self.collect_matches(address_id, &query, max).await
            }
            _ => Ok(Vec::new()),
        }
    }
}
