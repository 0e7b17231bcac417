//! Address point bundles.

use arcgis_rest::FeatureQuery;
use gis_common::fields::{
    pick_first_existing_field, where_contains, where_equals, ADDRESS_FIELD_CANDIDATES,
    PARCEL_ID_FIELD_CANDIDATES,
};
use gis_common::{AddressBundle, Feature, GeometryType, GisError, GisResult, LayerId, LayerInfo};
use tracing::{debug, info, instrument, warn};

use crate::client::{catalog_entry, OpenDataClient};
use crate::joins::{primary_spatial_filter, JoinPlan};
use crate::options::{AddressLookup, AddressRequest, BundleOptions};

/// Candidates fetched by an exact address match.
const EXACT_MATCH_PAGE: usize = 10;
/// Candidates fetched by the substring fallback.
const CONTAINS_MATCH_PAGE: usize = 25;

impl OpenDataClient {
    /// An address point, its matches in every other layer, and optionally
    /// the parcel bundle of the parcel it sits on.
    ///
    /// Other layers are attribute-joined on the parcel id read off the
    /// address point, else intersected with the point itself. A failure
    /// while fetching the linked parcel leaves `linked_parcel` empty.
    #[instrument(skip(self, request), fields(lookup = ?request.lookup))]
    pub async fn address_bundle(&self, request: &AddressRequest) -> GisResult<AddressBundle> {
        if let AddressLookup::FullAddress(text) = &request.lookup {
            if text.trim().is_empty() {
                return Err(GisError::MissingParameter(
                    "object id or full address".to_string(),
                ));
            }
        }

        let service_info = self.arc.get_service_info().await?;
        let layer_catalog = self.arc.build_layer_catalog().await?;

        let address_id = self.address_points_layer_id().await?;
        let address = catalog_entry(&layer_catalog, address_id)?;

        let (address_key, primary_feature) = match &request.lookup {
            AddressLookup::ObjectId(oid) => self.address_by_object_id(address_id, &address, *oid).await?,
            AddressLookup::FullAddress(text) => {
                self.address_by_text(address_id, &address, text.trim(), request.select_first_if_multiple)
                    .await?
            }
        };

        let options = &request.options;
        let spatial =
            primary_spatial_filter(&primary_feature, GeometryType::Point, options, &address_key);

        let parcel_number = pick_first_existing_field(&address.fields, PARCEL_ID_FIELD_CANDIDATES)
            .and_then(|field| primary_feature.attribute_text(field));

        let plan = JoinPlan {
            primary_layer_id: address_id,
            primary_feature: &primary_feature,
            join_key: parcel_number.as_deref(),
            spatial,
            options,
        };
        let matches = self.match_layers(&layer_catalog, &plan).await?;

        let linked_parcel = match parcel_number.as_deref() {
            Some(parcel) if request.also_fetch_linked_parcel => {
                self.linked_parcel(parcel, options).await.map(Box::new)
            }
            _ => None,
        };

        info!(
            address = %address_key,
            matches = matches.len(),
            parcel = ?parcel_number,
            linked = linked_parcel.is_some(),
            "Built address bundle"
        );

        Ok(AddressBundle {
            address_key,
            primary_layer_id: address_id,
            primary_feature,
            service_info,
            layer_catalog,
            matches,
            linked_parcel,
        })
    }

    async fn address_by_object_id(
        &self,
        layer_id: LayerId,
        layer: &LayerInfo,
        object_id: i64,
    ) -> GisResult<(String, Feature)> {
        let key = format!("{}={}", layer.object_id_field, object_id);
        let query = FeatureQuery::matching(format!("{} = {}", layer.object_id_field, object_id))
            .returning_geometry(true);
        let page = self.arc.query_page(layer_id, &query, 0, 1).await?;

        let feature = page
            .features
            .into_iter()
            .next()
            .ok_or_else(|| GisError::FeatureNotFound(format!("address point {}", key)))?;
        Ok((key, feature))
    }

    /// Exact match on the address column, then a substring match.
    async fn address_by_text(
        &self,
        layer_id: LayerId,
        layer: &LayerInfo,
        text: &str,
        select_first_if_multiple: bool,
    ) -> GisResult<(String, Feature)> {
        let field = pick_first_existing_field(&layer.fields, ADDRESS_FIELD_CANDIDATES).ok_or_else(
            || GisError::FieldNotFound {
                layer: layer.name.clone(),
                purpose: "address",
                available: layer.fields.clone(),
            },
        )?;

        let exact = FeatureQuery::matching(where_equals(field, text)).returning_geometry(true);
        let mut candidates = self
            .arc
            .query_page(layer_id, &exact, 0, EXACT_MATCH_PAGE)
            .await?
            .features;

        if candidates.is_empty() {
            debug!(field, text, "No exact address match, trying substring");
            let contains =
                FeatureQuery::matching(where_contains(field, text)).returning_geometry(true);
            candidates = self
                .arc
                .query_page(layer_id, &contains, 0, CONTAINS_MATCH_PAGE)
                .await?
                .features;
        }

        if candidates.len() > 1 && !select_first_if_multiple {
            return Err(GisError::Ambiguous {
                key: text.to_string(),
                count: candidates.len(),
            });
        }

        let feature = candidates
            .into_iter()
            .next()
            .ok_or_else(|| GisError::FeatureNotFound(format!("address point matching '{}'", text)))?;
        Ok((format!("{}~'{}'", field, text), feature))
    }

    async fn linked_parcel(
        &self,
        parcel_number: &str,
        options: &BundleOptions,
    ) -> Option<gis_common::ParcelBundle> {
        let parcel_options = BundleOptions {
            include_attribute_joins: true,
            include_spatial_intersects: true,
            ..options.clone()
        };
        match self.parcel_bundle(parcel_number, &parcel_options).await {
            Ok(bundle) => Some(bundle),
            Err(e) => {
                warn!(parcel = parcel_number, error = %e, "Linked parcel lookup failed");
                None
            }
        }
    }
}
