//! Fetch-once service and layer metadata.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use gis_common::{
    FormParams, GisError, GisResult, HttpMethod, LayerCatalog, LayerId, LayerInfo, ServiceInfo,
};
use tracing::{debug, info, instrument};

use crate::client::{check_error, ArcGisRestClient};

fn pjson() -> FormParams {
    vec![("f", "pjson".to_string())]
}

impl ArcGisRestClient {
    /// Service-level metadata, fetched on first call.
    #[instrument(skip(self), fields(base = %self.base))]
    pub async fn get_service_info(&self) -> GisResult<Arc<ServiceInfo>> {
        let info = self
            .service_cache
            .get_or_try_init(|| async {
                let payload = self
                    .transport
                    .request_json(&self.base, HttpMethod::Get, &pjson())
                    .await?;
                check_error(&payload, &self.base)?;

                let info = ServiceInfo::from_payload(&self.base, &payload);
                info!(
                    layers = info.layers.len(),
                    tables = info.tables.len(),
                    wkid = ?info.spatial_reference_wkid,
                    max_record_count = ?info.max_record_count,
                    "Loaded service metadata"
                );
                Ok::<_, GisError>(Arc::new(info))
            })
            .await?;

        Ok(Arc::clone(info))
    }

    /// Layer metadata, fetched once per id.
    ///
    /// Concurrent first calls for the same id share a single request.
    #[instrument(skip(self))]
    pub async fn get_layer_info(&self, layer_id: LayerId) -> GisResult<Arc<LayerInfo>> {
        let cell = {
            let mut cache = self.layer_cache.lock().await;
            Arc::clone(cache.entry(layer_id).or_default())
        };

        if let Some(info) = cell.get() {
            debug!("Layer metadata cache hit");
            return Ok(Arc::clone(info));
        }

        let service = self.get_service_info().await?;
        let info = cell
            .get_or_try_init(|| async {
                let url = self.layer_url(layer_id);
                let payload = self
                    .transport
                    .request_json(&url, HttpMethod::Get, &pjson())
                    .await?;
                check_error(&payload, &url)?;

                let info = LayerInfo::from_payload(layer_id, &payload, &service);
                debug!(
                    name = %info.name,
                    fields = info.fields.len(),
                    pagination = ?info.supports_pagination,
                    order_by = ?info.supports_order_by,
                    spatial = ?info.supports_spatial_filter,
                    "Loaded layer metadata"
                );
                Ok::<_, GisError>(Arc::new(info))
            })
            .await?;

        Ok(Arc::clone(info))
    }

    /// Ids of all layers and tables, ascending and unique.
    pub async fn list_layer_ids(&self) -> GisResult<Vec<LayerId>> {
        let service = self.get_service_info().await?;
        let ids: BTreeSet<LayerId> = service.entries().map(|entry| entry.id).collect();
        Ok(ids.into_iter().collect())
    }

    /// Metadata for every layer and table of the service.
    #[instrument(skip(self))]
    pub async fn build_layer_catalog(&self) -> GisResult<LayerCatalog> {
        let ids = self.list_layer_ids().await?;

        let catalog: LayerCatalog = stream::iter(ids)
            .map(|id| async move { self.get_layer_info(id).await.map(|info| (id, info)) })
            .buffer_unordered(self.catalog_concurrency)
            .try_collect()
            .await?;

        debug!(layers = catalog.len(), "Built layer catalog");
        Ok(catalog)
    }

    /// First layer or table whose name contains `token`, ignoring case.
    pub async fn find_layer_id_by_name_contains(&self, token: &str) -> GisResult<Option<LayerId>> {
        let needle = token.to_lowercase();
        let service = self.get_service_info().await?;
        let found = service
            .entries()
            .find(|entry| {
                entry
                    .name
                    .as_deref()
                    .is_some_and(|name| name.to_lowercase().contains(&needle))
            })
            .map(|entry| entry.id);
        Ok(found)
    }
}
