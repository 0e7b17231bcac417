//! County-level client: layer discovery and paging helpers.

use std::sync::Arc;

use arcgis_rest::{ArcGisRestClient, ClientSettings, FeatureQuery};
use futures::Stream;
use gis_common::{
    Feature, GisError, GisResult, LayerCatalog, LayerId, LayerInfo, QueryPage, ServiceInfo,
    Transport,
};
use tracing::debug;

/// Substring identifying the parcels layer by name.
pub const PARCELS_LAYER_TOKEN: &str = "parcels";

/// Substring identifying the address points layer by name.
pub const ADDRESS_LAYER_TOKEN: &str = "address";

/// Client for the county open data service.
///
/// Owns one [`ArcGisRestClient`], so service and layer metadata are fetched
/// once per `OpenDataClient`.
pub struct OpenDataClient {
    pub(crate) settings: ClientSettings,
    pub(crate) arc: ArcGisRestClient,
}

impl OpenDataClient {
    /// Client over HTTP configured by `settings`.
    pub fn new(settings: ClientSettings) -> GisResult<Self> {
        let arc = ArcGisRestClient::from_settings(&settings)?;
        Ok(Self { settings, arc })
    }

    /// Client configured from `STLCO_GIS_*` environment variables.
    pub fn from_env() -> GisResult<Self> {
        Self::new(ClientSettings::from_env())
    }

    /// Client over a caller-supplied transport.
    pub fn with_transport(settings: ClientSettings, transport: Arc<dyn Transport>) -> Self {
        let arc = ArcGisRestClient::new(settings.normalized_base_url(), transport)
            .with_catalog_concurrency(settings.concurrency);
        Self { settings, arc }
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// The underlying REST client, for queries not covered here.
    pub fn rest(&self) -> &ArcGisRestClient {
        &self.arc
    }

    /// Release the connection pool.
    pub fn close(self) {
        self.arc.close();
    }

    pub async fn service_info(&self) -> GisResult<Arc<ServiceInfo>> {
        self.arc.get_service_info().await
    }

    pub async fn layer_catalog(&self) -> GisResult<LayerCatalog> {
        self.arc.build_layer_catalog().await
    }

    pub async fn find_layer_id_by_name_contains(&self, token: &str) -> GisResult<Option<LayerId>> {
        self.arc.find_layer_id_by_name_contains(token).await
    }

    pub async fn parcels_layer_id(&self) -> GisResult<LayerId> {
        self.require_layer(PARCELS_LAYER_TOKEN, "Parcels").await
    }

    pub async fn address_points_layer_id(&self) -> GisResult<LayerId> {
        self.require_layer(ADDRESS_LAYER_TOKEN, "Address Points").await
    }

    async fn require_layer(&self, token: &str, label: &str) -> GisResult<LayerId> {
        self.find_layer_id_by_name_contains(token)
            .await?
            .ok_or_else(|| {
                GisError::LayerNotFound(format!("could not locate a {} layer in the service", label))
            })
    }

    /// First page of `query`; page size defaults to the configured one and
    /// is capped by `max_page_size_cap`.
    pub async fn first_page(
        &self,
        layer_id: LayerId,
        query: &FeatureQuery,
        page_size: Option<usize>,
    ) -> GisResult<QueryPage> {
        let page_size = self.settings.effective_page_size(page_size);
        debug!(layer_id, page_size, "Fetching first page");
        self.arc.query_page(layer_id, query, 0, page_size).await
    }

    /// Lazily walk every feature matching `query`.
    pub fn iter_all<'a>(
        &'a self,
        layer_id: LayerId,
        query: &'a FeatureQuery,
        page_size: Option<usize>,
        max_features: Option<usize>,
    ) -> impl Stream<Item = GisResult<Feature>> + 'a {
        let page_size = self.settings.effective_page_size(page_size);
        self.arc.iterate_all(layer_id, query, page_size, max_features)
    }

    pub async fn list_parcels_first_page(&self, page_size: Option<usize>) -> GisResult<QueryPage> {
        let layer_id = self.parcels_layer_id().await?;
        self.first_page(layer_id, &FeatureQuery::default(), page_size)
            .await
    }

    pub async fn list_address_points_first_page(
        &self,
        page_size: Option<usize>,
    ) -> GisResult<QueryPage> {
        let layer_id = self.address_points_layer_id().await?;
        self.first_page(layer_id, &FeatureQuery::default(), page_size)
            .await
    }

    /// Collect up to `max` features of `query` at the configured page size.
    pub(crate) async fn collect_matches(
        &self,
        layer_id: LayerId,
        query: &FeatureQuery,
        max: Option<usize>,
    ) -> GisResult<Vec<Feature>> {
        let page_size = self.settings.effective_page_size(None);
        self.arc.collect_all(layer_id, query, page_size, max).await
    }
}

/// Catalog entry for a layer the service listed.
pub(crate) fn catalog_entry(catalog: &LayerCatalog, layer_id: LayerId) -> GisResult<Arc<LayerInfo>> {
    catalog
        .get(&layer_id)
        .cloned()
        .ok_or_else(|| GisError::LayerNotFound(format!("layer {} missing from catalog", layer_id)))
}
