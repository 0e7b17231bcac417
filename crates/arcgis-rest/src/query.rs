//! Feature queries: single pages, id lists, and full walks.
//!
//! A full walk pages by `resultOffset` when the layer allows it. Layers that
//! declare `supportsPagination: false` are walked by fetching every matching
//! object id first and re-querying the ids in chunks.

use std::collections::VecDeque;

use futures::stream::{self, Stream, TryStreamExt};
use gis_common::fields::to_esri_json;
use gis_common::{
    Feature, FormParams, GisError, GisResult, HttpMethod, LayerId, ObjectId, QueryPage, SpatialFilter,
};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::client::{check_error, ArcGisRestClient};

/// Filter, projection and ordering of a layer query.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureQuery {
    /// SQL where clause
    pub where_clause: String,
    /// Comma-separated field list, `*` for all
    pub out_fields: String,
    pub return_geometry: bool,
    /// `orderByFields`; defaults to the object id ascending
    pub order_by: Option<String>,
    pub spatial: Option<SpatialFilter>,
}

impl Default for FeatureQuery {
    fn default() -> Self {
        Self {
            where_clause: "1=1".to_string(),
            out_fields: "*".to_string(),
            return_geometry: false,
            order_by: None,
            spatial: None,
        }
    }
}

impl FeatureQuery {
    /// All fields of every feature matching `where_clause`.
    pub fn matching(where_clause: impl Into<String>) -> Self {
        Self {
            where_clause: where_clause.into(),
            ..Self::default()
        }
    }

    pub fn out_fields(mut self, out_fields: impl Into<String>) -> Self {
        self.out_fields = out_fields.into();
        self
    }

    pub fn returning_geometry(mut self, return_geometry: bool) -> Self {
        self.return_geometry = return_geometry;
        self
    }

    pub fn order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    pub fn intersecting(mut self, filter: SpatialFilter) -> Self {
        self.spatial = Some(filter);
        self
    }
}

fn bool_param(value: bool) -> String {
    if value { "true" } else { "false" }.to_string()
}

fn push_spatial(params: &mut FormParams, filter: &SpatialFilter, wkid: Option<i64>, out_sr: bool) {
    params.push(("geometry", to_esri_json(&Value::Object(filter.geometry.clone()))));
    params.push(("geometryType", filter.geometry_type.as_str().to_string()));
    params.push(("spatialRel", filter.relation.as_str().to_string()));
    if let Some(wkid) = wkid {
        params.push(("inSR", wkid.to_string()));
        if out_sr {
            params.push(("outSR", wkid.to_string()));
        }
    }
}

impl ArcGisRestClient {
    /// One page of features.
    ///
    /// The page size is clamped to the layer's (else the service's) max
    /// record count. A spatial query against a layer that declares no
    /// spatial filter support returns an empty page without a request.
    #[instrument(skip(self, query), fields(where_clause = %query.where_clause))]
    pub async fn query_page(
        &self,
        layer_id: LayerId,
        query: &FeatureQuery,
        offset: u64,
        page_size: usize,
    ) -> GisResult<QueryPage> {
        let info = self.get_layer_info(layer_id).await?;
        let service = self.get_service_info().await?;
        let page_size = info.clamp_page_size(&service, page_size);

        if query.spatial.is_some() && info.supports_spatial_filter == Some(false) {
            debug!("Layer has no spatial filter support, skipping query");
            return Ok(QueryPage::empty(layer_id, offset, page_size));
        }

        let mut params: FormParams = vec![
            ("f", "json".to_string()),
            ("where", query.where_clause.clone()),
            ("outFields", query.out_fields.clone()),
            ("returnGeometry", bool_param(query.return_geometry)),
            ("resultOffset", offset.to_string()),
            ("resultRecordCount", page_size.to_string()),
        ];

        if info.supports_order_by != Some(false) {
            let order_by = query
                .order_by
                .clone()
                .unwrap_or_else(|| format!("{} ASC", info.object_id_field));
            params.push(("orderByFields", order_by));
        }

        if let Some(filter) = &query.spatial {
            push_spatial(&mut params, filter, service.spatial_reference_wkid, true);
        }

        let url = self.query_url(layer_id);
        let payload = self
            .transport
            .request_json(&url, HttpMethod::Post, &params)
            .await?;
        check_error(&payload, &url)?;

        let features = Feature::parse_features(&payload);
        let exceeded = payload
            .get("exceededTransferLimit")
            .and_then(Value::as_bool);

        debug!(
            offset,
            page_size,
            returned = features.len(),
            exceeded_transfer_limit = ?exceeded,
            "Fetched page"
        );

        Ok(QueryPage::new(
            layer_id, offset, page_size, features, exceeded, payload,
        ))
    }

    /// Ids of every matching feature, sorted ascending without duplicates.
    #[instrument(skip(self, query), fields(where_clause = %query.where_clause))]
    pub async fn query_object_ids(
        &self,
        layer_id: LayerId,
        query: &FeatureQuery,
    ) -> GisResult<Vec<ObjectId>> {
        let info = self.get_layer_info(layer_id).await?;
        let service = self.get_service_info().await?;

        if query.spatial.is_some() && info.supports_spatial_filter == Some(false) {
            debug!("Layer has no spatial filter support, skipping id query");
            return Ok(Vec::new());
        }

        let mut params: FormParams = vec![
            ("f", "json".to_string()),
            ("where", query.where_clause.clone()),
            ("returnIdsOnly", "true".to_string()),
            ("returnGeometry", "false".to_string()),
        ];
        if let Some(filter) = &query.spatial {
            push_spatial(&mut params, filter, service.spatial_reference_wkid, false);
        }

        let url = self.query_url(layer_id);
        let payload = self
            .transport
            .request_json(&url, HttpMethod::Post, &params)
            .await?;
        check_error(&payload, &url)?;

        let mut ids: Vec<ObjectId> = payload
            .get("objectIds")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_i64).collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids.dedup();

        debug!(count = ids.len(), "Fetched object ids");
        Ok(ids)
    }

    /// Full records for an explicit id list.
    pub async fn query_by_object_ids(
        &self,
        layer_id: LayerId,
        object_ids: &[ObjectId],
        out_fields: &str,
        return_geometry: bool,
    ) -> GisResult<Vec<Feature>> {
        if object_ids.is_empty() {
            return Ok(Vec::new());
        }

        let ids = object_ids
            .iter()
            .map(ObjectId::to_string)
            .collect::<Vec<_>>()
            .join(",");

        let params: FormParams = vec![
            ("f", "json".to_string()),
            ("objectIds", ids),
            ("outFields", out_fields.to_string()),
            ("returnGeometry", bool_param(return_geometry)),
        ];

        let url = self.query_url(layer_id);
        let payload = self
            .transport
            .request_json(&url, HttpMethod::Post, &params)
            .await?;
        check_error(&payload, &url)?;

        Ok(Feature::parse_features(&payload))
    }

    /// Lazily walk every matching feature.
    ///
    /// Nothing is requested until the stream is polled. Each call starts a
    /// fresh walk. `max_features` stops the walk as soon as that many
    /// features have been yielded, even mid-page.
    pub fn iterate_all<'a>(
        &'a self,
        layer_id: LayerId,
        query: &'a FeatureQuery,
        page_size: usize,
        max_features: Option<usize>,
    ) -> impl Stream<Item = GisResult<Feature>> + 'a {
        let walk = FeatureWalk {
            layer_id,
            requested_page_size: page_size,
            max_features,
            emitted: 0,
            buffer: VecDeque::new(),
            phase: WalkPhase::Start,
        };

        stream::try_unfold(walk, move |mut walk| async move {
            let next = walk.next_feature(self, query).await?;
            Ok::<_, GisError>(next.map(|feature| (feature, walk)))
        })
    }

    /// Collect `iterate_all` into a vector.
    pub async fn collect_all(
        &self,
        layer_id: LayerId,
        query: &FeatureQuery,
        page_size: usize,
        max_features: Option<usize>,
    ) -> GisResult<Vec<Feature>> {
        self.iterate_all(layer_id, query, page_size, max_features)
            .try_collect()
            .await
    }
}

/// State of one `iterate_all` walk.
struct FeatureWalk {
    layer_id: LayerId,
    requested_page_size: usize,
    max_features: Option<usize>,
    emitted: usize,
    buffer: VecDeque<Feature>,
    phase: WalkPhase,
}

enum WalkPhase {
    Start,
    Offsets {
        next: Option<u64>,
        page_size: usize,
    },
    ObjectIds {
        chunks: VecDeque<Vec<ObjectId>>,
        oid_field: String,
    },
    Done,
}

impl FeatureWalk {
    async fn next_feature(
        &mut self,
        client: &ArcGisRestClient,
        query: &FeatureQuery,
    ) -> GisResult<Option<Feature>> {
        loop {
            if self.max_features.is_some_and(|max| self.emitted >= max) {
                return Ok(None);
            }
            if let Some(feature) = self.buffer.pop_front() {
                self.emitted += 1;
                return Ok(Some(feature));
            }
            if !self.refill(client, query).await? {
                return Ok(None);
            }
        }
    }

    /// Advance one step; false once the walk is exhausted.
    async fn refill(
        &mut self,
        client: &ArcGisRestClient,
        query: &FeatureQuery,
    ) -> GisResult<bool> {
        match std::mem::replace(&mut self.phase, WalkPhase::Done) {
            WalkPhase::Start => {
                self.phase = self.plan(client, query).await?;
                Ok(true)
            }
            WalkPhase::Offsets {
                next: Some(offset),
                page_size,
            } => {
                let page = client
                    .query_page(self.layer_id, query, offset, page_size)
                    .await?;
                if page.features.is_empty() {
                    return Ok(false);
                }
                self.phase = WalkPhase::Offsets {
                    next: page.next_offset,
                    page_size,
                };
                self.buffer.extend(page.features);
                Ok(true)
            }
            WalkPhase::ObjectIds {
                mut chunks,
                oid_field,
            } => {
                let Some(chunk) = chunks.pop_front() else {
                    return Ok(false);
                };
                let mut features = client
                    .query_by_object_ids(
                        self.layer_id,
                        &chunk,
                        &query.out_fields,
                        query.return_geometry,
                    )
                    .await?;
                // servers do not promise to echo objectIds order
                features.sort_by_key(|f| {
                    let oid = f.object_id(&oid_field);
                    (oid.is_none(), oid)
                });
                self.buffer.extend(features);
                self.phase = WalkPhase::ObjectIds { chunks, oid_field };
                Ok(true)
            }
            WalkPhase::Offsets { next: None, .. } | WalkPhase::Done => Ok(false),
        }
    }

    async fn plan(
        &self,
        client: &ArcGisRestClient,
        query: &FeatureQuery,
    ) -> GisResult<WalkPhase> {
        let info = client.get_layer_info(self.layer_id).await?;
        let service = client.get_service_info().await?;
        let page_size = info.clamp_page_size(&service, self.requested_page_size);

        if info.supports_pagination != Some(false) {
            debug!(layer_id = self.layer_id, page_size, "Walking by offset");
            return Ok(WalkPhase::Offsets {
                next: Some(0),
                page_size,
            });
        }

        let ids = client.query_object_ids(self.layer_id, query).await?;
        debug!(
            layer_id = self.layer_id,
            page_size,
            ids = ids.len(),
            "Walking by object id chunks"
        );
        Ok(WalkPhase::ObjectIds {
            chunks: ids.chunks(page_size).map(<[ObjectId]>::to_vec).collect(),
            oid_field: info.object_id_field.clone(),
        })
    }
}

