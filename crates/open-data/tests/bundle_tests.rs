//! Parcel and address bundles over a scripted county service.

use std::sync::Arc;
use std::time::Duration;

use futures::TryStreamExt;
use gis_common::{GisError, MatchMethod};
use open_data::{AddressRequest, BundleOptions, ClientSettings, FeatureQuery, OpenDataClient};
use serde_json::{json, Value};
use test_utils::{
    assert_gis_err, feature, features_json, layer_json, layer_suffix, paged_responder, point,
    polygon, query_suffix, service_json, with_capabilities, RecordedCall, ScriptedTransport,
    SERVICE_SUFFIX, SERVICE_URL,
};

const PARCEL: &str = "123-456-789";

const PARCELS: u32 = 0;
const ADDRESSES: u32 = 1;
const ZONING: u32 = 2;
const TAX: u32 = 3;
const HYDRO: u32 = 4;

fn settings() -> ClientSettings {
    ClientSettings {
        base_url: SERVICE_URL.to_string(),
        ..ClientSettings::default()
    }
}

fn where_of(call: &RecordedCall) -> &str {
    call.param("where").unwrap_or_default()
}

fn is_spatial(call: &RecordedCall) -> bool {
    call.has_param("geometry")
}

fn parcel_feature(with_geometry: bool) -> Value {
    feature(
        json!({"OBJECTID": 11, "PRCL_NBR": PARCEL, "OWNER": "O'BRIEN"}),
        with_geometry.then(polygon),
    )
}

fn address_feature(oid: i64, text: &str, parcel: &str) -> Value {
    feature(
        json!({"OBJECTID": oid, "FULL_ADDRESS": text, "PRCL_NBR": parcel}),
        Some(point(5.0, 5.0)),
    )
}

fn tax_table() -> Value {
    json!({
        "id": TAX,
        "name": "Tax Records",
        "type": "Table",
        "objectIdField": "OBJECTID",
        "fields": [{"name": "OBJECTID"}, {"name": "Parcel_Id"}, {"name": "TAX_DUE"}]
    })
}

/// County service with parcels, address points, zoning, a tax table and
/// a hydrography layer that never matches.
struct County {
    parcels_layer: Value,
    zoning_layer: Value,
    parcel_geometry: bool,
    address_text_matches: usize,
    latency: Option<Duration>,
}

impl Default for County {
    fn default() -> Self {
        Self {
            parcels_layer: layer_json(PARCELS, "Parcels", &["PRCL_NBR", "OWNER"], "esriGeometryPolygon"),
            zoning_layer: layer_json(ZONING, "Zoning", &["ZONE"], "esriGeometryPolygon"),
            parcel_geometry: true,
            address_text_matches: 1,
            latency: None,
        }
    }
}

impl County {
    fn transport(self) -> Arc<ScriptedTransport> {
        let parcel_geometry = self.parcel_geometry;
        let text_matches = self.address_text_matches;

        let scripted = match self.latency {
            Some(latency) => ScriptedTransport::new().with_latency(latency),
            None => ScriptedTransport::new(),
        };

        scripted
            .route(
                SERVICE_SUFFIX,
                service_json(&[
                    (PARCELS, "Parcels"),
                    (ADDRESSES, "Address Points"),
                    (ZONING, "Zoning"),
                    (TAX, "Tax Records"),
                    (HYDRO, "Hydrography"),
                ]),
            )
            .route(&layer_suffix(PARCELS), self.parcels_layer)
            .route(
                &layer_suffix(ADDRESSES),
                layer_json(ADDRESSES, "Address Points", &["FULL_ADDRESS", "PRCL_NBR"], "esriGeometryPoint"),
            )
            .route(&layer_suffix(ZONING), self.zoning_layer)
            .route(&layer_suffix(TAX), tax_table())
            .route(&layer_suffix(HYDRO), layer_json(HYDRO, "Hydrography", &["NAME"], "esriGeometryPolygon"))
            .route_fn(&query_suffix(PARCELS), move |call| {
                let hit = where_of(call) == format!("PRCL_NBR = '{}'", PARCEL) && !is_spatial(call);
                Ok(features_json(if hit {
                    vec![parcel_feature(parcel_geometry)]
                } else {
                    vec![]
                }))
            })
            .route_fn(&query_suffix(ADDRESSES), move |call| {
                let w = where_of(call);
                let features = if w == format!("PRCL_NBR = '{}'", PARCEL) {
                    vec![
                        address_feature(7, "100 MAIN ST", PARCEL),
                        address_feature(8, "102 MAIN ST", PARCEL),
                    ]
                } else if w == "OBJECTID = 7" {
                    vec![address_feature(7, "100 MAIN ST", PARCEL)]
                } else if w == "OBJECTID = 9" {
                    vec![address_feature(9, "1 LAKE AVE", "999-000-000")]
                } else if w == "FULL_ADDRESS LIKE '%100 MAIN ST%'" {
                    (0..text_matches)
                        .map(|i| address_feature(7 + i as i64, "100 MAIN ST", PARCEL))
                        .collect()
                } else {
                    vec![]
                };
                Ok(features_json(features))
            })
            .route_fn(&query_suffix(ZONING), |call| {
                Ok(features_json(if is_spatial(call) {
                    vec![feature(json!({"OBJECTID": 1, "ZONE": "R-1"}), None)]
                } else {
                    vec![]
                }))
            })
            .route_fn(&query_suffix(TAX), |call| {
                let hit = where_of(call) == format!("Parcel_Id = '{}'", PARCEL);
                Ok(features_json(if hit {
                    vec![feature(json!({"OBJECTID": 3, "Parcel_Id": PARCEL, "TAX_DUE": 1200.5}), None)]
                } else {
                    vec![]
                }))
            })
            .route(&query_suffix(HYDRO), features_json(vec![]))
            .into_arc()
    }

    fn client(self) -> (OpenDataClient, Arc<ScriptedTransport>) {
        let transport = self.transport();
        let client = OpenDataClient::with_transport(settings(), transport.clone());
        (client, transport)
    }
}

// ============================================================================
// Parcel bundles
// ============================================================================

#[tokio::test]
async fn test_parcel_bundle_joins_every_layer() {
    let (client, transport) = County::default().client();

    let bundle = client
        .parcel_bundle(PARCEL, &BundleOptions::default())
        .await
        .unwrap();

    assert_eq!(bundle.parcel_key, PARCEL);
    assert_eq!(bundle.primary_layer_id, PARCELS);
    assert_eq!(bundle.layer_catalog.len(), 5);
    assert_eq!(bundle.address_points.len(), 2);

    let methods: Vec<_> = bundle
        .matches
        .iter()
        .map(|m| (m.layer_id, m.match_method))
        .collect();
    assert_eq!(
        methods,
        vec![
            (PARCELS, MatchMethod::Primary),
            (ADDRESSES, MatchMethod::AttributeJoin),
            (ZONING, MatchMethod::SpatialIntersect),
            (TAX, MatchMethod::AttributeJoin),
        ]
    );
    assert!(bundle.match_for(HYDRO).is_none());
    assert_eq!(bundle.match_for(TAX).unwrap().layer_name, "Tax Records");

    let primary_call = &transport.calls_to(&query_suffix(PARCELS))[0];
    assert_eq!(primary_call.param("where"), Some("PRCL_NBR = '123-456-789'"));
    assert_eq!(primary_call.param("resultRecordCount"), Some("1"));
    assert_eq!(primary_call.param("returnGeometry"), Some("true"));

    let zoning_call = &transport.calls_to(&query_suffix(ZONING))[0];
    assert_eq!(zoning_call.param("geometryType"), Some("esriGeometryPolygon"));
    assert_eq!(zoning_call.param("returnGeometry"), Some("false"));

    // metadata is fetched once per client
    assert_eq!(transport.count(SERVICE_SUFFIX), 1);
    assert_eq!(transport.count(&layer_suffix(PARCELS)), 1);
}

#[tokio::test]
async fn test_parcel_bundle_trims_key_and_caps_matches() {
    let (client, _) = County::default().client();

    let options = BundleOptions::default().max_features_per_layer(1).concurrency(1);
    let bundle = client.parcel_bundle("  123-456-789 ", &options).await.unwrap();

    assert_eq!(bundle.parcel_key, PARCEL);
    assert_eq!(bundle.address_points.len(), 1);
    assert_eq!(bundle.match_for(ADDRESSES).unwrap().features.len(), 1);
    assert_eq!(bundle.matches.len(), 4);
}

fn slow_county() -> Arc<ScriptedTransport> {
    County {
        latency: Some(Duration::from_millis(20)),
        ..County::default()
    }
    .transport()
}

#[tokio::test]
async fn test_fan_out_bounded_by_options() {
    let transport = slow_county();
    let client = OpenDataClient::with_transport(settings(), transport.clone());

    client
        .parcel_bundle(PARCEL, &BundleOptions::default())
        .await
        .unwrap();
    // four non-primary layers, all evaluated together
    assert_eq!(transport.peak_concurrent_queries(), 4);

    let transport = slow_county();
    let client = OpenDataClient::with_transport(settings(), transport.clone());
    let bundle = client
        .parcel_bundle(PARCEL, &BundleOptions::default().concurrency(2))
        .await
        .unwrap();
    assert_eq!(bundle.matches.len(), 4);
    assert_eq!(transport.peak_concurrent_queries(), 2);
}

#[tokio::test]
async fn test_fan_out_bounded_by_client_settings() {
    let transport = slow_county();
    let settings = ClientSettings {
        concurrency: 1,
        ..settings()
    };
    let client = OpenDataClient::with_transport(settings, transport.clone());

    let bundle = client
        .parcel_bundle(PARCEL, &BundleOptions::default())
        .await
        .unwrap();
    assert_eq!(bundle.matches.len(), 4);
    assert_eq!(transport.peak_concurrent_queries(), 1);
}

#[tokio::test]
async fn test_parcel_not_found() {
    let (client, _) = County::default().client();

    assert_gis_err!(
        client.parcel_bundle("000-000-000", &BundleOptions::default()).await,
        GisError::FeatureNotFound(_)
    );
}

#[tokio::test]
async fn test_parcel_quotes_key() {
    let (client, transport) = County::default().client();

    let _ = client
        .parcel_bundle("O'BRIEN-1", &BundleOptions::default())
        .await;
    let call = &transport.calls_to(&query_suffix(PARCELS))[0];
    assert_eq!(call.param("where"), Some("PRCL_NBR = 'O''BRIEN-1'"));
}

#[tokio::test]
async fn test_parcel_without_id_field() {
    let (client, transport) = County {
        parcels_layer: layer_json(PARCELS, "Parcels", &["OWNER", "ACRES"], "esriGeometryPolygon"),
        ..County::default()
    }
    .client();

    match client.parcel_bundle(PARCEL, &BundleOptions::default()).await {
        Err(GisError::FieldNotFound { available, .. }) => {
            assert_eq!(available, vec!["OBJECTID", "OWNER", "ACRES"]);
        }
        other => panic!("expected FieldNotFound, got {:?}", other.map(|b| b.parcel_key)),
    }
    assert_eq!(transport.count(&query_suffix(PARCELS)), 0);
}

#[tokio::test]
async fn test_parcel_pin_fallback() {
    let (client, transport) = County {
        parcels_layer: layer_json(PARCELS, "Parcels", &["PIN_NUM"], "esriGeometryPolygon"),
        ..County::default()
    }
    .client();

    let _ = client.parcel_bundle(PARCEL, &BundleOptions::default()).await;
    let call = &transport.calls_to(&query_suffix(PARCELS))[0];
    assert_eq!(call.param("where"), Some("PIN_NUM = '123-456-789'"));
}

#[tokio::test]
async fn test_parcel_without_geometry_skips_spatial_joins() {
    let (client, transport) = County {
        parcel_geometry: false,
        ..County::default()
    }
    .client();

    let bundle = client
        .parcel_bundle(PARCEL, &BundleOptions::default())
        .await
        .unwrap();

    assert!(bundle.match_for(ZONING).is_none());
    assert!(bundle.match_for(TAX).is_some());
    assert_eq!(transport.count(&query_suffix(ZONING)), 0);
    assert!(transport.calls().iter().all(|c| !is_spatial(c)));
}

#[tokio::test]
async fn test_spatial_join_skipped_for_unsupported_layer() {
    let zoning = with_capabilities(
        layer_json(ZONING, "Zoning", &["ZONE"], "esriGeometryPolygon"),
        Some(true),
        Some(true),
        Some(false),
    );
    let (client, transport) = County {
        zoning_layer: zoning,
        ..County::default()
    }
    .client();

    let bundle = client
        .parcel_bundle(PARCEL, &BundleOptions::default())
        .await
        .unwrap();

    assert!(bundle.match_for(ZONING).is_none());
    assert_eq!(transport.count(&query_suffix(ZONING)), 0);
}

#[tokio::test]
async fn test_attribute_joins_disabled() {
    let (client, _) = County::default().client();

    let options = BundleOptions::default().attribute_joins(false);
    let bundle = client.parcel_bundle(PARCEL, &options).await.unwrap();

    assert!(bundle.match_for(TAX).is_none());
    assert_eq!(
        bundle.match_for(ZONING).map(|m| m.match_method),
        Some(MatchMethod::SpatialIntersect)
    );
}

#[tokio::test]
async fn test_parcel_bundle_without_address_layer() {
    let transport = ScriptedTransport::new()
        .route(SERVICE_SUFFIX, service_json(&[(PARCELS, "Parcels")]))
        .route(
            &layer_suffix(PARCELS),
            layer_json(PARCELS, "Parcels", &["PRCL_NBR"], "esriGeometryPolygon"),
        )
        .route(&query_suffix(PARCELS), features_json(vec![parcel_feature(true)]))
        .into_arc();
    let client = OpenDataClient::with_transport(settings(), transport.clone());

    let bundle = client
        .parcel_bundle(PARCEL, &BundleOptions::default())
        .await
        .unwrap();
    assert!(bundle.address_points.is_empty());
    assert_eq!(bundle.matches.len(), 1);
}

#[tokio::test]
async fn test_missing_parcels_layer() {
    let transport = ScriptedTransport::new()
        .route(SERVICE_SUFFIX, service_json(&[(5, "Roads")]))
        .route(&layer_suffix(5), layer_json(5, "Roads", &[], "esriGeometryPolyline"))
        .into_arc();
    let client = OpenDataClient::with_transport(settings(), transport);

    assert_gis_err!(
        client.parcel_bundle(PARCEL, &BundleOptions::default()).await,
        GisError::LayerNotFound(_)
    );
    assert_gis_err!(
        client.list_parcels_first_page(None).await,
        GisError::LayerNotFound(_)
    );
}

// ============================================================================
// Address bundles
// ============================================================================

#[tokio::test]
async fn test_address_bundle_by_text_falls_back_to_like() {
    let (client, transport) = County::default().client();

    let bundle = client
        .address_bundle(&AddressRequest::by_full_address(" 100 MAIN ST "))
        .await
        .unwrap();

    assert_eq!(bundle.address_key, "FULL_ADDRESS~'100 MAIN ST'");
    assert_eq!(bundle.primary_layer_id, ADDRESSES);

    let address_calls = transport.calls_to(&query_suffix(ADDRESSES));
    assert_eq!(address_calls[0].param("where"), Some("FULL_ADDRESS = '100 MAIN ST'"));
    assert_eq!(address_calls[0].param("resultRecordCount"), Some("10"));
    assert_eq!(address_calls[1].param("where"), Some("FULL_ADDRESS LIKE '%100 MAIN ST%'"));
    assert_eq!(address_calls[1].param("resultRecordCount"), Some("25"));

    assert_eq!(
        bundle.match_for(PARCELS).map(|m| m.match_method),
        Some(MatchMethod::AttributeJoin)
    );
    assert_eq!(
        bundle.match_for(ZONING).map(|m| m.match_method),
        Some(MatchMethod::SpatialIntersect)
    );
    let zoning_call = transport
        .calls_to(&query_suffix(ZONING))
        .into_iter()
        .find(|c| is_spatial(c))
        .unwrap();
    assert_eq!(zoning_call.param("geometryType"), Some("esriGeometryPoint"));

    let linked = bundle.linked_parcel.expect("linked parcel");
    assert_eq!(linked.parcel_key, PARCEL);
    assert_eq!(linked.address_points.len(), 2);
}

#[tokio::test]
async fn test_address_bundle_ambiguous() {
    let (client, _) = County {
        address_text_matches: 3,
        ..County::default()
    }
    .client();

    let request = AddressRequest::by_full_address("100 MAIN ST").select_first_if_multiple(false);
    match client.address_bundle(&request).await {
        Err(GisError::Ambiguous { key, count }) => {
            assert_eq!(key, "100 MAIN ST");
            assert_eq!(count, 3);
        }
        other => panic!("expected Ambiguous, got {:?}", other.map(|b| b.address_key)),
    }

    let request = AddressRequest::by_full_address("100 MAIN ST").also_fetch_linked_parcel(false);
    let bundle = client.address_bundle(&request).await.unwrap();
    assert_eq!(bundle.primary_feature.object_id("OBJECTID"), Some(7));
    assert!(bundle.linked_parcel.is_none());
}

#[tokio::test]
async fn test_address_bundle_no_match() {
    let (client, _) = County::default().client();

    assert_gis_err!(
        client
            .address_bundle(&AddressRequest::by_full_address("1 NOWHERE RD"))
            .await,
        GisError::FeatureNotFound(_)
    );
}

#[tokio::test]
async fn test_address_bundle_blank_text() {
    let (client, transport) = County::default().client();

    assert_gis_err!(
        client
            .address_bundle(&AddressRequest::by_full_address("   "))
            .await,
        GisError::MissingParameter(_)
    );
    assert_eq!(transport.total_calls(), 0);
}

#[tokio::test]
async fn test_address_bundle_by_object_id() {
    let (client, transport) = County::default().client();

    let request = AddressRequest::by_object_id(7).also_fetch_linked_parcel(false);
    let bundle = client.address_bundle(&request).await.unwrap();

    assert_eq!(bundle.address_key, "OBJECTID=7");
    let call = &transport.calls_to(&query_suffix(ADDRESSES))[0];
    assert_eq!(call.param("where"), Some("OBJECTID = 7"));
    assert_eq!(call.param("resultRecordCount"), Some("1"));
    assert_eq!(
        bundle.match_for(ADDRESSES).map(|m| m.match_method),
        Some(MatchMethod::Primary)
    );
}

#[tokio::test]
async fn test_linked_parcel_failure_degrades() {
    let (client, _) = County::default().client();

    // address 9 points at a parcel the parcels layer does not have
    let bundle = client
        .address_bundle(&AddressRequest::by_object_id(9))
        .await
        .unwrap();

    assert!(bundle.linked_parcel.is_none());
    assert!(bundle.match_for(PARCELS).is_none());
    assert!(bundle.match_for(ZONING).is_some());
}

// ============================================================================
// Paging helpers
// ============================================================================

#[tokio::test]
async fn test_first_page_sizes() {
    let (client, transport) = County::default().client();

    client.list_parcels_first_page(None).await.unwrap();
    client.list_address_points_first_page(Some(5000)).await.unwrap();

    let parcels = &transport.calls_to(&query_suffix(PARCELS))[0];
    assert_eq!(parcels.param("resultRecordCount"), Some("200"));
    assert_eq!(parcels.param("resultOffset"), Some("0"));
    let addresses = &transport.calls_to(&query_suffix(ADDRESSES))[0];
    assert_eq!(addresses.param("resultRecordCount"), Some("2000"));
}

#[tokio::test]
async fn test_iter_all_stops_at_max() {
    let transport = ScriptedTransport::new()
        .route(SERVICE_SUFFIX, service_json(&[(PARCELS, "Parcels")]))
        .route(
            &layer_suffix(PARCELS),
            layer_json(PARCELS, "Parcels", &["PRCL_NBR"], "esriGeometryPolygon"),
        )
        .route_fn(&query_suffix(PARCELS), paged_responder(50))
        .into_arc();
    let client = OpenDataClient::with_transport(settings(), transport.clone());

    let query = FeatureQuery::default();
    let features: Vec<_> = client
        .iter_all(PARCELS, &query, Some(20), Some(25))
        .try_collect()
        .await
        .unwrap();

    assert_eq!(features.len(), 25);
    assert_eq!(transport.count(&query_suffix(PARCELS)), 2);
}
