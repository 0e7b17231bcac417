//! Tests for identifier field resolution and where-clause quoting.

use gis_common::fields::{
    pick_first_existing_field, sql_quote, where_equals, ADDRESS_FIELD_CANDIDATES,
    PARCEL_ID_FIELD_CANDIDATES, PARCEL_PIN_FIELD_CANDIDATES,
};
use gis_common::{GisError, SpatialFilter};
use tokio_test::assert_err;

// ============================================================================
// Field resolution
// ============================================================================

#[test]
fn test_parcel_field_case_insensitive() {
    let fields = ["objectid", "Parcel_Id", "OWNER"];
    assert_eq!(
        pick_first_existing_field(&fields, PARCEL_ID_FIELD_CANDIDATES),
        Some("Parcel_Id")
    );
}

#[test]
fn test_parcelid_candidate_matches_mixed_case() {
    let fields = ["ParcelID"];
    assert_eq!(
        pick_first_existing_field(&fields, PARCEL_ID_FIELD_CANDIDATES),
        Some("ParcelID")
    );
}

#[test]
fn test_parcel_field_absent() {
    let fields = ["OBJECTID", "OWNER_NAME"];
    assert_eq!(
        pick_first_existing_field(&fields, PARCEL_ID_FIELD_CANDIDATES),
        None
    );
}

#[test]
fn test_pin_fallback_candidates() {
    let fields = ["OBJECTID", "pin_num"];
    assert_eq!(
        pick_first_existing_field(&fields, PARCEL_ID_FIELD_CANDIDATES),
        None
    );
    assert_eq!(
        pick_first_existing_field(&fields, PARCEL_PIN_FIELD_CANDIDATES),
        Some("pin_num")
    );
}

#[test]
fn test_address_field_priority() {
    let fields = vec![
        "SITUSADDR".to_string(),
        "Full_Address".to_string(),
        "ADDR".to_string(),
    ];
    assert_eq!(
        pick_first_existing_field(&fields, ADDRESS_FIELD_CANDIDATES),
        Some("Full_Address")
    );
}

#[test]
fn test_empty_field_list() {
    let fields: Vec<String> = Vec::new();
    assert_eq!(
        pick_first_existing_field(&fields, ADDRESS_FIELD_CANDIDATES),
        None
    );
}

// ============================================================================
// Quoting
// ============================================================================

#[test]
fn test_quote_embedded_apostrophe() {
    assert_eq!(sql_quote("O'Brien"), "O''Brien");
    assert_eq!(where_equals("OWNER", "O'Brien"), "OWNER = 'O''Brien'");
}

#[test]
fn test_quote_multiple_apostrophes() {
    assert_eq!(sql_quote("'a''b'"), "''a''''b''");
}

// ============================================================================
// Spatial filters
// ============================================================================

#[test]
fn test_spatial_filter_without_recognizable_geometry() {
    let geometry = serde_json::json!({"spatialReference": {"wkid": 26915}});
    let result = SpatialFilter::infer(geometry.as_object().cloned().unwrap());
    let err = assert_err!(result);
    assert!(matches!(err, GisError::MissingParameter(_)));
}
