//! Field-name heuristics and where-clause helpers.
//!
//! County services do not agree on identifier column names, so joins pick
//! the first candidate a layer actually exposes.

use serde_json::Value;

/// Parcel identifier columns, in priority order.
pub const PARCEL_ID_FIELD_CANDIDATES: &[&str] =
    &["PRCL_NBR", "PARCEL", "PARCELID", "PARCEL_ID", "PRCL", "PID"];

/// Secondary parcel identifier columns used by St. Louis County layers.
pub const PARCEL_PIN_FIELD_CANDIDATES: &[&str] = &["PIN_NUM", "PIN_NUMBER"];

/// Full address text columns, in priority order.
pub const ADDRESS_FIELD_CANDIDATES: &[&str] = &[
    "FULLADDR",
    "FULL_ADDRESS",
    "ADDRESS",
    "ADDR",
    "SITEADDR",
    "SITUSADDR",
];

/// Escape a string literal for an ArcGIS SQL where clause.
pub fn sql_quote(value: &str) -> String {
    value.replace('\'', "''")
}

/// `FIELD = 'value'` with the value quoted.
pub fn where_equals(field: &str, value: &str) -> String {
    format!("{} = '{}'", field, sql_quote(value))
}

/// `FIELD LIKE '%value%'` with the value quoted.
pub fn where_contains(field: &str, value: &str) -> String {
    format!("{} LIKE '%{}%'", field, sql_quote(value))
}

/// First candidate present in `fields`, compared case-insensitively.
///
/// Returns the service's own spelling of the field.
pub fn pick_first_existing_field<'a, S: AsRef<str>>(
    fields: &'a [S],
    candidates: &[&str],
) -> Option<&'a str> {
    candidates.iter().find_map(|candidate| {
        fields
            .iter()
            .map(AsRef::as_ref)
            .find(|f| f.eq_ignore_ascii_case(candidate))
    })
}

/// Serialize a geometry the way the query endpoint expects it (no whitespace).
pub fn to_esri_json(value: &Value) -> String {
    // Value's Display impl is the compact encoding
    value.to_string()
}
