//! Knobs for bundle construction.

use gis_common::ObjectId;
use serde::{Deserialize, Serialize};

/// How far a bundle reaches across the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BundleOptions {
    /// Join layers sharing a parcel-id column
    pub include_attribute_joins: bool,
    /// Intersect layers with the primary geometry when no attribute join hits
    pub include_spatial_intersects: bool,
    /// Cap on features collected per layer
    pub max_features_per_layer: Option<usize>,
    pub return_geometries_in_matches: bool,
    /// Layers evaluated at once
    pub concurrency: usize,
}

impl Default for BundleOptions {
    fn default() -> Self {
        Self {
            include_attribute_joins: true,
            include_spatial_intersects: true,
            max_features_per_layer: None,
            return_geometries_in_matches: false,
            concurrency: 8,
        }
    }
}

impl BundleOptions {
    pub fn max_features_per_layer(mut self, max: usize) -> Self {
        self.max_features_per_layer = Some(max);
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn attribute_joins(mut self, enabled: bool) -> Self {
        self.include_attribute_joins = enabled;
        self
    }

    pub fn spatial_intersects(mut self, enabled: bool) -> Self {
        self.include_spatial_intersects = enabled;
        self
    }

    pub fn return_geometries(mut self, enabled: bool) -> Self {
        self.return_geometries_in_matches = enabled;
        self
    }
}

/// How the primary address point is located.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressLookup {
    /// Exact object id on the address layer.
    ObjectId(ObjectId),
    /// Address text: exact match first, then substring.
    FullAddress(String),
}

/// Parameters of an address bundle.
#[derive(Debug, Clone, PartialEq)]
pub struct AddressRequest {
    pub lookup: AddressLookup,
    /// Take the first candidate instead of failing when the text is ambiguous
    pub select_first_if_multiple: bool,
    /// Attach the parcel bundle of the parcel the address sits on
    pub also_fetch_linked_parcel: bool,
    pub options: BundleOptions,
}

impl AddressRequest {
    pub fn new(lookup: AddressLookup) -> Self {
        Self {
            lookup,
            select_first_if_multiple: true,
            also_fetch_linked_parcel: true,
            options: BundleOptions::default(),
        }
    }

    pub fn by_object_id(object_id: ObjectId) -> Self {
        Self::new(AddressLookup::ObjectId(object_id))
    }

    pub fn by_full_address(full_address: impl Into<String>) -> Self {
        Self::new(AddressLookup::FullAddress(full_address.into()))
    }

    pub fn select_first_if_multiple(mut self, select_first: bool) -> Self {
        self.select_first_if_multiple = select_first;
        self
    }

    pub fn also_fetch_linked_parcel(mut self, fetch: bool) -> Self {
        self.also_fetch_linked_parcel = fetch;
        self
    }

    pub fn with_options(mut self, options: BundleOptions) -> Self {
        self.options = options;
        self
    }
}
