//! High-level client for the St. Louis County (MN) open data MapServer.
//!
//! Adds layer discovery by name, first-page helpers, and parcel/address
//! bundles that join a primary record against every other layer of the
//! service, on top of [`arcgis_rest`].

pub mod address;
pub mod client;
mod joins;
pub mod options;
pub mod parcel;

pub use client::{OpenDataClient, ADDRESS_LAYER_TOKEN, PARCELS_LAYER_TOKEN};
pub use options::{AddressLookup, AddressRequest, BundleOptions};

pub use arcgis_rest::{ClientSettings, FeatureQuery};
pub use gis_common::{
    AddressBundle, Feature, GisError, GisResult, LayerCatalog, LayerQueryResult, MatchMethod,
    ParcelBundle, QueryPage,
};
