//! Shared test utilities for the stlco-gis workspace.
//!
//! This crate provides common testing infrastructure including:
//! - A scripted in-memory transport that records every request
//! - Canned service, layer and query payloads
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```
//!
//! Then import in your tests:
//!
//! ```ignore
//! use test_utils::{ScriptedTransport, service_json, layer_json};
//! ```

pub mod fixtures;
pub mod transport;

// Re-export commonly used items at the crate root
pub use fixtures::*;
pub use transport::*;

/// Assert that a `GisResult` failed with the given error variant.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_gis_err;
///
/// assert_gis_err!(client.get_service_info().await, GisError::Remote { .. });
/// ```
#[macro_export]
macro_rules! assert_gis_err {
    ($result:expr, $pattern:pat) => {{
        match $result {
            Err(ref e) if matches!(e, $pattern) => {}
            Err(e) => panic!(
                "assertion failed: expected `{}`, got error: {:?}",
                stringify!($pattern),
                e
            ),
            Ok(_) => panic!(
                "assertion failed: expected `{}`, got Ok",
                stringify!($pattern)
            ),
        }
    }};
}
