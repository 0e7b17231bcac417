//! Transport seam between the query layer and the HTTP stack.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::GisResult;

/// HTTP verbs used against a MapServer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// Metadata reads; params go in the query string.
    Get,
    /// Feature and id queries; params are form-encoded.
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

/// Ordered request parameters.
pub type FormParams = Vec<(&'static str, String)>;

/// Anything able to issue a request and hand back a decoded JSON body.
///
/// Implementations own retry policy. Callers only see the final body or
/// the terminal error.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request_json(
        &self,
        url: &str,
        method: HttpMethod,
        params: &FormParams,
    ) -> GisResult<Value>;
}
