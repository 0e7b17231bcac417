//! Error types for the open data GIS client.

use thiserror::Error;

/// Result type alias using GisError.
pub type GisResult<T> = Result<T, GisError>;

/// Primary error type for ArcGIS REST operations.
#[derive(Debug, Error)]
pub enum GisError {
    // === Transport Errors ===
    #[error("HTTP {status} from {url}: {body}")]
    Http {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Non-JSON response from {url}: {body}")]
    InvalidJson { url: String, body: String },

    #[error("Network error for {url}: {message}")]
    Network { url: String, message: String },

    #[error("Request failed after {attempts} attempts for {url}: {last_error}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    // === Remote Service Errors ===
    #[error("ArcGIS REST error from {url}: {message}")]
    Remote {
        url: String,
        code: Option<i64>,
        message: String,
        details: Vec<String>,
    },

    // === Domain Errors ===
    #[error("Layer not found: {0}")]
    LayerNotFound(String),

    #[error("Layer '{layer}' has no recognized {purpose} field. Available fields: {available:?}")]
    FieldNotFound {
        layer: String,
        purpose: &'static str,
        available: Vec<String>,
    },

    #[error("No feature found: {0}")]
    FeatureNotFound(String),

    #[error("Multiple features matched {key} (count={count})")]
    Ambiguous { key: String, count: usize },

    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid parameter value for '{param}': {message}")]
    InvalidParameter { param: String, message: String },
}

impl GisError {
    /// Whether the transport should retry after this error.
    pub fn is_transient(&self) -> bool {
        matches!(self, GisError::Network { .. })
    }

    /// Network, HTTP status and payload decoding failures.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            GisError::Http { .. }
                | GisError::InvalidJson { .. }
                | GisError::Network { .. }
                | GisError::RetriesExhausted { .. }
                | GisError::Client(_)
        )
    }

    /// Errors raised by the client's own lookup logic rather than the service.
    pub fn is_domain(&self) -> bool {
        matches!(
            self,
            GisError::LayerNotFound(_)
                | GisError::FieldNotFound { .. }
                | GisError::FeatureNotFound(_)
                | GisError::Ambiguous { .. }
                | GisError::MissingParameter(_)
                | GisError::InvalidParameter { .. }
        )
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            GisError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Truncate a response body for error context without splitting a character.
pub fn truncate_body(body: &str, max_chars: usize) -> String {
    match body.char_indices().nth(max_chars) {
        Some((idx, _)) => body[..idx].to_string(),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_body_short() {
        assert_eq!(truncate_body("abc", 10), "abc");
    }

    #[test]
    fn test_truncate_body_multibyte() {
        let body = "ééééé";
        assert_eq!(truncate_body(body, 2), "éé");
    }

    #[test]
    fn test_classification() {
        let http = GisError::Http {
            url: "u".into(),
            status: 404,
            body: String::new(),
        };
        assert!(http.is_transport());
        assert!(!http.is_domain());
        assert_eq!(http.status(), Some(404));

        let missing = GisError::MissingParameter("geometryType".into());
        assert!(missing.is_domain());
        assert!(!missing.is_transient());

        let net = GisError::Network {
            url: "u".into(),
            message: "reset".into(),
        };
        assert!(net.is_transient());
    }
}
