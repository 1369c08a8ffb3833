//! Logger configuration.
//!
//! The serialized form uses the key names of the original proxy plugin configuration, so an
//! existing middleware block can be deserialized as-is:
//!
//! ```json
//! {
//!   "RequestIDHeaderName": "X-Request-ID",
//!   "ContentTypes": ["application/json"],
//!   "StatusCodes": [500, 502],
//!   "Limits": { "MaxBodySize": 4096 }
//! }
//! ```

use axum::http::{HeaderName, StatusCode};
use serde::{Deserialize, Serialize};

use crate::filter::FilterPolicy;

/// Header carrying the correlation ID when none is configured.
pub const DEFAULT_REQUEST_ID_HEADER: &str = "X-Request-ID";

/// Error type for configuration problems
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid request ID header name {name:?}")]
    InvalidHeaderName { name: String },
    #[error("invalid status code {0}")]
    InvalidStatusCode(u16),
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Configuration for the request logging middleware.
///
/// Immutable once a layer has been built from it.
///
/// # Examples
///
/// ```rust
/// use sluice::{RequestLoggerConfig, config::Limits};
///
/// // Default configuration: no filters, bodies logged only when empty
/// let config = RequestLoggerConfig::default();
///
/// // Custom configuration
/// let config = RequestLoggerConfig {
///     content_types: vec!["application/json".to_string()],
///     status_codes: vec![500],
///     limits: Limits { max_body_size: 4096 },
///     ..Default::default()
/// };
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RequestLoggerConfig {
    /// Header read to obtain, and written to propagate, the correlation ID
    #[serde(rename = "RequestIDHeaderName")]
    pub request_id_header_name: String,
    /// Response status codes that produce a log record; empty means all
    pub status_codes: Vec<u16>,
    /// Content types whose bodies may be logged literally; empty means all
    pub content_types: Vec<String>,
    /// Size limits
    pub limits: Limits,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Limits {
    /// Largest body, in bytes, logged literally in either direction
    pub max_body_size: usize,
}

impl Default for RequestLoggerConfig {
    fn default() -> Self {
        Self {
            request_id_header_name: DEFAULT_REQUEST_ID_HEADER.to_string(),
            status_codes: Vec::new(),
            content_types: Vec::new(),
            limits: Limits::default(),
        }
    }
}

impl RequestLoggerConfig {
    /// Parse a JSON configuration block. Missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub(crate) fn request_id_header(&self) -> Result<HeaderName, ConfigError> {
        HeaderName::try_from(self.request_id_header_name.as_str()).map_err(|_| {
            ConfigError::InvalidHeaderName {
                name: self.request_id_header_name.clone(),
            }
        })
    }

    pub(crate) fn filter_policy(&self) -> Result<FilterPolicy, ConfigError> {
        let status_codes = self
            .status_codes
            .iter()
            .map(|&code| StatusCode::from_u16(code).map_err(|_| ConfigError::InvalidStatusCode(code)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(FilterPolicy::new(
            self.content_types.iter().cloned(),
            status_codes,
            self.limits.max_body_size,
        ))
    }
}
