//! The structured log record emitted once per exchange.
//!
//! Field names and order follow the JSON schema downstream log consumers parse: one
//! [`LogRecord`] per line, holding a [`RequestRecord`] and a [`ResponseRecord`].

use axum::extract::ConnectInfo;
use axum::http::{header, request, HeaderMap};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;

use crate::capture::CapturedResponse;
use crate::filter::{content_type, Direction, FilterPolicy};

/// Value of the `direction` field. The spelling is what existing consumers match on.
pub const DIRECTION_INCOMING: &str = "Incomming";

/// Value of the `metadata` field for exchanges whose connection was upgraded.
pub const METADATA_UPGRADED: &str = "upgraded";

/// One line of structured output.
///
/// # Examples
///
/// ```rust
/// use sluice::record::LogRecord;
///
/// let line = r#"{"request_id":"abc","request":{"uri":"/","host":"","headers":{},"body":"",
///     "verb":"GET","ip_address":"","time":"2024-01-01T00:00:00Z","transfer_encoding":""},
///     "response":{"time":"2024-01-01T00:00:00Z","status":200,"headers":{},"body":"",
///     "transfer_encoding":""},"direction":"Incomming","metadata":""}"#;
/// let record: LogRecord = serde_json::from_str(line).unwrap();
/// assert_eq!(record.response.status, 200);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub request_id: String,
    pub request: RequestRecord,
    pub response: ResponseRecord,
    pub direction: String,
    pub metadata: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRecord {
    pub uri: String,
    pub host: String,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    pub verb: String,
    pub ip_address: String,
    /// Arrival time, RFC 3339
    pub time: String,
    pub transfer_encoding: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseRecord {
    /// Completion time, RFC 3339
    pub time: String,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    pub transfer_encoding: String,
}

impl LogRecord {
    pub fn new(request_id: String, request: RequestRecord, response: ResponseRecord) -> Self {
        Self {
            request_id,
            request,
            response,
            direction: DIRECTION_INCOMING.to_string(),
            metadata: String::new(),
        }
    }
}

impl RequestRecord {
    /// Build the request half of a record from the request head and its buffered body.
    pub fn capture(
        head: &request::Parts,
        body: &[u8],
        received_at: DateTime<Utc>,
        policy: &FilterPolicy,
    ) -> Self {
        let host = head
            .headers
            .get(header::HOST)
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
            .or_else(|| head.uri.authority().map(|authority| authority.to_string()))
            .unwrap_or_default();

        let ip_address = head
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_default();

        // HTTP/2 requests carry scheme and authority in the URI; log the origin form only
        let uri = head
            .uri
            .path_and_query()
            .map(|path_and_query| path_and_query.to_string())
            .unwrap_or_else(|| head.uri.to_string());

        Self {
            uri,
            host,
            headers: first_value_headers(&head.headers),
            body: policy.body_field(Direction::Request, body, &content_type(&head.headers)),
            verb: head.method.to_string(),
            ip_address,
            time: rfc3339(received_at),
            transfer_encoding: transfer_encoding(&head.headers),
        }
    }
}

impl ResponseRecord {
    /// Build the response half of a record from what a flush released.
    pub fn capture(
        captured: &CapturedResponse,
        completed_at: DateTime<Utc>,
        policy: &FilterPolicy,
    ) -> Self {
        let body = if captured.upgraded {
            String::new()
        } else {
            policy.body_field(
                Direction::Response,
                &captured.body,
                &content_type(&captured.headers),
            )
        };

        Self {
            time: rfc3339(completed_at),
            status: captured.status.as_u16(),
            headers: first_value_headers(&captured.headers),
            body,
            transfer_encoding: transfer_encoding(&captured.headers),
        }
    }
}

/// Reduce a header map to one value per name.
///
/// Only the first value of a repeated header is kept; the rest are dropped. Names are the
/// lowercase form the `http` crate stores, values are decoded lossily as UTF-8.
pub fn first_value_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .keys()
        .filter_map(|name| {
            headers.get(name).map(|value| {
                (
                    name.as_str().to_owned(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
        })
        .collect()
}

fn transfer_encoding(headers: &HeaderMap) -> String {
    headers
        .get(header::TRANSFER_ENCODING)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
        .unwrap_or_default()
}

/// RFC 3339 timestamp at second precision in UTC.
pub fn rfc3339(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}
