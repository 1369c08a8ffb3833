//! Filtering policy deciding what gets logged literally.

use axum::http::{header, HeaderMap, StatusCode};
use std::collections::HashSet;
use std::fmt;

/// Which side of the exchange a body belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Request,
    Response,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Request => f.write_str("Request"),
            Direction::Response => f.write_str("Response"),
        }
    }
}

/// Content-type, status-code and size rules for one logger instance.
///
/// All matching is exact: `text/plain; charset=utf-8` does not match an allowed
/// `text/plain`. An empty allow-list allows everything.
#[derive(Debug, Clone, Default)]
pub struct FilterPolicy {
    content_types: HashSet<String>,
    status_codes: HashSet<StatusCode>,
    max_body_size: usize,
}

impl FilterPolicy {
    pub fn new(
        content_types: impl IntoIterator<Item = String>,
        status_codes: impl IntoIterator<Item = StatusCode>,
        max_body_size: usize,
    ) -> Self {
        Self {
            content_types: content_types.into_iter().collect(),
            status_codes: status_codes.into_iter().collect(),
            max_body_size,
        }
    }

    /// Check if a body with this content type may be logged.
    ///
    /// A missing content type never matches a non-empty allow-list.
    pub fn allows_content_type(&self, content_type: &str) -> bool {
        if self.content_types.is_empty() {
            return true;
        }
        !content_type.is_empty() && self.content_types.contains(content_type)
    }

    /// Check if an exchange with this status produces a log record.
    pub fn allows_status(&self, status: StatusCode) -> bool {
        self.status_codes.is_empty() || self.status_codes.contains(&status)
    }

    /// Check if a body of `size` bytes may be logged (inclusive).
    pub fn allows_body_size(&self, size: usize) -> bool {
        size <= self.max_body_size
    }

    /// Render the `body` field of a log record.
    ///
    /// Returns the body text when both the size and content-type rules allow it, otherwise a
    /// placeholder naming the byte count and the content type that was seen.
    pub fn body_field(&self, direction: Direction, body: &[u8], content_type: &str) -> String {
        if self.allows_body_size(body.len()) && self.allows_content_type(content_type) {
            return String::from_utf8_lossy(body).into_owned();
        }
        format!(
            "{direction} body too large to log or wrong content type. Size: {} bytes, Content-type: {content_type}",
            body.len()
        )
    }
}

/// First `Content-Type` value of a header map, or an empty string.
pub fn content_type(headers: &HeaderMap) -> String {
    headers
        .get(header::CONTENT_TYPE)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
        .unwrap_or_default()
}
