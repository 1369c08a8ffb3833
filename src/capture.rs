//! The response capture wrapper.
//!
//! [`ResponseCapture`] stands in for the outgoing response while the downstream service's
//! output is inspected. Writes land in a buffer, the status is only recorded, and nothing
//! reaches the client until [`ResponseCapture::flush`] hands back the real response.

use axum::body::{Body, Bytes};
use axum::extract::Request;
use axum::http::{response::Parts, HeaderMap, StatusCode};
use axum::response::Response;
use hyper::upgrade::OnUpgrade;

use crate::body_wrapper::BufferedBody;

/// Error type for capture operations
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("{sink} does not support connection upgrades")]
    HijackUnsupported { sink: &'static str },
}

/// Buffering stand-in for an outgoing response.
///
/// Header access goes straight to the response head that will be sent. Body writes and the
/// status code are held back until [`flush`](ResponseCapture::flush), which consumes the
/// capture and therefore runs exactly once.
///
/// A `101 Switching Protocols` response is treated as hijacked: its body is passed through
/// untouched and nothing is buffered, since the connection belongs to the upgrade from then on.
///
/// # Examples
///
/// ```rust
/// use sluice::capture::ResponseCapture;
/// use axum::http::StatusCode;
///
/// let mut capture = ResponseCapture::new();
/// capture.headers_mut().insert("content-type", "text/plain".parse().unwrap());
/// capture.set_status(StatusCode::CREATED);
/// assert_eq!(capture.write(b"hello"), 5);
///
/// let (response, captured) = capture.flush();
/// assert_eq!(response.status(), StatusCode::CREATED);
/// assert_eq!(captured.body, "hello");
/// ```
#[derive(Debug)]
pub struct ResponseCapture {
    head: Parts,
    buffer: BufferedBody,
    passthrough: Option<Body>,
}

/// What a flushed [`ResponseCapture`] released to the client.
#[derive(Debug, Clone)]
pub struct CapturedResponse {
    /// Status code sent to the client
    pub status: StatusCode,
    /// Headers sent to the client
    pub headers: HeaderMap,
    /// Body bytes sent to the client; empty for upgraded connections
    pub body: Bytes,
    /// Whether the connection was handed off to a protocol upgrade
    pub upgraded: bool,
}

impl ResponseCapture {
    /// A capture with no headers, an empty body and a `200 OK` status.
    pub fn new() -> Self {
        let (head, ()) = axum::http::Response::new(()).into_parts();
        Self {
            head,
            buffer: BufferedBody::default(),
            passthrough: None,
        }
    }

    /// Capture a downstream response by draining its body into the buffer.
    pub async fn record(response: Response) -> Self {
        let (head, body) = response.into_parts();

        if head.status == StatusCode::SWITCHING_PROTOCOLS {
            return Self {
                head,
                buffer: BufferedBody::default(),
                passthrough: Some(body),
            };
        }

        Self {
            head,
            buffer: BufferedBody::collect(body).await,
            passthrough: None,
        }
    }

    /// The live headers of the outgoing response.
    pub fn headers(&self) -> &HeaderMap {
        &self.head.headers
    }

    /// Mutable access to the live headers of the outgoing response.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.head.headers
    }

    /// Buffer `chunk` and return the number of bytes accepted.
    ///
    /// Writes after a hijack are dropped and report zero bytes.
    pub fn write(&mut self, chunk: &[u8]) -> usize {
        if self.passthrough.is_some() {
            return 0;
        }
        self.buffer.extend(chunk);
        chunk.len()
    }

    /// Record the status code to send on flush.
    pub fn set_status(&mut self, status: StatusCode) {
        self.head.status = status;
    }

    pub fn status(&self) -> StatusCode {
        self.head.status
    }

    /// Bytes buffered so far.
    pub fn body(&self) -> &[u8] {
        self.buffer.as_bytes()
    }

    /// Whether the response hands the connection to a protocol upgrade.
    pub fn is_upgraded(&self) -> bool {
        self.passthrough.is_some()
    }

    /// Take over the connection underneath this response.
    ///
    /// Succeeds only when the response carries hyper's upgrade handle, e.g. a proxied
    /// `101 Switching Protocols` from a backend.
    pub fn hijack(&mut self) -> Result<OnUpgrade, CaptureError> {
        self.head
            .extensions
            .remove::<OnUpgrade>()
            .ok_or(CaptureError::HijackUnsupported {
                sink: std::any::type_name::<Response>(),
            })
    }

    /// Release the recorded status, headers and buffered body as the outgoing response.
    pub fn flush(self) -> (Response, CapturedResponse) {
        let upgraded = self.passthrough.is_some();
        let (body, bytes) = match self.passthrough {
            Some(body) => (body, Bytes::new()),
            None => self.buffer.release(),
        };

        let captured = CapturedResponse {
            status: self.head.status,
            headers: self.head.headers.clone(),
            body: bytes,
            upgraded,
        };

        (Response::from_parts(self.head, body), captured)
    }
}

impl Default for ResponseCapture {
    fn default() -> Self {
        Self::new()
    }
}

/// Take over the client connection of a server-side request.
///
/// The handle is only present when the server supports upgrades for this connection.
pub fn hijack_request(request: &mut Request) -> Result<OnUpgrade, CaptureError> {
    request
        .extensions_mut()
        .remove::<OnUpgrade>()
        .ok_or(CaptureError::HijackUnsupported {
            sink: std::any::type_name::<Request>(),
        })
}
