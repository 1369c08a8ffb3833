//! # Sluice
//!
//! An Axum middleware that holds each response back long enough to log it, then releases it
//! to the client unchanged.
//!
//! For every request the middleware assigns (or propagates) a correlation ID, buffers the
//! request and response bodies, and writes one JSON object per exchange to standard output.
//! What ends up in the log is governed by a small filtering policy:
//!
//! - **Content types**: bodies are logged literally only for exactly matching types
//! - **Body size**: bodies above the byte limit are replaced by a placeholder
//! - **Status codes**: exchanges with other statuses produce no line at all
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use axum::{routing::get, Router};
//! use sluice::{RequestLoggerConfig, RequestLoggerLayer, config::Limits};
//!
//! async fn hello() -> &'static str {
//!     "Hello, World!"
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = RequestLoggerConfig {
//!         content_types: vec!["application/json".to_string()],
//!         limits: Limits { max_body_size: 4096 },
//!         ..Default::default()
//!     };
//!     let layer = RequestLoggerLayer::new(config).expect("valid logger config");
//!
//!     let app = Router::new().route("/hello", get(hello)).layer(layer);
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```
//!
//! Each request then produces a line like:
//!
//! ```json
//! {"request_id":"5f0c…","request":{"uri":"/hello","host":"localhost:3000","headers":{…},
//!  "body":"","verb":"GET","ip_address":"","time":"2024-05-17T09:30:00Z","transfer_encoding":""},
//!  "response":{"time":"2024-05-17T09:30:00Z","status":200,"headers":{…},"body":"…",
//!  "transfer_encoding":""},"direction":"Incomming","metadata":""}
//! ```
//!
//! ## Custom Sinks
//!
//! Implement [`LogSink`] to send records somewhere other than standard output:
//!
//! ```rust
//! use sluice::{LogRecord, LogSink, RequestLoggerConfig, RequestLoggerLayer, sink::EmitError};
//!
//! #[derive(Debug)]
//! struct StderrSink;
//!
//! impl LogSink for StderrSink {
//!     fn emit(&self, record: &LogRecord) -> Result<(), EmitError> {
//!         eprintln!("{}", serde_json::to_string(record)?);
//!         Ok(())
//!     }
//! }
//!
//! let layer = RequestLoggerLayer::new(RequestLoggerConfig::default())
//!     .unwrap()
//!     .with_sink(StderrSink);
//! ```

use axum::{
    extract::Request,
    http::{HeaderMap, HeaderName, HeaderValue},
    response::Response,
};
use chrono::Utc;
use rand::{rngs::OsRng, RngCore};
use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tower::{Layer, Service};
use tracing::{debug, debug_span, error, Instrument};

pub mod body_wrapper;
use body_wrapper::BufferedBody;

pub mod capture;
use capture::ResponseCapture;

pub mod config;
pub use config::{ConfigError, RequestLoggerConfig};

pub mod filter;
use filter::FilterPolicy;

pub mod record;
pub use record::LogRecord;
use record::{RequestRecord, ResponseRecord, METADATA_UPGRADED};

pub mod sink;
pub use sink::{JsonLinesSink, LogSink, TracingSink};

/// Number of random bytes in a generated correlation ID.
const REQUEST_ID_BYTES: usize = 16;

/// Generate a correlation ID: 16 bytes from the OS random source, hex-encoded.
fn generate_request_id() -> Result<String, rand::Error> {
    let mut bytes = [0u8; REQUEST_ID_BYTES];
    OsRng.try_fill_bytes(&mut bytes)?;
    Ok(hex::encode(bytes))
}

/// Immutable per-layer state shared by every request.
struct RequestLogger {
    request_id_header: HeaderName,
    policy: FilterPolicy,
    sink: Arc<dyn LogSink>,
}

impl RequestLogger {
    /// Read the caller's correlation ID, or generate one, and make sure the request carries it.
    fn assign_request_id(&self, headers: &mut HeaderMap) -> String {
        if let Some(existing) = headers.get(&self.request_id_header) {
            if !existing.is_empty() {
                return String::from_utf8_lossy(existing.as_bytes()).into_owned();
            }
        }

        let request_id = generate_request_id().unwrap_or_else(|e| {
            error!(error = %e, "Failed to generate request ID");
            String::new()
        });

        match HeaderValue::from_str(&request_id) {
            Ok(value) => {
                headers.insert(self.request_id_header.clone(), value);
            }
            Err(e) => error!(error = %e, "Generated request ID is not a valid header value"),
        }
        request_id
    }

    async fn intercept<S>(self: Arc<Self>, mut inner: S, mut request: Request) -> Result<Response, S::Error>
    where
        S: Service<Request, Response = Response>,
    {
        let received_at = Utc::now();
        let request_id = self.assign_request_id(request.headers_mut());
        debug!(request_id = %request_id, "Assigned request ID");

        let (head, body) = request.into_parts();
        let (body, request_body) = BufferedBody::collect(body).await.release();
        let request_record = RequestRecord::capture(&head, &request_body, received_at, &self.policy);
        debug!(request_id = %request_id, body_size = request_body.len(), "Request body buffered");

        let response = inner.call(Request::from_parts(head, body)).await?;

        let (response, captured) = ResponseCapture::record(response).await.flush();
        let completed_at = Utc::now();
        debug!(
            request_id = %request_id,
            status = %captured.status,
            body_size = captured.body.len(),
            upgraded = captured.upgraded,
            "Response released"
        );

        if !self.policy.allows_status(captured.status) {
            debug!(request_id = %request_id, status = %captured.status, "Status filtered out, not logging");
            return Ok(response);
        }

        let mut record = LogRecord::new(
            request_id,
            request_record,
            ResponseRecord::capture(&captured, completed_at, &self.policy),
        );
        if captured.upgraded {
            record.metadata = METADATA_UPGRADED.to_string();
        }

        if let Err(e) = self.sink.emit(&record) {
            error!(request_id = %record.request_id, error = %e, "Failed to emit request log record");
        }

        Ok(response)
    }
}

/// Tower layer for the request logging middleware.
///
/// This is the main entry point. The configuration is validated once here and shared,
/// read-only, by every service the layer produces.
///
/// # Examples
///
/// ```rust,no_run
/// use sluice::{RequestLoggerLayer, RequestLoggerConfig};
/// use axum::{routing::get, Router};
///
/// # async fn hello() -> &'static str { "Hello" }
/// # #[tokio::main]
/// # async fn main() {
/// let layer = RequestLoggerLayer::new(RequestLoggerConfig::default()).unwrap();
///
/// let app = Router::new()
///     .route("/hello", get(hello))
///     .layer(layer);
///
/// let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
/// axum::serve(listener, app).await.unwrap();
/// # }
/// ```
#[derive(Clone)]
pub struct RequestLoggerLayer {
    logger: Arc<RequestLogger>,
}

impl RequestLoggerLayer {
    /// Create a layer writing JSON lines to standard output.
    ///
    /// Fails if the correlation header name or any status code in `config` is invalid.
    pub fn new(config: RequestLoggerConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            logger: Arc::new(RequestLogger {
                request_id_header: config.request_id_header()?,
                policy: config.filter_policy()?,
                sink: Arc::new(JsonLinesSink::stdout()),
            }),
        })
    }

    /// Send records to `sink` instead of standard output.
    pub fn with_sink<K: LogSink>(self, sink: K) -> Self {
        self.with_shared_sink(Arc::new(sink))
    }

    /// Send records to an already shared sink.
    pub fn with_shared_sink(self, sink: Arc<dyn LogSink>) -> Self {
        Self {
            logger: Arc::new(RequestLogger {
                request_id_header: self.logger.request_id_header.clone(),
                policy: self.logger.policy.clone(),
                sink,
            }),
        }
    }
}

impl<S> Layer<S> for RequestLoggerLayer {
    type Service = RequestLoggerService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestLoggerService {
            inner,
            logger: self.logger.clone(),
        }
    }
}

/// Tower service implementation for the request logging middleware.
///
/// Buffers the request body, runs the inner service, buffers its response, releases the
/// response and then emits the log record. Users typically don't interact with this type
/// directly - it's created by [`RequestLoggerLayer`].
#[derive(Clone)]
pub struct RequestLoggerService<S> {
    inner: S,
    logger: Arc<RequestLogger>,
}

impl<S> Service<Request> for RequestLoggerService<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        // Drive the instance that was polled ready; leave a fresh clone in its place.
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);

        let span = debug_span!("request_logger", method = %request.method(), uri = %request.uri());
        Box::pin(self.logger.clone().intercept(inner, request).instrument(span))
    }
}
