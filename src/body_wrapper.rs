//! Body buffering and replay utilities.
//!
//! This module drains an HTTP body into memory and rebuilds an equivalent body from the
//! buffered bytes, so both the request and the response can be inspected in full while the
//! next hop still receives exactly what was sent.

use axum::body::{Body, Bytes};
use axum::http::HeaderMap;
use bytes::BytesMut;
use http_body::Frame;
use http_body_util::{BodyExt, StreamBody};
use tracing::error;

/// A fully materialized HTTP body.
///
/// Holds the data frames concatenated in arrival order, any trailers, and the error that ended
/// the stream early, if there was one. [`BufferedBody::release`] turns it back into a [`Body`]
/// that replays the same sequence.
#[derive(Debug, Default)]
pub struct BufferedBody {
    data: BytesMut,
    trailers: Option<HeaderMap>,
    error: Option<axum::Error>,
}

impl BufferedBody {
    /// Drain `body` until it ends or errors.
    ///
    /// A stream error stops the drain; the bytes read so far are kept and the error is
    /// replayed by [`BufferedBody::release`].
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sluice::body_wrapper::BufferedBody;
    /// use axum::body::Body;
    ///
    /// # async fn example() {
    /// let buffered = BufferedBody::collect(Body::from("Hello, World!")).await;
    /// assert_eq!(buffered.as_bytes(), b"Hello, World!");
    ///
    /// // Hand an identical body on to the next hop
    /// let (_body, bytes) = buffered.release();
    /// assert_eq!(bytes, "Hello, World!");
    /// # }
    /// ```
    pub async fn collect(mut body: Body) -> Self {
        let mut buffered = Self::default();
        while let Some(frame) = body.frame().await {
            match frame {
                Ok(frame) => buffered.push_frame(frame),
                Err(e) => {
                    error!(error = %e, "Stream error while buffering body");
                    buffered.error = Some(e);
                    break;
                }
            }
        }
        buffered
    }

    fn push_frame(&mut self, frame: Frame<Bytes>) {
        match frame.into_data() {
            Ok(data) => self.extend(&data),
            Err(frame) => {
                if let Ok(trailers) = frame.into_trailers() {
                    self.trailers.get_or_insert_with(HeaderMap::new).extend(trailers);
                }
            }
        }
    }

    /// Append raw bytes to the buffered data.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.data.extend_from_slice(chunk);
    }

    /// The buffered data bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Trailers received after the data, if any.
    pub fn trailers(&self) -> Option<&HeaderMap> {
        self.trailers.as_ref()
    }

    /// Whether the original stream ended with an error.
    pub fn is_truncated(&self) -> bool {
        self.error.is_some()
    }

    /// Rebuild a body that replays the buffered frames, and return the data bytes alongside it.
    ///
    /// A plain body (no trailers, no error) becomes a single full [`Body`] so its exact size
    /// hint is preserved.
    pub fn release(self) -> (Body, Bytes) {
        let data = self.data.freeze();

        if self.trailers.is_none() && self.error.is_none() {
            return (Body::from(data.clone()), data);
        }

        let mut frames: Vec<Result<Frame<Bytes>, axum::Error>> = Vec::with_capacity(3);
        if !data.is_empty() {
            frames.push(Ok(Frame::data(data.clone())));
        }
        if let Some(trailers) = self.trailers {
            frames.push(Ok(Frame::trailers(trailers)));
        }
        if let Some(e) = self.error {
            frames.push(Err(e));
        }

        let body = Body::new(StreamBody::new(futures::stream::iter(frames)));
        (body, data)
    }
}
