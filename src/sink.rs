//! Destinations for finished log records.
//!
//! [`JsonLinesSink`] is what the middleware uses by default: one JSON object per line on
//! standard output. [`TracingSink`] routes records through `tracing` instead, which is handy
//! during development.

use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};
use tracing::info;

use crate::record::LogRecord;

/// Error type for emitting a record
#[derive(Debug, thiserror::Error)]
pub enum EmitError {
    #[error("failed to serialize log record: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write log record: {0}")]
    Write(#[from] io::Error),
}

/// Trait for consuming finished log records.
///
/// Called once per logged exchange, after the response has been released to the client.
/// Implementations are shared across all in-flight requests.
///
/// # Examples
///
/// ```rust
/// use sluice::{LogRecord, LogSink, sink::EmitError};
///
/// #[derive(Debug)]
/// struct ErrorsOnly;
///
/// impl LogSink for ErrorsOnly {
///     fn emit(&self, record: &LogRecord) -> Result<(), EmitError> {
///         if record.response.status >= 500 {
///             eprintln!("{} failed with {}", record.request.uri, record.response.status);
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait LogSink: Send + Sync + 'static {
    /// Emit one record. Errors are reported by the middleware and never retried.
    fn emit(&self, record: &LogRecord) -> Result<(), EmitError>;
}

/// Newline-delimited JSON writer.
///
/// Each record is serialized up front and written with a single `write_all` while holding the
/// writer lock, so lines from concurrent requests never interleave.
///
/// The write blocks the calling runtime worker. A reader that stops draining the writer
/// stalls every request that reaches `emit`.
#[derive(Debug)]
pub struct JsonLinesSink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send + 'static> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

impl JsonLinesSink<io::Stdout> {
    /// A sink writing to the process standard output.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send + 'static> LogSink for JsonLinesSink<W> {
    fn emit(&self, record: &LogRecord) -> Result<(), EmitError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.write_all(&line)?;
        writer.flush()?;
        Ok(())
    }
}

/// Emits records as `tracing` events at info level.
#[derive(Debug, Clone, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn emit(&self, record: &LogRecord) -> Result<(), EmitError> {
        let line = serde_json::to_string(record)?;
        info!(
            request_id = %record.request_id,
            verb = %record.request.verb,
            uri = %record.request.uri,
            status = record.response.status,
            record = %line,
            "Request logged"
        );
        Ok(())
    }
}
