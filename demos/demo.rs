use axum::{
    body::Body,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use bytes::Bytes;
use sluice::{config::Limits, RequestLoggerConfig, RequestLoggerLayer};
use std::{net::SocketAddr, time::Duration};
use tokio::{net::TcpListener, time::sleep};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

// Test handlers for our demo server
async fn hello_handler() -> impl IntoResponse {
    sleep(Duration::from_millis(100)).await; // Simulate some work
    "Hello, World!"
}

async fn echo_handler(body: Bytes) -> impl IntoResponse {
    sleep(Duration::from_millis(50)).await; // Simulate some work
    format!("Echo: {}", String::from_utf8_lossy(&body))
}

async fn json_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({ "message": "hello" }))
}

async fn fail_handler() -> impl IntoResponse {
    (StatusCode::INTERNAL_SERVER_ERROR, "something broke")
}

async fn streaming_handler() -> impl IntoResponse {
    use futures::stream;
    use tokio::time::interval;

    let stream = stream::unfold(0u32, |count| async move {
        if count >= 5 {
            None
        } else {
            let mut interval = interval(Duration::from_millis(200));
            interval.tick().await;
            Some((
                Ok::<_, std::convert::Infallible>(Bytes::from(format!("chunk-{count}\n"))),
                count + 1,
            ))
        }
    });

    Response::builder()
        .header("content-type", "text/plain")
        .body(Body::from_stream(stream))
        .unwrap()
}

async fn large_response_handler() -> impl IntoResponse {
    // Larger than the demo body limit, so only a placeholder is logged
    "x".repeat(8192)
}

/// Load the logger config from the JSON file named by the first argument, if any.
fn load_config() -> anyhow::Result<RequestLoggerConfig> {
    match std::env::args().nth(1) {
        Some(path) => Ok(RequestLoggerConfig::from_json(&std::fs::read_to_string(path)?)?),
        None => Ok(RequestLoggerConfig {
            content_types: vec![
                "application/json".to_string(),
                "text/plain; charset=utf-8".to_string(),
            ],
            limits: Limits {
                max_body_size: 4096,
            },
            ..Default::default()
        }),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Diagnostics go to stderr; stdout carries only the JSON request log
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sluice=debug")),
        )
        .init();

    info!("Starting request logger demo server");

    let config = load_config()?;
    info!(?config, "Loaded logger configuration");

    // Build the router with middleware
    let app = Router::new()
        .route("/hello", get(hello_handler))
        .route("/echo", post(echo_handler))
        .route("/json", get(json_handler))
        .route("/fail", get(fail_handler))
        .route("/streaming", get(streaming_handler))
        .route("/large", get(large_response_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestLoggerLayer::new(config)?)
                .into_inner(),
        );

    info!("Demo server endpoints:");
    info!("  GET  /hello      - Simple greeting");
    info!("  POST /echo       - Echo request body");
    info!("  GET  /json       - JSON response");
    info!("  GET  /fail       - 500 response");
    info!("  GET  /streaming  - Streaming response");
    info!("  GET  /large      - Large response (logged as a placeholder)");
    info!("");
    info!("Try these commands:");
    info!("  curl http://localhost:3000/hello");
    info!("  curl -H 'X-Request-ID: my-trace' http://localhost:3000/json");
    info!("  curl -X POST -d 'Hello from client' http://localhost:3000/echo");
    info!("  curl http://localhost:3000/streaming");

    let listener = TcpListener::bind("0.0.0.0:3000").await?;
    info!("Demo server listening on http://localhost:3000");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
