//! HTTP server facade with Axum, error handling, and OpenAPI support.

use anyhow::Context;
use axum::{extract::Request, routing::get, Json, Router, ServiceExt};
use tower_http::normalize_path::NormalizePath;

use mux_kernel::{settings::Settings, ModuleRegistry};

pub mod error;
pub mod router;

use router::RouterBuilder;

/// The service as served: the router behind trailing-slash normalisation
pub type App = NormalizePath<Router>;

/// Start the HTTP server and serve until Ctrl-C
pub async fn start_server(
    registry: &ModuleRegistry,
    settings: &Settings,
    base: Router,
) -> anyhow::Result<()> {
    let address = format!("{}:{}", settings.server.host, settings.server.port);
    tracing::info!("starting HTTP server on {}", address);

    let app = build_app(registry, settings, base);

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind to {}", address))?;

    tracing::info!("Server is running on http://{}", address);

    axum::serve(listener, ServiceExt::<Request>::into_make_service(app))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    tracing::info!("HTTP server stopped");
    Ok(())
}

/// Build the full service: `base` routes, `/health` and `/healthz`, every module under its
/// prefixes, docs, and the global middleware stack
pub fn build_app(registry: &ModuleRegistry, settings: &Settings, base: Router) -> App {
    let mut router_builder = RouterBuilder::new()
        .merge(base)
        .route("/health", get(health_status))
        .route("/healthz", get(health_check));

    for module in registry.modules() {
        router_builder = router_builder.mount_module(module.as_ref());
    }

    let router = router_builder
        .with_openapi(registry)
        .with_timeout(settings.server.request_timeout_ms)
        .with_tracing()
        .with_request_id()
        .with_cors()
        .build();

    NormalizePath::trim_trailing_slash(router)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "ok"
}

/// JSON health check kept at the path existing probes use
async fn health_status() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt as _;

    async fn get_body(uri: &str) -> (StatusCode, Vec<u8>) {
        let app = build_app(&ModuleRegistry::new(), &Settings::default(), Router::new());
        let request = axum::http::Request::builder()
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, bytes.to_vec())
    }

    #[tokio::test]
    async fn health_answers_with_json_status() {
        let (status, body) = get_body("/health").await;
        assert_eq!(status, StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body, serde_json::json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn healthz_answers_with_plain_text() {
        let (status, body) = get_body("/healthz/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"ok");
    }
}
