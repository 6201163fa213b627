// rest/mod.rs — Public REST API server.
//
// Axum HTTP server, local-only by default.
//
// Endpoints:
//   GET  /api/v1/health
//   POST /api/v1/data-lifecycle                (service credential)
//   POST /api/v1/retention/run                 (service credential)
//   POST /api/v1/certificates                  (user JWT)
//   GET  /api/v1/certificates/{id}/verify
//   POST /api/v1/courses/generate              (user JWT)

pub mod routes;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::AppContext;

pub async fn start_rest_server(ctx: Arc<AppContext>) -> Result<()> {
    let bind = format!("{}:{}", ctx.config.bind_address, ctx.config.port);
    let addr: SocketAddr = bind.parse()?;

    let router = build_router(ctx);

    info!("REST API listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

pub fn build_router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        // Health (no auth)
        .route("/api/v1/health", get(routes::health::health))
        // GDPR data lifecycle
        .route("/api/v1/data-lifecycle", post(routes::lifecycle::data_lifecycle))
        .route("/api/v1/retention/run", post(routes::lifecycle::run_retention))
        // Certificates
        .route(
            "/api/v1/certificates",
            post(routes::certificates::request_certificate),
        )
        .route(
            "/api/v1/certificates/{id}/verify",
            get(routes::certificates::verify_certificate),
        )
        // Course generation
        .route("/api/v1/courses/generate", post(routes::courses::generate_course))
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}
