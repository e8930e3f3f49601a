use api_state::ApiState;
use axum::{
    extract::{DefaultBodyLimit, FromRef},
    routing::{any, get, post},
    Router,
};
use routes::{
    health::health,
    indexing::{index_batch, index_file, index_folder},
    proxy::proxy,
    query::query,
    readiness::ready,
};

pub mod api_state;
pub mod error;
pub mod mcp;
mod routes;

/// Router for API functionality, version 1
pub fn api_routes_v1<S>(app_state: &ApiState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ApiState: FromRef<S>,
{
    let max_body = app_state.config.ingest_max_body_bytes;

    // Probes for k8s/systemd
    let probes = Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready));

    let indexing = Router::new()
        .route(
            "/index",
            post(index_file).layer(DefaultBodyLimit::max(max_body)),
        )
        .route(
            "/index-batch",
            post(index_batch).layer(DefaultBodyLimit::max(max_body)),
        )
        .route("/index-folder", post(index_folder));

    let retrieval = Router::new().route("/query", post(query)).route(
        "/lightrag/{*path}",
        any(proxy).layer(DefaultBodyLimit::max(max_body)),
    );

    probes.merge(indexing).merge(retrieval)
}
