use std::{collections::BTreeMap, path::PathBuf, sync::Arc};

use anyhow::Context;
use api_router::{
    api_routes_v1,
    api_state::ApiState,
    mcp::{serve_stdio, streamable_http_service},
};
use axum::{http::HeaderValue, Router};
use common::{
    backends::{resolve, ResolvedConfig},
    utils::config::{get_config, AppConfig, McpTransport},
};
use retrieval_pipeline::build_engine;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let config = get_config().context("failed to load configuration")?;

    let resolved = match resolve(&config) {
        Ok(resolved) => Arc::new(resolved),
        Err(e) => {
            error!(error = %e, "invalid storage configuration");
            return Err(e).context("failed to resolve storage backends");
        }
    };
    info!(wiring = %resolved.describe(), "storage backends resolved");

    let env_file = write_engine_environment(&config, &resolved)
        .await
        .context("failed to write engine environment file")?;
    info!(path = %env_file.display(), "engine environment written");

    let engine = build_engine(&config, Arc::clone(&resolved))?;
    if let Err(e) = engine.initialize().await {
        warn!(error = %e, "retrieval engine is not reachable yet, continuing");
    }

    let api_state = ApiState::new(&config, resolved, engine)?;
    let app = build_app(&api_state);

    match config.mcp_transport {
        McpTransport::Stdio => {
            let engine = Arc::clone(&api_state.engine);
            tokio::spawn(async move {
                if let Err(e) = serve_stdio(engine).await {
                    warn!(error = %e, "MCP stdio transport stopped");
                }
            });
        }
        McpTransport::Sse => {
            warn!("MCP_TRANSPORT=sse is served by the streamable HTTP endpoint at /mcp");
        }
        McpTransport::Streamable => info!("MCP tools mounted at /mcp"),
    }

    let serve_address = format!("{}:{}", config.host, config.port);
    info!("Starting server listening on {serve_address}");
    let listener = tokio::net::TcpListener::bind(&serve_address)
        .await
        .with_context(|| format!("failed to bind {serve_address}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped, draining ingestion jobs");
    api_state.orchestrator.shutdown().await;

    Ok(())
}

fn build_app(api_state: &ApiState) -> Router {
    let mut app = Router::new().nest("/api/v1", api_routes_v1(api_state));
    if api_state.config.mcp_transport.is_http() {
        app = app.nest_service("/mcp", streamable_http_service(api_state));
    }

    app.with_state(api_state.clone())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&api_state.config))
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins = config.allowed_origins();
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if origins.is_empty() || origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    layer.allow_origin(AllowOrigin::list(parsed))
}

/// Renders `KEY=value` lines. Values spanning several lines cannot be represented.
fn render_engine_environment(env: &BTreeMap<&'static str, String>) -> std::io::Result<String> {
    env.iter()
        .map(|(key, value)| {
            if value.contains(['\n', '\r']) {
                Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("value for {key} contains a line break"),
                ))
            } else {
                Ok(format!("{key}={value}\n"))
            }
        })
        .collect()
}

/// Writes the resolved wiring for the engine process to load.
///
/// The file carries credentials, so on unix it is readable by the owner only.
async fn write_engine_environment(
    config: &AppConfig,
    resolved: &ResolvedConfig,
) -> std::io::Result<PathBuf> {
    let contents = render_engine_environment(&resolved.engine_environment())?;

    let dir = config.working_dir();
    tokio::fs::create_dir_all(&dir).await?;
    let path = dir.join("engine.env");

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(&path).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))
            .await?;
    }
    file.write_all(contents.as_bytes()).await?;
    file.flush().await?;

    Ok(path)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, http::StatusCode};
    use tower::ServiceExt;

    fn smoke_test_config(working_dir: &std::path::Path) -> AppConfig {
        AppConfig {
            working_dir: Some(working_dir.to_string_lossy().into_owned()),
            lightrag_api_url: "http://127.0.0.1:1".into(),
            lightrag_timeout: 2,
            ..Default::default()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn smoke_startup_without_engine() {
        let workdir = tempfile::tempdir().expect("tempdir");
        let config = smoke_test_config(workdir.path());
        let resolved = Arc::new(resolve(&config).expect("default config resolves"));
        let engine = build_engine(&config, Arc::clone(&resolved)).expect("engine");
        let api_state = ApiState::new(&config, resolved, engine).expect("api state");
        let app = build_app(&api_state);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::OK);

        let ready_response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/ready")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("ready response");
        assert_eq!(ready_response.status(), StatusCode::SERVICE_UNAVAILABLE);

        api_state.orchestrator.shutdown().await;
    }

    #[tokio::test]
    async fn mcp_endpoint_follows_transport() {
        let workdir = tempfile::tempdir().expect("tempdir");
        let initialize = r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2025-03-26","capabilities":{},"clientInfo":{"name":"smoke","version":"0"}}}"#;

        for (transport, mounted) in [
            (McpTransport::Stdio, false),
            (McpTransport::Sse, true),
            (McpTransport::Streamable, true),
        ] {
            let config = AppConfig {
                mcp_transport: transport,
                ..smoke_test_config(workdir.path())
            };
            let resolved = Arc::new(resolve(&config).expect("default config resolves"));
            let engine = build_engine(&config, Arc::clone(&resolved)).expect("engine");
            let api_state = ApiState::new(&config, resolved, engine).expect("api state");

            let response = build_app(&api_state)
                .oneshot(
                    Request::builder()
                        .method("POST")
                        .uri("/mcp")
                        .header("content-type", "application/json")
                        .header("accept", "application/json, text/event-stream")
                        .body(Body::from(initialize))
                        .expect("request"),
                )
                .await
                .expect("router response");

            assert_eq!(
                response.status() != StatusCode::NOT_FOUND,
                mounted,
                "{transport:?}"
            );
            api_state.orchestrator.shutdown().await;
        }
    }

    #[tokio::test]
    async fn engine_environment_file_lists_wiring() {
        let workdir = tempfile::tempdir().expect("tempdir");
        let config = AppConfig {
            vector_storage_type: Some("qdrant".into()),
            ..smoke_test_config(workdir.path())
        };
        let resolved = resolve(&config).expect("resolves");

        let path = write_engine_environment(&config, &resolved)
            .await
            .expect("written");
        let contents = tokio::fs::read_to_string(path).await.expect("readable");

        assert!(contents.contains("LIGHTRAG_VECTOR_STORAGE=QdrantVectorDBStorage"));
        assert!(contents.lines().all(|line| line.contains('=')));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn engine_environment_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let workdir = tempfile::tempdir().expect("tempdir");
        let config = AppConfig {
            postgres_password: "pg-secret".into(),
            ..smoke_test_config(workdir.path())
        };
        let resolved = resolve(&config).expect("resolves");
        let stale = workdir.path().join("engine.env");
        std::fs::write(&stale, "OLD=1\n").expect("seed file");
        std::fs::set_permissions(&stale, std::fs::Permissions::from_mode(0o644))
            .expect("loosen permissions");

        let path = write_engine_environment(&config, &resolved)
            .await
            .expect("written");

        let mode = std::fs::metadata(&path).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        let contents = std::fs::read_to_string(&path).expect("readable");
        assert!(!contents.contains("OLD=1"));
        assert!(contents.contains("POSTGRES_PASSWORD=pg-secret"));
    }

    #[tokio::test]
    async fn multi_line_values_are_rejected() {
        let workdir = tempfile::tempdir().expect("tempdir");
        let config = AppConfig {
            postgres_password: "line1\nINJECTED=1".into(),
            ..smoke_test_config(workdir.path())
        };
        let resolved = resolve(&config).expect("resolves");

        let err = write_engine_environment(&config, &resolved)
            .await
            .expect_err("line break must be rejected");

        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
        assert!(!err.to_string().contains("INJECTED"));
        assert!(!workdir.path().join("engine.env").exists());
    }

    #[test]
    fn cors_accepts_explicit_origin_list() {
        let config = AppConfig {
            allowed_origins: "https://a.example,not a header\u{7f}".into(),
            ..Default::default()
        };

        // Invalid entries are dropped instead of failing startup.
        let _layer = cors_layer(&config);
    }
}
