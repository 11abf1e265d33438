pub mod analysis;
pub mod error;
pub mod routes;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use std::path::PathBuf;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use analysis::{reanalyze, ReanalysisMode, ReanalysisOutcome};
pub use state::AppState;

/// Build the axum Router with Claude-backed collaborators from config.
pub fn build_router(root: PathBuf) -> Router {
    build_router_with(state::AppState::new(root))
}

/// Build the axum Router around an existing state. Tests use this to inject
/// their own scorer and generator.
pub fn build_router_with(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(routes::health::health))
        // Events (SSE)
        .route("/api/events", get(routes::events::sse_events))
        // Config
        .route("/api/config", get(routes::config::get_config))
        // Features
        .route(
            "/api/features",
            get(routes::features::list_features).post(routes::features::create_feature),
        )
        .route(
            "/api/features/{slug}",
            get(routes::features::get_feature)
                .patch(routes::features::update_feature)
                .delete(routes::features::delete_feature),
        )
        // Analysis
        .route(
            "/api/features/{slug}/analyze",
            post(routes::analysis::analyze_feature),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// Start the HTTP service on `port`.
pub async fn serve(root: PathBuf, port: u16, open_browser: bool) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    serve_on(root, listener, open_browser).await
}

/// Start the HTTP service on a pre-bound listener.
///
/// The caller can read the actual port before starting, which matters when
/// `port = 0` and the OS picks a free one.
pub async fn serve_on(
    root: PathBuf,
    listener: tokio::net::TcpListener,
    open_browser: bool,
) -> anyhow::Result<()> {
    let actual_port = listener.local_addr()?.port();
    let app = build_router(root);

    tracing::info!("gherkin-forge listening on http://localhost:{actual_port}");

    if open_browser {
        let url = format!("http://localhost:{actual_port}/api/features");
        if let Err(e) = open::that(&url) {
            tracing::debug!(error = %e, "could not open browser");
        }
    }

    axum::serve(listener, app).await?;
    Ok(())
}
