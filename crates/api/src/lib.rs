pub mod error;
pub mod routes;
pub mod state;

use axum::{
    Router,
    routing::{get, patch, post},
};
use state::AppState;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Task routes (job status + orchestrator entry)
    let task_routes = Router::new()
        .route("/{task_id}", get(routes::task::get))
        .route("/{task_id}/process", post(routes::task::process));

    // Transcription routes (reads + single-field overwrite)
    let transcription_routes = Router::new()
        .route("/{transcription_id}", get(routes::transcript::get))
        .route(
            "/{transcription_id}/segment",
            get(routes::transcript::list_segments),
        )
        .route(
            "/{transcription_id}/segment/{sequence}",
            patch(routes::transcript::update_segment),
        );

    // Standalone segmenter surface
    let segmenter_routes = Router::new().route("/watch", post(routes::segmenter::watch));

    let api = Router::new()
        .nest("/task", task_routes)
        .nest("/transcription", transcription_routes)
        .nest("/segmenter", segmenter_routes);

    // Health check
    let health = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api)
        .merge(health)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
