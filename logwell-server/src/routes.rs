use std::time::Duration;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::auth;
use crate::handlers::{health, ingest, labels, query, stream};
use crate::state::AppState;

pub fn create_app(state: AppState) -> Router {
    // Everything except probes sits behind the API key layer.
    let api = Router::new()
        .route("/ingest", post(ingest::ingest_handler))
        .route("/query", get(query::query_handler))
        .route("/labels", get(labels::label_keys_handler))
        .route("/labels/{name}/values", get(labels::label_values_handler))
        .route("/stream", get(stream::stream_handler))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ));

    Router::new()
        .route("/health", get(health::health_handler))
        .route("/metrics", get(health::metrics_handler))
        .merge(api)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        // Bounds request handling; upgraded stream connections are not
        // affected because the upgrade response completes immediately.
        .layer(TimeoutLayer::new(Duration::from_secs(
            state.config.server.read_timeout,
        )))
        .with_state(state)
}
