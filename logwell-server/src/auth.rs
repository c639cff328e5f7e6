//! API key middleware.
//!
//! When `auth.enabled` is set, every route this layer wraps requires the
//! configured key, either as `X-Api-Key` or as a bearer token. `/health`
//! and `/metrics` are mounted outside the layer so probes and scrapers
//! keep working.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::errors::ApiError;
use crate::state::AppState;

pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let auth = &state.config.auth;
    if !auth.enabled {
        return next.run(request).await;
    }
    let Some(expected) = auth.api_key.as_deref() else {
        // Config validation rejects this combination at startup.
        return ApiError::internal("auth enabled without an api key").into_response();
    };

    let provided = request
        .headers()
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .or_else(|| {
            request
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.strip_prefix("Bearer "))
        });

    if provided == Some(expected) {
        next.run(request).await
    } else {
        ApiError::unauthorized("missing or invalid api key").into_response()
    }
}
