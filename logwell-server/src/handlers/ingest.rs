use axum::{extract::State, Json};
use logwell_model::PushRequest;
use serde::Serialize;

use crate::errors::ApiResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub accepted: usize,
}

/// `POST /ingest` — validate and enqueue `{streams:[{labels, entries}]}`.
///
/// The response is optimistic: entries are accepted into the buffered
/// pipeline, not yet on disk. A full buffer answers 429.
pub async fn ingest_handler(
    State(state): State<AppState>,
    Json(request): Json<PushRequest>,
) -> ApiResult<Json<IngestResponse>> {
    let accepted = state.supervisor.ingestor().accept(request)?;
    Ok(Json(IngestResponse { accepted }))
}
