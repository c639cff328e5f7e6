use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use logwell_model::{time, QueryResult};
use serde::Deserialize;

use crate::errors::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct QueryParams {
    pub query: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub limit: Option<i64>,
}

/// `GET /query?query={…}&start=…&end=…&limit=…`
///
/// Times are unix nanoseconds or RFC 3339; the window defaults to the
/// last hour. `limit` ≤ 0 (or absent) means unlimited up to the hard
/// ceiling.
pub async fn query_handler(
    State(state): State<AppState>,
    Query(params): Query<QueryParams>,
) -> ApiResult<Json<QueryResult>> {
    let selector = params
        .query
        .ok_or_else(|| ApiError::validation("missing required parameter: query"))?;
    let start = parse_time(params.start.as_deref())?;
    let end = parse_time(params.end.as_deref())?;
    let limit = params.limit.unwrap_or(0);

    let result = state
        .supervisor
        .executor()
        .execute(&selector, start, end, limit)
        .await?;
    Ok(Json(result))
}

fn parse_time(value: Option<&str>) -> ApiResult<Option<DateTime<Utc>>> {
    match value {
        None => Ok(None),
        Some(raw) => time::parse_flexible(raw)
            .map(Some)
            .map_err(|err| ApiError::invalid_time_range(err.to_string())),
    }
}
