use axum::{
    extract::{Path, State},
    Json,
};

use crate::state::AppState;

/// `GET /labels` — known label keys, lexicographic.
pub async fn label_keys_handler(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.supervisor.index().label_keys())
}

/// `GET /labels/{name}/values` — known values for one key, lexicographic.
pub async fn label_values_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Json<Vec<String>> {
    Json(state.supervisor.index().values_of(&name))
}
