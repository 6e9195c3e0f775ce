use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;

use pushlog_db::{PushFilter, PushRecord};

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub after: Option<i64>,
    pub limit: Option<usize>,
}

pub async fn list_pushes(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<PushRecord>>, (StatusCode, String)> {
    let repository = state
        .db
        .repositories()
        .get_by_name(&name)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                format!("Repository not found: {}", name),
            )
        })?;

    let filter = PushFilter {
        after: params.after,
        limit: params.limit,
    };
    let pushes = state
        .db
        .pushes()
        .list(repository.id, &filter)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(pushes))
}
